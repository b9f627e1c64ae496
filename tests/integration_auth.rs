#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::todo,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    clippy::clone_on_ref_ptr,
    clippy::items_after_statements,
    unreachable_pub,
    clippy::similar_names
)]
mod common;

use common::{JWT_SECRET, TestApp, generate_username};
use ephemera_server::domain::auth::Claims;

#[tokio::test]
async fn test_missing_or_garbage_token_rejected() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(format!("{}/rooms", app.server_url)).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = app.client.get(format!("{}/rooms", app.server_url)).bearer_auth("not-a-jwt").send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = app
        .client
        .get(format!("{}/rooms", app.server_url))
        .header("Authorization", "Basic abc")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_rejected() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;

    let forged = Claims::new(alice.user_id, alice.session_id, 3600).encode("not_the_secret").unwrap();
    let resp = app.client.get(format!("{}/rooms", app.server_url)).bearer_auth(forged).send().await.unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;

    let expired = Claims { sub: alice.user_id, sid: alice.session_id, exp: 1_000 }.encode(JWT_SECRET).unwrap();
    let resp = app.client.get(format!("{}/rooms", app.server_url)).bearer_auth(expired).send().await.unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_token_for_deleted_session_rejected() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;

    sqlx::query("DELETE FROM user_sessions WHERE id = $1").bind(alice.session_id).execute(&app.pool).await.unwrap();

    let resp = app.get(&alice, "/rooms").await;
    assert_eq!(resp.status(), 401);
}
