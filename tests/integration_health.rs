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

use common::{TestApp, generate_username};
use serde_json::Value;

#[tokio::test]
async fn test_probes() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(format!("{}/livez", app.mgmt_url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = app.client.get(format!("{}/readyz", app.mgmt_url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert_eq!(body["pubsub"], "ok");
}

#[tokio::test]
async fn test_probes_not_exposed_on_public_port() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(format!("{}/livez", app.server_url)).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_requests_carry_request_id() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;

    let resp = app.get(&alice, "/sessions").await;
    let generated = resp.headers().get("x-request-id").unwrap().to_str().unwrap().to_string();
    assert_eq!(uuid::Uuid::parse_str(&generated).unwrap().get_version_num(), 7);

    let resp = app
        .client
        .get(format!("{}/sessions", app.server_url))
        .bearer_auth(&alice.token)
        .header("x-request-id", "trace-me")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers().get("x-request-id").unwrap(), "trace-me");
}
