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
use ephemera_server::adapters::database::message_repo::MessageRepository;
use ephemera_server::workers::MessageCleanupWorker;
use serde_json::Value;
use uuid::Uuid;

#[tokio::test]
async fn test_expired_messages_and_receipts_are_purged() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;
    let bob = app.register_user(&generate_username("bob")).await;
    let room_id = app.direct_room(&alice, &bob).await;

    let expired = app.send_text(&alice, room_id, "old").await;
    let active = app.send_text(&alice, room_id, "new").await;
    let expired_id: Uuid = expired["id"].as_str().unwrap().parse().unwrap();
    let active_id: Uuid = active["id"].as_str().unwrap().parse().unwrap();

    app.post_empty(&bob, &format!("/rooms/{room_id}/read")).await;
    assert_eq!(app.receipt_count(&expired_id.to_string(), "read").await, 1);

    sqlx::query("UPDATE messages SET expires_at = NOW() - INTERVAL '1 day' WHERE id = $1")
        .bind(expired_id)
        .execute(&app.pool)
        .await
        .unwrap();

    // Expired messages disappear from reads before the purge runs
    let history: Vec<Value> = app.get(&bob, &format!("/rooms/{room_id}/messages")).await.json().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], active_id.to_string());

    let worker = MessageCleanupWorker::new(app.pool.clone(), MessageRepository::new(), app.config.messaging.clone());
    let deleted = worker.perform_cleanup().await.unwrap();
    assert!(deleted >= 1);

    let remaining: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM messages WHERE id = ANY($1)")
        .bind(vec![expired_id, active_id])
        .fetch_all(&app.pool)
        .await
        .unwrap();
    assert_eq!(remaining, vec![active_id]);

    assert_eq!(app.receipt_count(&expired_id.to_string(), "read").await, 0);
    assert_eq!(app.receipt_count(&active_id.to_string(), "read").await, 1);
}

#[tokio::test]
async fn test_expired_message_cannot_be_acknowledged() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;
    let bob = app.register_user(&generate_username("bob")).await;
    let room_id = app.direct_room(&alice, &bob).await;
    let msg = app.send_text(&alice, room_id, "fading").await;
    let id = msg["id"].as_str().unwrap();

    sqlx::query("UPDATE messages SET expires_at = NOW() - INTERVAL '1 minute' WHERE id = $1")
        .bind(id.parse::<Uuid>().unwrap())
        .execute(&app.pool)
        .await
        .unwrap();

    let resp = app.post_empty(&bob, &format!("/messages/{id}/read")).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(app.receipt_count(id, "read").await, 0);
}
