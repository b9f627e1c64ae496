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
use serde_json::{Value, json};
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_direct_room_is_idempotent() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;
    let bob = app.register_user(&generate_username("bob")).await;

    let first = app.direct_room(&alice, &bob).await;
    let second = app.direct_room(&bob, &alice).await;
    assert_eq!(first, second);

    let rooms: Vec<Value> = app.get(&alice, "/rooms").await.json().await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["kind"], "direct");
    assert_eq!(rooms[0]["member_ids"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_direct_room_rejects_self_and_unknown() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;

    let resp = app.post(&alice, "/rooms/direct", &json!({ "user_id": alice.user_id })).await;
    assert_eq!(resp.status(), 400);

    let resp = app.post(&alice, "/rooms/direct", &json!({ "user_id": Uuid::new_v4() })).await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_group_creation_and_validation() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;
    let bob = app.register_user(&generate_username("bob")).await;

    let resp = app.post(&alice, "/rooms/group", &json!({ "name": "   ", "member_ids": [bob.user_id] })).await;
    assert_eq!(resp.status(), 400);

    let resp = app.post(&alice, "/rooms/group", &json!({ "name": "Ghosts", "member_ids": [Uuid::new_v4()] })).await;
    assert_eq!(resp.status(), 404);

    let resp = app
        .post(&alice, "/rooms/group", &json!({ "name": " Book club ", "member_ids": [bob.user_id, bob.user_id] }))
        .await;
    assert_eq!(resp.status(), 201);
    let group: Value = resp.json().await.unwrap();
    assert_eq!(group["name"], "Book club");
    assert_eq!(group["role"], "owner");
    assert_eq!(group["member_ids"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_group_member_management() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;
    let bob = app.register_user(&generate_username("bob")).await;
    let carol = app.register_user(&generate_username("carol")).await;
    let room_id = app.group_room(&alice, "Team", &[&bob]).await;

    // Plain members cannot add others
    let resp = app.post(&bob, &format!("/rooms/{room_id}/members"), &json!({ "user_id": carol.user_id })).await;
    assert_eq!(resp.status(), 403);

    let mut carol_ws = app.connect_ws(&carol).await;

    let resp = app.post(&alice, &format!("/rooms/{room_id}/members"), &json!({ "user_id": carol.user_id })).await;
    assert_eq!(resp.status(), 200);
    let added = carol_ws.wait_for_event("group:member_added", Duration::from_secs(3)).await.expect("No add event");
    assert_eq!(added["room_id"], room_id.to_string());

    let resp = app.post(&alice, &format!("/rooms/{room_id}/members"), &json!({ "user_id": carol.user_id })).await;
    assert_eq!(resp.status(), 409);

    // The added member's socket now hears the room
    app.send_text(&alice, room_id, "welcome carol").await;
    let msg = carol_ws.wait_for_event("new_message", Duration::from_secs(3)).await.expect("No message after join");
    assert_eq!(msg["content"], "welcome carol");

    let resp = app.delete(&bob, &format!("/rooms/{room_id}/members/{}", carol.user_id)).await;
    assert_eq!(resp.status(), 403);

    let resp = app.delete(&bob, &format!("/rooms/{room_id}/members/{}", alice.user_id)).await;
    assert_eq!(resp.status(), 403, "owner cannot be removed");

    let resp = app.delete(&alice, &format!("/rooms/{room_id}/members/{}", carol.user_id)).await;
    assert_eq!(resp.status(), 204);
    carol_ws.wait_for_event("group:member_removed", Duration::from_secs(3)).await.expect("No remove event");

    let resp = app.get(&carol, &format!("/rooms/{room_id}/messages")).await;
    assert_eq!(resp.status(), 403);

    // Anyone may leave
    let resp = app.delete(&bob, &format!("/rooms/{room_id}/members/{}", bob.user_id)).await;
    assert_eq!(resp.status(), 204);
}

#[tokio::test]
async fn test_members_cannot_be_added_to_direct_rooms() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;
    let bob = app.register_user(&generate_username("bob")).await;
    let carol = app.register_user(&generate_username("carol")).await;
    let room_id = app.direct_room(&alice, &bob).await;

    let resp = app.post(&alice, &format!("/rooms/{room_id}/members"), &json!({ "user_id": carol.user_id })).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_membership_flags_and_hidden_rooms() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;
    let bob = app.register_user(&generate_username("bob")).await;
    let room_id = app.direct_room(&alice, &bob).await;

    let resp = app.patch(&alice, &format!("/rooms/{room_id}/membership"), &json!({})).await;
    assert_eq!(resp.status(), 400);

    let resp =
        app.patch(&alice, &format!("/rooms/{room_id}/membership"), &json!({ "is_pinned": true, "is_hidden": true })).await;
    assert_eq!(resp.status(), 200);
    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["is_pinned"], true);
    assert_eq!(summary["is_hidden"], true);
    assert_eq!(summary["is_archived"], false);

    let rooms: Vec<Value> = app.get(&alice, "/rooms").await.json().await.unwrap();
    assert!(rooms.is_empty());
    let rooms: Vec<Value> = app.get(&alice, "/rooms?include_hidden=true").await.json().await.unwrap();
    assert_eq!(rooms.len(), 1);

    // Flags are private to each member
    let bob_rooms: Vec<Value> = app.get(&bob, "/rooms").await.json().await.unwrap();
    assert_eq!(bob_rooms[0]["is_pinned"], false);

    // A new message brings the room back
    app.send_text(&bob, room_id, "you there?").await;
    let rooms: Vec<Value> = app.get(&alice, "/rooms").await.json().await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["is_hidden"], false);
    assert_eq!(rooms[0]["is_pinned"], true);
}

#[tokio::test]
async fn test_clear_room_hides_history_for_caller() {
    let app = TestApp::spawn().await;
    let alice = app.register_user(&generate_username("alice")).await;
    let bob = app.register_user(&generate_username("bob")).await;
    let room_id = app.direct_room(&alice, &bob).await;

    let old = app.send_text(&alice, room_id, "old news").await;

    let resp = app.post_empty(&bob, &format!("/rooms/{room_id}/clear")).await;
    assert_eq!(resp.status(), 200);
    let summary: Value = resp.json().await.unwrap();
    assert!(summary["cleared_at"].is_string());

    app.send_text(&alice, room_id, "fresh").await;

    let history: Vec<Value> = app.get(&bob, &format!("/rooms/{room_id}/messages")).await.json().await.unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(contents, vec!["fresh"]);
    assert_eq!(app.get(&bob, &format!("/messages/{}", old["id"].as_str().unwrap())).await.status(), 404);

    let history: Vec<Value> = app.get(&alice, &format!("/rooms/{room_id}/messages")).await.json().await.unwrap();
    assert_eq!(history.len(), 2);
}
