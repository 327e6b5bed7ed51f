//! Reactions and pins over REST, with their room broadcasts.
//!
//! Run with: `cargo test --test reactions_pins_test`
mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::{Value, json};
use uuid::Uuid;

use common::{TestSocket, auth_header, chat_context, seed_user, setup_db, uuid_of};
use depot_chat::chat::ChatContext;
use depot_chat::db::conversations as conversation_db;
use depot_chat::models::users;

struct Room {
    alice: users::Model,
    bob: users::Model,
    conversation_id: Uuid,
    message_id: Uuid,
    /// Bob's socket, joined to the room.
    watcher: TestSocket,
}

/// Accepted direct conversation with one message from alice.
async fn room_with_message(ctx: &ChatContext) -> Room {
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let bob = seed_user(&ctx.db, "bob@example.com").await;
    let conversation_id = conversation_db::create_direct(&ctx.db, alice.id, bob.id)
        .await
        .unwrap()
        .conversation
        .id;
    conversation_db::accept_membership(&ctx.db, conversation_id, bob.id)
        .await
        .unwrap();

    let mut a = TestSocket::connect(ctx, alice.id).await;
    a.send_message(ctx, conversation_id, "c1", "Truck 7 at dock 2").await;
    let message_id = uuid_of(&a.frames_of("send-ack")[0]["data"]["serverMessageId"]);

    let mut watcher = TestSocket::connect(ctx, bob.id).await;
    watcher.join(ctx, conversation_id).await;
    watcher.frames();

    Room {
        alice,
        bob,
        conversation_id,
        message_id,
        watcher,
    }
}

#[actix_web::test]
async fn reactions_are_unique_per_user_and_counted() {
    let ctx = chat_context(setup_db().await);
    let mut room = room_with_message(&ctx).await;
    let app = test_app!(ctx);
    let uri = format!("/api/messages/{}/reactions", room.message_id);

    let react = |user: &users::Model, emoji: &str| {
        test::TestRequest::post()
            .uri(&uri)
            .insert_header(auth_header(user))
            .set_json(json!({ "emoji": emoji }))
            .to_request()
    };

    let resp = test::call_service(&app, react(&room.alice, "thumbsup")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = test::call_service(&app, react(&room.bob, "thumbsup")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = test::call_service(&app, react(&room.bob, "eyes")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = test::call_service(&app, react(&room.alice, "thumbsup")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let added = room.watcher.frames_of("reaction-added");
    assert_eq!(added.len(), 3);
    assert_eq!(added[0]["data"]["emoji"], "thumbsup");
    assert_eq!(uuid_of(&added[0]["data"]["userId"]), room.alice.id);

    let req = test::TestRequest::get()
        .uri(&uri)
        .insert_header(auth_header(&room.bob))
        .to_request();
    let summary: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(summary["reactions"].as_array().unwrap().len(), 3);
    assert_eq!(summary["counts"][0], json!({"emoji": "thumbsup", "count": 2}));
    assert_eq!(summary["counts"][1], json!({"emoji": "eyes", "count": 1}));

    let resp = test::call_service(&app, react(&room.alice, "   ")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn removing_reaction_only_touches_own_row() {
    let ctx = chat_context(setup_db().await);
    let mut room = room_with_message(&ctx).await;
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri(&format!("/api/messages/{}/reactions", room.message_id))
        .insert_header(auth_header(&room.alice))
        .set_json(json!({"emoji": "eyes"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let remove = |user: &users::Model| {
        test::TestRequest::delete()
            .uri(&format!("/api/messages/{}/reactions/eyes", room.message_id))
            .insert_header(auth_header(user))
            .to_request()
    };

    // Bob never reacted
    let resp = test::call_service(&app, remove(&room.bob)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(&app, remove(&room.alice)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let removed = room.watcher.frames_of("reaction-removed");
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0]["data"]["emoji"], "eyes");

    let resp = test::call_service(&app, remove(&room.alice)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn outsiders_cannot_see_or_react() {
    let ctx = chat_context(setup_db().await);
    let room = room_with_message(&ctx).await;
    let mallory = seed_user(&ctx.db, "mallory@example.com").await;
    let app = test_app!(ctx);

    let req = test::TestRequest::get()
        .uri(&format!("/api/messages/{}/reactions", room.message_id))
        .insert_header(auth_header(&mallory))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri(&format!("/api/messages/{}/reactions", room.message_id))
        .insert_header(auth_header(&mallory))
        .set_json(json!({"emoji": "eyes"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri(&format!("/api/conversations/{}/pinned", room.conversation_id))
        .insert_header(auth_header(&mallory))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri(&format!("/api/messages/{}/reactions", Uuid::new_v4()))
        .insert_header(auth_header(&room.alice))
        .set_json(json!({"emoji": "eyes"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn pin_lifecycle_is_broadcast() {
    let ctx = chat_context(setup_db().await);
    let mut room = room_with_message(&ctx).await;
    let app = test_app!(ctx);
    let pinned_uri = format!("/api/conversations/{}/pinned", room.conversation_id);

    let req = test::TestRequest::post()
        .uri(&pinned_uri)
        .insert_header(auth_header(&room.bob))
        .set_json(json!({"messageId": room.message_id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let pin: Value = test::read_body_json(resp).await;
    assert_eq!(pin["message"]["content"], "Truck 7 at dock 2");

    // Same message again, through the path-style alias
    let req = test::TestRequest::post()
        .uri(&format!(
            "/api/conversations/{}/pin/{}",
            room.conversation_id, room.message_id
        ))
        .insert_header(auth_header(&room.alice))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let pinned = room.watcher.frames_of("message-pinned");
    assert_eq!(pinned.len(), 1);
    assert_eq!(uuid_of(&pinned[0]["data"]["pinnedBy"]), room.bob.id);

    let req = test::TestRequest::get()
        .uri(&pinned_uri)
        .insert_header(auth_header(&room.alice))
        .to_request();
    let pins: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(pins.as_array().unwrap().len(), 1);
    assert_eq!(uuid_of(&pins[0]["messageId"]), room.message_id);

    let req = test::TestRequest::delete()
        .uri(&pinned_uri)
        .insert_header(auth_header(&room.alice))
        .set_json(json!({"messageId": room.message_id}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let unpinned = room.watcher.frames_of("message-unpinned");
    assert_eq!(unpinned.len(), 1);
    assert_eq!(uuid_of(&unpinned[0]["data"]["unpinnedBy"]), room.alice.id);

    let req = test::TestRequest::post()
        .uri(&format!(
            "/api/conversations/{}/unpin/{}",
            room.conversation_id, room.message_id
        ))
        .insert_header(auth_header(&room.alice))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&pinned_uri)
        .insert_header(auth_header(&room.alice))
        .to_request();
    let pins: Value = test::call_and_read_body_json(&app, req).await;
    assert!(pins.as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn pending_member_cannot_pin_and_foreign_message_is_not_found() {
    let ctx = chat_context(setup_db().await);
    let room = room_with_message(&ctx).await;
    let carol = seed_user(&ctx.db, "carol@example.com").await;
    let other = conversation_db::create_direct(&ctx.db, room.alice.id, carol.id)
        .await
        .unwrap()
        .conversation
        .id;
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{other}/pinned"))
        .insert_header(auth_header(&carol))
        .set_json(json!({"messageId": room.message_id}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    // Alice belongs to both, but the message lives in the first one
    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{other}/pinned"))
        .insert_header(auth_header(&room.alice))
        .set_json(json!({"messageId": room.message_id}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}
