//! REST surface for conversations, membership and history, exercised with
//! `actix_web::test` against an in-memory store.
//!
//! Run with: `cargo test --test conversations_test`
mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::{Value, json};
use uuid::Uuid;

use common::{TestSocket, auth_header, chat_context, seed_user, setup_db, uuid_of};
use depot_chat::models::{conversations, members, messages, receipts, users};

fn ids_of(list: &Value) -> Vec<Uuid> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|c| uuid_of(&c["id"]))
        .collect()
}

fn get_as(user: &users::Model, uri: &str) -> test::TestRequest {
    test::TestRequest::get()
        .uri(uri)
        .insert_header(auth_header(user))
}

#[actix_web::test]
async fn requests_without_token_are_unauthorized() {
    let ctx = chat_context(setup_db().await);
    let app = test_app!(ctx);

    let req = test::TestRequest::get().uri("/api/conversations").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/conversations")
        .insert_header(("Authorization", "Bearer garbage"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn direct_conversation_flows_from_pending_to_accepted() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let bob = seed_user(&ctx.db, "bob@example.com").await;
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/conversations/direct")
        .insert_header(auth_header(&alice))
        .set_json(json!({"email": "Bob@Example.com"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let conv = uuid_of(&created["conversationId"]);

    // Creating again, from either side, returns the same conversation
    let req = test::TestRequest::post()
        .uri("/api/conversations/direct")
        .insert_header(auth_header(&alice))
        .set_json(json!({"otherUserId": bob.id}))
        .to_request();
    let again: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(uuid_of(&again["conversationId"]), conv);

    let req = test::TestRequest::post()
        .uri("/api/conversations/direct")
        .insert_header(auth_header(&bob))
        .set_json(json!({"other_user_id": alice.id}))
        .to_request();
    let reverse: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(uuid_of(&reverse["conversationId"]), conv);

    let accepted: Value =
        test::call_and_read_body_json(&app, get_as(&alice, "/api/conversations").to_request()).await;
    assert_eq!(ids_of(&accepted), vec![conv]);
    assert_eq!(accepted[0]["type"], "direct");
    assert_eq!(accepted[0]["members"].as_array().unwrap().len(), 2);

    let pending: Value =
        test::call_and_read_body_json(&app, get_as(&bob, "/api/conversations/pending").to_request()).await;
    assert_eq!(ids_of(&pending), vec![conv]);
    let accepted: Value =
        test::call_and_read_body_json(&app, get_as(&bob, "/api/conversations").to_request()).await;
    assert!(ids_of(&accepted).is_empty());

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{conv}/accept"))
        .insert_header(auth_header(&bob))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let accepted: Value =
        test::call_and_read_body_json(&app, get_as(&bob, "/api/conversations").to_request()).await;
    assert_eq!(ids_of(&accepted), vec![conv]);
    let pending: Value =
        test::call_and_read_body_json(&app, get_as(&bob, "/api/conversations/pending").to_request()).await;
    assert!(ids_of(&pending).is_empty());
}

#[actix_web::test]
async fn direct_conversation_needs_a_real_other_user() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/conversations/direct")
        .insert_header(auth_header(&alice))
        .set_json(json!({"email": "alice@example.com"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/api/conversations/direct")
        .insert_header(auth_header(&alice))
        .set_json(json!({"email": "ghost@example.com"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/api/conversations/direct")
        .insert_header(auth_header(&alice))
        .set_json(json!({}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn new_direct_conversation_is_pushed_to_target() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let bob = seed_user(&ctx.db, "bob@example.com").await;
    let mut b = TestSocket::connect(&ctx, bob.id).await;
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/conversations/direct")
        .insert_header(auth_header(&alice))
        .set_json(json!({"email": "bob@example.com"}))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;

    let upserts = b.frames_of("conversation-upsert");
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0]["data"]["conversationId"], created["conversationId"]);
}

#[actix_web::test]
async fn reject_without_history_only_removes_caller() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let bob = seed_user(&ctx.db, "bob@example.com").await;
    let conv = depot_chat::db::conversations::create_direct(&ctx.db, alice.id, bob.id)
        .await
        .unwrap()
        .conversation
        .id;
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{conv}/reject"))
        .insert_header(auth_header(&bob))
        .set_json(json!({"deleteHistory": false}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let remaining = members::Entity::find()
        .filter(members::Column::ConversationId.eq(conv))
        .all(&ctx.db)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].user_id, alice.id);
    assert!(
        conversations::Entity::find_by_id(conv)
            .one(&ctx.db)
            .await
            .unwrap()
            .is_some()
    );

    // Rejecting again: no longer a member
    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{conv}/reject"))
        .insert_header(auth_header(&bob))
        .set_json(json!({"deleteHistory": false}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn leaving_a_direct_conversation_frees_the_pair() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let bob = seed_user(&ctx.db, "bob@example.com").await;
    let old = depot_chat::db::conversations::create_direct(&ctx.db, alice.id, bob.id)
        .await
        .unwrap()
        .conversation
        .id;
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{old}/reject"))
        .insert_header(auth_header(&bob))
        .set_json(json!({"deleteHistory": false}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    // Bob reaches out again: a fresh conversation, not the one he left
    let req = test::TestRequest::post()
        .uri("/api/conversations/direct")
        .insert_header(auth_header(&bob))
        .set_json(json!({"otherUserId": alice.id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let fresh = uuid_of(&created["conversationId"]);
    assert_ne!(fresh, old);

    let mut b = TestSocket::connect(&ctx, bob.id).await;
    b.send_message(&ctx, fresh, "again-1", "hello again").await;
    assert_eq!(b.frames_of("send-ack").len(), 1);

    let receipt_holders: Vec<Uuid> = receipts::Entity::find()
        .all(&ctx.db)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.user_id)
        .collect();
    assert!(receipt_holders.contains(&alice.id));

    // Alice sees the new one pending
    let pending: Value = test::call_and_read_body_json(
        &app,
        get_as(&alice, "/api/conversations/pending").to_request(),
    )
    .await;
    assert_eq!(ids_of(&pending), vec![fresh]);
}

#[actix_web::test]
async fn leaving_stops_live_events_for_the_leaver() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let bob = seed_user(&ctx.db, "bob@example.com").await;
    let conv = depot_chat::db::conversations::create_direct(&ctx.db, alice.id, bob.id)
        .await
        .unwrap()
        .conversation
        .id;
    depot_chat::db::conversations::accept_membership(&ctx.db, conv, bob.id)
        .await
        .unwrap();

    let mut a = TestSocket::connect(&ctx, alice.id).await;
    let mut b = TestSocket::connect(&ctx, bob.id).await;
    a.join(&ctx, conv).await;
    b.join(&ctx, conv).await;
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{conv}/reject"))
        .insert_header(auth_header(&bob))
        .set_json(json!({"deleteHistory": false}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    assert!(!ctx.registry.is_in_room(b.conn, conv).await);
    b.frames();

    a.send_message(&ctx, conv, "after-leave", "after bob left").await;
    assert!(b.frames_of("message-new").is_empty());

    // Typing into the old room is refused and never reaches alice
    a.frames();
    b.send(
        &ctx,
        json!({"type": "typing", "data": {"conversationId": conv, "isTyping": true}}),
    )
    .await;
    let errors = b.frames_of("error");
    assert_eq!(errors[0]["data"]["code"], "FORBIDDEN");
    assert!(a.frames_of("typing").is_empty());

    // Rejoining needs membership again
    b.join(&ctx, conv).await;
    assert!(!ctx.registry.is_in_room(b.conn, conv).await);
}

#[actix_web::test]
async fn reject_with_history_deletes_everything() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let bob = seed_user(&ctx.db, "bob@example.com").await;
    let conv = depot_chat::db::conversations::create_direct(&ctx.db, alice.id, bob.id)
        .await
        .unwrap()
        .conversation
        .id;

    let mut a = TestSocket::connect(&ctx, alice.id).await;
    a.join(&ctx, conv).await;
    for i in 0..3 {
        a.send_message(&ctx, conv, &format!("c{i}"), "unsolicited").await;
    }
    a.frames();
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri(&format!("/api/conversations/{conv}/reject"))
        .insert_header(auth_header(&bob))
        .set_json(json!({"deleteHistory": true}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let message_count = messages::Entity::find()
        .filter(messages::Column::ConversationId.eq(conv))
        .count(&ctx.db)
        .await
        .unwrap();
    let receipt_count = receipts::Entity::find().count(&ctx.db).await.unwrap();
    let member_count = members::Entity::find()
        .filter(members::Column::ConversationId.eq(conv))
        .count(&ctx.db)
        .await
        .unwrap();
    let conversation = conversations::Entity::find_by_id(conv)
        .one(&ctx.db)
        .await
        .unwrap();

    assert_eq!(message_count, 0);
    assert_eq!(receipt_count, 0);
    assert_eq!(member_count, 0);
    assert!(conversation.is_none());

    let rejected = a.frames_of("conversation-rejected");
    assert_eq!(rejected.len(), 1);
    assert_eq!(uuid_of(&rejected[0]["data"]["userId"]), bob.id);
    assert!(!ctx.registry.is_in_room(a.conn, conv).await);
}

#[actix_web::test]
async fn history_pages_by_cursor() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let bob = seed_user(&ctx.db, "bob@example.com").await;
    let mallory = seed_user(&ctx.db, "mallory@example.com").await;
    let conv = depot_chat::db::conversations::create_direct(&ctx.db, alice.id, bob.id)
        .await
        .unwrap()
        .conversation
        .id;

    let mut a = TestSocket::connect(&ctx, alice.id).await;
    for i in 0..5 {
        a.send_message(&ctx, conv, &format!("c{i}"), &format!("m{i}")).await;
    }
    let ids: Vec<Uuid> = a
        .frames_of("send-ack")
        .iter()
        .map(|f| uuid_of(&f["data"]["serverMessageId"]))
        .collect();
    let app = test_app!(ctx);

    let get = |query: String| {
        test::TestRequest::get()
            .uri(&format!("/api/conversations/{conv}/messages{query}"))
            .insert_header(auth_header(&bob))
            .to_request()
    };
    let contents = |page: &Value| -> Vec<String> {
        page["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap().to_string())
            .collect()
    };

    let latest: Value = test::call_and_read_body_json(&app, get("?limit=2".into())).await;
    assert_eq!(contents(&latest), vec!["m3", "m4"]);
    assert_eq!(latest["hasMore"], true);
    assert_eq!(latest["messages"][0]["receipts"].as_array().unwrap().len(), 2);

    let older: Value =
        test::call_and_read_body_json(&app, get(format!("?before={}&limit=2", ids[3]))).await;
    assert_eq!(contents(&older), vec!["m1", "m2"]);
    assert_eq!(older["hasMore"], true);

    let newer: Value =
        test::call_and_read_body_json(&app, get(format!("?after={}&limit=10", ids[1]))).await;
    assert_eq!(contents(&newer), vec!["m2", "m3", "m4"]);
    assert_eq!(newer["hasMore"], false);

    let resp = test::call_service(&app, get(format!("?after={}", Uuid::new_v4()))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&format!("/api/conversations/{conv}/messages"))
        .insert_header(auth_header(&mallory))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn listing_carries_last_message_and_unread_count() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let bob = seed_user(&ctx.db, "bob@example.com").await;
    let conv = depot_chat::db::conversations::create_direct(&ctx.db, alice.id, bob.id)
        .await
        .unwrap()
        .conversation
        .id;

    let a = TestSocket::connect(&ctx, alice.id).await;
    a.send_message(&ctx, conv, "c1", "first").await;
    a.send_message(&ctx, conv, "c2", "second").await;
    let app = test_app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/conversations/pending")
        .insert_header(auth_header(&bob))
        .to_request();
    let pending: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(pending[0]["unreadCount"], 2);
    assert_eq!(pending[0]["lastMessage"]["content"], "second");

    let alice_member = pending[0]["members"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| uuid_of(&m["userId"]) == alice.id)
        .unwrap()
        .clone();
    assert_eq!(alice_member["isOnline"], true);
    assert_eq!(alice_member["email"], "alice@example.com");
}

#[actix_web::test]
async fn group_and_module_linked_conversations() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let bob = seed_user(&ctx.db, "bob@example.com").await;
    let carol = seed_user(&ctx.db, "carol@example.com").await;
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/conversations/group")
        .insert_header(auth_header(&alice))
        .set_json(json!({"title": "Dock 4", "memberIds": [bob.id, carol.id, alice.id]}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let group: Value = test::read_body_json(resp).await;
    let group_id = uuid_of(&group["conversationId"]);

    let req = test::TestRequest::get()
        .uri(&format!("/api/conversations/{group_id}"))
        .insert_header(auth_header(&carol))
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["type"], "group");
    assert_eq!(view["title"], "Dock 4");
    let members = view["members"].as_array().unwrap();
    assert_eq!(members.len(), 3);
    let creator = members.iter().find(|m| uuid_of(&m["userId"]) == alice.id).unwrap();
    assert_eq!(creator["role"], "admin");
    assert_eq!(creator["isAccepted"], true);

    let req = test::TestRequest::post()
        .uri("/api/conversations/group")
        .insert_header(auth_header(&alice))
        .set_json(json!({
            "memberIds": [bob.id],
            "relatedEntityType": "purchase_order",
            "relatedEntityId": "PO-1042"
        }))
        .to_request();
    let linked: Value = test::call_and_read_body_json(&app, req).await;
    let linked_id = uuid_of(&linked["conversationId"]);

    let req = test::TestRequest::get()
        .uri("/api/conversations/pending")
        .insert_header(auth_header(&bob))
        .to_request();
    let pending: Value = test::call_and_read_body_json(&app, req).await;
    let entry = pending
        .as_array()
        .unwrap()
        .iter()
        .find(|c| uuid_of(&c["id"]) == linked_id)
        .unwrap()
        .clone();
    assert_eq!(entry["type"], "module-linked");
    assert_eq!(entry["relatedEntityId"], "PO-1042");

    let req = test::TestRequest::post()
        .uri("/api/conversations/group")
        .insert_header(auth_header(&alice))
        .set_json(json!({"memberIds": [Uuid::new_v4()]}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn edit_and_delete_own_messages() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let bob = seed_user(&ctx.db, "bob@example.com").await;
    let conv = depot_chat::db::conversations::create_direct(&ctx.db, alice.id, bob.id)
        .await
        .unwrap()
        .conversation
        .id;
    depot_chat::db::conversations::accept_membership(&ctx.db, conv, bob.id)
        .await
        .unwrap();

    let mut a = TestSocket::connect(&ctx, alice.id).await;
    let mut b = TestSocket::connect(&ctx, bob.id).await;
    b.join(&ctx, conv).await;
    a.send_message(&ctx, conv, "c1", "typo").await;
    let id = uuid_of(&a.frames_of("send-ack")[0]["data"]["serverMessageId"]);
    b.frames();
    let app = test_app!(ctx);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/messages/{id}"))
        .insert_header(auth_header(&bob))
        .set_json(json!({"content": "hijack"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/messages/{id}"))
        .insert_header(auth_header(&alice))
        .set_json(json!({"content": "fixed"}))
        .to_request();
    let edited: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(edited["content"], "fixed");
    assert!(edited["editedAt"].is_string());
    assert_eq!(b.frames_of("message-edited").len(), 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/messages/{id}"))
        .insert_header(auth_header(&alice))
        .to_request();
    let deleted: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(deleted["state"], "deleted");
    assert!(deleted.get("content").is_none());
    assert_eq!(b.frames_of("message-deleted").len(), 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/conversations/{conv}/messages"))
        .insert_header(auth_header(&bob))
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert!(page["messages"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn user_lookup_is_exact_and_rate_limited() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    seed_user(&ctx.db, "bob@example.com").await;
    let app = test_app!(ctx);

    let lookup = |email: &str| {
        test::TestRequest::get()
            .uri(&format!("/api/users/lookup?email={email}"))
            .insert_header(auth_header(&alice))
            .to_request()
    };

    let found: Value = test::call_and_read_body_json(&app, lookup("BOB@example.com")).await;
    assert_eq!(found["email"], "bob@example.com");

    let resp = test::call_service(&app, lookup("bo@example.com")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Two used; eight more allowed, then throttled
    for _ in 0..8 {
        let resp = test::call_service(&app, lookup("bob@example.com")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = test::call_service(&app, lookup("bob@example.com")).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[actix_web::test]
async fn attachment_metadata_is_validated() {
    let ctx = chat_context(setup_db().await);
    let alice = seed_user(&ctx.db, "alice@example.com").await;
    let app = test_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/files")
        .insert_header(auth_header(&alice))
        .set_json(json!({"name": "manifest.xlsx", "size": 2048, "mimeType": "application/vnd.ms-excel"}))
        .to_request();
    let accepted: Value = test::call_and_read_body_json(&app, req).await;
    assert!(accepted["url"].as_str().unwrap().ends_with(".xlsx"));
    assert_eq!(accepted["size"], 2048);

    let req = test::TestRequest::post()
        .uri("/api/files")
        .insert_header(auth_header(&alice))
        .set_json(json!({"name": "payload.sh", "size": 10}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}
