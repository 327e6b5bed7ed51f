//! Shared fixtures: an in-memory SQLite store migrated with the real
//! migrations, seeded users, HS256 tokens, and registry channels standing
//! in for sockets.
#![allow(dead_code)]

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use serde_json::{Value, json};
use uuid::Uuid;

use depot_chat::auth::jwt::Claims;
use depot_chat::chat::ChatContext;
use depot_chat::chat::registry::{ConnId, FrameReceiver};
use depot_chat::chat::router;
use depot_chat::config::ChatConfig;
use depot_chat::models::users;
use migration::{Migrator, MigratorTrait};

pub const TEST_SECRET: &str = "test-secret-at-least-256-bits-long-for-hs256-xxxxxxx";

pub async fn setup_db() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.expect("connect sqlite");
    Migrator::up(&db, None).await.expect("run migrations");
    db
}

pub async fn seed_user(db: &DatabaseConnection, email: &str) -> users::Model {
    users::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        username: Set(None),
        display_name: Set(Some(email.split('@').next().unwrap_or(email).to_string())),
        avatar_url: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("seed user")
}

pub fn mint_token(user_id: Uuid, email: Option<&str>) -> String {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: Some(now),
        email: email.map(str::to_string),
        name: None,
        picture: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("encode test JWT")
}

/// Chat config for tests: the send limiter is loose unless a test tightens it.
pub fn test_config() -> ChatConfig {
    ChatConfig {
        send_rate_limit: 1_000,
        ..ChatConfig::default()
    }
}

pub fn chat_context(db: DatabaseConnection) -> ChatContext {
    ChatContext::new(db, test_config())
}

/// One registered connection, read from its outbound queue.
pub struct TestSocket {
    pub conn: ConnId,
    pub user_id: Uuid,
    rx: FrameReceiver,
}

impl TestSocket {
    pub async fn connect(ctx: &ChatContext, user_id: Uuid) -> Self {
        let (conn, rx) = ctx.registry.connect(user_id).await;
        Self { conn, user_id, rx }
    }

    pub async fn send(&self, ctx: &ChatContext, frame: Value) {
        router::handle_frame(ctx, self.conn, self.user_id, &frame.to_string()).await;
    }

    pub async fn send_raw(&self, ctx: &ChatContext, text: &str) {
        router::handle_frame(ctx, self.conn, self.user_id, text).await;
    }

    /// Every frame queued so far.
    pub fn frames(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            out.push(serde_json::from_str(&frame).expect("server frames are JSON"));
        }
        out
    }

    /// Queued frames of one type, discarding the rest.
    pub fn frames_of(&mut self, kind: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|f| f["type"] == kind)
            .collect()
    }

    pub async fn join(&mut self, ctx: &ChatContext, conversation_id: Uuid) {
        self.send(
            ctx,
            json!({"type": "join-room", "data": {"conversationId": conversation_id}}),
        )
        .await;
    }

    pub async fn send_message(
        &self,
        ctx: &ChatContext,
        conversation_id: Uuid,
        client_message_id: &str,
        content: &str,
    ) {
        self.send(
            ctx,
            json!({
                "type": "send-message",
                "reqId": client_message_id,
                "data": {
                    "conversationId": conversation_id,
                    "clientMessageId": client_message_id,
                    "content": content,
                }
            }),
        )
        .await;
    }
}

pub fn uuid_of(value: &Value) -> Uuid {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("uuid string")
}

pub fn auth_header(user: &users::Model) -> (&'static str, String) {
    (
        "Authorization",
        format!("Bearer {}", mint_token(user.id, Some(&user.email))),
    )
}

/// Build the `/api` service around a chat context, wired like `main`.
#[macro_export]
macro_rules! test_app {
    ($ctx:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($ctx.db.clone()))
                .app_data(actix_web::web::Data::new(
                    depot_chat::auth::TokenVerifier::Secret($crate::common::TEST_SECRET.to_string()),
                ))
                .app_data(actix_web::web::Data::new($ctx.clone()))
                .app_data(actix_web::web::Data::new(
                    None::<std::sync::Arc<depot_chat::cache::RedisCache>>,
                ))
                .app_data(actix_web::web::Data::new(
                    depot_chat::chat::rate_limit::RateLimiter::new(
                        10,
                        std::time::Duration::from_secs(60),
                        std::time::Duration::from_secs(300),
                        1_000,
                    ),
                ))
                .app_data(actix_web::web::Data::new(
                    depot_chat::config::UploadConfig::default(),
                ))
                .service(
                    actix_web::web::scope("/api").configure(depot_chat::handlers::init_routes),
                ),
        )
        .await
    };
}
