use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::authorization::AccessError;
use crate::models::messages::{Attachment, ContentType, MessageResponse};

pub const PROTOCOL_VERSION: u32 = 1;

// ── Client -> Server ──

/// Envelope of every frame a client sends: `{type, reqId?, data}`.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "reqId", default)]
    pub req_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl InboundFrame {
    /// Decode `data` into the payload of a specific event.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, EventError> {
        let data = if self.data.is_null() {
            Value::Object(Default::default())
        } else {
            self.data.clone()
        };
        serde_json::from_value(data).map_err(|e| EventError::invalid(format!("Invalid data: {e}")))
    }
}

/// Client events understood by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Hello,
    JoinRoom,
    SendMessage,
    MarkRead,
    Typing,
    Sync,
    Pong,
}

impl ClientEvent {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "hello" | "client:hello" => Some(Self::Hello),
            "join-room" | "conv:join" => Some(Self::JoinRoom),
            "send-message" | "msg:send" => Some(Self::SendMessage),
            "mark-read" | "msg:read" => Some(Self::MarkRead),
            "typing" => Some(Self::Typing),
            "sync" | "conv:sync" => Some(Self::Sync),
            "pong" => Some(Self::Pong),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloData {
    pub device_id: Option<String>,
    pub app_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomData {
    pub conversation_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageData {
    pub conversation_id: Option<Uuid>,
    pub client_message_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    pub attachments: Option<Vec<Attachment>>,
    pub reply_to_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadData {
    pub conversation_id: Option<Uuid>,
    pub last_read_message_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingData {
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncData {
    pub conversation_id: Option<Uuid>,
    pub after_message_id: Option<Uuid>,
    pub limit: Option<u64>,
}

// ── Server -> Client ──

/// Every frame the server emits, serialized as `{type, data}`.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    HelloAck {
        user_id: Uuid,
        protocol_version: u32,
        server_time: DateTime<Utc>,
        heartbeat_interval_ms: u64,
    },
    SendAck {
        conversation_id: Uuid,
        client_message_id: String,
        server_message_id: Uuid,
        created_at_server: DateTime<Utc>,
    },
    MessageNew {
        message: MessageResponse,
    },
    Delivered {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        delivered_at: DateTime<Utc>,
    },
    Read {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    },
    Typing {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
    SyncResult {
        conversation_id: Uuid,
        messages: Vec<MessageResponse>,
        has_more: bool,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
    Ping,
    MessageEdited {
        message: MessageResponse,
    },
    MessageDeleted {
        conversation_id: Uuid,
        message_id: Uuid,
        deleted_at: DateTime<Utc>,
    },
    MessagePinned {
        conversation_id: Uuid,
        message_id: Uuid,
        pinned_by: Uuid,
        pinned_at: DateTime<Utc>,
    },
    MessageUnpinned {
        conversation_id: Uuid,
        message_id: Uuid,
        unpinned_by: Uuid,
    },
    ReactionAdded {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },
    ReactionRemoved {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    },
    ConversationUpsert {
        conversation_id: Uuid,
    },
    ConversationRejected {
        conversation_id: Uuid,
        user_id: Uuid,
    },
    Presence {
        user_id: Uuid,
        online: bool,
        last_seen_at: Option<DateTime<Utc>>,
    },
}

impl ServerEvent {
    /// Serialize into a text frame, echoing the request id when present.
    pub fn to_frame(&self, req_id: Option<&str>) -> Arc<str> {
        let mut value = match serde_json::to_value(self) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("Failed to serialize server event: {e}");
                return Arc::from(r#"{"type":"error","data":{"code":"INTERNAL_ERROR","message":"Serialization failed"}}"#);
            }
        };
        if let (Some(id), Some(obj)) = (req_id, value.as_object_mut()) {
            obj.insert("reqId".to_string(), Value::String(id.to_string()));
        }
        Arc::from(value.to_string())
    }
}

impl From<EventError> for ServerEvent {
    fn from(e: EventError) -> Self {
        ServerEvent::Error {
            code: e.code,
            message: e.message,
        }
    }
}

// ── Errors ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    Forbidden,
    RateLimit,
    UnknownEvent,
    NotFound,
    Conflict,
    InternalError,
}

/// A failed client event. Reported to the offending connection only; the
/// connection stays open.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EventError {
    pub code: ErrorCode,
    pub message: String,
}

impl EventError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

impl From<AccessError> for EventError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::NotMember | AccessError::Pending => EventError::forbidden(e.to_string()),
            AccessError::MessageNotFound => EventError::not_found(e.to_string()),
            AccessError::Database(db) => db.into(),
        }
    }
}

impl From<DbErr> for EventError {
    fn from(e: DbErr) -> Self {
        match e {
            DbErr::RecordNotFound(what) => EventError::not_found(what),
            other => {
                tracing::error!("Database error while handling event: {other}");
                EventError::new(ErrorCode::InternalError, "Internal error")
            }
        }
    }
}
