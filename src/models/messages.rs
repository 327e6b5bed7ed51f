use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::receipts::ReceiptResponse;

/// Message payload kind stored as a lowercase string.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    #[sea_orm(string_value = "text")]
    Text,
    #[sea_orm(string_value = "image")]
    Image,
    #[sea_orm(string_value = "file")]
    File,
    #[sea_orm(string_value = "system")]
    System,
}

/// SeaORM entity for the `messages` table.
///
/// `id` and `created_at` never change after insert. Soft deletion sets
/// `deleted_at` and keeps the row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub client_message_id: String,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub content_type: ContentType,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub attachments: Option<Json>,
    pub reply_to_id: Option<Uuid>,
    pub created_at: DateTimeUtc,
    pub edited_at: Option<DateTimeUtc>,
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::conversations::Entity",
        from = "Column::ConversationId",
        to = "super::conversations::Column::Id",
        on_delete = "Cascade"
    )]
    Conversation,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::SenderId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    Sender,
    #[sea_orm(has_many = "super::receipts::Entity")]
    Receipts,
    #[sea_orm(has_many = "super::reactions::Entity")]
    Reactions,
}

impl Related<super::conversations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversation.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sender.def()
    }
}

impl Related<super::receipts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Receipts.def()
    }
}

impl Related<super::reactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Attachments decoded from the JSON column. Malformed data reads as none.
    pub fn attachment_list(&self) -> Option<Vec<Attachment>> {
        self.attachments
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn body(&self) -> MessageBody {
        match self.deleted_at {
            Some(deleted_at) => MessageBody::Deleted { deleted_at },
            None => MessageBody::Active {
                content: self.content.clone(),
                attachments: self.attachment_list(),
            },
        }
    }
}

// ── DTOs ──

/// One attached file, as uploaded through `POST /api/files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub name: String,
    pub size: u64,
    #[serde(alias = "mimeType")]
    pub mime: String,
}

/// Visible state of a message. Deleted messages never expose their content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MessageBody {
    #[serde(rename_all = "camelCase")]
    Active {
        content: String,
        attachments: Option<Vec<Attachment>>,
    },
    #[serde(rename_all = "camelCase")]
    Deleted { deleted_at: DateTimeUtc },
}

/// Internal input for the send pipeline.
#[derive(Debug, Clone)]
pub struct CreateMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub client_message_id: String,
    pub content: String,
    pub content_type: ContentType,
    pub attachments: Option<Vec<Attachment>>,
    pub reply_to_id: Option<Uuid>,
}

/// Message as sent over the socket and REST.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub client_message_id: String,
    pub content_type: ContentType,
    #[serde(flatten)]
    pub body: MessageBody,
    pub reply_to_id: Option<Uuid>,
    pub created_at: DateTimeUtc,
    pub edited_at: Option<DateTimeUtc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipts: Option<Vec<ReceiptResponse>>,
}

impl From<Model> for MessageResponse {
    fn from(m: Model) -> Self {
        Self {
            body: m.body(),
            id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender_id,
            client_message_id: m.client_message_id,
            content_type: m.content_type,
            reply_to_id: m.reply_to_id,
            created_at: m.created_at,
            edited_at: m.edited_at,
            receipts: None,
        }
    }
}

/// Query parameters for cursor-paginated history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageQuery {
    pub after: Option<Uuid>,
    pub before: Option<Uuid>,
    pub limit: Option<u64>,
}

/// Direction and anchor of a history page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Latest,
    Earliest,
    After(Uuid),
    Before(Uuid),
}

/// One page of history in ascending creation order.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<Model>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePageResponse {
    pub messages: Vec<MessageResponse>,
    pub has_more: bool,
}

/// Body of `PATCH /api/messages/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct EditMessage {
    pub content: String,
}
