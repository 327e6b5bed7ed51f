use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::members::MemberResponse;

/// Conversation kind stored as a lowercase string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "kebab-case")]
pub enum ConversationKind {
    #[sea_orm(string_value = "direct")]
    Direct,
    #[sea_orm(string_value = "group")]
    Group,
    #[sea_orm(string_value = "module-linked")]
    ModuleLinked,
}

/// SeaORM entity for the `conversations` table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub kind: ConversationKind,
    pub title: Option<String>,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<String>,
    /// `"<min-uuid>:<max-uuid>"` for direct conversations, NULL otherwise.
    #[sea_orm(unique)]
    pub direct_key: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::members::Entity")]
    Members,
    #[sea_orm(has_many = "super::messages::Entity")]
    Messages,
    #[sea_orm(has_many = "super::pins::Entity")]
    Pins,
}

impl Related<super::members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl Related<super::messages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl Related<super::pins::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pins.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Canonical key for the unordered pair of direct-conversation members.
pub fn direct_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

// ── DTOs ──

/// Body of `POST /api/conversations/direct`. One of the two fields is required.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectConversation {
    pub email: Option<String>,
    #[serde(alias = "other_user_id")]
    pub other_user_id: Option<Uuid>,
}

/// Body of `POST /api/conversations/group`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupConversation {
    pub title: Option<String>,
    pub member_ids: Vec<Uuid>,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<String>,
}

/// Internal input for inserting a conversation together with its members.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub kind: ConversationKind,
    pub title: Option<String>,
    pub related_entity: Option<(String, String)>,
    pub creator_id: Uuid,
    pub invitee_ids: Vec<Uuid>,
}

/// Body of `POST /api/conversations/{id}/reject`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectConversation {
    #[serde(default, alias = "delete_history")]
    pub delete_history: bool,
}

/// Which half of the inbox a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbox {
    Accepted,
    Pending,
}

impl Inbox {
    pub fn is_accepted(self) -> bool {
        matches!(self, Inbox::Accepted)
    }
}

/// Preview of the most recent visible message in a conversation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTimeUtc,
}

/// Response for conversation listings and the single-conversation view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub title: Option<String>,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub members: Vec<MemberResponse>,
    pub last_message: Option<LastMessage>,
    pub unread_count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationCreated {
    pub conversation_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(direct_key(a, b), direct_key(b, a));
        assert_ne!(direct_key(a, b), direct_key(a, Uuid::new_v4()));
    }

    #[test]
    fn conversation_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ConversationKind::ModuleLinked).unwrap();
        assert_eq!(json, "\"module-linked\"");
    }
}
