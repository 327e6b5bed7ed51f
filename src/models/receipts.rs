use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// SeaORM entity for the `message_receipts` table.
///
/// One row per conversation member per message. `delivered_at` and `read_at`
/// are each set once, and `read_at` never precedes `delivered_at`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "message_receipts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub message_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,
    pub delivered_at: Option<DateTimeUtc>,
    pub read_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::messages::Entity",
        from = "Column::MessageId",
        to = "super::messages::Column::Id",
        on_delete = "Cascade"
    )]
    Message,
}

impl Related<super::messages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Message.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptResponse {
    pub user_id: Uuid,
    pub delivered_at: Option<DateTimeUtc>,
    pub read_at: Option<DateTimeUtc>,
}

impl From<Model> for ReceiptResponse {
    fn from(m: Model) -> Self {
        Self {
            user_id: m.user_id,
            delivered_at: m.delivered_at,
            read_at: m.read_at,
        }
    }
}

/// A receipt transition that the original sender should hear about.
#[derive(Debug, Clone)]
pub struct ReceiptUpdate {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub at: DateTimeUtc,
}

/// Result of a mark-read: receipts that only now became delivered, and
/// every receipt that became read.
#[derive(Debug, Clone, Default)]
pub struct ReadProgress {
    pub delivered: Vec<ReceiptUpdate>,
    pub read: Vec<ReceiptUpdate>,
}
