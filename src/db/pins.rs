use sea_orm::*;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{messages, pins};

/// Pin a message in its conversation. Pinning twice is a unique violation.
pub async fn pin_message(
    db: &DatabaseConnection,
    conversation_id: Uuid,
    message_id: Uuid,
    pinned_by: Uuid,
) -> Result<pins::Model, DbErr> {
    let pin = pins::Model {
        conversation_id,
        message_id,
        pinned_by,
        pinned_at: chrono::Utc::now(),
    };
    pins::Entity::insert(pin.clone().into_active_model())
        .exec_without_returning(db)
        .await?;
    Ok(pin)
}

/// Returns the number of rows removed.
pub async fn unpin_message(
    db: &DatabaseConnection,
    conversation_id: Uuid,
    message_id: Uuid,
) -> Result<u64, DbErr> {
    let result = pins::Entity::delete_by_id((conversation_id, message_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Current pins of a conversation, newest first, each with its message.
pub async fn get_pins(
    db: &DatabaseConnection,
    conversation_id: Uuid,
) -> Result<Vec<(pins::Model, Option<messages::Model>)>, DbErr> {
    let rows = pins::Entity::find()
        .filter(pins::Column::ConversationId.eq(conversation_id))
        .order_by_desc(pins::Column::PinnedAt)
        .all(db)
        .await?;

    let message_ids: Vec<Uuid> = rows.iter().map(|p| p.message_id).collect();
    let mut by_id: HashMap<Uuid, messages::Model> = if message_ids.is_empty() {
        HashMap::new()
    } else {
        messages::Entity::find()
            .filter(messages::Column::Id.is_in(message_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect()
    };

    Ok(rows
        .into_iter()
        .map(|p| {
            let message = by_id.remove(&p.message_id);
            (p, message)
        })
        .collect())
}
