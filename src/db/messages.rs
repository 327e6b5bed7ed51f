use sea_orm::prelude::Expr;
use sea_orm::*;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::conversations as conversation_db;
use crate::models::messages::{self, CreateMessage, Cursor, MessagePage};
use crate::models::receipts::{self, ReadProgress, ReceiptUpdate};

/// A freshly persisted message together with the members it was fanned out to.
#[derive(Debug, Clone)]
pub struct PersistedMessage {
    pub message: messages::Model,
    pub member_ids: Vec<Uuid>,
}

/// Fetch a single message by ID.
pub async fn get_message_by_id<C: ConnectionTrait>(
    db: &C,
    message_id: Uuid,
) -> Result<Option<messages::Model>, DbErr> {
    messages::Entity::find_by_id(message_id).one(db).await
}

/// Look up a message by its idempotency key.
pub async fn find_by_client_id<C: ConnectionTrait>(
    db: &C,
    sender_id: Uuid,
    client_message_id: &str,
) -> Result<Option<messages::Model>, DbErr> {
    messages::Entity::find()
        .filter(messages::Column::SenderId.eq(sender_id))
        .filter(messages::Column::ClientMessageId.eq(client_message_id))
        .one(db)
        .await
}

/// Insert a message and one receipt per current member atomically. The
/// sender's own receipt is delivered at creation time.
///
/// A duplicate idempotency key surfaces as a unique-constraint error and
/// nothing is written.
pub async fn insert_with_receipts(
    db: &DatabaseConnection,
    input: CreateMessage,
) -> Result<PersistedMessage, DbErr> {
    let now = chrono::Utc::now();
    let attachments = input
        .attachments
        .map(|a| serde_json::to_value(a).map_err(|e| DbErr::Custom(e.to_string())))
        .transpose()?;

    let txn = db.begin().await?;

    let member_ids: Vec<Uuid> = conversation_db::get_members(&txn, input.conversation_id)
        .await?
        .into_iter()
        .map(|m| m.user_id)
        .collect();

    let message = messages::Model {
        id: Uuid::new_v4(),
        conversation_id: input.conversation_id,
        sender_id: input.sender_id,
        client_message_id: input.client_message_id,
        content: input.content,
        content_type: input.content_type,
        attachments,
        reply_to_id: input.reply_to_id,
        created_at: now,
        edited_at: None,
        deleted_at: None,
    };
    messages::Entity::insert(message.clone().into_active_model())
        .exec_without_returning(&txn)
        .await?;

    let receipt_rows: Vec<receipts::ActiveModel> = member_ids
        .iter()
        .map(|&user_id| receipts::ActiveModel {
            message_id: Set(message.id),
            user_id: Set(user_id),
            delivered_at: Set((user_id == message.sender_id).then_some(now)),
            read_at: Set(None),
        })
        .collect();
    if !receipt_rows.is_empty() {
        receipts::Entity::insert_many(receipt_rows)
            .exec_without_returning(&txn)
            .await?;
    }

    conversation_db::touch(&txn, message.conversation_id, now).await?;

    txn.commit().await?;
    Ok(PersistedMessage {
        message,
        member_ids,
    })
}

/// Set `delivered_at` on one member's receipt if it is still pending.
/// Returns the timestamp when this call performed the transition.
pub async fn mark_delivered(
    db: &DatabaseConnection,
    message_id: Uuid,
    user_id: Uuid,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, DbErr> {
    let now = chrono::Utc::now();
    let result = receipts::Entity::update_many()
        .col_expr(receipts::Column::DeliveredAt, Expr::value(now))
        .filter(receipts::Column::MessageId.eq(message_id))
        .filter(receipts::Column::UserId.eq(user_id))
        .filter(receipts::Column::DeliveredAt.is_null())
        .exec(db)
        .await?;

    Ok((result.rows_affected > 0).then_some(now))
}

/// Lazily mark as delivered every pending receipt `user_id` holds on the given
/// messages (used when a client catches up through sync).
pub async fn mark_delivered_for_messages(
    db: &DatabaseConnection,
    user_id: Uuid,
    messages: &[messages::Model],
) -> Result<Vec<ReceiptUpdate>, DbErr> {
    let senders: HashMap<Uuid, Uuid> = messages
        .iter()
        .filter(|m| m.sender_id != user_id)
        .map(|m| (m.id, m.sender_id))
        .collect();
    if senders.is_empty() {
        return Ok(Vec::new());
    }

    let now = chrono::Utc::now();
    let txn = db.begin().await?;

    let pending: Vec<Uuid> = receipts::Entity::find()
        .filter(receipts::Column::UserId.eq(user_id))
        .filter(receipts::Column::MessageId.is_in(senders.keys().copied()))
        .filter(receipts::Column::DeliveredAt.is_null())
        .all(&txn)
        .await?
        .into_iter()
        .map(|r| r.message_id)
        .collect();

    if !pending.is_empty() {
        receipts::Entity::update_many()
            .col_expr(receipts::Column::DeliveredAt, Expr::value(now))
            .filter(receipts::Column::UserId.eq(user_id))
            .filter(receipts::Column::MessageId.is_in(pending.clone()))
            .filter(receipts::Column::DeliveredAt.is_null())
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    Ok(pending
        .into_iter()
        .filter_map(|message_id| {
            senders.get(&message_id).map(|&sender_id| ReceiptUpdate {
                message_id,
                sender_id,
                at: now,
            })
        })
        .collect())
}

/// Mark as read every unread receipt `reader_id` holds in the conversation on
/// messages from other senders up to and including `last_read_message_id`.
///
/// Receipts that were never delivered become delivered at the same instant,
/// so `read_at` never exists without `delivered_at`. Those are reported
/// separately so the senders hear `delivered` before `read`.
pub async fn mark_read_up_to(
    db: &DatabaseConnection,
    conversation_id: Uuid,
    reader_id: Uuid,
    last_read_message_id: Uuid,
) -> Result<ReadProgress, DbErr> {
    let txn = db.begin().await?;

    let anchor = get_message_by_id(&txn, last_read_message_id)
        .await?
        .filter(|m| m.conversation_id == conversation_id)
        .ok_or(DbErr::RecordNotFound("Message not found".to_string()))?;

    let unread: Vec<(receipts::Model, Option<messages::Model>)> = receipts::Entity::find()
        .find_also_related(messages::Entity)
        .filter(receipts::Column::UserId.eq(reader_id))
        .filter(receipts::Column::ReadAt.is_null())
        .filter(messages::Column::ConversationId.eq(conversation_id))
        .filter(messages::Column::SenderId.ne(reader_id))
        .filter(at_or_before(&anchor))
        .all(&txn)
        .await?;

    // (message, sender, was already delivered)
    let targets: Vec<(Uuid, Uuid, bool)> = unread
        .into_iter()
        .filter_map(|(r, m)| m.map(|m| (r.message_id, m.sender_id, r.delivered_at.is_some())))
        .collect();

    let now = chrono::Utc::now();
    if !targets.is_empty() {
        let ids: Vec<Uuid> = targets.iter().map(|(id, _, _)| *id).collect();

        receipts::Entity::update_many()
            .col_expr(receipts::Column::DeliveredAt, Expr::value(now))
            .filter(receipts::Column::UserId.eq(reader_id))
            .filter(receipts::Column::MessageId.is_in(ids.clone()))
            .filter(receipts::Column::DeliveredAt.is_null())
            .exec(&txn)
            .await?;

        receipts::Entity::update_many()
            .col_expr(receipts::Column::ReadAt, Expr::value(now))
            .filter(receipts::Column::UserId.eq(reader_id))
            .filter(receipts::Column::MessageId.is_in(ids))
            .filter(receipts::Column::ReadAt.is_null())
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    let update = |message_id, sender_id| ReceiptUpdate {
        message_id,
        sender_id,
        at: now,
    };
    Ok(ReadProgress {
        delivered: targets
            .iter()
            .filter(|(_, _, delivered)| !delivered)
            .map(|&(message_id, sender_id, _)| update(message_id, sender_id))
            .collect(),
        read: targets
            .iter()
            .map(|&(message_id, sender_id, _)| update(message_id, sender_id))
            .collect(),
    })
}

fn at_or_before(anchor: &messages::Model) -> Condition {
    Condition::any()
        .add(messages::Column::CreatedAt.lt(anchor.created_at))
        .add(
            Condition::all()
                .add(messages::Column::CreatedAt.eq(anchor.created_at))
                .add(messages::Column::Id.lte(anchor.id)),
        )
}

/// One page of non-deleted messages in ascending creation order.
///
/// `After` walks forward from the anchor, `Before` walks backward, `Latest`
/// returns the newest page and `Earliest` the oldest one. An anchor that does not exist in this
/// conversation is `RecordNotFound`.
pub async fn get_page(
    db: &DatabaseConnection,
    conversation_id: Uuid,
    cursor: Cursor,
    limit: u64,
) -> Result<MessagePage, DbErr> {
    let mut query = messages::Entity::find()
        .filter(messages::Column::ConversationId.eq(conversation_id))
        .filter(messages::Column::DeletedAt.is_null());

    let anchor_id = match cursor {
        Cursor::Latest | Cursor::Earliest => None,
        Cursor::After(id) | Cursor::Before(id) => Some(id),
    };
    let anchor = match anchor_id {
        Some(id) => Some(
            get_message_by_id(db, id)
                .await?
                .filter(|m| m.conversation_id == conversation_id)
                .ok_or(DbErr::RecordNotFound("Cursor message not found".to_string()))?,
        ),
        None => None,
    };

    let ascending = matches!(cursor, Cursor::After(_) | Cursor::Earliest);
    query = match (cursor, anchor) {
        (Cursor::After(_), Some(a)) => query.filter(
            Condition::any()
                .add(messages::Column::CreatedAt.gt(a.created_at))
                .add(
                    Condition::all()
                        .add(messages::Column::CreatedAt.eq(a.created_at))
                        .add(messages::Column::Id.gt(a.id)),
                ),
        ),
        (Cursor::Before(_), Some(a)) => query.filter(
            Condition::any()
                .add(messages::Column::CreatedAt.lt(a.created_at))
                .add(
                    Condition::all()
                        .add(messages::Column::CreatedAt.eq(a.created_at))
                        .add(messages::Column::Id.lt(a.id)),
                ),
        ),
        _ => query,
    };

    query = if ascending {
        query
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Id)
    } else {
        query
            .order_by_desc(messages::Column::CreatedAt)
            .order_by_desc(messages::Column::Id)
    };

    let mut rows = query.limit(limit + 1).all(db).await?;
    let has_more = rows.len() as u64 > limit;
    rows.truncate(limit as usize);
    if !ascending {
        rows.reverse();
    }

    Ok(MessagePage {
        messages: rows,
        has_more,
    })
}

/// Receipts for many messages in one query, grouped by message.
pub async fn get_receipts_for_messages(
    db: &DatabaseConnection,
    message_ids: Vec<Uuid>,
) -> Result<HashMap<Uuid, Vec<receipts::Model>>, DbErr> {
    if message_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = receipts::Entity::find()
        .filter(receipts::Column::MessageId.is_in(message_ids))
        .all(db)
        .await?;

    let mut grouped: HashMap<Uuid, Vec<receipts::Model>> = HashMap::new();
    for row in rows {
        grouped.entry(row.message_id).or_default().push(row);
    }
    Ok(grouped)
}

/// Fetch one receipt.
pub async fn get_receipt(
    db: &DatabaseConnection,
    message_id: Uuid,
    user_id: Uuid,
) -> Result<Option<receipts::Model>, DbErr> {
    receipts::Entity::find_by_id((message_id, user_id)).one(db).await
}

/// Replace the content of an active message and stamp `edited_at`.
pub async fn edit_message(
    db: &DatabaseConnection,
    message: messages::Model,
    content: String,
) -> Result<messages::Model, DbErr> {
    let mut active: messages::ActiveModel = message.into();
    active.content = Set(content);
    active.edited_at = Set(Some(chrono::Utc::now()));
    active.update(db).await
}

/// Soft-delete: stamp `deleted_at`, keep the row.
pub async fn soft_delete_message(
    db: &DatabaseConnection,
    message: messages::Model,
) -> Result<messages::Model, DbErr> {
    if message.deleted_at.is_some() {
        return Ok(message);
    }
    let mut active: messages::ActiveModel = message.into();
    active.deleted_at = Set(Some(chrono::Utc::now()));
    active.update(db).await
}

/// Latest non-deleted message for each conversation, one bounded query per
/// conversation so the cost follows the inbox size, not the history size.
pub async fn get_latest_messages_for_conversations(
    db: &DatabaseConnection,
    conversation_ids: Vec<Uuid>,
) -> Result<HashMap<Uuid, messages::Model>, DbErr> {
    let mut latest: HashMap<Uuid, messages::Model> = HashMap::new();

    for conversation_id in conversation_ids {
        let newest = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id))
            .filter(messages::Column::DeletedAt.is_null())
            .order_by_desc(messages::Column::CreatedAt)
            .order_by_desc(messages::Column::Id)
            .one(db)
            .await?;
        if let Some(message) = newest {
            latest.insert(conversation_id, message);
        }
    }

    Ok(latest)
}

/// Unread counts for many conversations: receipts `user_id` has not read on
/// other senders' non-deleted messages.
pub async fn count_unread_for_conversations(
    db: &DatabaseConnection,
    conversation_ids: Vec<Uuid>,
    user_id: Uuid,
) -> Result<HashMap<Uuid, u64>, DbErr> {
    if conversation_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(receipts::Model, Option<messages::Model>)> = receipts::Entity::find()
        .find_also_related(messages::Entity)
        .filter(receipts::Column::UserId.eq(user_id))
        .filter(receipts::Column::ReadAt.is_null())
        .filter(messages::Column::ConversationId.is_in(conversation_ids))
        .filter(messages::Column::SenderId.ne(user_id))
        .filter(messages::Column::DeletedAt.is_null())
        .all(db)
        .await?;

    let mut counts: HashMap<Uuid, u64> = HashMap::new();
    for (_, message) in rows {
        if let Some(message) = message {
            *counts.entry(message.conversation_id).or_insert(0) += 1;
        }
    }

    Ok(counts)
}
