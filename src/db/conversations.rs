use sea_orm::prelude::Expr;
use sea_orm::*;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::conversations::{self, ConversationKind, Inbox, NewConversation, direct_key};
use crate::models::{members, messages, pins, reactions, receipts};
use crate::models::members::MemberRole;

/// Outcome of an idempotent direct-conversation create.
#[derive(Debug, Clone)]
pub struct DirectConversation {
    pub conversation: conversations::Model,
    pub created: bool,
}

/// Fetch a single conversation by ID.
pub async fn get_conversation_by_id<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> Result<Option<conversations::Model>, DbErr> {
    conversations::Entity::find_by_id(id).one(db).await
}

/// Find the direct conversation between two users, in either direction.
pub async fn find_direct(
    db: &DatabaseConnection,
    a: Uuid,
    b: Uuid,
) -> Result<Option<conversations::Model>, DbErr> {
    conversations::Entity::find()
        .filter(conversations::Column::DirectKey.eq(direct_key(a, b)))
        .one(db)
        .await
}

/// Return the direct conversation between `initiator` and `target`, creating
/// it when none exists. A new conversation starts accepted for the initiator
/// and pending for the target.
pub async fn create_direct(
    db: &DatabaseConnection,
    initiator: Uuid,
    target: Uuid,
) -> Result<DirectConversation, DbErr> {
    if let Some(existing) = find_direct(db, initiator, target).await? {
        return Ok(DirectConversation {
            conversation: existing,
            created: false,
        });
    }

    let input = NewConversation {
        kind: ConversationKind::Direct,
        title: None,
        related_entity: None,
        creator_id: initiator,
        invitee_ids: vec![target],
    };

    match insert_conversation(db, input).await {
        Ok(conversation) => Ok(DirectConversation {
            conversation,
            created: true,
        }),
        // Lost a race against the same pair: the unique direct_key index
        // guarantees the winner's row is there.
        Err(e) if is_unique_violation(&e) => {
            let conversation = find_direct(db, initiator, target)
                .await?
                .ok_or(DbErr::RecordNotFound("Direct conversation not found".to_string()))?;
            Ok(DirectConversation {
                conversation,
                created: false,
            })
        }
        Err(e) => Err(e),
    }
}

/// Insert a conversation and all of its members in one transaction.
///
/// The creator is accepted (and admin for non-direct conversations); every
/// invitee starts pending.
pub async fn insert_conversation(
    db: &DatabaseConnection,
    input: NewConversation,
) -> Result<conversations::Model, DbErr> {
    let now = chrono::Utc::now();
    let id = Uuid::new_v4();

    let key = match (input.kind, input.invitee_ids.as_slice()) {
        (ConversationKind::Direct, [other]) => Some(direct_key(input.creator_id, *other)),
        (ConversationKind::Direct, _) => {
            return Err(DbErr::Custom(
                "A direct conversation has exactly two members".to_string(),
            ));
        }
        _ => None,
    };
    let (related_type, related_id) = input.related_entity.unzip();

    let txn = db.begin().await?;

    let conversation = conversations::Model {
        id,
        kind: input.kind,
        title: input.title,
        related_entity_type: related_type,
        related_entity_id: related_id,
        direct_key: key,
        created_at: now,
        updated_at: now,
    };
    conversations::Entity::insert(conversation.clone().into_active_model())
        .exec_without_returning(&txn)
        .await?;

    let creator_role = match input.kind {
        ConversationKind::Direct => MemberRole::Member,
        _ => MemberRole::Admin,
    };

    let mut rows = vec![members::ActiveModel {
        conversation_id: Set(id),
        user_id: Set(input.creator_id),
        role: Set(creator_role),
        joined_at: Set(now),
        is_accepted: Set(true),
    }];
    for invitee in input.invitee_ids {
        if invitee == input.creator_id {
            continue;
        }
        rows.push(members::ActiveModel {
            conversation_id: Set(id),
            user_id: Set(invitee),
            role: Set(MemberRole::Member),
            joined_at: Set(now),
            is_accepted: Set(false),
        });
    }
    members::Entity::insert_many(rows)
        .exec_without_returning(&txn)
        .await?;

    txn.commit().await?;
    Ok(conversation)
}

/// Conversations where `user_id` has a membership in the given half of the
/// inbox, most recently active first.
pub async fn list_for_user(
    db: &DatabaseConnection,
    user_id: Uuid,
    inbox: Inbox,
) -> Result<Vec<conversations::Model>, DbErr> {
    let conversation_ids: Vec<Uuid> = members::Entity::find()
        .filter(members::Column::UserId.eq(user_id))
        .filter(members::Column::IsAccepted.eq(inbox.is_accepted()))
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.conversation_id)
        .collect();

    if conversation_ids.is_empty() {
        return Ok(Vec::new());
    }

    conversations::Entity::find()
        .filter(conversations::Column::Id.is_in(conversation_ids))
        .order_by_desc(conversations::Column::UpdatedAt)
        .order_by_desc(conversations::Column::Id)
        .all(db)
        .await
}

/// Members of many conversations in one query, grouped by conversation.
pub async fn get_members_for_conversations(
    db: &DatabaseConnection,
    conversation_ids: Vec<Uuid>,
) -> Result<HashMap<Uuid, Vec<members::Model>>, DbErr> {
    if conversation_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = members::Entity::find()
        .filter(members::Column::ConversationId.is_in(conversation_ids))
        .order_by_asc(members::Column::JoinedAt)
        .all(db)
        .await?;

    let mut grouped: HashMap<Uuid, Vec<members::Model>> = HashMap::new();
    for row in rows {
        grouped.entry(row.conversation_id).or_default().push(row);
    }
    Ok(grouped)
}

/// All members of one conversation.
pub async fn get_members<C: ConnectionTrait>(
    db: &C,
    conversation_id: Uuid,
) -> Result<Vec<members::Model>, DbErr> {
    members::Entity::find()
        .filter(members::Column::ConversationId.eq(conversation_id))
        .all(db)
        .await
}

/// Flip the caller's own membership to accepted.
pub async fn accept_membership(
    db: &DatabaseConnection,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<members::Model, DbErr> {
    let member = members::Entity::find_by_id((conversation_id, user_id))
        .one(db)
        .await?
        .ok_or(DbErr::RecordNotFound("Membership not found".to_string()))?;

    if member.is_accepted {
        return Ok(member);
    }

    let mut active: members::ActiveModel = member.into();
    active.is_accepted = Set(true);
    active.update(db).await
}

/// Remove only the caller's membership; the conversation stays for everyone
/// else. A direct conversation loses its pair key in the same transaction, so
/// the next direct create between the two users starts a fresh one.
pub async fn remove_member(
    db: &DatabaseConnection,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<u64, DbErr> {
    let txn = db.begin().await?;

    let result = members::Entity::delete_by_id((conversation_id, user_id))
        .exec(&txn)
        .await?;

    if result.rows_affected > 0 {
        conversations::Entity::update_many()
            .col_expr(
                conversations::Column::DirectKey,
                Expr::value(Option::<String>::None),
            )
            .filter(conversations::Column::Id.eq(conversation_id))
            .filter(conversations::Column::Kind.eq(ConversationKind::Direct))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;
    Ok(result.rows_affected)
}

/// Delete a conversation and its whole history in one transaction:
/// reactions and pins, then receipts, messages, members and finally the
/// conversation row. Any failure rolls everything back.
pub async fn delete_with_history(
    db: &DatabaseConnection,
    conversation_id: Uuid,
) -> Result<(), DbErr> {
    let txn = db.begin().await?;

    let message_ids: Vec<Uuid> = messages::Entity::find()
        .select_only()
        .column(messages::Column::Id)
        .filter(messages::Column::ConversationId.eq(conversation_id))
        .into_tuple()
        .all(&txn)
        .await?;

    pins::Entity::delete_many()
        .filter(pins::Column::ConversationId.eq(conversation_id))
        .exec(&txn)
        .await?;

    if !message_ids.is_empty() {
        reactions::Entity::delete_many()
            .filter(reactions::Column::MessageId.is_in(message_ids.clone()))
            .exec(&txn)
            .await?;

        receipts::Entity::delete_many()
            .filter(receipts::Column::MessageId.is_in(message_ids))
            .exec(&txn)
            .await?;
    }

    messages::Entity::delete_many()
        .filter(messages::Column::ConversationId.eq(conversation_id))
        .exec(&txn)
        .await?;

    members::Entity::delete_many()
        .filter(members::Column::ConversationId.eq(conversation_id))
        .exec(&txn)
        .await?;

    conversations::Entity::delete_by_id(conversation_id)
        .exec(&txn)
        .await?;

    txn.commit().await
}

/// Bump `updated_at` so the conversation sorts to the top of inboxes.
pub async fn touch<C: ConnectionTrait>(
    db: &C,
    conversation_id: Uuid,
    at: chrono::DateTime<chrono::Utc>,
) -> Result<(), DbErr> {
    conversations::Entity::update_many()
        .col_expr(conversations::Column::UpdatedAt, Expr::value(at))
        .filter(conversations::Column::Id.eq(conversation_id))
        .exec(db)
        .await?;
    Ok(())
}
