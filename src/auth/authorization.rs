//! Capability checks called at the top of every conversation-scoped handler.

use sea_orm::{ConnectionTrait, DbErr, EntityTrait};
use thiserror::Error;
use uuid::Uuid;

use crate::db::messages as message_db;
use crate::error::ApiError;
use crate::models::{members, messages};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Not a member of this conversation")]
    NotMember,

    #[error("Conversation has not been accepted")]
    Pending,

    #[error("Message not found")]
    MessageNotFound,

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl From<AccessError> for ApiError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::NotMember | AccessError::Pending => ApiError::Forbidden(e.to_string()),
            AccessError::MessageNotFound => ApiError::NotFound(e.to_string()),
            AccessError::Database(db) => ApiError::Database(db),
        }
    }
}

/// Proof that the user belongs to the conversation (accepted or pending).
#[derive(Debug, Clone)]
pub struct Membership(pub members::Model);

/// Proof that the user belongs to the conversation and has accepted it.
#[derive(Debug, Clone)]
pub struct AcceptedMembership(pub members::Model);

pub async fn require_member<C: ConnectionTrait>(
    db: &C,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<Membership, AccessError> {
    members::Entity::find_by_id((conversation_id, user_id))
        .one(db)
        .await?
        .map(Membership)
        .ok_or(AccessError::NotMember)
}

pub async fn require_accepted_member<C: ConnectionTrait>(
    db: &C,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<AcceptedMembership, AccessError> {
    let Membership(member) = require_member(db, conversation_id, user_id).await?;
    if !member.is_accepted {
        return Err(AccessError::Pending);
    }
    Ok(AcceptedMembership(member))
}

/// Resolve a message and check the caller is an accepted member of its
/// conversation.
pub async fn require_message_access<C: ConnectionTrait>(
    db: &C,
    message_id: Uuid,
    user_id: Uuid,
) -> Result<(messages::Model, AcceptedMembership), AccessError> {
    let message = message_db::get_message_by_id(db, message_id)
        .await?
        .ok_or(AccessError::MessageNotFound)?;
    let membership = require_accepted_member(db, message.conversation_id, user_id).await?;
    Ok((message, membership))
}
