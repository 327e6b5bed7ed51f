//! The send-message pipeline: validate, rate-check, authorize, dedupe,
//! persist, then ack, broadcast and mark delivered, in that order.

use uuid::Uuid;

use crate::auth::authorization::require_accepted_member;
use crate::chat::ChatContext;
use crate::chat::protocol::{EventError, ErrorCode, SendMessageData, ServerEvent};
use crate::chat::registry::ConnId;
use crate::db::messages as message_db;
use crate::error::is_unique_violation;
use crate::models::messages::{self, CreateMessage, MessageResponse};
use crate::models::receipts::ReceiptUpdate;

/// A send that passed validation.
#[derive(Debug)]
struct ValidSend {
    conversation_id: Uuid,
    client_message_id: String,
    data: SendMessageData,
}

fn validate(data: SendMessageData, max_chars: usize) -> Result<ValidSend, EventError> {
    let (Some(conversation_id), Some(client_message_id)) =
        (data.conversation_id, data.client_message_id.clone())
    else {
        return Err(EventError::invalid(
            "conversationId and clientMessageId required",
        ));
    };
    if client_message_id.trim().is_empty() {
        return Err(EventError::invalid("clientMessageId must not be empty"));
    }
    if data.content.chars().count() > max_chars {
        return Err(EventError::invalid(format!(
            "Content too long (max {max_chars} chars)"
        )));
    }
    let has_attachments = data.attachments.as_ref().is_some_and(|a| !a.is_empty());
    if data.content.trim().is_empty() && !has_attachments {
        return Err(EventError::invalid("Message content cannot be empty"));
    }
    Ok(ValidSend {
        conversation_id,
        client_message_id,
        data,
    })
}

fn ack(message: &messages::Model) -> ServerEvent {
    ServerEvent::SendAck {
        conversation_id: message.conversation_id,
        client_message_id: message.client_message_id.clone(),
        server_message_id: message.id,
        created_at_server: message.created_at,
    }
}

/// Handle one `send-message` frame from `conn`.
pub async fn send_message(
    ctx: &ChatContext,
    conn: ConnId,
    sender_id: Uuid,
    req_id: Option<&str>,
    data: SendMessageData,
) -> Result<(), EventError> {
    let send = validate(data, ctx.config.max_content_chars)?;

    if !ctx.registry.check_rate_limit(sender_id).await {
        return Err(EventError::new(ErrorCode::RateLimit, "Too many messages"));
    }

    require_accepted_member(&ctx.db, send.conversation_id, sender_id).await?;

    // Retransmit of an already persisted send: same server id, no new row.
    if let Some(existing) =
        message_db::find_by_client_id(&ctx.db, sender_id, &send.client_message_id).await?
    {
        return replay(ctx, conn, req_id, send.conversation_id, existing).await;
    }

    if let Some(reply_to) = send.data.reply_to_id {
        let parent = message_db::get_message_by_id(&ctx.db, reply_to).await?;
        if parent.is_none_or(|p| p.conversation_id != send.conversation_id) {
            return Err(EventError::invalid("replyToId is not in this conversation"));
        }
    }

    let input = CreateMessage {
        conversation_id: send.conversation_id,
        sender_id,
        client_message_id: send.client_message_id.clone(),
        content: send.data.content,
        content_type: send.data.content_type,
        attachments: send.data.attachments,
        reply_to_id: send.data.reply_to_id,
    };

    let persisted = match message_db::insert_with_receipts(&ctx.db, input).await {
        Ok(p) => p,
        // A concurrent retry won the insert.
        Err(e) if is_unique_violation(&e) => {
            let existing = message_db::find_by_client_id(&ctx.db, sender_id, &send.client_message_id)
                .await?
                .ok_or_else(|| EventError::new(ErrorCode::Conflict, "Duplicate clientMessageId"))?;
            return replay(ctx, conn, req_id, send.conversation_id, existing).await;
        }
        Err(e) => return Err(e.into()),
    };
    let message = persisted.message;

    tracing::debug!(
        message_id = %message.id,
        conversation_id = %message.conversation_id,
        %sender_id,
        "Message persisted"
    );

    ctx.registry.send_to_conn(conn, &ack(&message), req_id).await;

    ctx.registry
        .send_to_room(
            message.conversation_id,
            &ServerEvent::MessageNew {
                message: MessageResponse::from(message.clone()),
            },
            Some(conn),
        )
        .await;

    for member_id in persisted.member_ids {
        if member_id == sender_id || !ctx.registry.is_online(member_id).await {
            continue;
        }
        if let Some(delivered_at) = message_db::mark_delivered(&ctx.db, message.id, member_id).await? {
            ctx.registry
                .send_to_user(
                    sender_id,
                    &ServerEvent::Delivered {
                        conversation_id: message.conversation_id,
                        message_id: message.id,
                        user_id: member_id,
                        delivered_at,
                    },
                )
                .await;
        }
    }

    Ok(())
}

async fn replay(
    ctx: &ChatContext,
    conn: ConnId,
    req_id: Option<&str>,
    conversation_id: Uuid,
    existing: messages::Model,
) -> Result<(), EventError> {
    if existing.conversation_id != conversation_id {
        return Err(EventError::new(
            ErrorCode::Conflict,
            "clientMessageId already used in another conversation",
        ));
    }
    tracing::debug!(message_id = %existing.id, "Replaying ack for duplicate send");
    ctx.registry.send_to_conn(conn, &ack(&existing), req_id).await;
    Ok(())
}

/// Tell each original sender that `recipient_id` received their messages.
pub async fn notify_delivered(
    ctx: &ChatContext,
    conversation_id: Uuid,
    recipient_id: Uuid,
    updates: &[ReceiptUpdate],
) {
    for update in updates {
        ctx.registry
            .send_to_user(
                update.sender_id,
                &ServerEvent::Delivered {
                    conversation_id,
                    message_id: update.message_id,
                    user_id: recipient_id,
                    delivered_at: update.at,
                },
            )
            .await;
    }
}

/// Tell each original sender that `reader` has read their messages.
pub async fn notify_read(
    ctx: &ChatContext,
    conversation_id: Uuid,
    reader_id: Uuid,
    updates: &[ReceiptUpdate],
) {
    for update in updates {
        ctx.registry
            .send_to_user(
                update.sender_id,
                &ServerEvent::Read {
                    conversation_id,
                    message_id: update.message_id,
                    user_id: reader_id,
                    read_at: update.at,
                },
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(content: &str) -> SendMessageData {
        SendMessageData {
            conversation_id: Some(Uuid::new_v4()),
            client_message_id: Some("c1".to_string()),
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_ids_are_invalid() {
        let mut d = data("hi");
        d.client_message_id = None;
        assert_eq!(validate(d, 10).unwrap_err().code, ErrorCode::InvalidRequest);
    }

    #[test]
    fn content_is_bounded_by_chars_not_bytes() {
        assert!(validate(data(&"é".repeat(10)), 10).is_ok());
        assert!(validate(data(&"é".repeat(11)), 10).is_err());
    }

    #[test]
    fn empty_text_without_attachments_is_invalid() {
        assert!(validate(data("   "), 10).is_err());
    }
}
