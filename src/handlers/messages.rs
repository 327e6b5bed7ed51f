use actix_web::{HttpResponse, web};
use uuid::Uuid;

use crate::auth::authorization::{require_member, require_message_access};
use crate::auth::middleware::AuthenticatedUser;
use crate::chat::ChatContext;
use crate::chat::protocol::ServerEvent;
use crate::db::conversations as conversation_db;
use crate::db::messages as message_db;
use crate::error::{ApiError, ApiResult, not_found_or_db};
use crate::models::messages::{
    Cursor, EditMessage, MessagePageResponse, MessageQuery, MessageResponse,
};
use crate::models::receipts::ReceiptResponse;

/// GET /api/conversations/{id}/messages?after=&before=&limit=
///
/// Cursor-paginated history in ascending order. Without a cursor the newest
/// page is returned.
pub async fn get_messages(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<Uuid>,
    query: web::Query<MessageQuery>,
) -> ApiResult<HttpResponse> {
    let conversation_id = path.into_inner();

    conversation_db::get_conversation_by_id(&ctx.db, conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".into()))?;
    require_member(&ctx.db, conversation_id, user.id()).await?;

    let cursor = match (query.after, query.before) {
        (Some(_), Some(_)) => {
            return Err(ApiError::BadRequest(
                "Use either after or before, not both".into(),
            ));
        }
        (Some(id), None) => Cursor::After(id),
        (None, Some(id)) => Cursor::Before(id),
        (None, None) => Cursor::Latest,
    };
    let limit = ctx.config.page_limit(query.limit);

    let page = message_db::get_page(&ctx.db, conversation_id, cursor, limit)
        .await
        .map_err(not_found_or_db)?;

    let ids = page.messages.iter().map(|m| m.id).collect();
    let mut receipts = message_db::get_receipts_for_messages(&ctx.db, ids).await?;

    let messages = page
        .messages
        .into_iter()
        .map(|m| {
            let id = m.id;
            let mut view = MessageResponse::from(m);
            view.receipts = Some(
                receipts
                    .remove(&id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(ReceiptResponse::from)
                    .collect(),
            );
            view
        })
        .collect();

    Ok(HttpResponse::Ok().json(MessagePageResponse {
        messages,
        has_more: page.has_more,
    }))
}

/// PATCH /api/messages/{id}: edit the caller's own message.
pub async fn edit_message(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<Uuid>,
    body: web::Json<EditMessage>,
) -> ApiResult<HttpResponse> {
    let (message, _) = require_message_access(&ctx.db, path.into_inner(), user.id()).await?;

    if message.sender_id != user.id() {
        return Err(ApiError::Forbidden("You can only edit your own messages".into()));
    }
    if message.is_deleted() {
        return Err(ApiError::Conflict("Message has been deleted".into()));
    }

    let content = body.into_inner().content;
    if content.trim().is_empty() {
        return Err(ApiError::BadRequest("Message content cannot be empty".into()));
    }
    let max = ctx.config.max_content_chars;
    if content.chars().count() > max {
        return Err(ApiError::BadRequest(format!(
            "Content too long (max {max} chars)"
        )));
    }

    let updated = message_db::edit_message(&ctx.db, message, content).await?;
    let view = MessageResponse::from(updated);

    ctx.registry
        .send_to_room(
            view.conversation_id,
            &ServerEvent::MessageEdited {
                message: view.clone(),
            },
            None,
        )
        .await;

    Ok(HttpResponse::Ok().json(view))
}

/// DELETE /api/messages/{id}: soft-delete the caller's own message.
pub async fn delete_message(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let (message, _) = require_message_access(&ctx.db, path.into_inner(), user.id()).await?;

    if message.sender_id != user.id() {
        return Err(ApiError::Forbidden(
            "You can only delete your own messages".into(),
        ));
    }

    let deleted = message_db::soft_delete_message(&ctx.db, message).await?;
    if let Some(deleted_at) = deleted.deleted_at {
        ctx.registry
            .send_to_room(
                deleted.conversation_id,
                &ServerEvent::MessageDeleted {
                    conversation_id: deleted.conversation_id,
                    message_id: deleted.id,
                    deleted_at,
                },
                None,
            )
            .await;
    }

    Ok(HttpResponse::Ok().json(MessageResponse::from(deleted)))
}
