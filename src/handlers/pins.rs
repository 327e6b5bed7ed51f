use actix_web::{HttpResponse, web};
use uuid::Uuid;

use crate::auth::authorization::{require_accepted_member, require_member};
use crate::auth::middleware::AuthenticatedUser;
use crate::chat::ChatContext;
use crate::chat::protocol::ServerEvent;
use crate::db::messages as message_db;
use crate::db::pins as pin_db;
use crate::error::{ApiError, ApiResult, is_unique_violation};
use crate::models::messages::MessageResponse;
use crate::models::pins::{PinMessage, PinResponse};

/// GET /api/conversations/{id}/pinned
pub async fn get_pins(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let conversation_id = path.into_inner();
    require_member(&ctx.db, conversation_id, user.id()).await?;

    let pins: Vec<PinResponse> = pin_db::get_pins(&ctx.db, conversation_id)
        .await?
        .into_iter()
        .map(|(pin, message)| {
            let mut view = PinResponse::from(pin);
            view.message = message.map(MessageResponse::from);
            view
        })
        .collect();

    Ok(HttpResponse::Ok().json(pins))
}

async fn pin(
    ctx: &ChatContext,
    user_id: Uuid,
    conversation_id: Uuid,
    message_id: Uuid,
) -> ApiResult<HttpResponse> {
    require_accepted_member(&ctx.db, conversation_id, user_id).await?;

    let message = message_db::get_message_by_id(&ctx.db, message_id)
        .await?
        .filter(|m| m.conversation_id == conversation_id && !m.is_deleted())
        .ok_or_else(|| ApiError::NotFound("Message not found".into()))?;

    let pin = match pin_db::pin_message(&ctx.db, conversation_id, message.id, user_id).await {
        Ok(p) => p,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::Conflict("Message is already pinned".into()));
        }
        Err(e) => return Err(e.into()),
    };

    ctx.registry
        .send_to_room(
            conversation_id,
            &ServerEvent::MessagePinned {
                conversation_id,
                message_id: pin.message_id,
                pinned_by: pin.pinned_by,
                pinned_at: pin.pinned_at,
            },
            None,
        )
        .await;

    let mut view = PinResponse::from(pin);
    view.message = Some(MessageResponse::from(message));
    Ok(HttpResponse::Created().json(view))
}

async fn unpin(
    ctx: &ChatContext,
    user_id: Uuid,
    conversation_id: Uuid,
    message_id: Uuid,
) -> ApiResult<HttpResponse> {
    require_accepted_member(&ctx.db, conversation_id, user_id).await?;

    let removed = pin_db::unpin_message(&ctx.db, conversation_id, message_id).await?;
    if removed == 0 {
        return Err(ApiError::NotFound("Message is not pinned".into()));
    }

    ctx.registry
        .send_to_room(
            conversation_id,
            &ServerEvent::MessageUnpinned {
                conversation_id,
                message_id,
                unpinned_by: user_id,
            },
            None,
        )
        .await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// POST /api/conversations/{id}/pinned {messageId}
pub async fn pin_message(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<Uuid>,
    body: web::Json<PinMessage>,
) -> ApiResult<HttpResponse> {
    pin(&ctx, user.id(), path.into_inner(), body.message_id).await
}

/// DELETE /api/conversations/{id}/pinned {messageId}
pub async fn unpin_message(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<Uuid>,
    body: web::Json<PinMessage>,
) -> ApiResult<HttpResponse> {
    unpin(&ctx, user.id(), path.into_inner(), body.message_id).await
}

/// POST /api/conversations/{id}/pin/{message_id}
pub async fn pin_by_path(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<(Uuid, Uuid)>,
) -> ApiResult<HttpResponse> {
    let (conversation_id, message_id) = path.into_inner();
    pin(&ctx, user.id(), conversation_id, message_id).await
}

/// POST|DELETE /api/conversations/{id}/unpin/{message_id}
pub async fn unpin_by_path(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<(Uuid, Uuid)>,
) -> ApiResult<HttpResponse> {
    let (conversation_id, message_id) = path.into_inner();
    unpin(&ctx, user.id(), conversation_id, message_id).await
}
