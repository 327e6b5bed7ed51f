use actix_web::{HttpResponse, web};
use uuid::Uuid;

use crate::auth::authorization::{require_member, require_message_access};
use crate::auth::middleware::AuthenticatedUser;
use crate::chat::ChatContext;
use crate::chat::protocol::ServerEvent;
use crate::db::messages as message_db;
use crate::db::reactions as reaction_db;
use crate::error::{ApiError, ApiResult, is_unique_violation};
use crate::models::reactions::{
    AddReaction, MAX_EMOJI_CHARS, ReactionResponse, ReactionSummary, count_by_emoji,
};

fn validate_emoji(raw: &str) -> ApiResult<String> {
    let emoji = raw.trim();
    if emoji.is_empty() || emoji.chars().count() > MAX_EMOJI_CHARS {
        return Err(ApiError::BadRequest(format!(
            "emoji must be 1-{MAX_EMOJI_CHARS} characters"
        )));
    }
    Ok(emoji.to_string())
}

/// POST /api/messages/{id}/reactions
pub async fn add_reaction(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<Uuid>,
    body: web::Json<AddReaction>,
) -> ApiResult<HttpResponse> {
    let emoji = validate_emoji(&body.emoji)?;
    let (message, _) = require_message_access(&ctx.db, path.into_inner(), user.id()).await?;
    if message.is_deleted() {
        return Err(ApiError::NotFound("Message not found".into()));
    }

    let reaction = match reaction_db::add_reaction(&ctx.db, message.id, user.id(), emoji).await {
        Ok(r) => r,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::Conflict("Reaction already exists".into()));
        }
        Err(e) => return Err(e.into()),
    };

    ctx.registry
        .send_to_room(
            message.conversation_id,
            &ServerEvent::ReactionAdded {
                conversation_id: message.conversation_id,
                message_id: message.id,
                user_id: user.id(),
                emoji: reaction.emoji.clone(),
            },
            None,
        )
        .await;

    Ok(HttpResponse::Created().json(ReactionResponse::from(reaction)))
}

/// DELETE /api/messages/{id}/reactions/{emoji}: only the caller's own row.
pub async fn remove_reaction(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<(Uuid, String)>,
) -> ApiResult<HttpResponse> {
    let (message_id, emoji) = path.into_inner();
    let emoji = validate_emoji(&emoji)?;
    let (message, _) = require_message_access(&ctx.db, message_id, user.id()).await?;

    let removed = reaction_db::remove_reaction(&ctx.db, message.id, user.id(), &emoji).await?;
    if removed == 0 {
        return Err(ApiError::NotFound("Reaction not found".into()));
    }

    ctx.registry
        .send_to_room(
            message.conversation_id,
            &ServerEvent::ReactionRemoved {
                conversation_id: message.conversation_id,
                message_id: message.id,
                user_id: user.id(),
                emoji,
            },
            None,
        )
        .await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// GET /api/messages/{id}/reactions: individual reactions plus per-emoji
/// counts.
pub async fn get_reactions(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let message_id = path.into_inner();
    let message = message_db::get_message_by_id(&ctx.db, message_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Message not found".into()))?;
    require_member(&ctx.db, message.conversation_id, user.id()).await?;

    let rows = reaction_db::get_reactions(&ctx.db, message_id).await?;
    let counts = count_by_emoji(&rows);

    Ok(HttpResponse::Ok().json(ReactionSummary {
        message_id,
        counts,
        reactions: rows.into_iter().map(ReactionResponse::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_is_trimmed_and_bounded() {
        assert_eq!(validate_emoji(" 👍 ").unwrap(), "👍");
        assert!(validate_emoji("").is_err());
        assert!(validate_emoji(&"x".repeat(MAX_EMOJI_CHARS + 1)).is_err());
    }
}
