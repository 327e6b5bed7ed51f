use actix_web::{HttpResponse, web};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::auth::authorization::require_member;
use crate::auth::middleware::AuthenticatedUser;
use crate::chat::ChatContext;
use crate::chat::protocol::ServerEvent;
use crate::db::conversations as conversation_db;
use crate::db::messages as message_db;
use crate::db::users as user_db;
use crate::error::{ApiError, ApiResult};
use crate::models::conversations::{
    self, ConversationCreated, ConversationKind, ConversationResponse, CreateDirectConversation,
    CreateGroupConversation, Inbox, LastMessage, NewConversation, RejectConversation,
};
use crate::models::members::MemberResponse;

/// Decorate conversations with members, presence, last message and unread
/// count for `viewer_id`, batching every lookup.
async fn build_responses(
    ctx: &ChatContext,
    viewer_id: Uuid,
    conversations: Vec<conversations::Model>,
) -> ApiResult<Vec<ConversationResponse>> {
    let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();

    let mut members = conversation_db::get_members_for_conversations(&ctx.db, ids.clone()).await?;
    let user_ids: Vec<Uuid> = members
        .values()
        .flatten()
        .map(|m| m.user_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let users = user_db::get_users_by_ids(&ctx.db, user_ids.clone()).await?;
    let mut latest = message_db::get_latest_messages_for_conversations(&ctx.db, ids.clone()).await?;
    let unread = message_db::count_unread_for_conversations(&ctx.db, ids, viewer_id).await?;

    let mut presence = HashMap::new();
    for user_id in user_ids {
        presence.insert(user_id, ctx.registry.presence(user_id).await);
    }

    let responses = conversations
        .into_iter()
        .map(|c| {
            let member_views = members
                .remove(&c.id)
                .unwrap_or_default()
                .into_iter()
                .map(|m| {
                    let profile = users.get(&m.user_id);
                    let live = presence.get(&m.user_id);
                    MemberResponse {
                        user_id: m.user_id,
                        role: m.role,
                        joined_at: m.joined_at,
                        is_accepted: m.is_accepted,
                        email: profile.map(|u| u.email.clone()),
                        display_name: profile.and_then(|u| u.display_name.clone()),
                        avatar_url: profile.and_then(|u| u.avatar_url.clone()),
                        is_online: live.is_some_and(|p| p.is_online),
                        last_seen_at: live.and_then(|p| p.last_seen_at),
                    }
                })
                .collect();

            ConversationResponse {
                last_message: latest.remove(&c.id).map(|m| LastMessage {
                    id: m.id,
                    sender_id: m.sender_id,
                    content: m.content,
                    created_at: m.created_at,
                }),
                unread_count: unread.get(&c.id).copied().unwrap_or(0),
                members: member_views,
                id: c.id,
                kind: c.kind,
                title: c.title,
                related_entity_type: c.related_entity_type,
                related_entity_id: c.related_entity_id,
                created_at: c.created_at,
                updated_at: c.updated_at,
            }
        })
        .collect();

    Ok(responses)
}

async fn list(ctx: &ChatContext, user_id: Uuid, inbox: Inbox) -> ApiResult<HttpResponse> {
    let conversations = conversation_db::list_for_user(&ctx.db, user_id, inbox).await?;
    let response = build_responses(ctx, user_id, conversations).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /api/conversations: conversations the caller has accepted.
pub async fn list_accepted(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
) -> ApiResult<HttpResponse> {
    list(&ctx, user.id(), Inbox::Accepted).await
}

/// GET /api/conversations/pending: unsolicited conversations awaiting the
/// caller's decision.
pub async fn list_pending(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
) -> ApiResult<HttpResponse> {
    list(&ctx, user.id(), Inbox::Pending).await
}

/// GET /api/conversations/{id}
pub async fn get_conversation(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let conversation_id = path.into_inner();
    require_member(&ctx.db, conversation_id, user.id()).await?;

    let conversation = conversation_db::get_conversation_by_id(&ctx.db, conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Conversation {conversation_id} not found")))?;

    let mut views = build_responses(&ctx, user.id(), vec![conversation]).await?;
    match views.pop() {
        Some(view) => Ok(HttpResponse::Ok().json(view)),
        None => Err(ApiError::NotFound(format!(
            "Conversation {conversation_id} not found"
        ))),
    }
}

/// POST /api/conversations/direct: find or create the direct conversation
/// with another user, addressed by email or id.
pub async fn create_direct(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    body: web::Json<CreateDirectConversation>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();

    let target = match (body.email, body.other_user_id) {
        (Some(email), _) if !email.trim().is_empty() => {
            user_db::get_user_by_email(&ctx.db, &email).await?
        }
        (_, Some(id)) => user_db::get_user_by_id(&ctx.db, id).await?,
        _ => return Err(ApiError::BadRequest("email or otherUserId required".into())),
    }
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    if target.id == user.id() {
        return Err(ApiError::BadRequest(
            "Cannot start a conversation with yourself".into(),
        ));
    }

    let outcome = conversation_db::create_direct(&ctx.db, user.id(), target.id).await?;
    let conversation_id = outcome.conversation.id;
    let body = ConversationCreated { conversation_id };

    if outcome.created {
        tracing::info!(%conversation_id, initiator = %user.id(), target = %target.id, "Direct conversation created");
        ctx.registry
            .send_to_user(target.id, &ServerEvent::ConversationUpsert { conversation_id })
            .await;
        Ok(HttpResponse::Created().json(body))
    } else {
        Ok(HttpResponse::Ok().json(body))
    }
}

/// POST /api/conversations/group: a group, or a module-linked conversation
/// when it points at a business object.
pub async fn create_group(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    body: web::Json<CreateGroupConversation>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    let creator_id = user.id();

    let mut seen = HashSet::new();
    let invitee_ids: Vec<Uuid> = body
        .member_ids
        .into_iter()
        .filter(|id| *id != creator_id && seen.insert(*id))
        .collect();
    if invitee_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "memberIds must name at least one other user".into(),
        ));
    }

    let known = user_db::get_users_by_ids(&ctx.db, invitee_ids.clone()).await?;
    if let Some(missing) = invitee_ids.iter().find(|id| !known.contains_key(id)) {
        return Err(ApiError::NotFound(format!("User {missing} not found")));
    }

    let (kind, related_entity) = match (body.related_entity_type, body.related_entity_id) {
        (Some(t), Some(id)) => (ConversationKind::ModuleLinked, Some((t, id))),
        (None, None) => (ConversationKind::Group, None),
        _ => {
            return Err(ApiError::BadRequest(
                "relatedEntityType and relatedEntityId go together".into(),
            ));
        }
    };

    let conversation = conversation_db::insert_conversation(
        &ctx.db,
        NewConversation {
            kind,
            title: body.title.filter(|t| !t.trim().is_empty()),
            related_entity,
            creator_id,
            invitee_ids: invitee_ids.clone(),
        },
    )
    .await?;

    let conversation_id = conversation.id;
    tracing::info!(%conversation_id, %creator_id, members = invitee_ids.len() + 1, "Group conversation created");
    for invitee in invitee_ids {
        ctx.registry
            .send_to_user(invitee, &ServerEvent::ConversationUpsert { conversation_id })
            .await;
    }

    Ok(HttpResponse::Created().json(ConversationCreated { conversation_id }))
}

fn not_a_member() -> ApiError {
    ApiError::NotFound("Conversation not found or you are not a member".into())
}

/// POST /api/conversations/{id}/accept
pub async fn accept(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let conversation_id = path.into_inner();
    require_member(&ctx.db, conversation_id, user.id())
        .await
        .map_err(|_| not_a_member())?;

    conversation_db::accept_membership(&ctx.db, conversation_id, user.id()).await?;
    tracing::info!(%conversation_id, user_id = %user.id(), "Conversation accepted");

    // Other devices of the caller move it between inbox halves.
    ctx.registry
        .send_to_user(user.id(), &ServerEvent::ConversationUpsert { conversation_id })
        .await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// POST /api/conversations/{id}/reject: leave the conversation, or with
/// `deleteHistory` destroy it for everyone.
pub async fn reject(
    user: AuthenticatedUser,
    ctx: web::Data<ChatContext>,
    path: web::Path<Uuid>,
    body: Option<web::Json<RejectConversation>>,
) -> ApiResult<HttpResponse> {
    let conversation_id = path.into_inner();
    let delete_history = body.map(|b| b.delete_history).unwrap_or(false);

    require_member(&ctx.db, conversation_id, user.id())
        .await
        .map_err(|_| not_a_member())?;

    if delete_history {
        let others: Vec<Uuid> = conversation_db::get_members(&ctx.db, conversation_id)
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .filter(|id| *id != user.id())
            .collect();

        conversation_db::delete_with_history(&ctx.db, conversation_id).await?;
        tracing::info!(%conversation_id, user_id = %user.id(), "Conversation deleted with history");
        ctx.registry.close_room(conversation_id).await;

        let event = ServerEvent::ConversationRejected {
            conversation_id,
            user_id: user.id(),
        };
        for other in others {
            ctx.registry.send_to_user(other, &event).await;
        }
    } else {
        conversation_db::remove_member(&ctx.db, conversation_id, user.id()).await?;
        ctx.registry.leave_room(user.id(), conversation_id).await;
        tracing::info!(%conversation_id, user_id = %user.id(), "Left conversation");
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}
