use chrono::Utc;
use uuid::Uuid;

use crate::auth::authorization::{require_accepted_member, require_member};
use crate::chat::ChatContext;
use crate::chat::delivery;
use crate::chat::protocol::{
    ClientEvent, ErrorCode, EventError, HelloData, InboundFrame, JoinRoomData, MarkReadData,
    PROTOCOL_VERSION, SendMessageData, ServerEvent, SyncData, TypingData,
};
use crate::chat::registry::ConnId;
use crate::db::messages as message_db;
use crate::models::messages::{Cursor, MessageResponse};

/// Parse and dispatch one inbound text frame from `conn`. Failures are
/// reported to that connection only.
pub async fn handle_frame(ctx: &ChatContext, conn: ConnId, user_id: Uuid, text: &str) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            let err = EventError::invalid(format!("Invalid frame: {e}"));
            ctx.registry.send_to_conn(conn, &ServerEvent::from(err), None).await;
            return;
        }
    };
    let req_id = frame.req_id.as_deref();

    let Some(event) = ClientEvent::parse(&frame.kind) else {
        let err = EventError::new(
            ErrorCode::UnknownEvent,
            format!("Unknown event type: {}", frame.kind),
        );
        ctx.registry.send_to_conn(conn, &ServerEvent::from(err), req_id).await;
        return;
    };

    tracing::debug!(conn, %user_id, event = %frame.kind, "Dispatching client event");

    let result = match event {
        ClientEvent::Hello => hello(ctx, conn, user_id, &frame).await,
        ClientEvent::JoinRoom => join_room(ctx, conn, user_id, &frame).await,
        ClientEvent::SendMessage => match frame.payload::<SendMessageData>() {
            Ok(data) => delivery::send_message(ctx, conn, user_id, req_id, data).await,
            Err(e) => Err(e),
        },
        ClientEvent::MarkRead => mark_read(ctx, user_id, &frame).await,
        ClientEvent::Typing => typing(ctx, conn, user_id, &frame).await,
        ClientEvent::Sync => sync(ctx, conn, user_id, &frame).await,
        ClientEvent::Pong => Ok(()),
    };

    if let Err(err) = result {
        tracing::debug!(conn, %user_id, code = ?err.code, "Event rejected: {err}");
        ctx.registry.send_to_conn(conn, &ServerEvent::from(err), req_id).await;
    }
}

async fn hello(
    ctx: &ChatContext,
    conn: ConnId,
    user_id: Uuid,
    frame: &InboundFrame,
) -> Result<(), EventError> {
    let data: HelloData = frame.payload()?;
    tracing::debug!(
        conn,
        device_id = data.device_id.as_deref().unwrap_or("-"),
        app_version = data.app_version.as_deref().unwrap_or("-"),
        "Client hello"
    );

    let ack = ServerEvent::HelloAck {
        user_id,
        protocol_version: PROTOCOL_VERSION,
        server_time: Utc::now(),
        heartbeat_interval_ms: ctx.config.heartbeat_interval.as_millis() as u64,
    };
    ctx.registry.send_to_conn(conn, &ack, frame.req_id.as_deref()).await;
    Ok(())
}

async fn join_room(
    ctx: &ChatContext,
    conn: ConnId,
    user_id: Uuid,
    frame: &InboundFrame,
) -> Result<(), EventError> {
    let data: JoinRoomData = frame.payload()?;
    let conversation_id = data
        .conversation_id
        .ok_or_else(|| EventError::invalid("conversationId required"))?;

    require_accepted_member(&ctx.db, conversation_id, user_id).await?;
    ctx.registry.join_room(conn, conversation_id).await;
    Ok(())
}

async fn mark_read(ctx: &ChatContext, user_id: Uuid, frame: &InboundFrame) -> Result<(), EventError> {
    let data: MarkReadData = frame.payload()?;
    let (Some(conversation_id), Some(last_read)) = (data.conversation_id, data.last_read_message_id)
    else {
        return Err(EventError::invalid(
            "conversationId and lastReadMessageId required",
        ));
    };

    require_member(&ctx.db, conversation_id, user_id).await?;

    let progress =
        message_db::mark_read_up_to(&ctx.db, conversation_id, user_id, last_read).await?;
    tracing::debug!(
        %user_id,
        %conversation_id,
        delivered = progress.delivered.len(),
        read = progress.read.len(),
        "Messages marked read"
    );

    delivery::notify_delivered(ctx, conversation_id, user_id, &progress.delivered).await;
    delivery::notify_read(ctx, conversation_id, user_id, &progress.read).await;
    Ok(())
}

async fn typing(
    ctx: &ChatContext,
    conn: ConnId,
    user_id: Uuid,
    frame: &InboundFrame,
) -> Result<(), EventError> {
    let data: TypingData = frame.payload()?;
    let conversation_id = data
        .conversation_id
        .ok_or_else(|| EventError::invalid("conversationId required"))?;

    // Joining already required membership.
    if !ctx.registry.is_in_room(conn, conversation_id).await {
        return Err(EventError::forbidden("Join the room before sending typing"));
    }

    let event = ServerEvent::Typing {
        conversation_id,
        user_id,
        is_typing: data.is_typing,
    };
    ctx.registry.send_to_room(conversation_id, &event, Some(conn)).await;
    Ok(())
}

async fn sync(
    ctx: &ChatContext,
    conn: ConnId,
    user_id: Uuid,
    frame: &InboundFrame,
) -> Result<(), EventError> {
    let data: SyncData = frame.payload()?;
    let conversation_id = data
        .conversation_id
        .ok_or_else(|| EventError::invalid("conversationId required"))?;

    require_member(&ctx.db, conversation_id, user_id).await?;

    // Catch-up walks forward: without an anchor start from the oldest page,
    // then follow `hasMore` with the last id received.
    let cursor = data.after_message_id.map_or(Cursor::Earliest, Cursor::After);
    let limit = ctx.config.page_limit(data.limit);
    let page = message_db::get_page(&ctx.db, conversation_id, cursor, limit).await?;

    let delivered =
        message_db::mark_delivered_for_messages(&ctx.db, user_id, &page.messages).await?;

    let result = ServerEvent::SyncResult {
        conversation_id,
        messages: page.messages.into_iter().map(MessageResponse::from).collect(),
        has_more: page.has_more,
    };
    ctx.registry.send_to_conn(conn, &result, frame.req_id.as_deref()).await;

    delivery::notify_delivered(ctx, conversation_id, user_id, &delivered).await;
    Ok(())
}
