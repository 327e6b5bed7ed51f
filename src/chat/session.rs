use actix_web::{HttpRequest, HttpResponse, web};
use actix_ws::Message;
use futures_util::StreamExt;
use tokio::time::{Instant, interval_at};
use uuid::Uuid;

use crate::auth::{TokenVerifier, identify};
use crate::chat::ChatContext;
use crate::chat::protocol::ServerEvent;
use crate::chat::registry::{ConnId, FrameReceiver};
use crate::chat::router;

/// Query params for the WebSocket handshake endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct WsQuery {
    pub token: String,
}

/// GET /api/ws?token=<jwt>
///
/// Browsers cannot set headers on the WebSocket handshake, so the credential
/// travels in the query string. An invalid token is refused before the
/// upgrade and never reaches the registry.
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<WsQuery>,
    verifier: web::Data<TokenVerifier>,
    ctx: web::Data<ChatContext>,
) -> Result<HttpResponse, actix_web::Error> {
    let user = identify(verifier.get_ref(), &ctx.db, &query.token).await?;

    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;

    let (conn, rx) = ctx.registry.connect(user.id).await;

    actix_web::rt::spawn(run_session(
        ctx.get_ref().clone(),
        session,
        msg_stream,
        rx,
        conn,
        user.id,
    ));

    Ok(response)
}

/// Drives one socket: inbound frames go through the router, queued frames go
/// out, and a heartbeat pings the client. Silence past the heartbeat timeout
/// ends the session.
async fn run_session(
    ctx: ChatContext,
    mut session: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
    mut rx: FrameReceiver,
    conn: ConnId,
    user_id: Uuid,
) {
    let period = ctx.config.heartbeat_interval;
    let timeout = ctx.config.heartbeat_timeout;
    let mut heartbeat = interval_at(Instant::now() + period, period);
    let mut last_heard = Instant::now();
    let ping = ServerEvent::Ping.to_frame(None);

    loop {
        tokio::select! {
            inbound = msg_stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        last_heard = Instant::now();
                        router::handle_frame(&ctx, conn, user_id, &text).await;
                    }
                    Some(Ok(Message::Ping(bytes))) => {
                        last_heard = Instant::now();
                        if session.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_heard = Instant::now();
                    }
                    Some(Ok(Message::Close(reason))) => {
                        tracing::debug!(conn, ?reason, "Client closed socket");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(conn, "Socket protocol error: {e}");
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
            outbound = rx.recv() => {
                // None: the registry dropped this connection (pruned or drained).
                let Some(frame) = outbound else { break };
                if session.text(frame.to_string()).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if last_heard.elapsed() > timeout {
                    tracing::info!(conn, %user_id, "Heartbeat timed out");
                    break;
                }
                if session.text(ping.to_string()).await.is_err() {
                    break;
                }
            }
        }
    }

    ctx.registry.disconnect(conn).await;
    let _ = session.close(None).await;
}
