//! The WebSocket chat multiplexer (component F): subscribe/message/typing
//! frame handling over one fabric chat-stream subscription per tenant,
//! ref-counted by local connection count.

use crate::server::AppState;
use crate::types::{close_codes, ClientFrame, ServerFrame};
use axum::{
    extract::{
        ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use mc_common::ids::{ActorKind, TenantId};
use mc_core::message::{extract_mentions, parse_command, ChannelId, Message, MessageId};
use mc_core::registry::Transport;
use mc_core::Channel;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub org_slug: String,
    pub token: String,
}

#[instrument(skip(state, ws), fields(org_slug = %query.org_slug))]
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: AppState, query: WsQuery) {
    // Token verification is out of scope (auth token minting lives in the
    // CRUD service); a non-empty token is accepted as a stand-in seam and
    // also used to derive a stable actor identity and revocation key.
    if query.token.trim().is_empty() {
        let _ = close_with(socket, close_codes::UNAUTHORIZED, "missing token").await;
        return;
    }

    let tenant_id = match state.membership.resolve_tenant(&query.org_slug).await {
        Ok(id) => id,
        Err(_) => {
            let _ = close_with(socket, close_codes::UNAUTHORIZED, "unknown org").await;
            return;
        }
    };

    let actor_id = match state.membership.resolve_actor(&query.token).await {
        Ok(id) => id,
        Err(_) => {
            let _ = close_with(socket, close_codes::UNAUTHORIZED, "unresolvable token").await;
            return;
        }
    };

    let connection_id = Uuid::new_v4();
    let cap = state.config.limits.ws_connection_cap as usize;
    if state
        .registry
        .register(tenant_id, Transport::WebSocket, connection_id, cap)
        .await
        .is_err()
    {
        let _ = close_with(socket, close_codes::CONNECTION_CAP_EXCEEDED, "connection cap exceeded").await;
        return;
    }

    info!(connection_id = %connection_id, "WebSocket connection established");
    run_session(socket, state.clone(), tenant_id, connection_id, actor_id, &query.token).await;

    if let Err(e) = state.registry.deregister(tenant_id, Transport::WebSocket, connection_id).await {
        warn!(error = %e, "failed to deregister WebSocket connection");
    }
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &str) -> Result<(), axum::Error> {
    socket
        .send(WsMessage::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await
}

async fn run_session(
    socket: WebSocket,
    state: AppState,
    tenant_id: TenantId,
    connection_id: Uuid,
    actor_id: Uuid,
    credential_id: &str,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscribed: HashSet<Uuid> = HashSet::new();

    let mut live = match state.fabric.subscribe(tenant_id).await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "fabric subscribe failed for WebSocket session");
            Box::pin(futures_util::stream::empty::<mc_core::Event>())
        }
    };

    let mut revocation_check = tokio::time::interval(Duration::from_secs(state.config.limits.heartbeat_interval_secs));
    let mut iterations: u64 = 0;

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(Ok(msg)) = incoming else { break };
                match msg {
                    WsMessage::Text(text) => {
                        if !handle_client_frame(&text, &state, tenant_id, actor_id, connection_id, &mut subscribed, &mut sender).await {
                            break;
                        }
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            maybe_event = live.next() => {
                let Some(event) = maybe_event else { break };
                let Some(frame) = frame_for_event(&event, &subscribed) else { continue };
                let payload = serde_json::to_string(&frame).unwrap_or_default();
                if sender.send(WsMessage::Text(payload)).await.is_err() {
                    break;
                }
            }
            _ = revocation_check.tick() => {
                iterations += 1;
                if iterations % 10 != 0 {
                    continue;
                }
                match state.registry.is_revoked(credential_id).await {
                    Ok(true) => {
                        let _ = send_frame(&mut sender, &ServerFrame::SessionRevoked).await;
                        let _ = sender
                            .send(WsMessage::Close(Some(CloseFrame {
                                code: close_codes::SESSION_REVOKED,
                                reason: "credential revoked".to_string().into(),
                            })))
                            .await;
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "revocation check failed"),
                }
            }
        }
    }
}

/// Whether an event for `channel_id` should be delivered to a connection
/// whose subscription set is `subscribed`. An empty set means "not yet
/// scoped to any channel," which is treated as "deliver everything" per
/// the multiplexer's default, mirroring `SubscriptionManager::is_subscribed`
/// on the Comms Bridge side.
fn should_deliver(subscribed: &HashSet<Uuid>, channel_id: Uuid) -> bool {
    subscribed.is_empty() || subscribed.contains(&channel_id)
}

fn frame_for_event(event: &mc_core::Event, subscribed: &HashSet<Uuid>) -> Option<ServerFrame> {
    let channel_id = event.channel_id().and_then(|s| Uuid::parse_str(s).ok())?;
    if !should_deliver(subscribed, channel_id) {
        return None;
    }

    match event.event_type.as_str() {
        "message.created" => {
            let message_id = event.payload.get("message_id").and_then(|v| v.as_str()).and_then(|s| Uuid::parse_str(s).ok()).unwrap_or_else(Uuid::new_v4);
            let sender_id = event.actor_id.unwrap_or_else(Uuid::new_v4);
            let content = event.payload.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let mentions = event
                .payload
                .get("mentions")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str()).filter_map(|s| Uuid::parse_str(s).ok()).collect())
                .unwrap_or_default();
            let client_id = event.payload.get("client_id").and_then(|v| v.as_str()).map(|s| s.to_string());
            Some(ServerFrame::Message {
                channel_id,
                message_id,
                sender_id,
                content,
                mentions,
                client_id,
                sequence_id: event.sequence_id,
            })
        }
        "typing.started" => Some(ServerFrame::Typing {
            channel_id,
            actor_id: event.actor_id.unwrap_or_else(Uuid::new_v4),
        }),
        "typing.stopped" => Some(ServerFrame::TypingStopped {
            channel_id,
            actor_id: event.actor_id.unwrap_or_else(Uuid::new_v4),
        }),
        _ => None,
    }
}

async fn handle_client_frame(
    text: &str,
    state: &AppState,
    tenant_id: TenantId,
    actor_id: Uuid,
    connection_id: Uuid,
    subscribed: &mut HashSet<Uuid>,
    sender: &mut (impl SinkExt<WsMessage, Error = axum::Error> + Unpin),
) -> bool {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            let error = ServerFrame::Error {
                error: format!("malformed frame: {e}"),
                code: "BAD_FRAME".to_string(),
            };
            return send_frame(sender, &error).await;
        }
    };

    match frame {
        ClientFrame::Ping => {
            if let Err(e) = state.registry.heartbeat(tenant_id, Transport::WebSocket, connection_id).await {
                warn!(error = %e, "registry heartbeat refresh failed");
            }
            send_frame(sender, &ServerFrame::Pong).await
        }
        ClientFrame::Subscribe { channel_ids } => {
            let mut accepted = Vec::with_capacity(channel_ids.len());
            for channel_id in channel_ids {
                if is_subscribable(state, tenant_id, actor_id, channel_id).await {
                    subscribed.insert(channel_id);
                    accepted.push(channel_id);
                }
            }
            send_frame(sender, &ServerFrame::Subscribed { channel_ids: accepted }).await
        }
        ClientFrame::Message {
            channel_id,
            content,
            mentions,
            client_id,
        } => {
            let mentions = extract_mentions(&content, &mentions);
            let payload = serde_json::json!({
                "channel_id": channel_id,
                "content": content,
                "mentions": mentions,
                "client_id": client_id,
            });
            let event = mc_core::event::Event {
                id: mc_core::event::EventId::new(),
                sequence_id: 0,
                tenant_id,
                event_type: "message.created".to_string(),
                actor_id: Some(actor_id),
                actor_kind: ActorKind::Human,
                payload,
                timestamp: chrono::Utc::now(),
            };
            if let Err(e) = state.broadcaster.broadcast(event).await {
                warn!(error = %e, "failed to broadcast chat message");
                return send_frame(
                    sender,
                    &ServerFrame::Error {
                        error: e.to_string(),
                        code: "BROADCAST_FAILED".to_string(),
                    },
                )
                .await;
            }
            let message = Message {
                id: MessageId::new(),
                tenant_id,
                channel_id: ChannelId(channel_id),
                sender_id: actor_id,
                content: content.clone(),
                mentions: mentions.clone(),
                created_at: chrono::Utc::now(),
            };
            let message_id = message.id.0;
            if let Err(e) = state.message_store.insert(message).await {
                warn!(error = %e, "failed to persist chat message");
            }

            if let Some((command, args)) = parse_command(&content) {
                broadcast_command_invoked(state, tenant_id, channel_id, actor_id, &command, &args).await;
            }
            if !mentions.is_empty() {
                broadcast_mention_created(state, tenant_id, channel_id, actor_id, message_id, &mentions).await;
            }
            true
        }
        ClientFrame::Typing { channel_id } => {
            publish_typing_event(state, tenant_id, channel_id, actor_id, "typing.started").await;
            true
        }
        ClientFrame::TypingStopped { channel_id } => {
            publish_typing_event(state, tenant_id, channel_id, actor_id, "typing.stopped").await;
            true
        }
    }
}

/// Whether `actor_id` may subscribe to `channel_id`: the channel must
/// belong to the connection's own tenant, and — for project-scoped
/// channels — the actor must be a member of that project.
async fn is_subscribable(state: &AppState, tenant_id: TenantId, actor_id: Uuid, channel_id: Uuid) -> bool {
    let channel: Channel = match state.membership.channel(channel_id).await {
        Ok(c) => c,
        Err(_) => return false,
    };
    if channel.tenant_id != tenant_id {
        return false;
    }
    let project_ids = state
        .membership
        .project_ids_for_actor(tenant_id, actor_id)
        .await
        .unwrap_or_default();
    channel.accessible_by(&project_ids)
}

/// Typing indicators are ephemeral: published straight to the fabric,
/// skipping the durable log and ring buffer, since they're explicitly
/// allowed to be delivered with lower reliability.
async fn publish_typing_event(state: &AppState, tenant_id: TenantId, channel_id: Uuid, actor_id: Uuid, event_type: &str) {
    let event = mc_core::event::Event {
        id: mc_core::event::EventId::new(),
        sequence_id: 0,
        tenant_id,
        event_type: event_type.to_string(),
        actor_id: Some(actor_id),
        actor_kind: ActorKind::Human,
        payload: serde_json::json!({ "channel_id": channel_id }),
        timestamp: chrono::Utc::now(),
    };
    if let Err(e) = state.fabric.publish(&event).await {
        warn!(error = %e, event_type, "failed to publish typing event");
    }
}

async fn broadcast_command_invoked(state: &AppState, tenant_id: TenantId, channel_id: Uuid, sender_id: Uuid, command: &str, args: &str) {
    let event = mc_core::event::Event {
        id: mc_core::event::EventId::new(),
        sequence_id: 0,
        tenant_id,
        event_type: "command.invoked".to_string(),
        actor_id: Some(sender_id),
        actor_kind: ActorKind::Human,
        payload: serde_json::json!({
            "channel_id": channel_id,
            "sender_id": sender_id,
            "command": command,
            "args": args,
        }),
        timestamp: chrono::Utc::now(),
    };
    if let Err(e) = state.broadcaster.broadcast(event).await {
        warn!(error = %e, command, "failed to broadcast command.invoked");
    }
}

async fn broadcast_mention_created(state: &AppState, tenant_id: TenantId, channel_id: Uuid, sender_id: Uuid, message_id: Uuid, mentions: &[Uuid]) {
    let event = mc_core::event::Event {
        id: mc_core::event::EventId::new(),
        sequence_id: 0,
        tenant_id,
        event_type: "mention.created".to_string(),
        actor_id: Some(sender_id),
        actor_kind: ActorKind::Human,
        payload: serde_json::json!({
            "channel_id": channel_id,
            "sender_id": sender_id,
            "message_id": message_id,
            "mentions": mentions,
        }),
        timestamp: chrono::Utc::now(),
    };
    if let Err(e) = state.broadcaster.broadcast(event).await {
        warn!(error = %e, "failed to broadcast mention.created");
    }
}

async fn send_frame(
    sender: &mut (impl SinkExt<WsMessage, Error = axum::Error> + Unpin),
    frame: &ServerFrame,
) -> bool {
    let Ok(payload) = serde_json::to_string(frame) else {
        return false;
    };
    sender.send(WsMessage::Text(payload)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::should_deliver;
    use std::collections::HashSet;
    use uuid::Uuid;

    #[test]
    fn empty_subscription_set_admits_all_channels() {
        let subscribed = HashSet::new();
        assert!(should_deliver(&subscribed, Uuid::new_v4()));
    }

    #[test]
    fn non_empty_subscription_set_filters_to_member_channels() {
        let subscribed_channel = Uuid::new_v4();
        let other_channel = Uuid::new_v4();
        let mut subscribed = HashSet::new();
        subscribed.insert(subscribed_channel);

        assert!(should_deliver(&subscribed, subscribed_channel));
        assert!(!should_deliver(&subscribed, other_channel));
    }
}
