//! Minimal REST stand-in for posting a chat message, sufficient to drive
//! the broadcaster end to end without the full projects/tasks/channels
//! CRUD schema, which is out of scope here.

use crate::server::AppState;
use crate::types::{ErrorResponse, ListMessagesQuery, ListMessagesResponse, PostMessageRequest, PostMessageResponse};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use mc_common::ids::{ActorKind, TenantId};
use mc_core::message::{extract_mentions, parse_command, ChannelId, Message, MessageId};
use mc_core::Event;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[instrument(skip(state, req), fields(channel_id = %channel_id))]
pub async fn post_message(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> Result<Json<PostMessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let channel = state.membership.channel(channel_id).await.map_err(|e| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(e.to_string(), "CHANNEL_NOT_FOUND")),
        )
    })?;
    let tenant_id = channel.tenant_id;
    let channel_id = ChannelId(channel_id);
    let mentions = extract_mentions(&req.content, &req.mentions);

    let payload = serde_json::json!({
        "channel_id": channel_id.to_string(),
        "sender_id": req.sender_id,
        "content": req.content,
        "mentions": mentions,
    });

    let event = mc_core::event::Event {
        id: mc_core::event::EventId::new(),
        sequence_id: 0,
        tenant_id,
        event_type: "message.created".to_string(),
        actor_id: Some(req.sender_id),
        actor_kind: ActorKind::Human,
        payload,
        timestamp: chrono::Utc::now(),
    };

    let persisted: Event = match state.broadcaster.broadcast(event).await {
        Ok(e) => e,
        Err(e) => {
            error!(error = %e, "failed to broadcast message.created");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string(), "BROADCAST_FAILED")),
            ));
        }
    };

    let message = Message {
        id: MessageId::new(),
        tenant_id,
        channel_id,
        sender_id: req.sender_id,
        content: req.content.clone(),
        mentions: mentions.clone(),
        created_at: persisted.timestamp,
    };
    let message_id = message.id.0;
    if let Err(e) = state.message_store.insert(message).await {
        error!(error = %e, "failed to persist message in message store");
    }

    if let Some((command, args)) = parse_command(&req.content) {
        broadcast_command_invoked(&state, tenant_id, channel_id, req.sender_id, &command, &args).await;
    }

    if !mentions.is_empty() {
        broadcast_mention_created(&state, tenant_id, channel_id, req.sender_id, message_id, &mentions).await;
    }

    info!(sequence_id = persisted.sequence_id, "message posted");

    Ok(Json(PostMessageResponse {
        message_id,
        sequence_id: persisted.sequence_id,
    }))
}

#[instrument(skip(state), fields(channel_id = %channel_id))]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<ListMessagesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let limit = query.limit.unwrap_or(50);
    let messages = state
        .message_store
        .recent(ChannelId(channel_id), limit)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string(), "MESSAGE_HISTORY_FAILED")),
            )
        })?;
    Ok(Json(ListMessagesResponse { messages }))
}

async fn broadcast_command_invoked(
    state: &AppState,
    tenant_id: TenantId,
    channel_id: ChannelId,
    sender_id: Uuid,
    command: &str,
    args: &str,
) {
    let event = Event {
        id: mc_core::event::EventId::new(),
        sequence_id: 0,
        tenant_id,
        event_type: "command.invoked".to_string(),
        actor_id: Some(sender_id),
        actor_kind: ActorKind::Human,
        payload: serde_json::json!({
            "channel_id": channel_id.to_string(),
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

async fn broadcast_mention_created(
    state: &AppState,
    tenant_id: TenantId,
    channel_id: ChannelId,
    sender_id: Uuid,
    message_id: Uuid,
    mentions: &[Uuid],
) {
    let event = Event {
        id: mc_core::event::EventId::new(),
        sequence_id: 0,
        tenant_id,
        event_type: "mention.created".to_string(),
        actor_id: Some(sender_id),
        actor_kind: ActorKind::Human,
        payload: serde_json::json!({
            "channel_id": channel_id.to_string(),
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
