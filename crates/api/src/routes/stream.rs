//! The resumable SSE event stream (component E): replay from the ring
//! buffer (falling back to the durable log), then a live fabric
//! subscription, deduplicated against the replay tail.

use crate::server::AppState;
use crate::types::ErrorResponse;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        Json,
    },
};
use futures_util::StreamExt;
use mc_core::registry::Transport;
use mc_core::replay::should_deliver_live;
use mc_core::{Event, SubscriptionFilter};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub filter: Option<String>,
    /// Credential identifier used for revocation polling. Optional: a
    /// caller that never supplies one simply never has its stream closed
    /// by a revocation (there's nothing to key the revocation marker on).
    #[serde(default)]
    pub token: Option<String>,
}

/// Decrements the registry slot this stream held when the connection ends,
/// regardless of how the stream task exits.
struct RegistryGuard {
    registry: Arc<dyn mc_core::registry::ConnectionRegistry>,
    tenant_id: mc_common::ids::TenantId,
    connection_id: Uuid,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        let registry = self.registry.clone();
        let tenant_id = self.tenant_id;
        let connection_id = self.connection_id;
        tokio::spawn(async move {
            if let Err(e) = registry.deregister(tenant_id, Transport::Sse, connection_id).await {
                warn!(error = %e, "failed to deregister SSE connection");
            }
        });
    }
}

#[instrument(skip(state, headers), fields(tenant_slug = %tenant_slug))]
pub async fn stream_events(
    State(state): State<AppState>,
    Path(tenant_slug): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl futures_util::Stream<Item = Result<SseEvent, Infallible>>>, (StatusCode, Json<ErrorResponse>)> {
    let tenant_id = state
        .membership
        .resolve_tenant(&tenant_slug)
        .await
        .map_err(|e| (StatusCode::NOT_FOUND, Json(ErrorResponse::new(e.to_string(), "TENANT_NOT_FOUND"))))?;

    let connection_id = Uuid::new_v4();
    let cap = state.config.limits.sse_connection_cap as usize;
    state
        .registry
        .register(tenant_id, Transport::Sse, connection_id, cap)
        .await
        .map_err(|e| {
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorResponse::new(e.to_string(), "CONNECTION_CAP_EXCEEDED")),
            )
        })?;

    let filter: SubscriptionFilter = query
        .filter
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(SubscriptionFilter::everything);

    let last_event_id: i64 = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    info!(connection_id = %connection_id, last_event_id, "SSE stream opened");

    let guard = RegistryGuard {
        registry: state.registry.clone(),
        tenant_id,
        connection_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;

        let min_seq = match state.event_log.min_sequence_id(tenant_id).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to read min_sequence_id, skipping replay");
                None
            }
        };

        let mut max_emitted = last_event_id;

        if let Some(min_seq) = min_seq {
            if last_event_id > 0 && last_event_id < min_seq {
                let reset = Event::reset(tenant_id, min_seq);
                max_emitted = reset.sequence_id;
                yield Ok(to_sse_event(&reset));
            }
        }

        // The ring buffer's snapshot is already filtered to `> max_emitted`,
        // so an empty result is ambiguous: it could mean the window covers
        // the cursor and there's nothing new, or that the window's oldest
        // retained entry has already evicted past the cursor (a gap). Only
        // the first case is safe to treat as "replay served"; the second
        // must fall through to the durable log.
        let ring_oldest = state.ring_buffer.oldest_sequence_id(tenant_id).await.unwrap_or(None);
        let ring_covers_cursor = matches!(ring_oldest, Some(oldest) if oldest <= max_emitted + 1);

        let replay = if ring_covers_cursor {
            state
                .ring_buffer
                .snapshot(tenant_id, max_emitted)
                .await
                .unwrap_or_default()
        } else {
            state
                .event_log
                .range(tenant_id, max_emitted, state.config.limits.max_replay_events as usize)
                .await
                .unwrap_or_default()
        };

        for event in replay.into_iter().filter(|e| filter.matches(e)) {
            max_emitted = max_emitted.max(event.sequence_id);
            yield Ok(to_sse_event(&event));
        }

        let mut live = match state.fabric.subscribe(tenant_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "fabric subscribe failed, stream will only heartbeat");
                Box::pin(futures_util::stream::empty::<Event>())
            }
        };

        let mut heartbeat = tokio::time::interval(Duration::from_secs(
            state.config.limits.heartbeat_interval_secs,
        ));
        let mut iterations: u64 = 0;

        loop {
            tokio::select! {
                maybe_event = live.next() => {
                    let Some(event) = maybe_event else { break };
                    if !filter.matches(&event) {
                        continue;
                    }
                    if !should_deliver_live(max_emitted, &event) {
                        continue;
                    }
                    max_emitted = event.sequence_id;
                    yield Ok(to_sse_event(&event));
                }
                _ = heartbeat.tick() => {
                    iterations += 1;
                    if iterations % 10 == 0 {
                        if let Err(e) = state.registry.heartbeat(tenant_id, Transport::Sse, connection_id).await {
                            warn!(error = %e, "registry heartbeat refresh failed");
                        }
                        if let Some(credential_id) = query.token.as_deref() {
                            match state.registry.is_revoked(credential_id).await {
                                Ok(true) => {
                                    let revoked = Event::session_revoked(tenant_id, max_emitted);
                                    yield Ok(to_sse_event(&revoked));
                                    break;
                                }
                                Ok(false) => {}
                                Err(e) => warn!(error = %e, "revocation check failed"),
                            }
                        }
                    }
                    yield Ok(SseEvent::default().comment("hb"));
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.config.limits.heartbeat_interval_secs))
            .text(""),
    ))
}

fn to_sse_event(event: &Event) -> SseEvent {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    SseEvent::default()
        .event(event.event_type.clone())
        .id(event.sequence_id.to_string())
        .data(data)
}
