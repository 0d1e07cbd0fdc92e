//! Application state, the membership/message-store seams, and router
//! assembly for the hub's HTTP surface.

use async_trait::async_trait;
use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use mc_common::{ids::TenantId, Result, SystemConfig};
use mc_core::{
    channel::{Channel, ChannelKind},
    fabric::PubSubFabric,
    log::EventLog,
    message::{ChannelId, Message},
    registry::ConnectionRegistry,
    ring_buffer::RingBuffer,
    Broadcaster,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Out-of-scope CRUD (projects/tasks/organizations/users) is modeled as an
/// external collaborator behind this trait: the hub only needs to know
/// whether an actor may see a channel, not how membership is computed.
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    async fn resolve_tenant(&self, tenant_slug: &str) -> Result<TenantId>;
    async fn project_ids_for_actor(&self, tenant_id: TenantId, actor_id: Uuid) -> Result<Vec<Uuid>>;

    /// Resolve the channel a route was given only a bare id for, including
    /// which tenant it belongs to — the real projects/tasks schema would
    /// look this up from a channel row instead of minting one on first use.
    async fn channel(&self, channel_id: Uuid) -> Result<Channel>;

    /// Resolve the acting identity behind a connection's bearer token. A
    /// stand-in for real session-token verification (out of scope here);
    /// deterministic per token so the same caller gets the same actor id
    /// across requests/connections.
    async fn resolve_actor(&self, token: &str) -> Result<Uuid>;
}

/// Persistence seam for chat messages, kept separate from the event log
/// since message history has its own read patterns (by channel, paginated)
/// that don't belong on `EventLog`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: Message) -> Result<Message>;
    async fn recent(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<Message>>;
}

/// An in-memory `MembershipProvider` that treats any dashed UUID-looking
/// slug as resolvable and grants every actor access to every project. A
/// stand-in for the real identity/CRUD service, documented as a seam.
pub struct OpenMembershipProvider {
    tenants: DashMap<String, TenantId>,
    channels: DashMap<Uuid, Channel>,
}

impl OpenMembershipProvider {
    pub fn new() -> Self {
        Self {
            tenants: DashMap::new(),
            channels: DashMap::new(),
        }
    }
}

impl Default for OpenMembershipProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MembershipProvider for OpenMembershipProvider {
    async fn resolve_tenant(&self, tenant_slug: &str) -> Result<TenantId> {
        if let Some(existing) = self.tenants.get(tenant_slug) {
            return Ok(*existing);
        }
        let tenant_id = TenantId::new();
        self.tenants.insert(tenant_slug.to_string(), tenant_id);
        Ok(tenant_id)
    }

    async fn project_ids_for_actor(&self, _tenant_id: TenantId, _actor_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(Vec::new())
    }

    async fn channel(&self, channel_id: Uuid) -> Result<Channel> {
        let entry = self.channels.entry(channel_id).or_insert_with(|| Channel {
            id: ChannelId(channel_id),
            tenant_id: TenantId::new(),
            name: String::new(),
            kind: ChannelKind::TenantWide,
        });
        Ok(entry.clone())
    }

    async fn resolve_actor(&self, token: &str) -> Result<Uuid> {
        Ok(Uuid::new_v5(&Uuid::NAMESPACE_URL, token.as_bytes()))
    }
}

/// An in-memory `MessageStore`, sufficient for tests and for deployments
/// that don't need durable chat history beyond the event log.
pub struct InMemoryMessageStore {
    by_channel: DashMap<ChannelId, Vec<Message>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            by_channel: DashMap::new(),
        }
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, message: Message) -> Result<Message> {
        self.by_channel
            .entry(message.channel_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn recent(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<Message>> {
        let Some(messages) = self.by_channel.get(&channel_id) else {
            return Ok(Vec::new());
        };
        let len = messages.len();
        let start = len.saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Arc<Broadcaster>,
    pub event_log: Arc<dyn EventLog>,
    pub ring_buffer: Arc<dyn RingBuffer>,
    pub fabric: Arc<dyn PubSubFabric>,
    pub registry: Arc<dyn ConnectionRegistry>,
    pub message_store: Arc<dyn MessageStore>,
    pub membership: Arc<dyn MembershipProvider>,
    pub config: Arc<SystemConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(crate::routes::health::health))
        .route(
            "/api/v1/orgs/:tenant_slug/events/stream",
            get(crate::routes::stream::stream_events),
        )
        .route(
            "/api/v1/channels/:channel_id/messages",
            post(crate::routes::channels::post_message).get(crate::routes::channels::list_messages),
        )
        .route("/ws", get(crate::routes::ws::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(crate::middleware::logging::logging_middleware))
        .with_state(state)
}
