//! The pub/sub fabric: best-effort live fan-out of already-durable events.

use crate::event::Event;
use async_trait::async_trait;
use mc_common::{ids::TenantId, Result};
use futures_util::stream::BoxStream;

/// A subscription to a tenant's live event fan-out.
pub type EventStream = BoxStream<'static, Event>;

/// Best-effort publish/subscribe. Unlike `EventLog`, delivery is not
/// guaranteed: a subscriber that's briefly disconnected misses anything
/// published while it was away and must fall back to `EventLog::range`.
#[async_trait]
pub trait PubSubFabric: Send + Sync {
    /// Publish `event` to any live subscribers of its tenant. Never fails
    /// the caller's append path; failures are logged and swallowed by
    /// whoever calls this after a successful `EventLog::append`.
    async fn publish(&self, event: &Event) -> Result<()>;

    /// Subscribe to live events for `tenant_id`.
    async fn subscribe(&self, tenant_id: TenantId) -> Result<EventStream>;
}
