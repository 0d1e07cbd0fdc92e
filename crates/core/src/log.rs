//! The durable event log: the source of truth every other component is a
//! cache or projection of.

use crate::event::Event;
use async_trait::async_trait;
use mc_common::{ids::TenantId, Result};

/// Append-only, per-tenant sequenced event storage.
///
/// Implementations must assign `sequence_id` atomically and strictly
/// increasing within a tenant; `append` is the one operation every other
/// component's durability guarantee is built on.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Persist `event`, assigning it the next sequence id for its tenant.
    /// Returns the event with `sequence_id` filled in.
    async fn append(&self, event: Event) -> Result<Event>;

    /// Events for `tenant_id` with `sequence_id > after`, oldest first,
    /// capped at `limit`.
    async fn range(&self, tenant_id: TenantId, after: i64, limit: usize) -> Result<Vec<Event>>;

    /// The oldest `sequence_id` still retained for `tenant_id`, or `None`
    /// if the tenant has no events yet. A replay cursor older than this
    /// has aged out and must be answered with `Event::reset`.
    async fn min_sequence_id(&self, tenant_id: TenantId) -> Result<Option<i64>>;

    /// The most recently assigned `sequence_id` for `tenant_id`, or `None`
    /// if empty.
    async fn max_sequence_id(&self, tenant_id: TenantId) -> Result<Option<i64>>;
}
