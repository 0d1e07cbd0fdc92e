//! The connection registry: per-tenant, per-transport connection counting
//! and membership, used to enforce connection caps and to answer "who's
//! connected" for the Comms Bridge.

use async_trait::async_trait;
use mc_common::ids::TenantId;
use mc_common::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Sse,
    WebSocket,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Sse => write!(f, "sse"),
            Transport::WebSocket => write!(f, "websocket"),
        }
    }
}

/// Tracks live connections per tenant, per transport, with a crash-safety
/// net: every registration carries a TTL that must be refreshed by the
/// holder (a heartbeat) or the slot is reclaimed automatically.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Register a new connection, failing with
    /// `CoreError::CapacityExceeded` if `tenant_id`'s `transport` cap is
    /// already at its limit.
    async fn register(
        &self,
        tenant_id: TenantId,
        transport: Transport,
        connection_id: Uuid,
        cap: usize,
    ) -> Result<()>;

    /// Refresh a connection's TTL so it isn't reclaimed by the crash
    /// safety net.
    async fn heartbeat(&self, tenant_id: TenantId, transport: Transport, connection_id: Uuid) -> Result<()>;

    /// Remove a connection on clean disconnect.
    async fn deregister(&self, tenant_id: TenantId, transport: Transport, connection_id: Uuid) -> Result<()>;

    /// Current live connection count for `tenant_id` on `transport`.
    async fn count(&self, tenant_id: TenantId, transport: Transport) -> Result<usize>;

    /// The connection ids currently registered for `tenant_id` on
    /// `transport`, used by the Comms Bridge to decide whether a tenant
    /// has any live viewer before relaying.
    async fn members(&self, tenant_id: TenantId, transport: Transport) -> Result<Vec<Uuid>>;

    /// Mark `credential_id` revoked for `ttl_secs`. Short-lived: the
    /// revocation marker ages out on its own rather than needing explicit
    /// cleanup once every stream holding that credential has noticed.
    async fn revoke(&self, credential_id: &str, ttl_secs: u64) -> Result<()>;

    /// Whether `credential_id` currently carries a live revocation marker.
    /// Polled periodically by the SSE stream and the WebSocket multiplexer
    /// so a revoked credential's connections close themselves.
    async fn is_revoked(&self, credential_id: &str) -> Result<bool>;
}
