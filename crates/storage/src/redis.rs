//! Redis-backed fabric, ring buffer, and connection registry: the
//! best-effort layers that sit in front of the durable Postgres log.

use async_trait::async_trait;
use futures_util::StreamExt;
use mc_common::{ids::TenantId, CoreError, Result};
use mc_core::event::Event;
use mc_core::fabric::{EventStream, PubSubFabric};
use mc_core::registry::{ConnectionRegistry, Transport};
use mc_core::ring_buffer::RingBuffer;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

fn fabric_channel(tenant_id: TenantId) -> String {
    format!("mc:fabric:{tenant_id}")
}

fn ring_key(tenant_id: TenantId) -> String {
    format!("mc:ring:{tenant_id}")
}

fn registry_count_key(tenant_id: TenantId, transport: Transport) -> String {
    format!("mc:registry:{tenant_id}:{transport}:count")
}

fn registry_member_key(tenant_id: TenantId, transport: Transport, connection_id: Uuid) -> String {
    format!("mc:registry:{tenant_id}:{transport}:member:{connection_id}")
}

fn revocation_key(credential_id: &str) -> String {
    format!("mc:revoked:{credential_id}")
}

const REGISTRY_TTL_SECS: u64 = 90;

/// Atomically checks membership and the connection cap, then registers.
/// Returns `1` on a fresh registration, `0` if `KEYS[1]` was already a
/// member (idempotent re-registration), `-1` if the cap is met.
const REGISTER_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
local current = tonumber(redis.call('GET', KEYS[2]) or '0')
if current >= tonumber(ARGV[2]) then
    return -1
end
redis.call('SETEX', KEYS[1], ARGV[1], '1')
redis.call('INCR', KEYS[2])
return 1
"#;

/// Publishes durable events onto a Redis pub/sub channel scoped to a
/// tenant. Subscribers that reconnect miss anything published while they
/// were away; that's why this sits behind an already-successful
/// `EventLog::append`, never in front of it.
pub struct RedisFabric {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisFabric {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| CoreError::Fabric(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CoreError::Fabric(e.to_string()))?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl PubSubFabric for RedisFabric {
    async fn publish(&self, event: &Event) -> Result<()> {
        let payload = serde_json::to_string(event).map_err(CoreError::Serialization)?;
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(fabric_channel(event.tenant_id), payload)
            .await
            .map_err(|e| CoreError::Fabric(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, tenant_id: TenantId) -> Result<EventStream> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| CoreError::Fabric(e.to_string()))?;
        pubsub
            .subscribe(fabric_channel(tenant_id))
            .await
            .map_err(|e| CoreError::Fabric(e.to_string()))?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str::<Event>(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

/// A bounded per-tenant recent-events window kept in a Redis list, used to
/// serve short replays without a round trip to Postgres.
pub struct RedisRingBuffer {
    conn: ConnectionManager,
    capacity: usize,
}

impl RedisRingBuffer {
    pub async fn new(redis_url: &str, capacity: usize) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| CoreError::Storage(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(Self { conn, capacity })
    }
}

#[async_trait]
impl RingBuffer for RedisRingBuffer {
    async fn push(&self, event: &Event) -> Result<()> {
        let payload = serde_json::to_string(event).map_err(CoreError::Serialization)?;
        let key = ring_key(event.tenant_id);
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .rpush(&key, payload)
            .ignore()
            .ltrim(&key, -(self.capacity as isize), -1)
            .ignore();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn snapshot(&self, tenant_id: TenantId, after: i64) -> Result<Vec<Event>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(ring_key(tenant_id), 0, -1)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        let mut events: Vec<Event> = raw
            .into_iter()
            .filter_map(|s| serde_json::from_str::<Event>(&s).ok())
            .filter(|e| e.sequence_id > after)
            .collect();
        events.sort_by_key(|e| e.sequence_id);
        Ok(events)
    }

    async fn oldest_sequence_id(&self, tenant_id: TenantId) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .lindex(ring_key(tenant_id), 0)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(raw.and_then(|s| serde_json::from_str::<Event>(&s).ok()).map(|e| e.sequence_id))
    }
}

/// Per-tenant, per-transport connection counting with a TTL-backed crash
/// safety net: every membership key expires unless refreshed by
/// `heartbeat`, so a process that dies without deregistering doesn't leak
/// its slot forever.
pub struct RedisConnectionRegistry {
    conn: ConnectionManager,
}

impl RedisConnectionRegistry {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| CoreError::Storage(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ConnectionRegistry for RedisConnectionRegistry {
    async fn register(
        &self,
        tenant_id: TenantId,
        transport: Transport,
        connection_id: Uuid,
        cap: usize,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let member_key = registry_member_key(tenant_id, transport, connection_id);
        let count_key = registry_count_key(tenant_id, transport);

        // The membership check, cap check, and increment must happen as
        // one atomic step: two concurrent registrations both reading
        // current < cap before either writes would otherwise push the
        // live count past the configured cap.
        let outcome: i64 = redis::Script::new(REGISTER_SCRIPT)
            .key(&member_key)
            .key(&count_key)
            .arg(REGISTRY_TTL_SECS)
            .arg(cap)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        if outcome < 0 {
            return Err(CoreError::CapacityExceeded {
                tenant: tenant_id.to_string(),
                transport: transport.to_string(),
            });
        }
        Ok(())
    }

    async fn heartbeat(&self, tenant_id: TenantId, transport: Transport, connection_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(registry_member_key(tenant_id, transport, connection_id), REGISTRY_TTL_SECS as i64)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn deregister(&self, tenant_id: TenantId, transport: Transport, connection_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let member_key = registry_member_key(tenant_id, transport, connection_id);

        let removed: i32 = conn.del(&member_key).await.map_err(|e| CoreError::Storage(e.to_string()))?;
        if removed > 0 {
            let _: i64 = conn
                .decr(registry_count_key(tenant_id, transport), 1)
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    async fn count(&self, tenant_id: TenantId, transport: Transport) -> Result<usize> {
        let mut conn = self.conn.clone();
        let count: usize = conn
            .get(registry_count_key(tenant_id, transport))
            .await
            .unwrap_or(0);
        Ok(count)
    }

    async fn members(&self, tenant_id: TenantId, transport: Transport) -> Result<Vec<Uuid>> {
        let mut conn = self.conn.clone();
        let pattern = format!("mc:registry:{tenant_id}:{transport}:member:*");
        let keys: Vec<String> = conn.keys(&pattern).await.map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.rsplit(':').next().and_then(|id| Uuid::parse_str(id).ok()))
            .collect())
    }

    async fn revoke(&self, credential_id: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(revocation_key(credential_id), "1", ttl_secs)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn is_revoked(&self, credential_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(revocation_key(credential_id))
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(exists)
    }
}
