//! The event broadcaster: the single write path every event takes on its
//! way into the system.
//!
//! Ordering is the invariant that matters here: append to the durable log
//! first, and only once that succeeds, best-effort push to the ring
//! buffer and best-effort publish to the fabric. A cache or fabric
//! failure never loses an event; it just delays when live subscribers
//! see it, since they can still catch up via `EventLog::range`.

use crate::event::Event;
use crate::fabric::PubSubFabric;
use crate::log::EventLog;
use crate::ring_buffer::RingBuffer;
use mc_common::Result;
use std::sync::Arc;
use tracing::warn;

pub struct Broadcaster {
    log: Arc<dyn EventLog>,
    ring_buffer: Arc<dyn RingBuffer>,
    fabric: Arc<dyn PubSubFabric>,
}

impl Broadcaster {
    pub fn new(
        log: Arc<dyn EventLog>,
        ring_buffer: Arc<dyn RingBuffer>,
        fabric: Arc<dyn PubSubFabric>,
    ) -> Self {
        Self {
            log,
            ring_buffer,
            fabric,
        }
    }

    /// Append `event`, then best-effort fan it out. Returns the persisted
    /// event (with `sequence_id` assigned) once the append has committed;
    /// ring buffer and fabric failures are logged, not propagated.
    pub async fn broadcast(&self, event: Event) -> Result<Event> {
        let persisted = self.log.append(event).await?;

        if let Err(err) = self.ring_buffer.push(&persisted).await {
            warn!(error = %err, event_id = ?persisted.id, "ring buffer push failed after durable append");
        }

        if let Err(err) = self.fabric.publish(&persisted).await {
            warn!(error = %err, event_id = ?persisted.id, "fabric publish failed after durable append");
        }

        Ok(persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventId;
    use async_trait::async_trait;
    use mc_common::ids::{ActorKind, TenantId};
    use mc_common::CoreError;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    struct RecordingLog {
        next_seq: AtomicI64,
        appended: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventLog for RecordingLog {
        async fn append(&self, mut event: Event) -> Result<Event> {
            event.sequence_id = self.next_seq.fetch_add(1, Ordering::SeqCst);
            self.appended.lock().unwrap().push(event.clone());
            Ok(event)
        }

        async fn range(&self, _tenant_id: TenantId, _after: i64, _limit: usize) -> Result<Vec<Event>> {
            Ok(Vec::new())
        }

        async fn min_sequence_id(&self, _tenant_id: TenantId) -> Result<Option<i64>> {
            Ok(None)
        }

        async fn max_sequence_id(&self, _tenant_id: TenantId) -> Result<Option<i64>> {
            Ok(None)
        }
    }

    struct FailingRingBuffer;

    #[async_trait]
    impl RingBuffer for FailingRingBuffer {
        async fn push(&self, _event: &Event) -> Result<()> {
            Err(CoreError::Storage("ring buffer down".to_string()))
        }

        async fn snapshot(&self, _tenant_id: TenantId, _after: i64) -> Result<Vec<Event>> {
            Ok(Vec::new())
        }

        async fn oldest_sequence_id(&self, _tenant_id: TenantId) -> Result<Option<i64>> {
            Ok(None)
        }
    }

    struct FailingFabric;

    #[async_trait]
    impl PubSubFabric for FailingFabric {
        async fn publish(&self, _event: &Event) -> Result<()> {
            Err(CoreError::Fabric("fabric down".to_string()))
        }

        async fn subscribe(
            &self,
            _tenant_id: TenantId,
        ) -> Result<crate::fabric::EventStream> {
            unimplemented!("not exercised by this test")
        }
    }

    fn sample_event(tenant_id: TenantId) -> Event {
        Event {
            id: EventId::new(),
            sequence_id: 0,
            tenant_id,
            event_type: "task.created".to_string(),
            actor_id: None,
            actor_kind: ActorKind::System,
            payload: serde_json::json!({}),
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn broadcast_succeeds_despite_cache_and_fabric_failures() {
        let log = Arc::new(RecordingLog {
            next_seq: AtomicI64::new(1),
            appended: Mutex::new(Vec::new()),
        });
        let broadcaster = Broadcaster::new(log.clone(), Arc::new(FailingRingBuffer), Arc::new(FailingFabric));

        let tenant = TenantId::new();
        let result = broadcaster.broadcast(sample_event(tenant)).await;

        assert!(result.is_ok());
        assert_eq!(log.appended.lock().unwrap().len(), 1);
        assert_eq!(result.unwrap().sequence_id, 1);
    }
}
