//! The ring buffer cache: a bounded, recent-events window used to serve
//! short replays without touching the durable log.

use crate::event::Event;
use async_trait::async_trait;
use mc_common::{ids::TenantId, Result};

/// A bounded per-tenant cache of the most recent events, newest retained
/// up to some fixed capacity. Best-effort: a cache miss or eviction just
/// means the caller falls back to `EventLog::range`.
#[async_trait]
pub trait RingBuffer: Send + Sync {
    /// Push `event` onto the tenant's window, evicting the oldest entry if
    /// the window is at capacity.
    async fn push(&self, event: &Event) -> Result<()>;

    /// Events for `tenant_id` with `sequence_id > after`, oldest first.
    /// Always scoped to whatever the window currently retains; callers
    /// that need to know whether that's the *complete* tail since `after`
    /// (as opposed to a window that's already evicted past it) must
    /// consult `oldest_sequence_id` too.
    async fn snapshot(&self, tenant_id: TenantId, after: i64) -> Result<Vec<Event>>;

    /// The `sequence_id` of the oldest entry the window currently
    /// retains for `tenant_id`, or `None` if nothing is retained (the
    /// tenant has never been pushed to, or everything has been evicted).
    /// Lets a caller distinguish "the window covers `after` and there's
    /// nothing new" from "the window's retained tail no longer reaches
    /// back to `after`" (a true coverage gap requiring a log fallback).
    async fn oldest_sequence_id(&self, tenant_id: TenantId) -> Result<Option<i64>>;
}

/// An in-memory `RingBuffer` used by tests and by any deployment that
/// doesn't need cross-process sharing.
pub mod in_memory {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    pub struct InMemoryRingBuffer {
        capacity: usize,
        windows: Mutex<HashMap<TenantId, VecDeque<Event>>>,
    }

    impl InMemoryRingBuffer {
        pub fn new(capacity: usize) -> Self {
            Self {
                capacity,
                windows: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl RingBuffer for InMemoryRingBuffer {
        async fn push(&self, event: &Event) -> Result<()> {
            let mut windows = self.windows.lock().expect("ring buffer lock poisoned");
            let window = windows.entry(event.tenant_id).or_default();
            window.push_back(event.clone());
            while window.len() > self.capacity {
                window.pop_front();
            }
            Ok(())
        }

        async fn snapshot(&self, tenant_id: TenantId, after: i64) -> Result<Vec<Event>> {
            let windows = self.windows.lock().expect("ring buffer lock poisoned");
            let Some(window) = windows.get(&tenant_id) else {
                return Ok(Vec::new());
            };
            Ok(window
                .iter()
                .filter(|e| e.sequence_id > after)
                .cloned()
                .collect())
        }

        async fn oldest_sequence_id(&self, tenant_id: TenantId) -> Result<Option<i64>> {
            let windows = self.windows.lock().expect("ring buffer lock poisoned");
            Ok(windows.get(&tenant_id).and_then(|w| w.front()).map(|e| e.sequence_id))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::event::EventId;
        use mc_common::ids::ActorKind;
        use chrono::Utc;

        fn event(tenant_id: TenantId, sequence_id: i64) -> Event {
            Event {
                id: EventId::new(),
                sequence_id,
                tenant_id,
                event_type: "task.created".to_string(),
                actor_id: None,
                actor_kind: ActorKind::System,
                payload: serde_json::json!({}),
                timestamp: Utc::now(),
            }
        }

        #[tokio::test]
        async fn evicts_oldest_past_capacity() {
            let buf = InMemoryRingBuffer::new(2);
            let tenant = TenantId::new();
            for seq in 1..=3 {
                buf.push(&event(tenant, seq)).await.unwrap();
            }
            let snapshot = buf.snapshot(tenant, 0).await.unwrap();
            let seqs: Vec<i64> = snapshot.iter().map(|e| e.sequence_id).collect();
            assert_eq!(seqs, vec![2, 3]);
        }

        #[tokio::test]
        async fn snapshot_filters_by_after() {
            let buf = InMemoryRingBuffer::new(10);
            let tenant = TenantId::new();
            for seq in 1..=5 {
                buf.push(&event(tenant, seq)).await.unwrap();
            }
            let snapshot = buf.snapshot(tenant, 3).await.unwrap();
            let seqs: Vec<i64> = snapshot.iter().map(|e| e.sequence_id).collect();
            assert_eq!(seqs, vec![4, 5]);
        }

        #[tokio::test]
        async fn unknown_tenant_is_empty_not_error() {
            let buf = InMemoryRingBuffer::new(10);
            let snapshot = buf.snapshot(TenantId::new(), 0).await.unwrap();
            assert!(snapshot.is_empty());
        }

        #[tokio::test]
        async fn oldest_sequence_id_tracks_eviction() {
            let buf = InMemoryRingBuffer::new(2);
            let tenant = TenantId::new();
            assert_eq!(buf.oldest_sequence_id(tenant).await.unwrap(), None);

            for seq in 1..=3 {
                buf.push(&event(tenant, seq)).await.unwrap();
            }
            // capacity 2, so 1 was evicted and 2 is now the oldest retained.
            assert_eq!(buf.oldest_sequence_id(tenant).await.unwrap(), Some(2));
        }
    }
}
