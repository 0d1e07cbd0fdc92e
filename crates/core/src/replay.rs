//! Replay-then-live merge for the SSE stream engine.
//!
//! A subscriber opens a stream with a `last_event_id` cursor. The engine
//! first replays persisted events after that cursor, then switches to the
//! live fabric subscription. Events published to the fabric while the
//! replay was still in flight can overlap the tail of the replay; this
//! module is the pure merge logic that guarantees no event is delivered
//! twice across that boundary.

use crate::event::Event;

/// Given the events already replayed (in delivery order) and the next
/// live event received from the fabric, decide whether the live event
/// should be delivered or dropped as a duplicate.
///
/// An event is a duplicate if the highest `sequence_id` replayed so far
/// is already `>= ` the live event's `sequence_id`.
pub fn should_deliver_live(max_emitted_sequence_id: i64, live_event: &Event) -> bool {
    live_event.sequence_id > max_emitted_sequence_id
}

/// Merge a replay batch and a buffered-live batch into one delivery
/// sequence with no duplicate `sequence_id`s, ordered by `sequence_id`.
/// `live` events that overlap the replay's tail are dropped; both inputs
/// are assumed individually sorted by `sequence_id`.
pub fn merge_replay_and_live(replay: Vec<Event>, live: Vec<Event>) -> Vec<Event> {
    let max_replayed = replay.last().map(|e| e.sequence_id).unwrap_or(i64::MIN);
    let mut merged = replay;
    merged.extend(live.into_iter().filter(|e| e.sequence_id > max_replayed));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventId;
    use mc_common::ids::{ActorKind, TenantId};
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

    #[test]
    fn should_deliver_live_rejects_already_emitted_sequence() {
        let tenant = TenantId::new();
        assert!(!should_deliver_live(10, &event(tenant, 9)));
        assert!(!should_deliver_live(10, &event(tenant, 10)));
        assert!(should_deliver_live(10, &event(tenant, 11)));
    }

    #[test]
    fn merge_drops_live_overlap_with_replay_tail() {
        let tenant = TenantId::new();
        let replay = vec![event(tenant, 1), event(tenant, 2), event(tenant, 3)];
        let live = vec![event(tenant, 2), event(tenant, 3), event(tenant, 4)];

        let merged = merge_replay_and_live(replay, live);
        let seqs: Vec<i64> = merged.iter().map(|e| e.sequence_id).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }

    #[test]
    fn merge_with_no_overlap_concatenates() {
        let tenant = TenantId::new();
        let replay = vec![event(tenant, 1)];
        let live = vec![event(tenant, 2), event(tenant, 3)];

        let merged = merge_replay_and_live(replay, live);
        let seqs: Vec<i64> = merged.iter().map(|e| e.sequence_id).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn merge_with_empty_replay_passes_live_through() {
        let tenant = TenantId::new();
        let live = vec![event(tenant, 1), event(tenant, 2)];
        let merged = merge_replay_and_live(Vec::new(), live);
        let seqs: Vec<i64> = merged.iter().map(|e| e.sequence_id).collect();
        assert_eq!(seqs, vec![1, 2]);
    }
}
