//! The durable, immutable event record (component A's unit of storage).

use chrono::{DateTime, Utc};
use mc_common::ids::{ActorKind, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for an event row, independent of its `sequence_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Who produced an event, when `actor_kind` alone isn't enough to identify them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub kind: ActorKind,
}

/// An immutable append-only record in the durable event log.
///
/// Never updated or deleted after append; `sequence_id` is assigned at
/// append time and is strictly increasing within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub sequence_id: i64,
    pub tenant_id: TenantId,
    pub event_type: String,
    pub actor_id: Option<Uuid>,
    pub actor_kind: ActorKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// The well-known `project_id` payload key, used by the project topic filter.
    pub fn project_id(&self) -> Option<&str> {
        self.payload.get("project_id").and_then(|v| v.as_str())
    }

    /// The well-known `task_id` payload key, used by the task topic filter.
    pub fn task_id(&self) -> Option<&str> {
        self.payload.get("task_id").and_then(|v| v.as_str())
    }

    /// The well-known `channel_id` payload key, used by the channel topic filter.
    pub fn channel_id(&self) -> Option<&str> {
        self.payload.get("channel_id").and_then(|v| v.as_str())
    }

    /// The well-known `sender_id` payload key (present on `message.created`
    /// and `command.invoked`), used by the bridge's self-loop prevention.
    pub fn sender_id(&self) -> Option<&str> {
        self.payload.get("sender_id").and_then(|v| v.as_str())
    }

    /// Build the synthetic `events.reset` event emitted when a client's
    /// cursor has aged out of retention. Not persisted; constructed
    /// on-the-fly by the SSE engine.
    pub fn reset(tenant_id: TenantId, sequence_id: i64) -> Self {
        Self {
            id: EventId::new(),
            sequence_id,
            tenant_id,
            event_type: "events.reset".to_string(),
            actor_id: None,
            actor_kind: ActorKind::System,
            payload: serde_json::json!({ "reason": "cursor_expired" }),
            timestamp: Utc::now(),
        }
    }

    /// Build the synthetic `session.revoked` event that ends a stream whose
    /// credential has been revoked.
    pub fn session_revoked(tenant_id: TenantId, sequence_id: i64) -> Self {
        Self {
            id: EventId::new(),
            sequence_id,
            tenant_id,
            event_type: "session.revoked".to_string(),
            actor_id: None,
            actor_kind: ActorKind::System,
            payload: serde_json::json!({}),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_accessors_read_well_known_keys() {
        let event = Event {
            id: EventId::new(),
            sequence_id: 1,
            tenant_id: TenantId::new(),
            event_type: "task.transitioned".to_string(),
            actor_id: None,
            actor_kind: ActorKind::System,
            payload: serde_json::json!({"project_id": "p1", "task_id": "t1"}),
            timestamp: Utc::now(),
        };
        assert_eq!(event.project_id(), Some("p1"));
        assert_eq!(event.task_id(), Some("t1"));
        assert_eq!(event.channel_id(), None);
    }

    #[test]
    fn reset_event_carries_cursor_expired_reason() {
        let tenant = TenantId::new();
        let event = Event::reset(tenant, 42);
        assert_eq!(event.event_type, "events.reset");
        assert_eq!(event.payload["reason"], "cursor_expired");
        assert_eq!(event.sequence_id, 42);
    }
}
