//! Subscription filters and the pure matching rule that governs delivery.
//!
//! A subscriber with a non-empty filter set only receives events that match
//! at least one entry; an empty filter set means "everything for this
//! tenant".

use crate::event::Event;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopicKind {
    Project { project_id: String },
    Task { task_id: String },
    Channel { channel_id: String },
    EventTypePrefix { prefix: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub topics: Vec<TopicKind>,
}

impl SubscriptionFilter {
    pub fn everything() -> Self {
        Self { topics: Vec::new() }
    }

    pub fn matches(&self, event: &Event) -> bool {
        matches(event, self)
    }
}

/// Whether `event` passes `filter`. An empty filter always passes; a
/// non-empty one passes if the event matches any single entry.
pub fn matches(event: &Event, filter: &SubscriptionFilter) -> bool {
    if filter.topics.is_empty() {
        return true;
    }

    filter.topics.iter().any(|topic| match topic {
        TopicKind::Project { project_id } => event.project_id() == Some(project_id.as_str()),
        TopicKind::Task { task_id } => event.task_id() == Some(task_id.as_str()),
        TopicKind::Channel { channel_id } => event.channel_id() == Some(channel_id.as_str()),
        TopicKind::EventTypePrefix { prefix } => event.event_type.starts_with(prefix.as_str()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_common::ids::{ActorKind, TenantId};
    use crate::event::EventId;
    use chrono::Utc;

    fn event_with(payload: serde_json::Value, event_type: &str) -> Event {
        Event {
            id: EventId::new(),
            sequence_id: 1,
            tenant_id: TenantId::new(),
            event_type: event_type.to_string(),
            actor_id: None,
            actor_kind: ActorKind::System,
            payload,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = SubscriptionFilter::everything();
        let event = event_with(serde_json::json!({}), "task.created");
        assert!(matches(&event, &filter));
    }

    #[test]
    fn project_topic_matches_only_same_project() {
        let filter = SubscriptionFilter {
            topics: vec![TopicKind::Project {
                project_id: "p1".to_string(),
            }],
        };
        let matching = event_with(serde_json::json!({"project_id": "p1"}), "task.created");
        let other = event_with(serde_json::json!({"project_id": "p2"}), "task.created");
        assert!(matches(&matching, &filter));
        assert!(!matches(&other, &filter));
    }

    #[test]
    fn event_type_prefix_matches_prefix_only() {
        let filter = SubscriptionFilter {
            topics: vec![TopicKind::EventTypePrefix {
                prefix: "task.".to_string(),
            }],
        };
        let matching = event_with(serde_json::json!({}), "task.transitioned");
        let other = event_with(serde_json::json!({}), "message.created");
        assert!(matches(&matching, &filter));
        assert!(!matches(&other, &filter));
    }

    #[test]
    fn any_single_entry_match_is_sufficient() {
        let filter = SubscriptionFilter {
            topics: vec![
                TopicKind::Channel {
                    channel_id: "c1".to_string(),
                },
                TopicKind::Task {
                    task_id: "t1".to_string(),
                },
            ],
        };
        let task_event = event_with(serde_json::json!({"task_id": "t1"}), "task.created");
        assert!(matches(&task_event, &filter));
    }

    #[test]
    fn non_matching_entries_all_fail_closed() {
        let filter = SubscriptionFilter {
            topics: vec![TopicKind::Project {
                project_id: "p1".to_string(),
            }],
        };
        let event = event_with(serde_json::json!({}), "task.created");
        assert!(!matches(&event, &filter));
    }
}
