//! Per-agent topic subscription tracking, adjustable at runtime via
//! `mc-bridge` local commands.

use std::collections::BTreeSet;
use tracing::info;

/// An empty topic set means accept-all (the default, auto-subscribe mode).
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    topics: BTreeSet<String>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, topic: &str) {
        self.topics.insert(topic.to_string());
        info!(topic, "subscription added");
    }

    pub fn unsubscribe(&mut self, topic: &str) {
        self.topics.remove(topic);
        info!(topic, "subscription removed");
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        if self.topics.is_empty() {
            return true;
        }
        self.topics.contains(topic)
    }

    pub fn list_topics(&self) -> Vec<String> {
        self.topics.iter().cloned().collect()
    }

    pub fn set_topics(&mut self, topics: Vec<String>) {
        self.topics = topics.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_topic_set_accepts_everything() {
        let manager = SubscriptionManager::new();
        assert!(manager.is_subscribed("project.p1"));
        assert!(manager.is_subscribed("anything"));
    }

    #[test]
    fn non_empty_set_filters_to_members() {
        let mut manager = SubscriptionManager::new();
        manager.subscribe("project.p1");
        assert!(manager.is_subscribed("project.p1"));
        assert!(!manager.is_subscribed("project.p2"));

        manager.unsubscribe("project.p1");
        assert!(manager.is_subscribed("project.p2"));
    }

    #[test]
    fn set_topics_replaces_existing_subscriptions() {
        let mut manager = SubscriptionManager::new();
        manager.subscribe("a");
        manager.set_topics(vec!["b".to_string(), "c".to_string()]);
        assert_eq!(manager.list_topics(), vec!["b".to_string(), "c".to_string()]);
        assert!(!manager.is_subscribed("a"));
    }
}
