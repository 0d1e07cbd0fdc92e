//! Dispatches parsed SSE events to the right handler: channel messages and
//! commands go to the agent runtime and the response is relayed back,
//! project/sub-agent lifecycle events maintain the session mapping table.

use crate::config::AgentConfig;
use crate::relay::MessageRelay;
use crate::sse::SseEvent;
use crate::state::BridgeState;
use crate::subscriptions::SubscriptionManager;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub struct EventRouter {
    agent: AgentConfig,
    state: Arc<BridgeState>,
    relay: Arc<MessageRelay>,
    subscriptions: Arc<Mutex<SubscriptionManager>>,
    sender_id: String,
}

impl EventRouter {
    pub fn new(agent: AgentConfig, state: Arc<BridgeState>, relay: Arc<MessageRelay>, subscriptions: Arc<Mutex<SubscriptionManager>>) -> Self {
        let sender_id = agent.name.replace('-', "_");
        Self { agent, state, relay, subscriptions, sender_id }
    }

    pub async fn handle_event(&self, event: SseEvent) {
        match event.event_type.as_str() {
            "message.created" => self.handle_message(&event.data).await,
            "command.invoked" => self.handle_command(&event.data).await,
            "project.user_assigned" => self.handle_assignment(&event.data).await,
            "project.user_unassigned" => self.handle_unassignment(&event.data).await,
            "sub_agent.created" => self.handle_sub_agent_created(&event.data).await,
            "sub_agent.terminated" => self.handle_sub_agent_terminated(&event.data).await,
            _ => {}
        }

        if let Some(sequence_id) = event.sequence_id {
            if let Err(err) = self.state.save_cursor(&self.agent.name, &self.agent.org_slug, sequence_id).await {
                tracing::warn!(error = %err, "failed to persist event cursor");
            }
        }
    }

    async fn handle_message(&self, payload: &Value) {
        if self.is_self(payload) {
            return;
        }

        let channel_id = str_field(payload, "channel_id");
        let content = str_field(payload, "content");
        let content = content.trim();
        let sender = payload.get("sender_name").and_then(|v| v.as_str()).unwrap_or("unknown");

        if let Some(text) = content.strip_prefix("mc-bridge ").map(str::trim) {
            self.handle_bridge_command(&channel_id, text).await;
            return;
        }
        if content.is_empty() {
            return;
        }

        let session_key = self.resolve_session(&channel_id).await;
        info!(channel = %short(&channel_id), sender, session = %session_key, "routing message to runtime");

        if let Some(response) = self.relay.forward_to_gateway(&session_key, content, sender).await {
            self.post_response(&channel_id, &response).await;
        }
    }

    async fn handle_command(&self, payload: &Value) {
        if self.is_self(payload) {
            return;
        }

        let channel_id = str_field(payload, "channel_id");
        let command = str_field(payload, "command");
        let args = str_field(payload, "args");

        let session_key = self.resolve_session(&channel_id).await;
        info!(channel = %short(&channel_id), command, session = %session_key, "routing command to runtime");

        if let Some(output) = self.relay.forward_command_to_gateway(&session_key, &command, &args).await {
            self.post_response(&channel_id, &output).await;
        }
    }

    async fn handle_bridge_command(&self, channel_id: &str, text: &str) {
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.is_empty() {
            return;
        }

        match parts[0] {
            "subscribe" if parts.len() >= 2 => {
                let topic = parts[1];
                self.subscriptions.lock().await.subscribe(topic);
                self.post_response(channel_id, &format!("Subscribed to topic: {topic}")).await;
                info!(topic, "bridge subscribe command handled");
            }
            "unsubscribe" if parts.len() >= 2 => {
                let topic = parts[1];
                self.subscriptions.lock().await.unsubscribe(topic);
                self.post_response(channel_id, &format!("Unsubscribed from topic: {topic}")).await;
                info!(topic, "bridge unsubscribe command handled");
            }
            "subscriptions" => {
                let topics = self.subscriptions.lock().await.list_topics();
                let message = if topics.is_empty() {
                    "No active subscriptions.".to_string()
                } else {
                    format!("Active subscriptions:\n{}", topics.iter().map(|t| format!("  - {t}")).collect::<Vec<_>>().join("\n"))
                };
                self.post_response(channel_id, &message).await;
            }
            _ => {}
        }
    }

    async fn handle_assignment(&self, payload: &Value) {
        if payload.get("user_id").and_then(|v| v.as_str()) != Some(self.agent.name.as_str()) {
            return;
        }
        let project_id = str_field(payload, "project_id");
        let channel_id = str_field(payload, "channel_id");
        if channel_id.is_empty() {
            return;
        }

        let session_key = format!("mc:{}:project:{}", self.agent.org_slug, project_id);
        if let Err(err) = self
            .state
            .create_session_mapping(&session_key, &self.agent.name, &self.agent.org_slug, &channel_id, "project")
            .await
        {
            tracing::warn!(error = %err, "failed to persist project assignment session mapping");
        }
        info!(project = project_id, channel = channel_id, "project assignment routed");
    }

    async fn handle_unassignment(&self, payload: &Value) {
        if payload.get("user_id").and_then(|v| v.as_str()) != Some(self.agent.name.as_str()) {
            return;
        }
        let project_id = str_field(payload, "project_id");
        let session_key = format!("mc:{}:project:{}", self.agent.org_slug, project_id);
        if let Err(err) = self.state.delete_session_mapping(&session_key).await {
            tracing::warn!(error = %err, "failed to delete session mapping on unassignment");
        }
        info!(project = project_id, "project unassignment routed");
    }

    async fn handle_sub_agent_created(&self, payload: &Value) {
        let sub_agent_id = str_field(payload, "sub_agent_id");
        let channel_id = str_field(payload, "channel_id");
        if sub_agent_id.is_empty() || channel_id.is_empty() {
            return;
        }
        let session_key = format!("mc:{}:sub:{}", self.agent.org_slug, sub_agent_id);
        if let Err(err) = self
            .state
            .create_session_mapping(&session_key, &self.agent.name, &self.agent.org_slug, &channel_id, "sub_agent")
            .await
        {
            tracing::warn!(error = %err, "failed to persist sub-agent session mapping");
        }
        info!(sub_agent = sub_agent_id, "sub-agent creation routed");
    }

    async fn handle_sub_agent_terminated(&self, payload: &Value) {
        let sub_agent_id = str_field(payload, "sub_agent_id");
        if sub_agent_id.is_empty() {
            return;
        }
        let session_key = format!("mc:{}:sub:{}", self.agent.org_slug, sub_agent_id);
        if let Err(err) = self.state.delete_session_mapping(&session_key).await {
            tracing::warn!(error = %err, "failed to delete session mapping on sub-agent termination");
        }
        info!(sub_agent = sub_agent_id, "sub-agent termination routed");
    }

    async fn resolve_session(&self, channel_id: &str) -> String {
        if let Ok(Some(existing)) = self.state.get_session_key(channel_id, &self.agent.name).await {
            return existing;
        }

        let session_key = format!("mc:{}:project:{}", self.agent.org_slug, channel_id);
        if let Err(err) = self
            .state
            .create_session_mapping(&session_key, &self.agent.name, &self.agent.org_slug, channel_id, "project")
            .await
        {
            tracing::warn!(error = %err, "failed to persist default session mapping");
        }
        info!(channel = %short(channel_id), session = %session_key, "created default session mapping");
        session_key
    }

    async fn post_response(&self, channel_id: &str, content: &str) {
        let api_key = self.agent.api_key().unwrap_or_default();
        self.relay.post_to_mc(channel_id, content, &self.sender_id, &self.agent.name, &api_key).await;
    }

    fn is_self(&self, payload: &Value) -> bool {
        payload.get("sender_id").and_then(|v| v.as_str()) == Some(self.sender_id.as_str())
    }
}

fn str_field(payload: &Value, key: &str) -> String {
    payload.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

fn short(s: &str) -> String {
    s.chars().take(8).collect()
}
