//! Translates between Mission Control channel messages and the agent
//! runtime's session protocol, with retry/backoff on the outbound leg and a
//! bounded buffer so a runtime-side blip doesn't drop messages on the floor.

use crate::metrics::Metrics;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, warn};

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_SECONDS: f64 = 1.0;
const OUTBOUND_BUFFER_MAX: usize = 1000;

#[derive(Debug, Clone)]
struct OutboundMessage {
    channel_id: String,
    content: String,
    sender_id: String,
    sender_name: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    output: Option<String>,
}

pub struct MessageRelay {
    mc_url: String,
    runtime_url: String,
    request_timeout: Duration,
    client: Client,
    metrics: Arc<Metrics>,
    outbound_buffer: Mutex<VecDeque<OutboundMessage>>,
}

impl MessageRelay {
    pub fn new(mc_url: &str, runtime_url: &str, verify_tls: bool, request_timeout_secs: u64, metrics: Arc<Metrics>) -> Self {
        let client = Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .expect("reqwest client build");

        Self {
            mc_url: mc_url.trim_end_matches('/').to_string(),
            runtime_url: runtime_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(request_timeout_secs),
            client,
            metrics,
            outbound_buffer: Mutex::new(VecDeque::with_capacity(OUTBOUND_BUFFER_MAX)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    // --- Inbound: Mission Control -> runtime ---

    pub async fn forward_to_gateway(&self, session_key: &str, message: &str, sender: &str) -> Option<String> {
        let url = format!("{}/v1/chat", self.runtime_url);
        let body = json!({ "session_key": session_key, "message": message, "sender": sender });

        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                self.metrics.inc("messages_inbound_total");
                resp.json::<ChatResponse>().await.ok().and_then(|r| r.response)
            }
            Ok(resp) => {
                error!(status = %resp.status(), session_key, "runtime returned an error for chat forward");
                None
            }
            Err(err) => {
                error!(error = %err, session_key, "runtime unreachable for chat forward");
                None
            }
        }
    }

    pub async fn forward_command_to_gateway(&self, session_key: &str, command: &str, args: &str) -> Option<String> {
        let url = format!("{}/v1/command", self.runtime_url);
        let body = json!({ "session_key": session_key, "command": command, "args": args });

        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                self.metrics.inc("commands_routed_total");
                resp.json::<CommandResponse>().await.ok().and_then(|r| r.output)
            }
            Ok(resp) => {
                error!(status = %resp.status(), command, "runtime returned an error for command forward");
                None
            }
            Err(err) => {
                error!(error = %err, command, "runtime unreachable for command forward");
                None
            }
        }
    }

    // --- Outbound: runtime response -> Mission Control ---

    /// Posts to Mission Control with retry; on ultimate failure, buffers the
    /// message for a later `flush_outbound` instead of dropping it.
    pub async fn post_to_mc(&self, channel_id: &str, content: &str, sender_id: &str, sender_name: &str, api_key: &str) -> bool {
        match self.post_to_mc_inner(channel_id, content, sender_id, sender_name, api_key).await {
            Ok(()) => true,
            Err(_) => {
                let mut buffer = self.outbound_buffer.lock().await;
                if buffer.len() >= OUTBOUND_BUFFER_MAX {
                    buffer.pop_front();
                }
                buffer.push_back(OutboundMessage {
                    channel_id: channel_id.to_string(),
                    content: content.to_string(),
                    sender_id: sender_id.to_string(),
                    sender_name: sender_name.to_string(),
                    api_key: api_key.to_string(),
                });
                false
            }
        }
    }

    pub async fn flush_outbound(&self) -> usize {
        let mut flushed = 0;
        loop {
            let item = {
                let mut buffer = self.outbound_buffer.lock().await;
                match buffer.pop_front() {
                    Some(item) => item,
                    None => break,
                }
            };

            if self
                .post_to_mc_inner(&item.channel_id, &item.content, &item.sender_id, &item.sender_name, &item.api_key)
                .await
                .is_ok()
            {
                flushed += 1;
            } else {
                warn!(channel_id = item.channel_id, "flush of buffered outbound message failed, requeueing");
                let mut buffer = self.outbound_buffer.lock().await;
                buffer.push_front(item);
                break;
            }
        }
        flushed
    }

    async fn post_to_mc_inner(&self, channel_id: &str, content: &str, sender_id: &str, sender_name: &str, api_key: &str) -> anyhow::Result<()> {
        let url = format!("{}/api/v1/channels/{channel_id}/messages", self.mc_url);
        let body = PostMessageBody { content, sender_id, sender_name };

        for attempt in 0..MAX_RETRIES {
            let response = self.client.post(&url).json(&body).bearer_auth(api_key).send().await;

            let response = match response {
                Ok(resp) => resp,
                Err(err) => {
                    let backoff = RETRY_BASE_SECONDS * 2f64.powi(attempt as i32);
                    warn!(attempt = attempt + 1, backoff, error = %err, "mission control post failed, retrying");
                    tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                    continue;
                }
            };

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(RETRY_BASE_SECONDS * (attempt as f64 + 1.0));
                warn!(retry_after, "mission control rate limited the bridge");
                tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                continue;
            }

            if response.status().is_client_error() {
                error!(status = %response.status(), channel_id, "mission control rejected the message, not retrying");
                self.metrics.inc("messages_outbound_errors_total");
                anyhow::bail!("mission control returned client error {}", response.status());
            }

            if response.status().is_success() {
                self.metrics.inc("messages_outbound_total");
                return Ok(());
            }

            let backoff = RETRY_BASE_SECONDS * 2f64.powi(attempt as i32);
            warn!(attempt = attempt + 1, backoff, status = %response.status(), "mission control post failed, retrying");
            tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
        }

        self.metrics.inc("messages_outbound_errors_total");
        anyhow::bail!("mission control post exhausted retries for channel {channel_id}")
    }

    // --- Health ---

    pub async fn check_gateway_health(&self) -> bool {
        self.client
            .get(format!("{}/health", self.runtime_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    pub async fn check_mc_health(&self) -> bool {
        self.client
            .get(format!("{}/health", self.mc_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[derive(Serialize)]
struct PostMessageBody<'a> {
    content: &'a str,
    sender_id: &'a str,
    sender_name: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn post_to_mc_succeeds_on_first_try() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/channels/c1/messages"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&mock_server)
            .await;

        let relay = MessageRelay::new(&mock_server.uri(), "http://runtime.invalid", true, 5, Arc::new(Metrics::new()));
        let ok = relay.post_to_mc("c1", "hello", "bot-1", "Release Bot", "key").await;
        assert!(ok);
        assert_eq!(relay.metrics.get_counter("messages_outbound_total"), 1);
    }

    #[tokio::test]
    async fn post_to_mc_buffers_after_exhausting_retries_on_5xx() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/channels/c1/messages"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let relay = MessageRelay::new(&mock_server.uri(), "http://runtime.invalid", true, 5, Arc::new(Metrics::new()));
        let ok = relay.post_to_mc("c1", "hello", "bot-1", "Release Bot", "key").await;
        assert!(!ok);
        assert_eq!(relay.outbound_buffer.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn post_to_mc_does_not_retry_4xx() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/channels/c1/messages"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&mock_server)
            .await;

        let relay = MessageRelay::new(&mock_server.uri(), "http://runtime.invalid", true, 5, Arc::new(Metrics::new()));
        let ok = relay.post_to_mc("c1", "hello", "bot-1", "Release Bot", "key").await;
        assert!(!ok);
    }
}
