//! Reconnecting SSE client for an agent's Mission Control event stream.
//!
//! Maintains one persistent connection per agent: manual SSE line framing
//! (this hub emits comments and multi-field events that a generic SSE crate
//! would either choke on or hide behind an API we don't need), exponential
//! backoff reconnection, heartbeat-timeout detection, and resume via
//! `Last-Event-ID`.

use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

const RECONNECT_BASE_SECONDS: f64 = 1.0;
const RECONNECT_MAX_SECONDS: f64 = 60.0;
const RECONNECT_MULTIPLIER: f64 = 2.0;

/// A parsed SSE event, already JSON-decoded.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event_type: String,
    pub data: Value,
    pub sequence_id: Option<i64>,
    pub raw_id: Option<String>,
}

pub struct SseListener {
    mc_url: String,
    org_slug: String,
    api_key: String,
    heartbeat_timeout: Duration,
    last_event_id: Option<String>,
    client: Client,
}

impl SseListener {
    pub fn new(mc_url: &str, org_slug: &str, api_key: &str, heartbeat_timeout_secs: u64, verify_tls: bool) -> Self {
        let client = Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .expect("reqwest client build");

        Self {
            mc_url: mc_url.trim_end_matches('/').to_string(),
            org_slug: org_slug.to_string(),
            api_key: api_key.to_string(),
            heartbeat_timeout: Duration::from_secs(heartbeat_timeout_secs),
            last_event_id: None,
            client,
        }
    }

    pub fn set_last_event_id(&mut self, event_id: String) {
        self.last_event_id = Some(event_id);
    }

    /// Run the reconnect loop forever, emitting parsed events on `tx`, until
    /// `shutdown` resolves. Backoff resets to the base delay after any clean
    /// (non-erroring) disconnect. `connected`/`reconnect_count` are updated
    /// in place so the bridge's health reporting can read them.
    pub async fn run(
        &mut self,
        tx: mpsc::Sender<SseEvent>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
        connected: std::sync::Arc<std::sync::atomic::AtomicBool>,
        reconnect_count: std::sync::Arc<std::sync::atomic::AtomicU32>,
    ) {
        use std::sync::atomic::Ordering;
        let mut backoff = RECONNECT_BASE_SECONDS;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.connect_and_stream(&tx, &mut shutdown, &connected).await {
                Ok(()) => {
                    backoff = RECONNECT_BASE_SECONDS;
                }
                Err(err) => {
                    warn!(error = %err, backoff, "sse connection lost");
                }
            }
            connected.store(false, Ordering::Relaxed);

            if *shutdown.borrow() {
                break;
            }

            let attempt = reconnect_count.fetch_add(1, Ordering::Relaxed) + 1;
            info!(backoff, attempt, "sse reconnecting");
            tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
            backoff = (backoff * RECONNECT_MULTIPLIER).min(RECONNECT_MAX_SECONDS);
        }
    }

    async fn connect_and_stream(
        &mut self,
        tx: &mpsc::Sender<SseEvent>,
        shutdown: &mut tokio::sync::watch::Receiver<bool>,
        connected: &std::sync::Arc<std::sync::atomic::AtomicBool>,
    ) -> anyhow::Result<()> {
        let url = format!("{}/api/v1/orgs/{}/events/stream", self.mc_url, self.org_slug);

        let mut request = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream");
        if let Some(last_id) = &self.last_event_id {
            request = request.header("Last-Event-ID", last_id.clone());
        }

        let response = request.send().await?.error_for_status()?;
        connected.store(true, std::sync::atomic::Ordering::Relaxed);
        info!(url, resume_from = ?self.last_event_id, "sse connected");

        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        let mut current_event_type: Option<String> = None;
        let mut current_event_id: Option<String> = None;
        let mut current_data_lines: Vec<String> = Vec::new();
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Ok(());
                    }
                }
                _ = tokio::time::sleep(self.heartbeat_timeout.saturating_sub(last_activity.elapsed())) => {
                    anyhow::bail!("heartbeat timeout after {:?}", last_activity.elapsed());
                }
                chunk = byte_stream.next() => {
                    let chunk = match chunk {
                        Some(Ok(chunk)) => chunk,
                        Some(Err(err)) => return Err(err.into()),
                        None => return Ok(()),
                    };
                    last_activity = Instant::now();
                    buffer.push_str(&String::from_utf8_lossy(&chunk));

                    while let Some(newline_pos) = buffer.find('\n') {
                        let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
                        buffer.drain(..=newline_pos);

                        if let Some(rest) = line.strip_prefix("event:") {
                            current_event_type = Some(rest.trim().to_string());
                        } else if let Some(rest) = line.strip_prefix("id:") {
                            current_event_id = Some(rest.trim().to_string());
                        } else if let Some(rest) = line.strip_prefix("data:") {
                            current_data_lines.push(rest.trim().to_string());
                        } else if line.starts_with(':') {
                            // comment / keepalive
                        } else if line.is_empty() {
                            if !current_data_lines.is_empty() {
                                self.dispatch(
                                    current_event_type.take(),
                                    current_event_id.take(),
                                    std::mem::take(&mut current_data_lines),
                                    tx,
                                )
                                .await;
                            }
                            current_event_type = None;
                            current_event_id = None;
                            current_data_lines.clear();
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(
        &mut self,
        event_type: Option<String>,
        event_id: Option<String>,
        data_lines: Vec<String>,
        tx: &mpsc::Sender<SseEvent>,
    ) {
        let data_str = data_lines.join("\n");
        let data: Value = match serde_json::from_str(&data_str) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "sse parse error");
                return;
            }
        };

        let resolved_type = event_type.unwrap_or_else(|| {
            data.get("type").and_then(|v| v.as_str()).unwrap_or("unknown").to_string()
        });
        let sequence_id = data.get("sequence_id").and_then(|v| v.as_i64());
        let payload = data.get("payload").cloned().unwrap_or_else(|| data.clone());

        if let Some(id) = &event_id {
            self.last_event_id = Some(id.clone());
        }

        let event = SseEvent {
            event_type: resolved_type,
            data: payload,
            sequence_id,
            raw_id: event_id,
        };

        if tx.send(event).await.is_err() {
            warn!("sse event channel closed, dropping event");
        }
    }
}
