use serde::{Deserialize, Serialize};

/// Hub process configuration. Loaded once at startup and passed explicitly
/// into the components that need it (no global mutable config state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub postgres_url: String,
    pub redis_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Max concurrent SSE connections per tenant.
    pub sse_connection_cap: u32,
    /// Max concurrent WebSocket connections per tenant.
    pub ws_connection_cap: u32,
    /// Entries retained per tenant in the ring buffer.
    pub ring_buffer_size: usize,
    /// Heartbeat interval for SSE/WS idle pipes, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Max events replayed from the durable log in one pass.
    pub max_replay_events: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            sse_connection_cap: 50,
            ws_connection_cap: 50,
            ring_buffer_size: 500,
            heartbeat_interval_secs: 30,
            max_replay_events: 1000,
        }
    }
}

impl SystemConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SystemConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
