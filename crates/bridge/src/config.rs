//! Bridge configuration: one TOML file per process. API keys are never
//! stored in the file itself — only the name of the environment variable
//! that holds them.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionControlConfig {
    #[serde(default = "default_mc_url")]
    pub url: String,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_heartbeat_interval")]
    pub sse_heartbeat_interval_seconds: u64,
    #[serde(default = "default_heartbeat_timeout")]
    pub sse_heartbeat_timeout_seconds: u64,
}

fn default_mc_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_true() -> bool {
    true
}
fn default_request_timeout() -> u64 {
    30
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_heartbeat_timeout() -> u64 {
    90
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_runtime_url")]
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_runtime_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_api_key_env() -> String {
    "MC_BRIDGE_RUNTIME_KEY".to_string()
}

impl RuntimeConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub api_key_env: String,
    pub org_slug: String,
    #[serde(default = "default_true")]
    pub auto_subscribe: bool,
    #[serde(default = "default_history_fetch_count")]
    pub history_fetch_count: usize,
}

fn default_history_fetch_count() -> usize {
    50
}

impl AgentConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "./data/bridge_state.db".to_string()
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_host")]
    pub host: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_host() -> String {
    "127.0.0.1".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_metrics_host(),
            port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub mission_control: MissionControlConfig,
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_errors() {
        assert!(BridgeConfig::load("/nonexistent/comms-bridge.toml").is_err());
    }

    #[test]
    fn load_parses_agents_and_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comms-bridge.toml");
        std::fs::write(
            &path,
            r#"
[mission_control]
url = "http://hub.internal:8000"

[runtime]
url = "http://runtime.internal:8080"
api_key_env = "RUNTIME_KEY"

[[agents]]
name = "release-bot"
api_key_env = "RELEASE_BOT_KEY"
org_slug = "acme"
"#,
        )
        .unwrap();

        let config = BridgeConfig::load(&path).unwrap();
        assert_eq!(config.mission_control.url, "http://hub.internal:8000");
        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.agents[0].name, "release-bot");
        assert!(config.agents[0].auto_subscribe);
        assert_eq!(config.state.db_path, "./data/bridge_state.db");
    }
}
