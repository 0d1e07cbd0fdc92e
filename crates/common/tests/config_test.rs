use mc_common::SystemConfig;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_config_load_from_toml() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("test_config.toml");

    let config_content = r#"
[server]
host = "0.0.0.0"
port = 8000

[storage]
postgres_url = "postgresql://localhost/mission_control"
redis_url = "redis://localhost:6379"

[limits]
sse_connection_cap = 50
ws_connection_cap = 50
ring_buffer_size = 500
heartbeat_interval_secs = 30
max_replay_events = 1000
"#;

    fs::write(&config_path, config_content).unwrap();

    let config = SystemConfig::load(config_path.to_str().unwrap()).unwrap();

    assert_eq!(config.server.port, 8000);
    assert_eq!(config.limits.sse_connection_cap, 50);
    assert_eq!(config.storage.redis_url, "redis://localhost:6379");
}

#[test]
fn test_config_load_missing_file_errors() {
    let result = SystemConfig::load("/nonexistent/path/config.toml");
    assert!(result.is_err());
}
