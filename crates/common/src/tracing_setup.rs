//! Structured logging setup shared by the hub and the bridge.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize `tracing` with sensible defaults for `mission-control`.
///
/// `RUST_LOG` overrides the default filter when set.
pub fn init_tracing(crate_name: &str, level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{crate_name}={level},tower_http=info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
