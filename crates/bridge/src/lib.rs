//! The Comms Bridge: a standalone process that gives agent runtimes a
//! durable, reconnecting view of a Mission Control organization's event
//! stream, and relays their replies back as channel messages.
//!
//! ```text
//! Mission Control SSE  ---->  SseListener  ---->  EventRouter  ---->  MessageRelay  ---->  agent runtime
//!                                  |                    |
//!                             reconnect loop      BridgeState (SQLite: session map + cursor)
//! ```
//!
//! One [`sse::SseListener`] and [`router::EventRouter`] pair runs per
//! configured agent; [`bridge::CommsBridge`] owns their lifecycle.

pub mod bridge;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod router;
pub mod sse;
pub mod state;
pub mod subscriptions;

pub use bridge::CommsBridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
