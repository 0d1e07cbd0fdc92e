//! Shared types, error taxonomy, configuration, and tracing setup used by
//! every Mission Control crate.

pub mod config;
pub mod error;
pub mod ids;
pub mod tracing_setup;

pub use config::SystemConfig;
pub use error::{CoreError, Result};
pub use ids::{ActorKind, TenantId};
pub use tracing_setup::init_tracing;
