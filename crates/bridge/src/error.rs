//! Error taxonomy for the bridge process, separate from `CoreError` since
//! the bridge runs out-of-process with its own failure surface (HTTP to
//! two different services, local SQLite, no durable log of its own).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("state error: {0}")]
    State(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned client error {status}")]
    RuntimeClientError { status: u16 },

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
