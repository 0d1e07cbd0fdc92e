use thiserror::Error;

/// Error taxonomy for the coordination core (components A-G). The bridge
/// (component H) has its own `BridgeError` since it runs as a separate
/// process with a different failure surface.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("fabric error: {0}")]
    Fabric(String),

    #[error("over connection cap for tenant {tenant} transport {transport}")]
    CapacityExceeded { tenant: String, transport: String },

    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

/// Convert opaque upstream errors (sqlx, redis, ...) into a `CoreError`.
impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
