//! Wire types for the hub's HTTP/WS/SSE surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error response body returned by every REST endpoint on failure.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: Some(code.to_string()),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub sender_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct PostMessageResponse {
    pub message_id: Uuid,
    pub sequence_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListMessagesResponse {
    pub messages: Vec<mc_core::message::Message>,
}

/// Frames a WebSocket client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
    Subscribe {
        channel_ids: Vec<Uuid>,
    },
    Message {
        channel_id: Uuid,
        content: String,
        #[serde(default)]
        mentions: Vec<Uuid>,
        client_id: Option<String>,
    },
    Typing {
        channel_id: Uuid,
    },
    TypingStopped {
        channel_id: Uuid,
    },
}

/// Frames the hub may send over a WebSocket connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Pong,
    Subscribed {
        channel_ids: Vec<Uuid>,
    },
    Message {
        channel_id: Uuid,
        message_id: Uuid,
        sender_id: Uuid,
        content: String,
        mentions: Vec<Uuid>,
        client_id: Option<String>,
        sequence_id: i64,
    },
    Typing {
        channel_id: Uuid,
        actor_id: Uuid,
    },
    TypingStopped {
        channel_id: Uuid,
        actor_id: Uuid,
    },
    SessionRevoked,
    Error {
        error: String,
        code: String,
    },
}

/// WebSocket close codes used by the multiplexer beyond the RFC 6455 range.
pub mod close_codes {
    pub const UNAUTHORIZED: u16 = 4001;
    pub const SESSION_REVOKED: u16 = 4002;
    pub const CONNECTION_CAP_EXCEEDED: u16 = 4029;
}
