//! The hub's HTTP surface: the resumable SSE event stream, the WebSocket
//! chat multiplexer, and the minimal REST stand-ins that drive the
//! broadcaster without the full projects/tasks/organizations schema.
//!
//! ```text
//! ┌─────────────────────┐
//! │  GET  /health        │
//! │  GET  /.../events/stream  <- resumable SSE (component E)
//! │  POST /channels/:id/messages
//! │  GET  /ws             <- WebSocket multiplexer (component F)
//! ├─────────────────────┤
//! │  Broadcaster (mc-core)  │
//! ├─────────────────────┤
//! │  EventLog / Fabric / RingBuffer / Registry (mc-storage) │
//! └─────────────────────┘
//! ```

pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;

pub use server::{router, AppState, InMemoryMessageStore, MembershipProvider, MessageStore, OpenMembershipProvider};
