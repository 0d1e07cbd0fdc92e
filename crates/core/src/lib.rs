//! Domain model and component contracts for the coordination hub: the
//! durable event log, pub/sub fabric, ring buffer cache, broadcaster,
//! connection registry, and the types they all operate on.

pub mod broadcaster;
pub mod channel;
pub mod event;
pub mod fabric;
pub mod filter;
pub mod log;
pub mod message;
pub mod registry;
pub mod replay;
pub mod ring_buffer;

pub use broadcaster::Broadcaster;
pub use channel::{Channel, ChannelKind};
pub use event::{Actor, Event, EventId};
pub use fabric::{EventStream, PubSubFabric};
pub use filter::{SubscriptionFilter, TopicKind};
pub use log::EventLog;
pub use message::{ChannelId, Message, MessageId};
pub use registry::{ConnectionRegistry, Transport};
pub use ring_buffer::RingBuffer;
