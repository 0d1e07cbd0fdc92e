//! Postgres and Redis adapters implementing the `mc-core` component
//! traits.

pub mod postgres;
pub mod redis;

pub use self::postgres::PostgresEventLog;
pub use self::redis::{RedisConnectionRegistry, RedisFabric, RedisRingBuffer};
