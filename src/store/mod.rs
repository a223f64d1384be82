//! # Backing Store Adapter
//!
//! Contract the messaging substrate requires from its backing store: plain
//! key-value storage for message bodies, sorted sets for the per-type ready
//! queues and dead-letter queues, pub/sub channels for the event system,
//! and a liveness probe.
//!
//! The store is the single source of truth for queue state. `zpopmax` must
//! be atomic so that multiple competing consumer processes can contend on
//! the same queue without handing one message to two of them.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by backing store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Store serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value / sorted-set / pub-sub primitives backing both components
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Liveness probe (`PING`)
    async fn ping(&self) -> StoreResult<()>;

    /// Store a value, optionally with an expiry
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Add or update a member in a sorted set
    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;

    /// Atomically pop the highest-scored member
    async fn zpopmax(&self, key: &str) -> StoreResult<Option<(String, f64)>>;

    /// Atomically pop the lowest-scored member
    async fn zpopmin(&self, key: &str) -> StoreResult<Option<(String, f64)>>;

    /// Cardinality of a sorted set
    async fn zcard(&self, key: &str) -> StoreResult<u64>;

    /// Publish a payload on a pub/sub channel
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()>;

    /// Register interest in a pub/sub channel
    async fn subscribe(&self, channel: &str) -> StoreResult<()>;

    /// Release interest in a pub/sub channel
    async fn unsubscribe(&self, channel: &str) -> StoreResult<()>;
}
