//! # Workbus Configuration
//!
//! Struct-per-section configuration with serde defaults. Every tunable the
//! substrate exposes lives here: store connection, queue polling and retry
//! defaults, dead-letter retention, heartbeat cadence, and event size
//! limits. Loading (defaults → optional TOML file → environment overrides)
//! is handled by [`loader::ConfigLoader`].

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};

use crate::messaging::message::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Root configuration for the messaging substrate
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkbusConfig {
    /// Backing store connection settings
    pub redis: RedisConfig,

    /// Durable queue behavior
    pub queue: QueueConfig,

    /// Pub/sub event system behavior
    pub events: EventsConfig,
}

/// Backing store connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout_seconds: 5,
        }
    }
}

/// Durable queue behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Sleep between processing cycles when polling the ready queues
    pub poll_interval_ms: u64,

    /// Priority applied by `publish_payload` when none is given
    pub default_priority: i64,

    /// Retry policy applied by `publish_payload` when none is given
    pub default_retry_policy: RetryPolicy,

    /// How long completed message bodies are retained in the store
    pub completed_ttl_seconds: u64,

    /// How often the dead-letter archival sweep runs
    pub dlq_sweep_interval_seconds: u64,

    /// Age after which dead-letter entries move to the archive namespace
    pub archive_after_days: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            default_priority: 1,
            default_retry_policy: RetryPolicy::default(),
            completed_ttl_seconds: 3600,
            dlq_sweep_interval_seconds: 60,
            archive_after_days: 7,
        }
    }
}

/// Pub/sub event system behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Heartbeat cadence while the store is responsive
    pub heartbeat_interval_ms: u64,

    /// Delay before the next heartbeat attempt after a failed ping
    pub heartbeat_retry_delay_ms: u64,

    /// Maximum serialized event size accepted by `publish`
    pub max_event_bytes: usize,

    /// Name announced on the heartbeat channel
    pub service_name: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5000,
            heartbeat_retry_delay_ms: 1000,
            max_event_bytes: 1024 * 1024,
            service_name: "workbus".to_string(),
        }
    }
}
