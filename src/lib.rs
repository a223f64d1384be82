#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, ZPOPMAX in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Workbus
//!
//! Event-driven messaging substrate for an event-sourced workflow engine:
//! a durable, priority-ordered work queue with retry and dead-lettering
//! ([`messaging::EventQueue`]), and a publish/subscribe event bus with
//! connection-health monitoring ([`events::EventSystem`]), both backed by
//! a pluggable key-value / sorted-set / pub-sub store.
//!
//! ## Architecture
//!
//! Producers publish messages or events; the queue's background loop
//! dequeues the highest-priority ready message per type (atomic pop-max,
//! safe for competing consumer processes) and runs registered handlers,
//! routing failures through an exponential-backoff retry pipeline into a
//! dead-letter queue with long-term archival. The event system fans
//! published events out to locally-registered handlers with optional
//! filter/transform hooks, and a heartbeat task watches connection health.
//!
//! ## Module Organization
//!
//! - [`messaging`] - message envelope and the durable priority queue
//! - [`events`] - event envelope and the pub/sub event system
//! - [`store`] - backing-store contract, Redis and in-memory backends
//! - [`config`] - configuration management
//! - [`logging`] - structured logging setup
//! - [`constants`] - key namespaces, channels, and scoring constants
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use workbus::config::WorkbusConfig;
//! use workbus::messaging::EventQueue;
//! use workbus::store::RedisStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WorkbusConfig::default();
//! let store = Arc::new(RedisStore::from_config(&config.redis).await?);
//! let queue = EventQueue::new(store, config.queue);
//!
//! let id = queue.publish_payload("build", serde_json::json!({"target": "release"})).await?;
//! println!("enqueued {id}");
//!
//! queue.start_processing().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod store;

pub use config::{ConfigLoader, EventsConfig, QueueConfig, RedisConfig, WorkbusConfig};
pub use events::{
    ConnectionState, Event, EventError, EventHandler, EventPattern, EventStatus, EventSystem,
    SubscribeOptions,
};
pub use messaging::{
    EventQueue, Message, MessageHandler, MessageState, ProcessOutcome, QueueError, RetryPolicy,
};
pub use store::{MemoryStore, MessageStore, RedisStore, StoreError};
