//! # Pub/Sub Event System
//!
//! Event envelope, event error taxonomy, and the fan-out bus with
//! connection-health monitoring.

pub mod errors;
pub mod system;
pub mod types;

pub use errors::{EventError, EventResult};
pub use system::{
    ConnectionState, EventFilter, EventHandler, EventSystem, EventTransform, SubscribeOptions,
};
pub use types::{Event, EventPattern, EventStatus};
