//! # Event System Error Types
//!
//! Pub/sub failures are split by phase: transport publish, subscription
//! setup, handler invocation, connection lifecycle, and payload validation.
//! Handler failures are logged and isolated; only transport-level failures
//! reach the publisher.

use thiserror::Error;

/// Errors surfaced by the pub/sub event system
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event publish failed: {channel}: {message}")]
    Publish { channel: String, message: String },

    #[error("Event subscription failed: {event_type}: {message}")]
    Subscription { event_type: String, message: String },

    #[error("Event handler failed: {event_type}: {message}")]
    Handling { event_type: String, message: String },

    #[error("Event transport connection failed: {message}")]
    Connection { message: String },

    #[error("Event too large: {size_bytes} bytes exceeds limit of {limit_bytes} bytes")]
    SizeLimitExceeded {
        size_bytes: usize,
        limit_bytes: usize,
    },

    #[error("Invalid event: {message}")]
    InvalidEvent { message: String },

    #[error("Event serialization error: {message}")]
    Serialization { message: String },
}

impl EventError {
    /// Create a publish error
    pub fn publish(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Create a subscription error
    pub fn subscription(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscription {
            event_type: event_type.into(),
            message: message.into(),
        }
    }

    /// Create a handler error
    pub fn handling(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handling {
            event_type: event_type.into(),
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create an invalid event error
    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

/// Result type alias for event system operations
pub type EventResult<T> = Result<T, EventError>;
