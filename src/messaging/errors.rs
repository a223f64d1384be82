//! # Queue Error Types
//!
//! Structured error handling for the durable queue using thiserror. Store
//! connectivity failures surface to producers; handler failures never do,
//! they drive the retry/DLQ state machine instead.

use crate::messaging::message::MessageState;
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by queue operations
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue publish failed: {queue_name}: {message}")]
    Publish { queue_name: String, message: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Message not found: {id}")]
    MessageNotFound { id: String },

    #[error("Invalid message state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: MessageState,
        to: MessageState,
    },

    #[error("Processing loop error: {message}")]
    ProcessingLoop { message: String },
}

impl QueueError {
    /// Create a publish error
    pub fn publish(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    /// Create a message serialization error
    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    /// Create a message deserialization error
    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    /// Create a message not found error
    pub fn message_not_found(id: impl Into<String>) -> Self {
        Self::MessageNotFound { id: id.into() }
    }

    /// Create an invalid state transition error
    pub fn invalid_state_transition(from: MessageState, to: MessageState) -> Self {
        Self::InvalidStateTransition { from, to }
    }

    /// Create a processing loop error
    pub fn processing_loop(message: impl Into<String>) -> Self {
        Self::ProcessingLoop {
            message: message.into(),
        }
    }
}

/// Conversion from serde_json::Error to QueueError
impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            QueueError::message_deserialization(err.to_string())
        } else {
            QueueError::message_serialization(err.to_string())
        }
    }
}

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;
