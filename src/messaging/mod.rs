//! # Durable Message Queue
//!
//! Message envelope, queue error taxonomy, and the priority-ordered
//! retryable work queue.

pub mod errors;
pub mod message;
pub mod queue;

pub use errors::{QueueError, QueueResult};
pub use message::{Message, MessageState, RetryPolicy, DEFAULT_PRIORITY};
pub use queue::{EventQueue, MessageHandler, ProcessOutcome};
