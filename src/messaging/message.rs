//! # Message Envelope
//!
//! Immutable unit-of-work record for the durable queue: identity, payload,
//! priority, retry policy, and lifecycle state. Producer input of any shape
//! is normalized into this envelope once, at the `Message::new` ingress
//! boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::messaging::errors::QueueError;

/// Default priority for messages published without an explicit one
pub const DEFAULT_PRIORITY: i64 = 1;

/// Lifecycle state of a queued message.
///
/// Transitions are forward-only: `pending → processing → {completed |
/// pending (retry) | failed}`. A failed message never becomes completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl MessageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageState::Pending => "pending",
            MessageState::Processing => "processing",
            MessageState::Completed => "completed",
            MessageState::Failed => "failed",
        }
    }

    /// Whether moving to `next` follows the forward-only lifecycle
    pub fn can_transition_to(self, next: MessageState) -> bool {
        matches!(
            (self, next),
            (MessageState::Pending, MessageState::Processing)
                | (MessageState::Processing, MessageState::Completed)
                | (MessageState::Processing, MessageState::Pending)
                | (MessageState::Processing, MessageState::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MessageState::Completed | MessageState::Failed)
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry budget and backoff bounds for one message.
///
/// Delays are in seconds; the delay before retry attempt `k` is
/// `min(base_delay * 2^(k-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: u64,
    pub max_delay: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: 1,
            max_delay: 60,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: u64, max_delay: u64) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Backoff before retry attempt `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(32);
        let delay_seconds = self
            .base_delay
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay);
        Duration::from_secs(delay_seconds)
    }
}

/// Unit of work flowing through the durable queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub payload: Value,
    pub message_type: String,
    pub priority: i64,
    pub retry_policy: RetryPolicy,
    pub state: MessageState,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a new pending message, normalizing the payload into a JSON
    /// object. Non-object payloads are wrapped under a `value` key so the
    /// envelope always carries a map.
    pub fn new(
        message_type: impl Into<String>,
        payload: impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        let payload = normalize_payload(serde_json::to_value(payload)?);
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            payload,
            message_type: message_type.into(),
            priority: DEFAULT_PRIORITY,
            retry_policy: RetryPolicy::default(),
            state: MessageState::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            last_processed_at: None,
        })
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Serialize to the JSON wire format stored in the backing store
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from the JSON wire format
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// Move to `next`, rejecting transitions outside the forward-only
    /// lifecycle
    pub fn transition_to(&mut self, next: MessageState) -> Result<(), QueueError> {
        if !self.state.can_transition_to(next) {
            return Err(QueueError::invalid_state_transition(self.state, next));
        }
        self.state = next;
        Ok(())
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    pub fn is_retries_exhausted(&self) -> bool {
        self.retry_count >= self.retry_policy.max_retries
    }

    /// Backoff delay implied by the current retry count
    pub fn retry_delay(&self) -> Duration {
        self.retry_policy.delay_for_attempt(self.retry_count)
    }

    /// When this message becomes eligible for processing again. `None`
    /// means immediately (fresh message, or no processing attempt recorded).
    pub fn next_eligible_at(&self) -> Option<DateTime<Utc>> {
        if self.retry_count == 0 {
            return None;
        }
        let last = self.last_processed_at?;
        let delay = chrono::Duration::from_std(self.retry_delay()).ok()?;
        Some(last + delay)
    }

    /// Whether the message may be processed at `now`
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.next_eligible_at() {
            Some(eligible_at) => now >= eligible_at,
            None => true,
        }
    }
}

fn normalize_payload(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => serde_json::json!({ "value": other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_message_creation_defaults() {
        let message = Message::new("build", json!({"target": "release"})).unwrap();

        assert_eq!(message.message_type, "build");
        assert_eq!(message.priority, DEFAULT_PRIORITY);
        assert_eq!(message.state, MessageState::Pending);
        assert_eq!(message.retry_count, 0);
        assert!(message.last_processed_at.is_none());
        assert!(!message.is_retries_exhausted());
    }

    #[test]
    fn test_payload_normalization() {
        let message = Message::new("build", "plain string").unwrap();
        assert_eq!(message.payload, json!({"value": "plain string"}));

        let message = Message::new("build", json!({"already": "object"})).unwrap();
        assert_eq!(message.payload, json!({"already": "object"}));
    }

    #[test]
    fn test_json_roundtrip() {
        let message = Message::new("ingest", json!({"order_id": 1001}))
            .unwrap()
            .with_priority(7);

        let body = message.to_json().unwrap();
        let decoded = Message::from_json(&body).unwrap();

        assert_eq!(decoded.id, message.id);
        assert_eq!(decoded.message_type, "ingest");
        assert_eq!(decoded.priority, 7);
        assert_eq!(decoded.state, MessageState::Pending);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let message = Message::new("build", json!({})).unwrap();
        let body = message.to_json().unwrap();
        assert!(body.contains("\"state\":\"pending\""));
    }

    #[test]
    fn test_forward_only_transitions() {
        let mut message = Message::new("build", json!({})).unwrap();

        assert!(message.transition_to(MessageState::Processing).is_ok());
        assert!(message.transition_to(MessageState::Completed).is_ok());

        // completed is terminal
        assert!(message.transition_to(MessageState::Failed).is_err());
        assert!(message.transition_to(MessageState::Pending).is_err());
    }

    #[test]
    fn test_failed_never_returns_to_completed() {
        assert!(!MessageState::Failed.can_transition_to(MessageState::Completed));
        assert!(!MessageState::Failed.can_transition_to(MessageState::Pending));
        assert!(MessageState::Failed.is_terminal());
    }

    #[test]
    fn test_retry_exhaustion() {
        let mut message = Message::new("build", json!({}))
            .unwrap()
            .with_retry_policy(RetryPolicy::new(3, 1, 8));

        for _ in 0..2 {
            message.increment_retry();
            assert!(!message.is_retries_exhausted());
        }
        message.increment_retry();
        assert!(message.is_retries_exhausted());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(3, 1, 8);

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(8));
    }

    #[test]
    fn test_readiness_gate() {
        let mut message = Message::new("build", json!({}))
            .unwrap()
            .with_retry_policy(RetryPolicy::new(3, 60, 120));

        let now = Utc::now();
        assert!(message.is_ready(now));

        message.last_processed_at = Some(now);
        message.increment_retry();

        assert!(!message.is_ready(now));
        assert!(message.is_ready(now + chrono::Duration::seconds(61)));
    }

    proptest! {
        #[test]
        fn prop_delay_never_exceeds_max(
            base in 0u64..1000,
            max in 0u64..10_000,
            attempt in 1u32..64,
        ) {
            let policy = RetryPolicy::new(5, base, max);
            prop_assert!(policy.delay_for_attempt(attempt).as_secs() <= max);
        }

        #[test]
        fn prop_delay_matches_formula(
            base in 1u64..16,
            max in 1u64..512,
            attempt in 1u32..10,
        ) {
            let policy = RetryPolicy::new(5, base, max);
            let expected = (base as u128 * (1u128 << (attempt - 1))).min(max as u128);
            prop_assert_eq!(
                policy.delay_for_attempt(attempt).as_secs() as u128,
                expected
            );
        }
    }
}
