//! # Event Envelope
//!
//! Fire-and-forget notification record for the pub/sub layer. Events share
//! the id/type/payload/timestamp shape of queue messages but carry a
//! messaging pattern and optional correlation metadata instead of a retry
//! policy; they are not persisted beyond the transport's transient
//! delivery.

use crate::events::errors::{EventError, EventResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Messaging pattern of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPattern {
    /// Fan-out to every subscriber of the type
    Broadcast,
    /// Addressed to a single target service
    Direct,
    /// Expects a response; requires a target
    Request,
    /// Answers a request; requires a target and correlation id
    Response,
}

impl EventPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventPattern::Broadcast => "broadcast",
            EventPattern::Direct => "direct",
            EventPattern::Request => "request",
            EventPattern::Response => "response",
        }
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status stamped on the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Created,
    Published,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Created => "created",
            EventStatus::Published => "published",
            EventStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pub/sub notification envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub channel: String,
    pub priority: i64,
    pub status: EventStatus,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub pattern: EventPattern,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl Event {
    fn base(event_type: String, data: Value, pattern: EventPattern) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel: event_type.clone(),
            event_type,
            priority: 1,
            status: EventStatus::Created,
            timestamp: Utc::now(),
            data: normalize_data(data),
            correlation_id: None,
            causation_id: None,
            reply_to: None,
            pattern,
            target: None,
            service_name: None,
        }
    }

    /// Fan-out notification to every subscriber of the type
    pub fn broadcast(event_type: impl Into<String>, data: Value) -> Self {
        Self::base(event_type.into(), data, EventPattern::Broadcast)
    }

    /// Notification addressed to one target service
    pub fn direct(event_type: impl Into<String>, target: impl Into<String>, data: Value) -> Self {
        let mut event = Self::base(event_type.into(), data, EventPattern::Direct);
        event.target = Some(target.into());
        event
    }

    /// Request expecting a response; the event's own id doubles as the
    /// correlation id responders echo back
    pub fn request(event_type: impl Into<String>, target: impl Into<String>, data: Value) -> Self {
        let mut event = Self::base(event_type.into(), data, EventPattern::Request);
        event.target = Some(target.into());
        event.correlation_id = Some(event.id.clone());
        event
    }

    /// Response to a prior request
    pub fn response(
        event_type: impl Into<String>,
        target: impl Into<String>,
        correlation_id: impl Into<String>,
        data: Value,
    ) -> Self {
        let mut event = Self::base(event_type.into(), data, EventPattern::Response);
        event.target = Some(target.into());
        event.correlation_id = Some(correlation_id.into());
        event
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_causation_id(mut self, causation_id: impl Into<String>) -> Self {
        self.causation_id = Some(causation_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Check pattern requirements: request/response need a target, and a
    /// response must carry the correlation id of the request it answers
    pub fn validate(&self) -> EventResult<()> {
        match self.pattern {
            EventPattern::Request | EventPattern::Response if self.target.is_none() => {
                Err(EventError::invalid_event(format!(
                    "{} events require a target",
                    self.pattern
                )))
            }
            EventPattern::Response if self.correlation_id.is_none() => Err(
                EventError::invalid_event("response events require a correlation_id"),
            ),
            _ => Ok(()),
        }
    }

    /// Serialize to the JSON wire format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from the JSON wire format
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

fn normalize_data(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => serde_json::json!({ "value": other }),
    }
}
