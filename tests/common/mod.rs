//! Shared test fixtures: recording and failing handlers for both the queue
//! and the event system.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use workbus::{Event, EventHandler, Message, MessageHandler};

/// Queue handler that records every message it sees
#[derive(Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<Message>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seen(&self) -> Vec<Message> {
        self.seen.lock().clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.seen.lock().iter().map(|m| m.id.clone()).collect()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        self.seen.lock().push(message.clone());
        Ok(())
    }
}

/// Queue handler that always fails
pub struct FailingHandler;

#[async_trait]
impl MessageHandler for FailingHandler {
    async fn handle(&self, _message: &Message) -> anyhow::Result<()> {
        anyhow::bail!("handler exploded")
    }
}

/// Event handler that records every event it sees
#[derive(Default)]
pub struct RecordingEventHandler {
    seen: Mutex<Vec<Event>>,
}

impl RecordingEventHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seen(&self) -> Vec<Event> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl EventHandler for RecordingEventHandler {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        self.seen.lock().push(event);
        Ok(())
    }
}

/// Event handler that always fails
pub struct FailingEventHandler;

#[async_trait]
impl EventHandler for FailingEventHandler {
    async fn handle(&self, _event: Event) -> anyhow::Result<()> {
        anyhow::bail!("event handler exploded")
    }
}
