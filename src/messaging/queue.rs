//! # EventQueue
//!
//! Durable, priority-ordered, retryable delivery of messages to registered
//! handlers. Message bodies live in the backing store keyed by id; a
//! per-type sorted set orders ready work priority-first, then
//! earliest-enqueued-first. Handler failures drive an exponential-backoff
//! retry pipeline that dead-letters messages once their retry budget is
//! exhausted; a periodic sweep relocates old dead letters into a long-term
//! archive namespace.
//!
//! Dequeue is an atomic pop-max against the store, so multiple processes
//! may compete on the same queues and each message is handed to exactly
//! one of them. `EventQueue` itself is a cheap clonable handle; handler
//! registrations are process-local and must be re-registered on every
//! process start.

use crate::config::QueueConfig;
use crate::constants::{self, topics};
use crate::events::{Event, EventSystem};
use crate::messaging::errors::{QueueError, QueueResult};
use crate::messaging::message::{Message, MessageState};
use crate::store::MessageStore;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Async consumer invoked for each dequeued message of a subscribed type.
///
/// A returned error triggers the retry pipeline for that message; it is
/// never propagated to the producer.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> anyhow::Result<()>;
}

/// Outcome of a single dequeue step for one message type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Nothing to do: no ready entry, or no handlers registered
    Empty,
    /// Highest-priority entry is a delayed retry that is not yet eligible
    NotReady,
    /// All handlers succeeded
    Completed(String),
    /// A handler failed and the message was rescheduled
    Retried(String),
    /// A handler failed and the retry budget was exhausted
    DeadLettered(String),
}

/// Durable priority work queue with retry and dead-lettering
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    store: Arc<dyn MessageStore>,
    config: QueueConfig,
    handlers: DashMap<String, Vec<Arc<dyn MessageHandler>>>,
    events: Option<EventSystem>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventQueue {
    pub fn new(store: Arc<dyn MessageStore>, config: QueueConfig) -> Self {
        Self::build(store, config, None)
    }

    /// Build a queue with an attached event system for best-effort
    /// lifecycle notifications
    pub fn with_event_system(
        store: Arc<dyn MessageStore>,
        config: QueueConfig,
        events: EventSystem,
    ) -> Self {
        Self::build(store, config, Some(events))
    }

    fn build(
        store: Arc<dyn MessageStore>,
        config: QueueConfig,
        events: Option<EventSystem>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                store,
                config,
                handlers: DashMap::new(),
                events,
                running: AtomicBool::new(false),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Persist a message and enqueue it for processing. Returns the
    /// message id; store failures surface to the caller because they mean
    /// the message was not durably accepted.
    pub async fn publish(&self, message: Message) -> QueueResult<String> {
        self.inner.publish(message).await
    }

    /// Publish a raw payload under a type, applying configured defaults
    pub async fn publish_payload(
        &self,
        message_type: &str,
        payload: impl Serialize,
    ) -> QueueResult<String> {
        let message = Message::new(message_type, payload)?
            .with_priority(self.inner.config.default_priority)
            .with_retry_policy(self.inner.config.default_retry_policy);
        self.publish(message).await
    }

    /// Register an additional handler for a type. All handlers registered
    /// for a type run in registration order for each dequeued message.
    pub fn subscribe(&self, message_type: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let message_type = message_type.into();
        self.inner
            .handlers
            .entry(message_type.clone())
            .or_default()
            .push(handler);
        debug!(message_type = %message_type, "queue handler registered");
    }

    /// Start the background processing loop. No-op if already running.
    pub async fn start_processing(&self) -> QueueResult<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run_loop().await });
        *self.inner.worker.lock().await = Some(handle);

        info!(
            poll_interval_ms = self.inner.config.poll_interval_ms,
            "queue processing started"
        );
        Ok(())
    }

    /// Cooperatively stop the processing loop, letting any in-flight
    /// handler finish its current message.
    pub async fn stop_processing(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.inner.worker.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "processing worker did not shut down cleanly");
            }
        }
        info!("queue processing stopped");
    }

    /// Pop and process the single highest-priority ready message of a type.
    ///
    /// Handlers run sequentially in registration order; the first failure
    /// aborts the remaining handlers for that message and routes it through
    /// the retry pipeline.
    pub async fn process_one(&self, message_type: &str) -> QueueResult<ProcessOutcome> {
        self.inner.process_one(message_type).await
    }

    /// Move dead-letter entries older than the archive threshold into the
    /// archive namespace. Returns the number of entries archived.
    pub async fn sweep_dead_letters(&self, message_type: &str) -> QueueResult<u64> {
        self.inner.sweep_dead_letters(message_type).await
    }

    /// Load a message body by id
    pub async fn get_message(&self, id: &str) -> QueueResult<Message> {
        self.inner.get_message(id).await
    }

    /// Number of entries in a type's ready queue
    pub async fn get_queue_length(&self, message_type: &str) -> QueueResult<u64> {
        Ok(self
            .inner
            .store
            .zcard(&constants::queue_key(message_type))
            .await?)
    }

    /// Number of entries in a type's dead-letter queue
    pub async fn get_dlq_length(&self, message_type: &str) -> QueueResult<u64> {
        Ok(self
            .inner
            .store
            .zcard(&constants::dlq_key(message_type))
            .await?)
    }

    /// Drop all entries from a type's ready queue
    pub async fn clear_queue(&self, message_type: &str) -> QueueResult<()> {
        self.inner
            .store
            .delete(&constants::queue_key(message_type))
            .await?;
        warn!(message_type = %message_type, "queue cleared");
        Ok(())
    }

    /// Drop all entries from a type's dead-letter queue
    pub async fn clear_dlq(&self, message_type: &str) -> QueueResult<()> {
        self.inner
            .store
            .delete(&constants::dlq_key(message_type))
            .await?;
        warn!(message_type = %message_type, "dead-letter queue cleared");
        Ok(())
    }
}

impl QueueInner {
    async fn run_loop(&self) {
        let mut last_sweep = tokio::time::Instant::now();
        let sweep_every = Duration::from_secs(self.config.dlq_sweep_interval_seconds);

        while self.running.load(Ordering::SeqCst) {
            let types: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();

            for message_type in &types {
                if !self.running.load(Ordering::SeqCst) {
                    return;
                }
                // store errors here are logged, never fatal to the loop
                if let Err(e) = self.process_one(message_type).await {
                    error!(
                        message_type = %message_type,
                        error = %e,
                        "queue processing cycle failed"
                    );
                }
            }

            if last_sweep.elapsed() >= sweep_every {
                for message_type in &types {
                    if let Err(e) = self.sweep_dead_letters(message_type).await {
                        error!(
                            message_type = %message_type,
                            error = %e,
                            "dead-letter sweep failed"
                        );
                    }
                }
                last_sweep = tokio::time::Instant::now();
            }

            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }
    }

    async fn publish(&self, message: Message) -> QueueResult<String> {
        let body = message.to_json()?;
        self.store
            .set(&constants::message_key(&message.id), &body, None)
            .await?;

        let score = constants::queue_score(
            message.priority,
            message.created_at.timestamp_millis(),
        );
        self.store
            .zadd(
                &constants::queue_key(&message.message_type),
                &message.id,
                score,
            )
            .await?;

        debug!(
            message_id = %message.id,
            message_type = %message.message_type,
            priority = message.priority,
            "message published"
        );

        self.notify(&message.message_type, topics::PUBLISHED, &message)
            .await;

        Ok(message.id)
    }

    async fn process_one(&self, message_type: &str) -> QueueResult<ProcessOutcome> {
        let handlers: Vec<Arc<dyn MessageHandler>> = self
            .handlers
            .get(message_type)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        if handlers.is_empty() {
            return Ok(ProcessOutcome::Empty);
        }

        let queue_key = constants::queue_key(message_type);
        let Some((id, score)) = self.store.zpopmax(&queue_key).await? else {
            return Ok(ProcessOutcome::Empty);
        };

        let mut message = self.get_message(&id).await?;
        let now = Utc::now();

        if !message.is_ready(now) {
            // delayed retry, re-insert untouched
            self.store.zadd(&queue_key, &id, score).await?;
            return Ok(ProcessOutcome::NotReady);
        }

        message.transition_to(MessageState::Processing)?;
        message.last_processed_at = Some(now);
        self.persist(&message, None).await?;

        for handler in &handlers {
            if let Err(err) = handler.handle(&message).await {
                warn!(
                    message_id = %message.id,
                    message_type = %message_type,
                    error = %err,
                    "handler failed"
                );
                return self.handle_failure(message).await;
            }
        }

        message.transition_to(MessageState::Completed)?;
        let ttl = Duration::from_secs(self.config.completed_ttl_seconds);
        self.persist(&message, Some(ttl)).await?;
        debug!(message_id = %message.id, message_type = %message_type, "message completed");
        self.notify(message_type, topics::COMPLETED, &message).await;

        Ok(ProcessOutcome::Completed(message.id))
    }

    /// Retry path: reschedule with backoff while budget remains, otherwise
    /// dead-letter.
    async fn handle_failure(&self, mut message: Message) -> QueueResult<ProcessOutcome> {
        message.increment_retry();

        if !message.is_retries_exhausted() {
            message.transition_to(MessageState::Pending)?;
            self.persist(&message, None).await?;

            let eligible_at = message.next_eligible_at().unwrap_or_else(Utc::now);
            let score =
                constants::queue_score(message.priority, eligible_at.timestamp_millis());
            self.store
                .zadd(
                    &constants::queue_key(&message.message_type),
                    &message.id,
                    score,
                )
                .await?;

            info!(
                message_id = %message.id,
                message_type = %message.message_type,
                retry_count = message.retry_count,
                delay_seconds = message.retry_delay().as_secs(),
                "message scheduled for retry"
            );
            self.notify(&message.message_type, topics::RETRYING, &message)
                .await;

            Ok(ProcessOutcome::Retried(message.id))
        } else {
            message.transition_to(MessageState::Failed)?;
            self.persist(&message, None).await?;

            let failed_at = message.last_processed_at.unwrap_or_else(Utc::now);
            self.store
                .zadd(
                    &constants::dlq_key(&message.message_type),
                    &message.id,
                    failed_at.timestamp_millis() as f64,
                )
                .await?;

            warn!(
                message_id = %message.id,
                message_type = %message.message_type,
                retry_count = message.retry_count,
                "retry budget exhausted, message dead-lettered"
            );
            self.notify(&message.message_type, topics::FAILED, &message)
                .await;

            Ok(ProcessOutcome::DeadLettered(message.id))
        }
    }

    /// Entries are examined oldest-first and the sweep stops at the first
    /// entry still inside the retention window; it never resurrects a
    /// message into the live queue.
    async fn sweep_dead_letters(&self, message_type: &str) -> QueueResult<u64> {
        let dlq_key = constants::dlq_key(message_type);
        let archive_key = constants::archive_key(message_type);
        let cutoff_ms = (Utc::now()
            - chrono::Duration::days(i64::from(self.config.archive_after_days)))
        .timestamp_millis();

        let mut archived = 0u64;
        while let Some((id, score)) = self.store.zpopmin(&dlq_key).await? {
            if (score as i64) < cutoff_ms {
                self.store.zadd(&archive_key, &id, score).await?;
                archived += 1;
                debug!(
                    message_id = %id,
                    message_type = %message_type,
                    "dead-letter entry archived"
                );
            } else {
                // oldest remaining entry is still within retention
                self.store.zadd(&dlq_key, &id, score).await?;
                break;
            }
        }

        if archived > 0 {
            info!(
                message_type = %message_type,
                archived = archived,
                "dead-letter sweep archived entries"
            );
        }
        Ok(archived)
    }

    async fn get_message(&self, id: &str) -> QueueResult<Message> {
        let body = self
            .store
            .get(&constants::message_key(id))
            .await?
            .ok_or_else(|| QueueError::message_not_found(id))?;
        Ok(Message::from_json(&body)?)
    }

    async fn persist(&self, message: &Message, ttl: Option<Duration>) -> QueueResult<()> {
        let body = message.to_json()?;
        self.store
            .set(&constants::message_key(&message.id), &body, ttl)
            .await?;
        Ok(())
    }

    /// Best-effort lifecycle notification through the attached event
    /// system; failures are logged, never raised.
    async fn notify(&self, message_type: &str, suffix: &str, message: &Message) {
        let Some(events) = &self.events else {
            return;
        };

        let topic = topics::queue_topic(message_type, suffix);
        let event = Event::broadcast(
            &topic,
            json!({
                "message_id": message.id,
                "message_type": message.message_type,
                "state": message.state,
                "retry_count": message.retry_count,
            }),
        );

        if let Err(e) = events.publish(event).await {
            warn!(topic = %topic, error = %e, "queue notification publish failed");
        }
    }
}
