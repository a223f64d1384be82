//! # EventSystem
//!
//! Low-latency pub/sub fan-out with per-registration filter/transform hooks
//! and connection-health monitoring. Delivery is not durable and not
//! retried: events are wire-published to the channel named by their type,
//! and every locally-registered handler is invoked directly so local
//! consumers never wait on transport latency.
//!
//! Connection lifecycle is `disconnected → connecting → connected →
//! disconnected`. A background heartbeat pings the store on a fixed
//! interval and maintains a separate liveness flag; heartbeat failures are
//! a logged signal and only an explicit `verify_connection` failure (or
//! `disconnect`) moves the state machine back to disconnected.
//!
//! `EventSystem` is a cheap clonable handle; the handler registry is
//! process-local and must be re-registered on every process start.

use crate::config::EventsConfig;
use crate::constants::{HEARTBEAT_CHANNEL, HEARTBEAT_EVENT_TYPE};
use crate::events::errors::{EventError, EventResult};
use crate::events::types::{Event, EventStatus};
use crate::store::{MessageStore, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock as StateLock;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Async consumer of published events.
///
/// A returned error is logged and isolated; it never blocks delivery to
/// sibling handlers or fails the publisher.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event) -> anyhow::Result<()>;
}

/// Predicate gating whether a handler runs for an event
pub type EventFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Rewrite applied to an event immediately before handler invocation
pub type EventTransform = Arc<dyn Fn(Event) -> Event + Send + Sync>;

/// Per-registration hooks; both optional, keyed to the registration rather
/// than the handler instance
#[derive(Default, Clone)]
pub struct SubscribeOptions {
    pub filter: Option<EventFilter>,
    pub transform: Option<EventTransform>,
}

#[derive(Clone)]
struct Subscription {
    handler: Arc<dyn EventHandler>,
    filter: Option<EventFilter>,
    transform: Option<EventTransform>,
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Publish/subscribe event bus with liveness monitoring
#[derive(Clone)]
pub struct EventSystem {
    inner: Arc<SystemInner>,
}

struct SystemInner {
    store: Arc<dyn MessageStore>,
    config: EventsConfig,
    state: StateLock<ConnectionState>,
    healthy: AtomicBool,
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl EventSystem {
    pub fn new(store: Arc<dyn MessageStore>, config: EventsConfig) -> Self {
        Self {
            inner: Arc::new(SystemInner {
                store,
                config,
                state: StateLock::new(ConnectionState::Disconnected),
                healthy: AtomicBool::new(false),
                subscriptions: RwLock::new(HashMap::new()),
                heartbeat: Mutex::new(None),
            }),
        }
    }

    /// Establish the pub/sub session, subscribe the heartbeat channel, and
    /// start the heartbeat task. No-op if already connected.
    pub async fn connect(&self) -> EventResult<()> {
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        *self.inner.state.write() = ConnectionState::Connecting;

        if let Err(e) = self.inner.store.ping().await {
            *self.inner.state.write() = ConnectionState::Disconnected;
            return Err(EventError::connection(format!(
                "liveness probe failed during connect: {e}"
            )));
        }

        if let Err(e) = self.inner.store.subscribe(HEARTBEAT_CHANNEL).await {
            *self.inner.state.write() = ConnectionState::Disconnected;
            return Err(EventError::connection(format!(
                "heartbeat channel subscription failed: {e}"
            )));
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.heartbeat_loop().await });
        *self.inner.heartbeat.lock().await = Some(handle);

        self.inner.healthy.store(true, Ordering::SeqCst);
        *self.inner.state.write() = ConnectionState::Connected;
        info!(
            heartbeat_interval_ms = self.inner.config.heartbeat_interval_ms,
            "event system connected"
        );
        Ok(())
    }

    /// Cancel the heartbeat task and release the session
    pub async fn disconnect(&self) {
        if let Some(handle) = self.inner.heartbeat.lock().await.take() {
            handle.abort();
        }

        if let Err(e) = self.inner.store.unsubscribe(HEARTBEAT_CHANNEL).await {
            debug!(error = %e, "heartbeat channel release failed");
        }

        self.inner.healthy.store(false, Ordering::SeqCst);
        *self.inner.state.write() = ConnectionState::Disconnected;
        info!("event system disconnected");
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Liveness flag maintained by the heartbeat task
    pub fn is_healthy(&self) -> bool {
        self.inner.healthy.load(Ordering::SeqCst)
    }

    /// Explicit liveness check. Failure is treated as unrecoverable and
    /// moves the connection state to disconnected.
    pub async fn verify_connection(&self) -> EventResult<()> {
        match self.inner.store.ping().await {
            Ok(()) => {
                self.inner.healthy.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.inner.healthy.store(false, Ordering::SeqCst);
                *self.inner.state.write() = ConnectionState::Disconnected;
                error!(error = %e, "connection verification failed");
                Err(EventError::connection(format!(
                    "connection verification failed: {e}"
                )))
            }
        }
    }

    /// Validate, wire-publish, then deliver to local handlers.
    ///
    /// Local delivery proceeds even when the wire publish fails so local
    /// consumers are not starved by transport problems; the transport error
    /// is returned afterwards.
    pub async fn publish(&self, mut event: Event) -> EventResult<()> {
        event.validate()?;
        event.status = EventStatus::Published;

        let payload = event
            .to_json()
            .map_err(|e| EventError::serialization(e.to_string()))?;

        if payload.len() > self.inner.config.max_event_bytes {
            return Err(EventError::SizeLimitExceeded {
                size_bytes: payload.len(),
                limit_bytes: self.inner.config.max_event_bytes,
            });
        }

        let transport = self
            .inner
            .store
            .publish(&event.channel, &payload)
            .await
            .map_err(|e| EventError::publish(&event.channel, e.to_string()));

        if let Err(ref e) = transport {
            error!(
                channel = %event.channel,
                error = %e,
                "transport publish failed, delivering to local handlers anyway"
            );
        } else {
            debug!(
                event_id = %event.id,
                channel = %event.channel,
                "event published"
            );
        }

        self.inner.deliver_local(&event).await;

        transport
    }

    /// Register a handler for an event type, connecting lazily if needed.
    /// The same handler may be registered multiple times with independent
    /// filter/transform hooks.
    pub async fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> EventResult<()> {
        let event_type = event_type.into();

        if !self.is_connected() {
            self.connect().await?;
        }

        self.inner
            .store
            .subscribe(&event_type)
            .await
            .map_err(|e| EventError::subscription(&event_type, e.to_string()))?;

        let mut subscriptions = self.inner.subscriptions.write().await;
        subscriptions
            .entry(event_type.clone())
            .or_default()
            .push(Subscription {
                handler,
                filter: options.filter,
                transform: options.transform,
            });

        debug!(event_type = %event_type, "event handler registered");
        Ok(())
    }

    /// Remove every registration of a handler for an event type, along with
    /// its filter/transform hooks. No-op if the handler is not registered.
    /// Releases the remote channel once the last local handler is gone.
    pub async fn unsubscribe(&self, event_type: &str, handler: &Arc<dyn EventHandler>) {
        let release_channel = {
            let mut subscriptions = self.inner.subscriptions.write().await;
            match subscriptions.get_mut(event_type) {
                Some(entries) => {
                    entries.retain(|s| !Arc::ptr_eq(&s.handler, handler));
                    if entries.is_empty() {
                        subscriptions.remove(event_type);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if release_channel {
            if let Err(e) = self.inner.store.unsubscribe(event_type).await {
                debug!(event_type = %event_type, error = %e, "channel release failed");
            }
        }

        debug!(event_type = %event_type, "event handler unsubscribed");
    }
}

impl SystemInner {
    /// Invoke every local handler registered for the event's type. Each
    /// invocation is independently guarded so one handler's failure cannot
    /// prevent its siblings from running.
    async fn deliver_local(&self, event: &Event) {
        let entries: Vec<Subscription> = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions
                .get(&event.event_type)
                .cloned()
                .unwrap_or_default()
        };

        for subscription in &entries {
            if let Err(err) = self.invoke(subscription, event.clone()).await {
                error!(
                    event_type = %event.event_type,
                    error = %err,
                    "event handler failed"
                );
            }
        }
    }

    /// Filter → transform → handler for one registration
    async fn invoke(&self, subscription: &Subscription, event: Event) -> EventResult<()> {
        if let Some(filter) = &subscription.filter {
            if !filter(&event) {
                debug!(event_type = %event.event_type, "event filtered");
                return Ok(());
            }
        }

        let event = match &subscription.transform {
            Some(transform) => transform(event),
            None => event,
        };

        let event_type = event.event_type.clone();
        subscription
            .handler
            .handle(event)
            .await
            .map_err(|e| EventError::handling(event_type, e.to_string()))
    }

    async fn heartbeat_loop(&self) {
        let interval = Duration::from_millis(self.config.heartbeat_interval_ms);
        let retry_delay = Duration::from_millis(self.config.heartbeat_retry_delay_ms);

        loop {
            match self.beat().await {
                Ok(()) => {
                    self.healthy.store(true, Ordering::SeqCst);
                    tokio::time::sleep(interval).await;
                }
                Err(e) => {
                    self.healthy.store(false, Ordering::SeqCst);
                    warn!(error = %e, "heartbeat failed");
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    /// One heartbeat: announce liveness on the internal channel, then ping
    async fn beat(&self) -> StoreResult<()> {
        let event = Event::broadcast(
            HEARTBEAT_EVENT_TYPE,
            json!({ "service": self.config.service_name }),
        )
        .with_channel(HEARTBEAT_CHANNEL);

        let payload = event
            .to_json()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.store.publish(HEARTBEAT_CHANNEL, &payload).await?;
        self.store.ping().await
    }
}
