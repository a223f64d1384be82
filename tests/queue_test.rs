//! Integration tests for the durable priority queue: ordering, retry and
//! dead-lettering, archival, notifications, and the background loop, all
//! against the in-memory store.

mod common;

use common::{FailingHandler, RecordingHandler, RecordingEventHandler};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use workbus::{
    EventQueue, EventSystem, EventsConfig, MemoryStore, Message, MessageState, MessageStore,
    ProcessOutcome, QueueConfig, QueueError, RetryPolicy, SubscribeOptions,
};

fn fast_config() -> QueueConfig {
    QueueConfig {
        poll_interval_ms: 10,
        dlq_sweep_interval_seconds: 1,
        ..QueueConfig::default()
    }
}

/// Retry policy with no backoff so failure paths run without waiting
fn immediate_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, 0, 0)
}

#[tokio::test]
async fn higher_priority_is_dequeued_first() {
    let store = Arc::new(MemoryStore::new());
    let queue = EventQueue::new(store, fast_config());

    // published before any handler is registered; they wait in the queue
    let low = Message::new("build", json!({"n": 1})).unwrap().with_priority(5);
    let high = Message::new("build", json!({"n": 2})).unwrap().with_priority(10);
    let low_id = queue.publish(low).await.unwrap();
    let high_id = queue.publish(high).await.unwrap();

    let handler = RecordingHandler::new();
    queue.subscribe("build", handler.clone());

    queue.process_one("build").await.unwrap();
    queue.process_one("build").await.unwrap();

    assert_eq!(handler.ids(), vec![high_id, low_id]);
}

#[tokio::test]
async fn equal_priority_ties_break_oldest_first() {
    let store = Arc::new(MemoryStore::new());
    let queue = EventQueue::new(store, fast_config());

    let first = queue
        .publish(Message::new("build", json!({"n": 1})).unwrap().with_priority(3))
        .await
        .unwrap();
    // make sure enqueue timestamps differ at millisecond resolution
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = queue
        .publish(Message::new("build", json!({"n": 2})).unwrap().with_priority(3))
        .await
        .unwrap();

    let handler = RecordingHandler::new();
    queue.subscribe("build", handler.clone());

    queue.process_one("build").await.unwrap();
    queue.process_one("build").await.unwrap();

    assert_eq!(handler.ids(), vec![first, second]);
}

#[tokio::test]
async fn handlers_run_in_registration_order() {
    let store = Arc::new(MemoryStore::new());
    let queue = EventQueue::new(store, fast_config());

    let first = RecordingHandler::new();
    let second = RecordingHandler::new();
    queue.subscribe("build", first.clone());
    queue.subscribe("build", second.clone());

    let id = queue.publish_payload("build", json!({"n": 1})).await.unwrap();
    let outcome = queue.process_one("build").await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Completed(id.clone()));
    assert_eq!(first.ids(), vec![id.clone()]);
    assert_eq!(second.ids(), vec![id]);
}

#[tokio::test]
async fn failing_handler_increments_retries_then_dead_letters() {
    let store = Arc::new(MemoryStore::new());
    let queue = EventQueue::new(store, fast_config());

    let message = Message::new("ingest", json!({"k": "v"}))
        .unwrap()
        .with_retry_policy(immediate_retry(3));
    let id = queue.publish(message).await.unwrap();
    queue.subscribe("ingest", Arc::new(FailingHandler));

    for expected_count in 1..=2u32 {
        let outcome = queue.process_one("ingest").await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Retried(id.clone()));

        let message = queue.get_message(&id).await.unwrap();
        assert_eq!(message.retry_count, expected_count);
        assert_eq!(message.state, MessageState::Pending);
    }

    let outcome = queue.process_one("ingest").await.unwrap();
    assert_eq!(outcome, ProcessOutcome::DeadLettered(id.clone()));

    let message = queue.get_message(&id).await.unwrap();
    assert_eq!(message.retry_count, 3);
    assert_eq!(message.state, MessageState::Failed);

    // gone from the live queue, discoverable in the DLQ
    assert_eq!(queue.get_queue_length("ingest").await.unwrap(), 0);
    assert_eq!(queue.get_dlq_length("ingest").await.unwrap(), 1);
}

#[tokio::test]
async fn failed_handler_aborts_remaining_handlers_for_that_message() {
    let store = Arc::new(MemoryStore::new());
    let queue = EventQueue::new(store, fast_config());

    let after = RecordingHandler::new();
    queue.subscribe("ingest", Arc::new(FailingHandler));
    queue.subscribe("ingest", after.clone());

    let message = Message::new("ingest", json!({}))
        .unwrap()
        .with_retry_policy(immediate_retry(1));
    queue.publish(message).await.unwrap();
    queue.process_one("ingest").await.unwrap();

    assert!(after.seen().is_empty());
}

#[tokio::test]
async fn delayed_retry_is_not_immediately_poppable() {
    let store = Arc::new(MemoryStore::new());
    let queue = EventQueue::new(store, fast_config());

    let message = Message::new("ingest", json!({}))
        .unwrap()
        .with_retry_policy(RetryPolicy::new(2, 30, 60));
    let id = queue.publish(message).await.unwrap();
    queue.subscribe("ingest", Arc::new(FailingHandler));

    let outcome = queue.process_one("ingest").await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Retried(id));

    // the retry is scheduled 30s out; the next cycle must not run it
    let outcome = queue.process_one("ingest").await.unwrap();
    assert_eq!(outcome, ProcessOutcome::NotReady);
    assert_eq!(queue.get_queue_length("ingest").await.unwrap(), 1);
}

#[tokio::test]
async fn dlq_entries_archive_after_retention_window() {
    let store = Arc::new(MemoryStore::new());
    let queue = EventQueue::new(store.clone(), fast_config());

    // seed one expired dead letter and one fresh one
    let mut expired = Message::new("export", json!({})).unwrap();
    expired.state = MessageState::Failed;
    expired.retry_count = 3;
    expired.last_processed_at = Some(Utc::now() - chrono::Duration::days(8));

    let mut fresh = Message::new("export", json!({})).unwrap();
    fresh.state = MessageState::Failed;
    fresh.retry_count = 3;
    fresh.last_processed_at = Some(Utc::now() - chrono::Duration::days(1));

    for message in [&expired, &fresh] {
        store
            .set(
                &format!("message:{}", message.id),
                &message.to_json().unwrap(),
                None,
            )
            .await
            .unwrap();
        store
            .zadd(
                "dlq:export",
                &message.id,
                message.last_processed_at.unwrap().timestamp_millis() as f64,
            )
            .await
            .unwrap();
    }

    let archived = queue.sweep_dead_letters("export").await.unwrap();

    assert_eq!(archived, 1);
    assert_eq!(queue.get_dlq_length("export").await.unwrap(), 1);
    assert_eq!(store.zcard("archive:export").await.unwrap(), 1);
}

#[tokio::test]
async fn publish_surfaces_store_failures() {
    let store = Arc::new(MemoryStore::new());
    let queue = EventQueue::new(store.clone(), fast_config());

    store.set_healthy(false);
    let err = queue
        .publish(Message::new("build", json!({})).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, QueueError::Store(_)));
}

#[tokio::test]
async fn processing_loop_drains_queue() {
    let store = Arc::new(MemoryStore::new());
    let queue = EventQueue::new(store, fast_config());

    let handler = RecordingHandler::new();
    queue.subscribe("job", handler.clone());

    let mut ids = Vec::new();
    for n in 0..3 {
        ids.push(queue.publish_payload("job", json!({"n": n})).await.unwrap());
    }

    queue.start_processing().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    queue.stop_processing().await;

    assert_eq!(handler.seen().len(), 3);
    assert_eq!(queue.get_queue_length("job").await.unwrap(), 0);

    // completed bodies remain inspectable until their TTL expires
    for id in &ids {
        let message = queue.get_message(id).await.unwrap();
        assert_eq!(message.state, MessageState::Completed);
    }
}

#[tokio::test]
async fn clear_operations_empty_the_indexes() {
    let store = Arc::new(MemoryStore::new());
    let queue = EventQueue::new(store, fast_config());

    queue.publish_payload("build", json!({})).await.unwrap();
    assert_eq!(queue.get_queue_length("build").await.unwrap(), 1);

    queue.clear_queue("build").await.unwrap();
    assert_eq!(queue.get_queue_length("build").await.unwrap(), 0);

    queue.clear_dlq("build").await.unwrap();
    assert_eq!(queue.get_dlq_length("build").await.unwrap(), 0);
}

#[tokio::test]
async fn lifecycle_notifications_reach_attached_event_system() {
    let store = Arc::new(MemoryStore::new());
    let events = EventSystem::new(store.clone(), EventsConfig::default());

    let observer = RecordingEventHandler::new();
    events
        .subscribe(
            "queue.build.published",
            observer.clone(),
            SubscribeOptions::default(),
        )
        .await
        .unwrap();

    let queue = EventQueue::with_event_system(store, fast_config(), events.clone());
    let id = queue.publish_payload("build", json!({"n": 1})).await.unwrap();

    let seen = observer.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].event_type, "queue.build.published");
    assert_eq!(seen[0].data["message_id"], json!(id));

    events.disconnect().await;
}
