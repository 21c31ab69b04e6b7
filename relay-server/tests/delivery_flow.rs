//! 投递协调器端到端行为：直投、入队、重投、恢复、放弃、清空

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use relay_server::delivery::publisher::MemoryPublisher;
use relay_server::delivery::{
    AbandonReason, DeliveryCoordinator, DeliveryRoute, DeliverySettings, PublishError,
};
use serde_json::json;
use shared::event::{EnvelopeBuilder, EnvelopeError, Priority};

fn settings(max_retries: u32) -> DeliverySettings {
    DeliverySettings {
        retry_interval: Duration::from_millis(100),
        max_retries,
        max_queue_size: 1000,
        // 等于重试间隔 → 不跳过任何重连周期
        reconnect_max_backoff: Duration::from_millis(100),
    }
}

fn coordinator(dir: &Path, publisher: Arc<MemoryPublisher>, max_retries: u32) -> DeliveryCoordinator {
    DeliveryCoordinator::new(
        EnvelopeBuilder::new("fraud-evidence-backend", "1.0.0", "test"),
        publisher,
        settings(max_retries),
        dir.join("queue").join("pending_events.json"),
        Some(dir.join("queue").join("dead_letter.json")),
    )
}

#[tokio::test]
async fn publish_goes_direct_when_broker_is_up() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = Arc::new(MemoryPublisher::new("fraud.events"));
    let coordinator = coordinator(dir.path(), publisher.clone(), 10);
    assert!(coordinator.connect().await);

    let receipt = coordinator
        .publish("evidence.uploaded", json!({"evidenceId": "ev-1"}), None)
        .await
        .unwrap();

    assert!(receipt.success);
    assert_eq!(receipt.published, DeliveryRoute::Broker);
    assert_eq!(receipt.topic.as_deref(), Some("fraud.events"));
    assert_eq!(coordinator.stats().queue_size, 0);

    let delivered = publisher.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].envelope.event_id, receipt.event_id);
    assert_eq!(delivered[0].headers.retry_count, None);
    assert_eq!(delivered[0].envelope.metadata["environment"], "test");
}

#[tokio::test]
async fn publish_is_queued_when_broker_is_down_then_drained() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = Arc::new(MemoryPublisher::default());
    publisher.set_online(false);
    let coordinator = coordinator(dir.path(), publisher.clone(), 10);
    assert!(!coordinator.connect().await);

    let receipt = coordinator
        .publish("case.escalated", json!({"caseId": "c-1"}), None)
        .await
        .unwrap();
    assert!(receipt.success);
    assert_eq!(receipt.published, DeliveryRoute::Queued);
    assert_eq!(receipt.queue_size, Some(1));
    assert_eq!(receipt.will_retry, Some(true));

    let stats = coordinator.stats();
    assert_eq!(stats.queue_size, 1);
    assert!(!stats.broker_connected);
    assert_eq!(stats.events[0].priority, Priority::Critical);
    assert!(stats.oldest_event_timestamp.is_some());

    publisher.set_online(true);
    let report = coordinator.process_queue().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.remaining, 0);

    let stats = coordinator.stats();
    assert_eq!(stats.queue_size, 0);
    assert!(stats.broker_connected);
    assert_eq!(stats.counters.redelivered, 1);
}

#[tokio::test]
async fn invalid_publish_leaves_queue_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = Arc::new(MemoryPublisher::default());
    publisher.set_online(false);
    let coordinator = coordinator(dir.path(), publisher, 10);

    coordinator.publish("user.login", json!({"u": 1}), None).await.unwrap();
    let before = coordinator.stats();

    let missing_data = coordinator.publish("user.login", serde_json::Value::Null, None).await;
    let missing_type = coordinator.publish("", json!({"u": 2}), None).await;

    assert!(matches!(
        missing_data,
        Err(PublishError::InvalidEnvelope(EnvelopeError::MissingData))
    ));
    assert!(matches!(
        missing_type,
        Err(PublishError::InvalidEnvelope(EnvelopeError::MissingEventType))
    ));

    let after = coordinator.stats();
    assert_eq!(after.queue_size, before.queue_size);
    assert_eq!(after.events, before.events);
}

#[tokio::test]
async fn redelivery_attempts_follow_fifo_order() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = Arc::new(MemoryPublisher::default());
    publisher.set_online(false);
    let coordinator = coordinator(dir.path(), publisher.clone(), 10);

    let mut ids = Vec::new();
    for n in 0..4 {
        let receipt = coordinator
            .publish("rl.prediction.made", json!({ "n": n }), None)
            .await
            .unwrap();
        ids.push(receipt.event_id);
    }

    publisher.set_online(true);
    let report = coordinator.process_queue().await;

    assert_eq!(report.delivered, 4);
    assert_eq!(publisher.attempts(), ids);
}

#[tokio::test]
async fn rejected_event_does_not_hold_back_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = Arc::new(MemoryPublisher::default());
    publisher.set_online(false);
    publisher.reject_event_type("system.alert");
    let coordinator = coordinator(dir.path(), publisher.clone(), 10);

    let rejected = coordinator
        .publish("system.alert", json!({"payload": "oversized"}), None)
        .await
        .unwrap();
    let healthy = coordinator
        .publish("case.created", json!({"caseId": "c-2"}), None)
        .await
        .unwrap();

    publisher.set_online(true);
    for _ in 0..5 {
        coordinator.process_queue().await;
    }

    let attempts = publisher.attempts();
    assert_eq!(attempts[0], rejected.event_id);
    assert_eq!(attempts[1], healthy.event_id);
    assert_eq!(attempts.iter().filter(|id| **id == healthy.event_id).count(), 1);

    let stats = coordinator.stats();
    assert_eq!(stats.queue_size, 1);
    assert_eq!(stats.events[0].event_id, rejected.event_id);
    assert_eq!(stats.events[0].retry_count, 5);
    assert!(stats.broker_connected);

    let live = coordinator
        .publish("case.created", json!({"caseId": "c-3"}), None)
        .await
        .unwrap();
    assert_eq!(live.published, DeliveryRoute::Broker);
}

#[tokio::test]
async fn queue_survives_restart_with_retry_counts() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = Arc::new(MemoryPublisher::default());
    publisher.set_online(false);

    let (first, second) = {
        let coordinator = coordinator(dir.path(), publisher.clone(), 10);
        let a = coordinator.publish("case.created", json!({"n": "a"}), None).await.unwrap();
        let b = coordinator.publish("case.created", json!({"n": "b"}), None).await.unwrap();

        publisher.set_online(true);
        publisher.fail_next_sends(1);
        let report = coordinator.process_queue().await;
        assert_eq!(report.failed, 1);
        (a.event_id, b.event_id)
        // 不调用 shutdown，模拟进程崩溃
    };

    publisher.set_online(false);
    let restarted = coordinator(dir.path(), publisher, 10);
    let report = restarted.recover().await;
    assert_eq!(report.remaining, 2);

    let stats = restarted.stats();
    assert_eq!(stats.queue_size, 2);
    assert_eq!(stats.events[0].event_id, first);
    assert_eq!(stats.events[0].retry_count, 1);
    assert_eq!(stats.events[1].event_id, second);
    assert_eq!(stats.events[1].retry_count, 0);
}

#[tokio::test]
async fn item_is_abandoned_after_max_retries() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = Arc::new(MemoryPublisher::default());
    publisher.set_online(false);
    let coordinator = coordinator(dir.path(), publisher.clone(), 3);

    let receipt = coordinator
        .publish("evidence.deleted", json!({"evidenceId": "ev-9"}), None)
        .await
        .unwrap();

    publisher.set_online(true);
    publisher.fail_next_sends(3);

    let first = coordinator.process_queue().await;
    let second = coordinator.process_queue().await;
    assert_eq!((first.failed, second.failed), (1, 1));
    assert_eq!(coordinator.stats().events[0].retry_count, 2);

    let third = coordinator.process_queue().await;
    assert_eq!(third.failed, 1);
    assert_eq!(third.abandoned, 1);

    let stats = coordinator.stats();
    assert_eq!(stats.queue_size, 0);
    assert_eq!(stats.counters.abandoned, 1);
    assert_eq!(stats.dead_letter_count, 1);

    let dead = coordinator.dead_letters();
    assert_eq!(dead[0].envelope.event_id, receipt.event_id);
    assert_eq!(dead[0].reason, AbandonReason::RetriesExhausted);
    assert_eq!(dead[0].retry_count, 3);
    assert!(dead[0].last_error.is_some());

    // 放弃后的事件不会再被发送
    let attempts_before = publisher.attempts().len();
    coordinator.process_queue().await;
    assert_eq!(publisher.attempts().len(), attempts_before);
}

#[tokio::test]
async fn clear_reports_cleared_count() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = Arc::new(MemoryPublisher::default());
    publisher.set_online(false);
    let coordinator = coordinator(dir.path(), publisher, 10);

    for n in 0..5 {
        coordinator.publish("user.logout", json!({ "n": n }), None).await.unwrap();
    }

    let report = coordinator.clear();
    assert_eq!(report.cleared_count, 5);
    assert_eq!(coordinator.stats().queue_size, 0);

    let snapshot = std::fs::read_to_string(dir.path().join("queue").join("pending_events.json")).unwrap();
    assert_eq!(serde_json::from_str::<serde_json::Value>(&snapshot).unwrap(), json!([]));
}

#[tokio::test]
async fn shutdown_flushes_queue_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = Arc::new(MemoryPublisher::default());
    publisher.set_online(false);
    let coordinator = coordinator(dir.path(), publisher, 10);

    coordinator.publish("system.error", json!({"msg": "x"}), None).await.unwrap();
    coordinator.shutdown().await;

    let snapshot = std::fs::read_to_string(dir.path().join("queue").join("pending_events.json")).unwrap();
    let items: Vec<serde_json::Value> = serde_json::from_str(&snapshot).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["retryCount"], 0);
    assert_eq!(items[0]["maxRetries"], 10);
    assert_eq!(items[0]["envelope"]["eventType"], "system.error");
}
