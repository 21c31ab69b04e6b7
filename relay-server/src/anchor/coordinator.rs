//! Batch Anchor Coordinator
//!
//! 批次只在内存中，审计记录本身已经落库；进程重启后未锚定的记录保持
//! `blockchainSynced = false`。
//!
//! flush 流程：
//! 1. 从队头取最多 `batch_size` 条
//! 2. 逐条锚定，成功后调用幂等的 `mark_synced`
//! 3. 失败的条目 `attempts + 1`，按原顺序放回队头 (或按策略放弃)

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::AnchorSettings;
use super::client::AnchorClient;
use super::types::{AnchorError, AnchorStats, AuditBatchItem, FlushReport};
use crate::audit::{AuditRecordStore, MarkOutcome};

pub struct BatchAnchorCoordinator {
    client: Arc<dyn AnchorClient>,
    store: Arc<dyn AuditRecordStore>,
    settings: AnchorSettings,
    batch: Mutex<VecDeque<AuditBatchItem>>,
    flush_guard: tokio::sync::Mutex<()>,
    anchored: AtomicU64,
    failed_attempts: AtomicU64,
    abandoned: AtomicU64,
    last_flush_at: Mutex<Option<String>>,
}

impl std::fmt::Debug for BatchAnchorCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchAnchorCoordinator")
            .field("client", &self.client.name())
            .field("settings", &self.settings)
            .field("pending", &self.batch.lock().len())
            .finish_non_exhaustive()
    }
}

impl BatchAnchorCoordinator {
    pub fn new(
        client: Arc<dyn AnchorClient>,
        store: Arc<dyn AuditRecordStore>,
        settings: AnchorSettings,
    ) -> Self {
        Self {
            client,
            store,
            settings,
            batch: Mutex::new(VecDeque::new()),
            flush_guard: tokio::sync::Mutex::new(()),
            anchored: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            last_flush_at: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &Arc<dyn AnchorClient> {
        &self.client
    }

    pub fn settings(&self) -> &AnchorSettings {
        &self.settings
    }

    /// 加入批次 (同一 record_id 只保留一条)，返回是否新加入
    pub fn enqueue(&self, item: AuditBatchItem) -> bool {
        let mut batch = self.batch.lock();
        if batch.iter().any(|i| i.record_id == item.record_id) {
            return false;
        }
        tracing::debug!(record_id = %item.record_id, severity = %item.severity, "Audit record queued for anchoring");
        batch.push_back(item);
        true
    }

    pub fn pending_count(&self) -> usize {
        self.batch.lock().len()
    }

    pub fn is_batch_full(&self) -> bool {
        self.pending_count() >= self.settings.batch_size
    }

    /// 锚定一个批次
    pub async fn flush_batch(&self) -> FlushReport {
        let Ok(_flush) = self.flush_guard.try_lock() else {
            tracing::debug!("Anchor flush already in flight, skipping");
            return FlushReport {
                skipped: true,
                ..Default::default()
            };
        };

        let taken: Vec<AuditBatchItem> = {
            let mut batch = self.batch.lock();
            let n = batch.len().min(self.settings.batch_size);
            batch.drain(..n).collect()
        };

        let mut report = FlushReport {
            attempted: taken.len(),
            ..Default::default()
        };
        if taken.is_empty() {
            return report;
        }

        tracing::info!(batch = taken.len(), client = self.client.name(), "⛓️ Anchoring audit batch");

        let mut retry = Vec::new();
        for mut item in taken {
            let result = match self.client.anchor(&item).await {
                Ok(receipt) => self
                    .store
                    .mark_synced(&item.record_id, &receipt)
                    .await
                    .map(|outcome| (outcome, receipt)),
                Err(e) => Err(e),
            };

            match result {
                Ok((MarkOutcome::Marked, receipt)) => {
                    report.anchored += 1;
                    self.anchored.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        record_id = %item.record_id,
                        tx_hash = %receipt.tx_hash,
                        block_number = receipt.block_number,
                        "✅ Audit record anchored"
                    );
                }
                Ok((MarkOutcome::AlreadySynced, _)) => {
                    report.already_synced += 1;
                    tracing::debug!(record_id = %item.record_id, "Audit record already synced");
                }
                Err(AnchorError::RecordNotFound(id)) => {
                    report.abandoned += 1;
                    self.abandoned.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(record_id = %id, "Audit record vanished before anchoring, dropped");
                }
                Err(e) => {
                    report.failed += 1;
                    self.failed_attempts.fetch_add(1, Ordering::Relaxed);
                    item.attempts += 1;
                    item.last_error = Some(e.to_string());

                    if self.settings.retry_policy.is_exhausted(item.attempts) {
                        report.abandoned += 1;
                        self.abandoned.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(
                            record_id = %item.record_id,
                            attempts = item.attempts,
                            error = %e,
                            "Anchoring abandoned, record stays unsynced"
                        );
                    } else {
                        tracing::warn!(
                            record_id = %item.record_id,
                            attempts = item.attempts,
                            error = %e,
                            "Anchoring failed, will retry"
                        );
                        retry.push(item);
                    }
                }
            }
        }

        {
            let mut batch = self.batch.lock();
            for item in retry.into_iter().rev() {
                if !batch.iter().any(|i| i.record_id == item.record_id) {
                    batch.push_front(item);
                }
            }
            report.remaining = batch.len();
        }
        *self.last_flush_at.lock() = Some(shared::util::now_rfc3339());

        report
    }

    pub fn stats(&self) -> AnchorStats {
        AnchorStats {
            pending: self.pending_count(),
            batch_size: self.settings.batch_size,
            interval_ms: self.settings.interval.as_millis() as u64,
            retry_policy: self.settings.retry_policy,
            client: self.client.name().to_string(),
            client_available: self.client.is_available(),
            anchored_total: self.anchored.load(Ordering::Relaxed),
            failed_attempts_total: self.failed_attempts.load(Ordering::Relaxed),
            abandoned_total: self.abandoned.load(Ordering::Relaxed),
            last_flush_at: self.last_flush_at.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{AnchorRetryPolicy, MockChainAnchor};
    use crate::audit::{AuditRecord, AuditStatus, MemoryAuditStore, Severity};
    use std::time::Duration;

    fn record(id: &str) -> AuditRecord {
        AuditRecord {
            id: id.to_string(),
            action: "case_escalate".into(),
            resource_type: "case".into(),
            resource_id: None,
            user_id: "system".into(),
            user_email: None,
            status: AuditStatus::Success,
            severity: Severity::Critical,
            details: serde_json::Value::Null,
            timestamp: shared::util::now_rfc3339(),
            digest: format!("{id}-digest"),
            blockchain_tx_hash: None,
            blockchain_block_number: None,
            anchored_at: None,
            blockchain_synced: false,
        }
    }

    async fn setup(
        ids: &[&str],
        retry_policy: AnchorRetryPolicy,
    ) -> (BatchAnchorCoordinator, Arc<MockChainAnchor>, Arc<MemoryAuditStore>) {
        let client = Arc::new(MockChainAnchor::new());
        let store = Arc::new(MemoryAuditStore::new());
        let coordinator = BatchAnchorCoordinator::new(
            client.clone(),
            store.clone(),
            AnchorSettings {
                batch_size: 2,
                interval: Duration::from_secs(30),
                retry_policy,
            },
        );
        for id in ids {
            let rec = record(id);
            coordinator.enqueue(AuditBatchItem::from_record(&rec));
            store.insert(rec).await.unwrap();
        }
        (coordinator, client, store)
    }

    #[tokio::test]
    async fn test_flush_takes_at_most_batch_size() {
        let (coordinator, _, store) = setup(&["a", "b", "c"], AnchorRetryPolicy::Unbounded).await;

        let report = coordinator.flush_batch().await;
        assert_eq!(report.anchored, 2);
        assert_eq!(report.remaining, 1);

        let report = coordinator.flush_batch().await;
        assert_eq!(report.anchored, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(store.synced_count(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_ignored() {
        let (coordinator, _, _) = setup(&["a"], AnchorRetryPolicy::Unbounded).await;
        assert!(!coordinator.enqueue(AuditBatchItem::from_record(&record("a"))));
        assert_eq!(coordinator.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_requeued_in_order() {
        let (coordinator, client, store) = setup(&["a", "b"], AnchorRetryPolicy::Unbounded).await;
        client.set_available(false);

        let report = coordinator.flush_batch().await;
        assert_eq!(report.failed, 2);
        assert_eq!(report.remaining, 2);
        assert_eq!(store.synced_count(), 0);

        client.set_available(true);
        let report = coordinator.flush_batch().await;
        assert_eq!(report.anchored, 2);
        assert_eq!(coordinator.stats().failed_attempts_total, 2);
    }

    #[tokio::test]
    async fn test_bounded_policy_abandons() {
        let (coordinator, client, store) = setup(&["a"], AnchorRetryPolicy::Bounded(2)).await;
        client.set_available(false);

        coordinator.flush_batch().await;
        assert_eq!(coordinator.pending_count(), 1);

        let report = coordinator.flush_batch().await;
        assert_eq!(report.abandoned, 1);
        assert_eq!(coordinator.pending_count(), 0);
        assert!(!store.get("a").await.unwrap().unwrap().blockchain_synced);
    }

    #[tokio::test]
    async fn test_reanchoring_synced_record_is_noop() {
        let (coordinator, _, store) = setup(&["a"], AnchorRetryPolicy::Unbounded).await;
        coordinator.flush_batch().await;
        let first = store.get("a").await.unwrap().unwrap();

        coordinator.enqueue(AuditBatchItem::from_record(&record("a")));
        let report = coordinator.flush_batch().await;

        assert_eq!(report.already_synced, 1);
        let second = store.get("a").await.unwrap().unwrap();
        assert_eq!(first.blockchain_tx_hash, second.blockchain_tx_hash);
        assert_eq!(first.anchored_at, second.anchored_at);
    }
}
