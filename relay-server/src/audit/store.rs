//! 审计记录存储
//!
//! `mark_synced` 是锚定协调器唯一的写回口：幂等，`blockchain_synced` 只会从 false 变 true。

use async_trait::async_trait;
use dashmap::DashMap;

use super::types::AuditRecord;
use crate::anchor::{AnchorError, AnchorReceipt};

/// `mark_synced` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    /// 已同步过，本次为 no-op
    AlreadySynced,
}

#[async_trait]
pub trait AuditRecordStore: Send + Sync + std::fmt::Debug {
    async fn insert(&self, record: AuditRecord) -> Result<(), AnchorError>;

    async fn get(&self, record_id: &str) -> Result<Option<AuditRecord>, AnchorError>;

    /// 写回锚定结果 (幂等)
    async fn mark_synced(
        &self,
        record_id: &str,
        receipt: &AnchorReceipt,
    ) -> Result<MarkOutcome, AnchorError>;
}

/// 进程内存储
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    records: DashMap<String, AuditRecord>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn synced_count(&self) -> usize {
        self.records.iter().filter(|r| r.blockchain_synced).count()
    }
}

#[async_trait]
impl AuditRecordStore for MemoryAuditStore {
    async fn insert(&self, record: AuditRecord) -> Result<(), AnchorError> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, record_id: &str) -> Result<Option<AuditRecord>, AnchorError> {
        Ok(self.records.get(record_id).map(|r| r.clone()))
    }

    async fn mark_synced(
        &self,
        record_id: &str,
        receipt: &AnchorReceipt,
    ) -> Result<MarkOutcome, AnchorError> {
        let mut record = self
            .records
            .get_mut(record_id)
            .ok_or_else(|| AnchorError::RecordNotFound(record_id.to_string()))?;

        if record.blockchain_synced {
            return Ok(MarkOutcome::AlreadySynced);
        }

        record.blockchain_tx_hash = Some(receipt.tx_hash.clone());
        record.blockchain_block_number = Some(receipt.block_number);
        record.anchored_at = Some(receipt.anchored_at.clone());
        record.blockchain_synced = true;
        Ok(MarkOutcome::Marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::types::{AuditStatus, Severity};
    use serde_json::Value;

    fn record(id: &str) -> AuditRecord {
        AuditRecord {
            id: id.to_string(),
            action: "evidence_delete".into(),
            resource_type: "evidence".into(),
            resource_id: Some("ev-1".into()),
            user_id: "system".into(),
            user_email: None,
            status: AuditStatus::Success,
            severity: Severity::Critical,
            details: Value::Null,
            timestamp: shared::util::now_rfc3339(),
            digest: "ab".repeat(32),
            blockchain_tx_hash: None,
            blockchain_block_number: None,
            anchored_at: None,
            blockchain_synced: false,
        }
    }

    fn receipt(tx: &str, block: u64) -> AnchorReceipt {
        AnchorReceipt {
            tx_hash: tx.to_string(),
            block_number: block,
            anchored_at: shared::util::now_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_mark_synced_is_idempotent() {
        let store = MemoryAuditStore::new();
        store.insert(record("aud_1")).await.unwrap();

        let first = store.mark_synced("aud_1", &receipt("0xaaa", 1)).await.unwrap();
        let second = store.mark_synced("aud_1", &receipt("0xbbb", 2)).await.unwrap();

        assert_eq!(first, MarkOutcome::Marked);
        assert_eq!(second, MarkOutcome::AlreadySynced);

        let stored = store.get("aud_1").await.unwrap().unwrap();
        assert!(stored.blockchain_synced);
        assert_eq!(stored.blockchain_tx_hash.as_deref(), Some("0xaaa"));
        assert_eq!(stored.blockchain_block_number, Some(1));
        assert_eq!(store.synced_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_unknown_record_fails() {
        let store = MemoryAuditStore::new();
        let err = store.mark_synced("missing", &receipt("0x1", 1)).await.unwrap_err();
        assert!(matches!(err, AnchorError::RecordNotFound(id) if id == "missing"));
    }
}
