//! 审计日志服务
//!
//! 写入记录 → 推导严重级别 → 计算摘要 → high/critical 进入锚定批次。
//! 批次满时立即触发一次 flush，不等定时器。

use std::sync::Arc;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::store::AuditRecordStore;
use super::types::{AuditLogRequest, AuditRecord, Severity};
use crate::anchor::{AnchorError, AnchorVerification, AuditBatchItem, BatchAnchorCoordinator};

/// 缺省操作人
const SYSTEM_USER: &str = "system";

/// 记录摘要：SHA256(action:resource_type:resource_id:user_id:timestamp)
pub fn record_digest(
    action: &str,
    resource_type: &str,
    resource_id: &str,
    user_id: &str,
    timestamp: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{action}:{resource_type}:{resource_id}:{user_id}:{timestamp}"));
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct AuditService {
    store: Arc<dyn AuditRecordStore>,
    anchor: Arc<BatchAnchorCoordinator>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditRecordStore>, anchor: Arc<BatchAnchorCoordinator>) -> Self {
        Self { store, anchor }
    }

    /// 写入一条审计记录
    pub async fn record(&self, req: AuditLogRequest) -> Result<AuditRecord, AnchorError> {
        let timestamp = shared::util::now_rfc3339();
        let user_id = req.user_id.unwrap_or_else(|| SYSTEM_USER.to_string());
        let severity = req
            .severity
            .unwrap_or_else(|| Severity::derive(&req.action, req.status));
        let digest = record_digest(
            &req.action,
            &req.resource_type,
            req.resource_id.as_deref().unwrap_or_default(),
            &user_id,
            &timestamp,
        );

        let record = AuditRecord {
            id: format!("aud_{}", Uuid::new_v4().simple()),
            action: req.action,
            resource_type: req.resource_type,
            resource_id: req.resource_id,
            user_id,
            user_email: req.user_email,
            status: req.status,
            severity,
            details: req.details,
            timestamp,
            digest,
            blockchain_tx_hash: None,
            blockchain_block_number: None,
            anchored_at: None,
            blockchain_synced: false,
        };

        self.store.insert(record.clone()).await?;
        tracing::info!(
            audit_id = %record.id,
            action = %record.action,
            user = %record.user_id,
            severity = %record.severity,
            "📋 Audit logged"
        );

        if severity.requires_anchor() {
            self.anchor.enqueue(AuditBatchItem::from_record(&record));
            if self.anchor.is_batch_full() {
                let anchor = self.anchor.clone();
                tokio::spawn(async move {
                    anchor.flush_batch().await;
                });
            }
        }

        Ok(record)
    }

    pub async fn get(&self, record_id: &str) -> Result<Option<AuditRecord>, AnchorError> {
        self.store.get(record_id).await
    }

    /// 校验审计记录：重新计算摘要，并向锚定客户端核对链上回执
    ///
    /// 记录不存在返回 `None`。未锚定的记录 `receipt_valid` 为 false。
    pub async fn verify(&self, record_id: &str) -> Result<Option<AnchorVerification>, AnchorError> {
        let Some(record) = self.store.get(record_id).await? else {
            return Ok(None);
        };

        let computed_digest = record_digest(
            &record.action,
            &record.resource_type,
            record.resource_id.as_deref().unwrap_or_default(),
            &record.user_id,
            &record.timestamp,
        );
        let digest_matches = computed_digest == record.digest;

        let receipt_valid = match (&record.blockchain_tx_hash, record.blockchain_block_number) {
            (Some(tx_hash), Some(block_number)) if record.blockchain_synced => {
                self.anchor
                    .client()
                    .verify(&record.id, &record.digest, tx_hash, block_number)
                    .await?
            }
            _ => false,
        };

        let overall_valid = digest_matches && receipt_valid;
        if record.blockchain_synced && !overall_valid {
            tracing::warn!(
                audit_id = %record.id,
                digest_matches,
                receipt_valid,
                "⚠️ Audit record failed anchor verification"
            );
        }

        Ok(Some(AnchorVerification {
            record_id: record.id,
            anchored: record.blockchain_synced,
            stored_digest: record.digest,
            computed_digest,
            digest_matches,
            receipt_valid,
            tx_hash: record.blockchain_tx_hash,
            block_number: record.blockchain_block_number,
            overall_valid,
        }))
    }

    pub fn anchor(&self) -> &Arc<BatchAnchorCoordinator> {
        &self.anchor
    }
}
