//! 锚定相关类型

use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use crate::audit::{AuditRecord, Severity};

/// 等待锚定的审计记录引用 (只在内存中)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditBatchItem {
    pub record_id: String,
    pub action: String,
    pub severity: Severity,
    pub digest: String,
    /// 已失败的锚定次数
    pub attempts: u32,
    pub enqueued_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl AuditBatchItem {
    pub fn from_record(record: &AuditRecord) -> Self {
        Self {
            record_id: record.id.clone(),
            action: record.action.clone(),
            severity: record.severity,
            digest: record.digest.clone(),
            attempts: 0,
            enqueued_at: shared::util::now_rfc3339(),
            last_error: None,
        }
    }
}

/// 链上回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub anchored_at: String,
}

/// 锚定失败重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorRetryPolicy {
    /// 一直留在批次中，直到锚定成功
    #[default]
    Unbounded,
    /// 失败 n 次后放弃 (只记录日志，记录本身保持未同步)
    Bounded(u32),
}

impl AnchorRetryPolicy {
    /// 0 表示不限次数
    pub fn from_max_retries(max_retries: u32) -> Self {
        match max_retries {
            0 => AnchorRetryPolicy::Unbounded,
            n => AnchorRetryPolicy::Bounded(n),
        }
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        match self {
            AnchorRetryPolicy::Unbounded => false,
            AnchorRetryPolicy::Bounded(max) => attempts >= *max,
        }
    }
}

/// 一次 flush 的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    /// 已有 flush 在运行，本次跳过
    pub skipped: bool,
    pub attempted: usize,
    pub anchored: usize,
    pub already_synced: usize,
    pub failed: usize,
    pub abandoned: usize,
    pub remaining: usize,
}

/// 锚定统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorStats {
    pub pending: usize,
    pub batch_size: usize,
    pub interval_ms: u64,
    pub retry_policy: AnchorRetryPolicy,
    pub client: String,
    pub client_available: bool,
    pub anchored_total: u64,
    pub failed_attempts_total: u64,
    pub abandoned_total: u64,
    pub last_flush_at: Option<String>,
}

/// 单条审计记录的锚定校验结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorVerification {
    pub record_id: String,
    pub anchored: bool,
    pub stored_digest: String,
    pub computed_digest: String,
    /// 记录内容重新计算的摘要与存储值一致
    pub digest_matches: bool,
    /// 链上回执与存储的摘要对应 (未锚定时为 false)
    pub receipt_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub overall_valid: bool,
}

#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("Anchor service unavailable: {0}")]
    Unavailable(String),

    #[error("Anchor request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid anchor response: {0}")]
    InvalidResponse(String),

    #[error("Audit record not found: {0}")]
    RecordNotFound(String),

    #[error("Audit store error: {0}")]
    Store(String),
}

impl From<AnchorError> for AppError {
    fn from(err: AnchorError) -> Self {
        let code = match &err {
            AnchorError::Unavailable(_) => ErrorCode::AnchorServiceUnavailable,
            AnchorError::RecordNotFound(_) => ErrorCode::AuditRecordNotFound,
            AnchorError::Store(_) => ErrorCode::InternalError,
            AnchorError::Rejected { .. } | AnchorError::InvalidResponse(_) => {
                ErrorCode::AnchorFailed
            }
        };
        AppError::with_message(code, err.to_string())
    }
}
