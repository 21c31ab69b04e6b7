//! Dead Letter Sink - 放弃投递的事件
//!
//! 重试耗尽、队列溢出或信封损坏的事件不会静默丢弃，
//! 而是带原因写入单独的 JSON 快照，供人工排查或重新投递。

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shared::event::EventEnvelope;

use super::queue::{QueueError, QueueResult, QueuedItem, read_snapshot, write_snapshot};

/// 死信保留上限，超出时丢弃最旧的记录
const MAX_DEAD_LETTERS: usize = 10_000;

/// 放弃原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    /// 重试次数达到上限
    RetriesExhausted,
    /// 信封校验失败 (快照损坏等)
    InvalidEnvelope,
    /// 本地队列已满，被淘汰
    QueueOverflow,
}

impl std::fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbandonReason::RetriesExhausted => write!(f, "retries_exhausted"),
            AbandonReason::InvalidEnvelope => write!(f, "invalid_envelope"),
            AbandonReason::QueueOverflow => write!(f, "queue_overflow"),
        }
    }
}

/// 死信条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub envelope: EventEnvelope,
    pub added_at: String,
    pub abandoned_at: String,
    pub retry_count: u32,
    pub reason: AbandonReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl DeadLetterEntry {
    pub fn from_item(item: QueuedItem, reason: AbandonReason) -> Self {
        Self {
            envelope: item.envelope,
            added_at: item.added_at,
            abandoned_at: shared::util::now_rfc3339(),
            retry_count: item.retry_count,
            reason,
            last_error: item.last_error,
        }
    }
}

#[derive(Debug)]
pub struct DeadLetterSink {
    path: PathBuf,
    entries: VecDeque<DeadLetterEntry>,
}

impl DeadLetterSink {
    /// 打开死信文件，读取已有记录 (损坏时从空开始)
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_snapshot::<DeadLetterEntry>(&path) {
            Ok(Some((entries, _))) => entries.into(),
            Ok(None) => VecDeque::new(),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Dead letter file unreadable, starting empty");
                VecDeque::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.iter().cloned().collect()
    }

    /// 追加并落盘
    pub fn record(&mut self, batch: Vec<DeadLetterEntry>) -> QueueResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.entries.extend(batch);
        while self.entries.len() > MAX_DEAD_LETTERS {
            self.entries.pop_front();
        }
        write_snapshot(&self.path, &self.entries)
    }
}

impl From<QueueError> for shared::error::AppError {
    fn from(err: QueueError) -> Self {
        shared::error::AppError::with_message(
            shared::error::ErrorCode::QueuePersistFailed,
            err.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::event::EnvelopeBuilder;

    fn exhausted_item() -> QueuedItem {
        let env = EnvelopeBuilder::default().build("case.escalated", json!({"caseId": "c-1"}), None);
        let mut item = QueuedItem::new(env, 3);
        item.retry_count = 3;
        item.last_error = Some("broker unreachable".into());
        item
    }

    #[test]
    fn test_record_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead_letter.json");

        let mut sink = DeadLetterSink::open(&path);
        sink.record(vec![DeadLetterEntry::from_item(
            exhausted_item(),
            AbandonReason::RetriesExhausted,
        )])
        .unwrap();

        let reopened = DeadLetterSink::open(&path);
        assert_eq!(reopened.len(), 1);
        let entry = &reopened.entries()[0];
        assert_eq!(entry.reason, AbandonReason::RetriesExhausted);
        assert_eq!(entry.retry_count, 3);
        assert_eq!(entry.last_error.as_deref(), Some("broker unreachable"));
    }

    #[test]
    fn test_reason_wire_format() {
        let json = serde_json::to_string(&AbandonReason::QueueOverflow).unwrap();
        assert_eq!(json, "\"queue_overflow\"");
        assert_eq!(AbandonReason::InvalidEnvelope.to_string(), "invalid_envelope");
    }
}
