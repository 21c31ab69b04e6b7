//! Durable Local Queue - 未投递事件的本地持久化队列
//!
//! 内存中是一个有序列表，每次变更后把完整列表覆盖写入 JSON 快照
//! (先写临时文件再 rename)。不使用追加日志：队列规模在数百条以内，
//! 覆盖写不需要回放和压缩。
//!
//! 快照损坏或无法读取时按空队列处理，原文件改名保留以便排查。

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shared::event::EventEnvelope;
use thiserror::Error;

/// 队列持久化错误
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// 队列中的一条待投递事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedItem {
    pub envelope: EventEnvelope,
    /// 入队时间 (RFC 3339)
    pub added_at: String,
    #[serde(default)]
    pub retry_count: u32,
    /// 入队时从配置复制，之后配置变化不影响
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedItem {
    pub fn new(envelope: EventEnvelope, max_retries: u32) -> Self {
        Self {
            envelope,
            added_at: shared::util::now_rfc3339(),
            retry_count: 0,
            max_retries,
            last_error: None,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.envelope.event_id
    }

    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// 覆盖写快照：写临时文件 → fsync → rename
pub(crate) fn write_snapshot<T: Serialize + ?Sized>(path: &Path, value: &T) -> QueueResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// 读取 JSON 数组快照，逐条解析
///
/// 文件不存在返回 `Ok(None)`；整体无法解析返回错误；
/// 单条无法解析的记录被跳过。
pub(crate) fn read_snapshot<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> QueueResult<Option<(Vec<T>, usize)>> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let values: Vec<serde_json::Value> = serde_json::from_slice(&raw)?;
    let mut skipped = 0;
    let items: Vec<T> = values
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<T>(v) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Skipping unreadable snapshot entry");
                skipped += 1;
                None
            }
        })
        .collect();

    Ok(Some((items, skipped)))
}

/// 把损坏的快照改名保留，避免下一次写入覆盖现场
fn set_aside_corrupt(path: &Path) {
    let mut aside = path.as_os_str().to_owned();
    aside.push(format!(".corrupt-{}", shared::util::now_millis()));
    if let Err(e) = std::fs::rename(path, PathBuf::from(&aside)) {
        tracing::warn!(error = %e, path = %path.display(), "Failed to set aside corrupt snapshot");
    }
}

/// 本地持久化队列
///
/// 由 `DeliveryCoordinator` 独占，外部不直接修改。
#[derive(Debug)]
pub struct DurableQueue {
    path: PathBuf,
    items: VecDeque<QueuedItem>,
    max_size: usize,
}

impl DurableQueue {
    pub fn new(path: impl Into<PathBuf>, max_size: usize) -> Self {
        Self {
            path: path.into(),
            items: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedItem> {
        self.items.iter()
    }

    pub fn front(&self) -> Option<&QueuedItem> {
        self.items.front()
    }

    pub fn back(&self) -> Option<&QueuedItem> {
        self.items.back()
    }

    /// 当前队列的拷贝 (FIFO 顺序)
    pub fn snapshot(&self) -> Vec<QueuedItem> {
        self.items.iter().cloned().collect()
    }

    /// 启动时加载快照，替换内存中的列表
    ///
    /// 返回加载的条数。任何读取/解析失败都按空队列处理。
    pub fn load_from_disk(&mut self) -> usize {
        self.items.clear();

        match read_snapshot::<QueuedItem>(&self.path) {
            Ok(None) => {
                tracing::debug!(path = %self.path.display(), "No queue snapshot, starting empty");
            }
            Ok(Some((items, skipped))) => {
                if skipped > 0 {
                    tracing::warn!(skipped, "Dropped unreadable entries from queue snapshot");
                }
                self.items.extend(items);
            }
            Err(QueueError::Serialization(e)) => {
                tracing::warn!(
                    error = %e,
                    path = %self.path.display(),
                    "Queue snapshot is corrupt, starting with an empty queue"
                );
                set_aside_corrupt(&self.path);
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %self.path.display(),
                    "Queue snapshot unreadable, starting with an empty queue"
                );
            }
        }

        self.items.len()
    }

    /// 追加到队尾并立即同步落盘
    ///
    /// 超出容量时从队头淘汰，返回被淘汰的条目。落盘失败只记录日志。
    pub fn enqueue(&mut self, item: QueuedItem) -> Vec<QueuedItem> {
        self.items.push_back(item);

        let mut evicted = Vec::new();
        while self.items.len() > self.max_size {
            if let Some(oldest) = self.items.pop_front() {
                evicted.push(oldest);
            }
        }

        self.persist();
        evicted
    }

    /// 全量覆盖写快照 (幂等)
    pub fn drain_to_disk(&self) -> QueueResult<()> {
        write_snapshot(&self.path, &self.items)
    }

    /// `drain_to_disk` 的容错版本：失败只记录日志
    pub fn persist(&self) -> bool {
        match self.drain_to_disk() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = %self.path.display(),
                    queue_size = self.items.len(),
                    "Failed to persist local queue, durability degraded"
                );
                false
            }
        }
    }

    pub fn get_mut(&mut self, event_id: &str) -> Option<&mut QueuedItem> {
        self.items.iter_mut().find(|i| i.event_id() == event_id)
    }

    /// 按 eventId 移除 (不落盘，由调用方在批量变更后 persist)
    pub fn remove(&mut self, event_id: &str) -> Option<QueuedItem> {
        let pos = self.items.iter().position(|i| i.event_id() == event_id)?;
        self.items.remove(pos)
    }

    /// 清空队列并落盘，返回清除条数
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        self.persist();
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::event::EnvelopeBuilder;
    use serde_json::json;

    fn item(n: u32) -> QueuedItem {
        let env = EnvelopeBuilder::default().build("evidence.uploaded", json!({ "n": n }), None);
        QueuedItem::new(env, 10)
    }

    #[test]
    fn test_restart_round_trip_keeps_retry_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue/pending_events.json");

        let mut queue = DurableQueue::new(&path, 100);
        for n in 0..5 {
            let mut it = item(n);
            it.retry_count = n;
            queue.enqueue(it);
        }
        let before = queue.snapshot();

        // Simulated restart
        let mut reloaded = DurableQueue::new(&path, 100);
        assert_eq!(reloaded.load_from_disk(), 5);
        let after = reloaded.snapshot();

        assert_eq!(before, after);
        let counts: Vec<u32> = after.iter().map(|i| i.retry_count).collect();
        assert_eq!(counts, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_missing_snapshot_is_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = DurableQueue::new(dir.path().join("nope.json"), 10);
        assert_eq!(queue.load_from_disk(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_empty_queue_and_set_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_events.json");
        std::fs::write(&path, b"{ this is not json").unwrap();

        let mut queue = DurableQueue::new(&path, 10);
        assert_eq!(queue.load_from_disk(), 0);
        assert!(!path.exists());

        let aside = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(aside);
    }

    #[test]
    fn test_unreadable_entry_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_events.json");
        let good = serde_json::to_value(item(1)).unwrap();
        let snapshot = json!([good, { "addedAt": "2024-01-01T00:00:00Z" }]);
        std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let mut queue = DurableQueue::new(&path, 10);
        assert_eq!(queue.load_from_disk(), 1);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = DurableQueue::new(dir.path().join("q.json"), 3);

        let first = item(0);
        let first_id = first.event_id().to_string();
        queue.enqueue(first);
        queue.enqueue(item(1));
        queue.enqueue(item(2));
        let evicted = queue.enqueue(item(3));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].event_id(), first_id);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_snapshot_is_overwritten_not_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");
        let mut queue = DurableQueue::new(&path, 10);

        let a = item(0);
        let a_id = a.event_id().to_string();
        queue.enqueue(a);
        queue.enqueue(item(1));
        queue.remove(&a_id);
        queue.drain_to_disk().unwrap();
        queue.drain_to_disk().unwrap();

        let on_disk: Vec<QueuedItem> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_ne!(on_disk[0].event_id(), a_id);
    }

    #[test]
    fn test_clear_persists_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");
        let mut queue = DurableQueue::new(&path, 10);
        for n in 0..5 {
            queue.enqueue(item(n));
        }

        assert_eq!(queue.clear(), 5);

        let mut reloaded = DurableQueue::new(&path, 10);
        assert_eq!(reloaded.load_from_disk(), 0);
    }

    #[test]
    fn test_enqueue_survives_unwritable_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file, not a directory").unwrap();

        let mut queue = DurableQueue::new(blocker.join("q.json"), 10);
        queue.enqueue(item(0));

        assert_eq!(queue.len(), 1);
        assert!(queue.drain_to_disk().is_err());
    }

    #[test]
    fn test_snapshot_field_names() {
        let v = serde_json::to_value(item(7)).unwrap();
        assert!(v.get("envelope").is_some());
        assert!(v.get("addedAt").is_some());
        assert_eq!(v["retryCount"], 0);
        assert_eq!(v["maxRetries"], 10);
        assert!(v.get("lastError").is_none());
    }
}
