//! 事件投递子系统
//!
//! ```text
//!   publish()
//!      │
//!      ▼
//! ┌──────────────┐  Connected   ┌──────────────┐
//! │  Coordinator │ ───────────► │  Publisher   │ ──► broker
//! └──────┬───────┘              └──────▲───────┘
//!        │ 失败 / 未连接                 │ 定时重投
//!        ▼                              │
//! ┌──────────────┐   retry tick   ┌─────┴────────┐
//! │ DurableQueue │ ─────────────► │ DeliveryWorker│
//! └──────┬───────┘                └──────────────┘
//!        │ 放弃 (重试耗尽 / 溢出 / 信封损坏)
//!        ▼
//!   DeadLetterSink
//! ```
//!
//! - [`DurableQueue`]: 内存有序列表 + 全量 JSON 快照
//! - [`publisher`]: `Publisher` trait 及 HTTP / 仅队列 / 内存实现
//! - [`DeliveryCoordinator`]: 连接状态机、重试、统计
//! - [`DeliveryWorker`]: 定时器 + fire-and-forget 通道

pub mod coordinator;
pub mod dead_letter;
pub mod publisher;
pub mod queue;
pub mod worker;

use std::time::Duration;

pub use coordinator::{
    BrokerState, ClearReport, DeliveryCoordinator, DeliveryCounters, DeliveryRoute, PassReport,
    PublishError, PublishReceipt, QueueStats, QueuedEventSummary,
};
pub use dead_letter::{AbandonReason, DeadLetterEntry, DeadLetterSink};
pub use queue::{DurableQueue, QueueError, QueuedItem};
pub use worker::{DeliverySubmitter, DeliveryWorker, Submission};

/// 投递协调器配置
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// 重试定时器间隔
    pub retry_interval: Duration,
    /// 入队时写入每条事件的重试上限
    pub max_retries: u32,
    /// 本地队列容量，超出时丢弃最旧的事件
    pub max_queue_size: usize,
    /// 连续重连失败时的退避上限
    pub reconnect_max_backoff: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(10),
            max_retries: 10,
            max_queue_size: 1000,
            reconnect_max_backoff: Duration::from_secs(300),
        }
    }
}
