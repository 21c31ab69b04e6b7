//! 审计记录上链锚定
//!
//! ```text
//! AuditService ──enqueue──► BatchAnchorCoordinator ──flush──► AnchorClient
//!                               ▲  (内存批次)                     │
//!                               │                                 ▼
//!                          AnchorWorker (定时器)        AuditRecordStore::mark_synced
//! ```
//!
//! 与投递协调器相互独立，两者之间没有顺序保证。

pub mod client;
pub mod coordinator;
pub mod types;
pub mod worker;

use std::time::Duration;

pub use client::{AnchorClient, HttpAnchorClient, MockChainAnchor};
pub use coordinator::BatchAnchorCoordinator;
pub use types::{
    AnchorError, AnchorReceipt, AnchorRetryPolicy, AnchorStats, AnchorVerification,
    AuditBatchItem, FlushReport,
};
pub use worker::AnchorWorker;

/// 锚定协调器配置
#[derive(Debug, Clone)]
pub struct AnchorSettings {
    /// 每次 flush 最多处理的条数
    pub batch_size: usize,
    pub interval: Duration,
    pub retry_policy: AnchorRetryPolicy,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            interval: Duration::from_secs(30),
            retry_policy: AnchorRetryPolicy::Unbounded,
        }
    }
}
