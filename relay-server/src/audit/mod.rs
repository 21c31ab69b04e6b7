//! 审计日志模块
//!
//! ```text
//! POST /api/audit
//!   └─ AuditService::record()
//!        ├─ AuditRecordStore::insert()
//!        └─ high / critical → BatchAnchorCoordinator::enqueue()
//!                                 └─ flush → AnchorClient → mark_synced()
//! ```

pub mod service;
pub mod store;
pub mod types;

pub use service::{AuditService, record_digest};
pub use store::{AuditRecordStore, MarkOutcome, MemoryAuditStore};
pub use types::{AuditLogRequest, AuditRecord, AuditStatus, Severity};
