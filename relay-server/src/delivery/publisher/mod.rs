//! Publisher 投递层抽象
//!
//! 可插拔的 broker 客户端：
//! ```text
//!              ┌─────────────────────┐
//!              │   Publisher Trait   │  ◄── 可插拔接口
//!              └──────────┬──────────┘
//!                         │
//!      ┌──────────────────┼──────────────────┐
//!      ▼                  ▼                  ▼
//! HttpBrokerPublisher  QueueOnlyPublisher  MemoryPublisher
//! (REST 代理)          (无 broker，只入队)   (同进程/测试)
//! ```
//!
//! 连接状态由 `DeliveryCoordinator` 持有，Publisher 只负责 connect/send/disconnect。

mod http_broker;
mod memory;
mod queue_only;

pub use http_broker::HttpBrokerPublisher;
pub use memory::{DeliveredMessage, MemoryPublisher};
pub use queue_only::QueueOnlyPublisher;

use std::time::Duration;

use async_trait::async_trait;
use shared::error::{AppError, ErrorCode};
use shared::event::{EventEnvelope, Priority};
use thiserror::Error;

/// Header 名称 (HTTP 头不区分大小写)
pub const HEADER_EVENT_KEY: &str = "x-event-key";
pub const HEADER_EVENT_TYPE: &str = "x-event-type";
pub const HEADER_PRIORITY: &str = "x-event-priority";
pub const HEADER_TIMESTAMP: &str = "x-event-timestamp";
pub const HEADER_RETRY_COUNT: &str = "x-retry-count";

/// Broker 连接配置
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// 按顺序尝试的 broker 地址
    pub endpoints: Vec<String>,
    pub topic: String,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("No broker configured")]
    NotConfigured,

    #[error("Broker not connected")]
    NotConnected,

    #[error("Broker unreachable: {0}")]
    Unreachable(String),

    #[error("Broker rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Broker client error: {0}")]
    Client(String),
}

impl BrokerError {
    /// 传输层故障：broker 整体不可用，后续发送也会失败
    ///
    /// 4xx (408/429 除外) 和请求构建失败只针对当前消息，不影响连接状态。
    pub fn is_transport(&self) -> bool {
        match self {
            BrokerError::Rejected { status, .. } => {
                !(400..500).contains(status) || matches!(status, 408 | 429)
            }
            BrokerError::Client(_) => false,
            BrokerError::NotConfigured
            | BrokerError::NotConnected
            | BrokerError::Unreachable(_) => true,
        }
    }
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        let code = match err {
            BrokerError::Rejected { .. } | BrokerError::Client(_) => ErrorCode::BrokerSendFailed,
            _ => ErrorCode::BrokerUnavailable,
        };
        AppError::with_message(code, err.to_string())
    }
}

/// 随每次发送附带的传输层 header
///
/// `retry_count` 只在重投时出现，消费端据此区分首次投递与重试。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryHeaders {
    pub event_key: String,
    pub event_type: String,
    pub priority: Priority,
    pub timestamp: String,
    pub retry_count: Option<u32>,
}

impl DeliveryHeaders {
    pub fn for_envelope(envelope: &EventEnvelope, retry_count: Option<u32>) -> Self {
        Self {
            event_key: envelope.event_id.clone(),
            event_type: envelope.event_type.clone(),
            priority: envelope.priority,
            timestamp: envelope.timestamp.clone(),
            retry_count,
        }
    }

    pub fn is_retry(&self) -> bool {
        self.retry_count.is_some()
    }

    /// (name, value) 列表
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (HEADER_EVENT_KEY, self.event_key.clone()),
            (HEADER_EVENT_TYPE, self.event_type.clone()),
            (HEADER_PRIORITY, self.priority.to_string()),
            (HEADER_TIMESTAMP, self.timestamp.clone()),
        ];
        if let Some(n) = self.retry_count {
            pairs.push((HEADER_RETRY_COUNT, n.to_string()));
        }
        pairs
    }
}

/// 建立连接后的会话信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSession {
    pub endpoint: String,
    pub topic: String,
}

/// 发送确认
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAck {
    pub topic: String,
    /// 分区键 (= eventId)
    pub key: String,
}

/// Broker 发布者特征
#[async_trait]
pub trait Publisher: Send + Sync + std::fmt::Debug {
    /// 建立 (或重新建立) 到 broker 的连接
    async fn connect(&self) -> Result<BrokerSession, BrokerError>;

    /// 发送一条信封，必须附带 `headers`
    async fn send(
        &self,
        envelope: &EventEnvelope,
        headers: &DeliveryHeaders,
    ) -> Result<DeliveryAck, BrokerError>;

    /// 断开连接 (尽力而为)
    async fn disconnect(&self) -> Result<(), BrokerError>;

    fn topic(&self) -> &str;

    /// 是否存在可用的 broker 客户端 (仅队列模式返回 false)
    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::event::EnvelopeBuilder;

    #[test]
    fn test_headers_first_attempt_has_no_retry_count() {
        let env = EnvelopeBuilder::default().build("evidence.deleted", json!({}), None);
        let headers = DeliveryHeaders::for_envelope(&env, None);

        assert!(!headers.is_retry());
        let pairs = headers.pairs();
        assert!(pairs.iter().any(|(k, v)| *k == HEADER_EVENT_TYPE && v == "evidence.deleted"));
        assert!(pairs.iter().any(|(k, v)| *k == HEADER_PRIORITY && v == "critical"));
        assert!(pairs.iter().any(|(k, v)| *k == HEADER_EVENT_KEY && *v == env.event_id));
        assert!(!pairs.iter().any(|(k, _)| *k == HEADER_RETRY_COUNT));
    }

    #[test]
    fn test_headers_retry_carries_count() {
        let env = EnvelopeBuilder::default().build("case.created", json!({}), None);
        let headers = DeliveryHeaders::for_envelope(&env, Some(3));
        assert!(headers.is_retry());
        assert!(
            headers
                .pairs()
                .iter()
                .any(|(k, v)| *k == HEADER_RETRY_COUNT && v == "3")
        );
    }

    #[test]
    fn test_transport_vs_message_errors() {
        assert!(BrokerError::NotConnected.is_transport());
        assert!(BrokerError::Unreachable("refused".into()).is_transport());
        assert!(
            BrokerError::Rejected { status: 503, body: String::new() }.is_transport()
        );
        assert!(
            BrokerError::Rejected { status: 429, body: String::new() }.is_transport()
        );
        assert!(
            !BrokerError::Rejected { status: 413, body: String::new() }.is_transport()
        );
        assert!(
            !BrokerError::Rejected { status: 400, body: String::new() }.is_transport()
        );
        assert!(!BrokerError::Client("invalid header value".into()).is_transport());
    }

    #[test]
    fn test_broker_error_codes() {
        let err: AppError = BrokerError::NotConfigured.into();
        assert_eq!(err.code, ErrorCode::BrokerUnavailable);

        let err: AppError = BrokerError::Rejected {
            status: 500,
            body: "boom".into(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::BrokerSendFailed);
    }
}
