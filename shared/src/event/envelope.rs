//! 事件信封 (Event Envelope)
//!
//! 所有投递到 broker 的事件都包装成统一结构：
//!
//! ```text
//! {
//!   "eventId":   "evt_1718000000000_k3j9x0a2b",
//!   "eventType": "evidence.uploaded",
//!   "timestamp": "2024-06-10T06:13:20.000Z",
//!   "priority":  "medium",
//!   "data":      { ... },
//!   "metadata":  { "source": ..., "version": ..., "environment": ... }
//! }
//! ```
//!
//! 反序列化时缺失的字段会落成空值而不是报错，
//! 由 [`EventEnvelope::check`] 统一判定，这样快照里损坏的条目也能被识别出来。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{EventType, Priority};
use crate::error::{AppError, ErrorCode};

/// 标准化事件记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// 全局唯一 ID，同时作为 broker 分区键
    #[serde(default)]
    pub event_id: String,
    /// 点分事件类型字符串
    #[serde(default)]
    pub event_type: String,
    /// 创建时间 (RFC 3339)
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub priority: Priority,
    /// 调用方负载，必须非 null
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// 信封校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("eventId is missing")]
    MissingEventId,
    #[error("eventType is missing")]
    MissingEventType,
    #[error("timestamp is missing")]
    MissingTimestamp,
    #[error("data is missing")]
    MissingData,
}

impl EnvelopeError {
    pub fn field(&self) -> &'static str {
        match self {
            EnvelopeError::MissingEventId => "eventId",
            EnvelopeError::MissingEventType => "eventType",
            EnvelopeError::MissingTimestamp => "timestamp",
            EnvelopeError::MissingData => "data",
        }
    }
}

impl From<EnvelopeError> for AppError {
    fn from(err: EnvelopeError) -> Self {
        let code = match err {
            EnvelopeError::MissingData => ErrorCode::EventDataMissing,
            EnvelopeError::MissingEventType => ErrorCode::EventTypeMissing,
            _ => ErrorCode::EnvelopeInvalid,
        };
        AppError::with_message(code, err.to_string()).with_detail("field", err.field())
    }
}

impl EventEnvelope {
    /// 检查必填字段，返回第一个缺失项
    pub fn check(&self) -> Result<(), EnvelopeError> {
        if self.event_id.trim().is_empty() {
            return Err(EnvelopeError::MissingEventId);
        }
        if self.event_type.trim().is_empty() {
            return Err(EnvelopeError::MissingEventType);
        }
        if self.timestamp.trim().is_empty() {
            return Err(EnvelopeError::MissingTimestamp);
        }
        if self.data.is_null() {
            return Err(EnvelopeError::MissingData);
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.check().is_ok()
    }

    /// 已登记的事件类型 (未知类型返回 None)
    pub fn kind(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }
}

/// 无副作用的信封校验，每次发送前（包括重试）都会调用
pub fn validate(envelope: &EventEnvelope) -> bool {
    envelope.is_valid()
}

/// 信封构建器
///
/// 持有部署相关的默认 metadata。`build` 是纯函数，不做任何 I/O。
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    source: String,
    version: String,
    environment: String,
}

impl EnvelopeBuilder {
    pub fn new(
        source: impl Into<String>,
        version: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            version: version.into(),
            environment: environment.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// 构建信封
    ///
    /// - 优先级取 `metadata.priority`（合法值时），否则查静态表
    /// - 调用方的 metadata 覆盖默认值，`source` / `version` 除外
    pub fn build(
        &self,
        event_type: &str,
        data: Value,
        overrides: Option<Map<String, Value>>,
    ) -> EventEnvelope {
        let mut metadata = Map::new();
        metadata.insert("environment".into(), Value::String(self.environment.clone()));

        for (key, value) in overrides.unwrap_or_default() {
            if key == "source" || key == "version" {
                continue;
            }
            metadata.insert(key, value);
        }
        metadata.insert("source".into(), Value::String(self.source.clone()));
        metadata.insert("version".into(), Value::String(self.version.clone()));

        let priority = metadata
            .get("priority")
            .and_then(Value::as_str)
            .and_then(|p| p.parse::<Priority>().ok())
            .unwrap_or_else(|| EventType::priority_of(event_type));

        EventEnvelope {
            event_id: crate::util::event_id(),
            event_type: event_type.to_string(),
            timestamp: crate::util::now_rfc3339(),
            priority,
            data,
            metadata,
        }
    }
}

impl Default for EnvelopeBuilder {
    fn default() -> Self {
        Self::new("fraud-evidence-backend", "1.0.0", "development")
    }
}
