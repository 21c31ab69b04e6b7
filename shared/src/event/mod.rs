//! 事件模型
//!
//! - [`EventType`] / [`Priority`]: 事件分类与静态优先级表
//! - [`EventEnvelope`] / [`EnvelopeBuilder`]: 标准化信封及其构建、校验

mod envelope;
mod types;

pub use envelope::{EnvelopeBuilder, EnvelopeError, EventEnvelope, validate};
pub use types::{EventType, Priority, UnknownEventType};
