//! Memory publisher (同进程)
//!
//! 记录收到的每条信封和 header，可切换在线状态、注入发送失败。
//! 用于测试或本地无 broker 的演示。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::event::EventEnvelope;

use super::{BrokerError, BrokerSession, DeliveryAck, DeliveryHeaders, Publisher};

/// 已送达的消息
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub envelope: EventEnvelope,
    pub headers: DeliveryHeaders,
}

#[derive(Debug)]
pub struct MemoryPublisher {
    topic: String,
    online: AtomicBool,
    /// 接下来需要失败的发送次数
    failing_sends: AtomicU32,
    connects: AtomicU32,
    /// 总是以 413 拒绝的事件类型
    rejected_types: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<String>>,
    delivered: Mutex<Vec<DeliveredMessage>>,
}

impl MemoryPublisher {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            online: AtomicBool::new(true),
            failing_sends: AtomicU32::new(0),
            connects: AtomicU32::new(0),
            rejected_types: Mutex::new(HashSet::new()),
            attempts: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// 离线时 connect 与 send 都失败
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// 让接下来 `n` 次发送失败 (连接仍然成功)
    pub fn fail_next_sends(&self, n: u32) {
        self.failing_sends.store(n, Ordering::SeqCst);
    }

    /// 该类型的事件每次都被拒绝 (413)，连接与其他事件不受影响
    pub fn reject_event_type(&self, event_type: impl Into<String>) {
        self.rejected_types.lock().insert(event_type.into());
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// 按顺序记录的每次发送尝试 (eventId)
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    pub fn delivered(&self) -> Vec<DeliveredMessage> {
        self.delivered.lock().clone()
    }
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new("fraud.events")
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn connect(&self) -> Result<BrokerSession, BrokerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(BrokerError::Unreachable("memory broker offline".into()));
        }
        Ok(BrokerSession {
            endpoint: "memory://".into(),
            topic: self.topic.clone(),
        })
    }

    async fn send(
        &self,
        envelope: &EventEnvelope,
        headers: &DeliveryHeaders,
    ) -> Result<DeliveryAck, BrokerError> {
        self.attempts.lock().push(envelope.event_id.clone());

        if !self.online.load(Ordering::SeqCst) {
            return Err(BrokerError::Unreachable("memory broker offline".into()));
        }

        if self.rejected_types.lock().contains(&envelope.event_type) {
            return Err(BrokerError::Rejected {
                status: 413,
                body: "message too large".into(),
            });
        }

        let should_fail = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BrokerError::Rejected {
                status: 503,
                body: "injected failure".into(),
            });
        }

        self.delivered.lock().push(DeliveredMessage {
            envelope: envelope.clone(),
            headers: headers.clone(),
        });

        Ok(DeliveryAck {
            topic: self.topic.clone(),
            key: envelope.event_id.clone(),
        })
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}
