//! 仅队列模式：未配置 broker 时使用，所有事件进入本地队列

use async_trait::async_trait;
use shared::event::EventEnvelope;

use super::{BrokerError, BrokerSession, DeliveryAck, DeliveryHeaders, Publisher};

#[derive(Debug, Clone)]
pub struct QueueOnlyPublisher {
    topic: String,
}

impl QueueOnlyPublisher {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl Publisher for QueueOnlyPublisher {
    async fn connect(&self) -> Result<BrokerSession, BrokerError> {
        Err(BrokerError::NotConfigured)
    }

    async fn send(
        &self,
        _envelope: &EventEnvelope,
        _headers: &DeliveryHeaders,
    ) -> Result<DeliveryAck, BrokerError> {
        Err(BrokerError::NotConfigured)
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    fn is_available(&self) -> bool {
        false
    }
}
