//! HTTP broker 客户端 (Kafka REST 代理风格)
//!
//! - connect: `GET {endpoint}/topics/{topic}`，按顺序尝试，第一个成功的地址成为活动地址
//! - send:    `POST {endpoint}/topics/{topic}`，body 为 `{"records":[{"key","value"}]}`

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use shared::event::EventEnvelope;

use super::{BrokerError, BrokerSession, BrokerSettings, DeliveryAck, DeliveryHeaders, Publisher};

const RECORDS_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

#[derive(Debug)]
pub struct HttpBrokerPublisher {
    client: Client,
    settings: BrokerSettings,
    /// 当前连接的地址
    active: RwLock<Option<String>>,
}

impl HttpBrokerPublisher {
    pub fn new(settings: BrokerSettings) -> Result<Self, BrokerError> {
        if settings.endpoints.is_empty() {
            return Err(BrokerError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout)
            .build()
            .map_err(|e| BrokerError::Client(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            settings,
            active: RwLock::new(None),
        })
    }

    fn topic_url(&self, endpoint: &str) -> String {
        format!("{}/topics/{}", endpoint, self.settings.topic)
    }

    pub fn active_endpoint(&self) -> Option<String> {
        self.active.read().clone()
    }
}

#[async_trait]
impl Publisher for HttpBrokerPublisher {
    async fn connect(&self) -> Result<BrokerSession, BrokerError> {
        let mut last_error = String::from("no endpoints tried");

        for endpoint in &self.settings.endpoints {
            match self.client.get(self.topic_url(endpoint)).send().await {
                Ok(resp) if resp.status().is_success() => {
                    *self.active.write() = Some(endpoint.clone());
                    return Ok(BrokerSession {
                        endpoint: endpoint.clone(),
                        topic: self.settings.topic.clone(),
                    });
                }
                Ok(resp) => {
                    last_error = format!("{endpoint} answered {}", resp.status());
                }
                Err(e) => {
                    last_error = format!("{endpoint}: {e}");
                }
            }
            tracing::debug!(endpoint = %endpoint, error = %last_error, "Broker endpoint not reachable");
        }

        *self.active.write() = None;
        Err(BrokerError::Unreachable(last_error))
    }

    async fn send(
        &self,
        envelope: &EventEnvelope,
        headers: &DeliveryHeaders,
    ) -> Result<DeliveryAck, BrokerError> {
        let endpoint = self.active_endpoint().ok_or(BrokerError::NotConnected)?;

        let body = serde_json::json!({
            "records": [{ "key": envelope.event_id, "value": envelope }]
        });

        let mut request = self
            .client
            .post(self.topic_url(&endpoint))
            .header(reqwest::header::CONTENT_TYPE, RECORDS_CONTENT_TYPE);
        for (name, value) in headers.pairs() {
            request = request.header(name, value);
        }

        let response = request
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    BrokerError::Client(format!("invalid request for {}: {e}", envelope.event_id))
                } else {
                    BrokerError::Unreachable(format!("{endpoint}: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Rejected { status, body });
        }

        Ok(DeliveryAck {
            topic: self.settings.topic.clone(),
            key: envelope.event_id.clone(),
        })
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        *self.active.write() = None;
        Ok(())
    }

    fn topic(&self) -> &str {
        &self.settings.topic
    }
}
