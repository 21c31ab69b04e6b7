//! Delivery Worker - 重投定时器 + fire-and-forget 发布通道
//!
//! HTTP handler 不等待 broker：`DeliverySubmitter::submit` 只把事件放进通道，
//! 由 worker 串行调用 `DeliveryCoordinator::publish`。

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::coordinator::DeliveryCoordinator;

/// 待发布的事件
#[derive(Debug, Clone)]
pub struct Submission {
    pub event_type: String,
    pub data: Value,
    pub metadata: Option<Map<String, Value>>,
}

/// 发布入口 (可 Clone，供 handler 使用)
#[derive(Debug, Clone)]
pub struct DeliverySubmitter {
    tx: mpsc::Sender<Submission>,
}

impl DeliverySubmitter {
    /// 提交事件，不等待投递结果
    ///
    /// 通道满时转为后台等待发送，不阻塞调用方。
    pub fn submit(&self, submission: Submission) {
        match self.tx.try_send(submission) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(submission)) => {
                tracing::debug!("Delivery channel full, deferring submission");
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if tx.send(submission).await.is_err() {
                        tracing::warn!("Delivery worker stopped, submission dropped");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(submission)) => {
                tracing::warn!(
                    event_type = %submission.event_type,
                    "Delivery worker stopped, submission dropped"
                );
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 投递后台任务
pub struct DeliveryWorker {
    coordinator: Arc<DeliveryCoordinator>,
    shutdown: CancellationToken,
}

impl DeliveryWorker {
    /// 创建提交通道
    pub fn channel(buffer: usize) -> (DeliverySubmitter, mpsc::Receiver<Submission>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (DeliverySubmitter { tx }, rx)
    }

    pub fn new(coordinator: Arc<DeliveryCoordinator>, shutdown: CancellationToken) -> Self {
        Self {
            coordinator,
            shutdown,
        }
    }

    /// 运行直到取消
    ///
    /// 启动时恢复磁盘快照并连接 broker；取消时先处理完通道里已提交的事件，
    /// 再执行协调器的关闭流程 (最终落盘)。
    pub async fn run(self, mut rx: mpsc::Receiver<Submission>) {
        let interval = self.coordinator.settings().retry_interval;
        tracing::info!(retry_interval_ms = interval.as_millis() as u64, "📮 Delivery worker started");

        let report = self.coordinator.recover().await;
        if report.remaining > 0 {
            tracing::info!(remaining = report.remaining, "Pending events remain after recovery");
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval 的第一次 tick 立即完成，recover 已经跑过一次
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    rx.close();
                    while let Some(submission) = rx.recv().await {
                        self.handle(submission).await;
                    }
                    self.coordinator.shutdown().await;
                    tracing::info!("Delivery worker stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.coordinator.process_queue().await;
                }
                submission = rx.recv() => {
                    match submission {
                        Some(submission) => self.handle(submission).await,
                        None => {
                            tracing::info!("Delivery channel closed, waiting for shutdown");
                            self.shutdown.cancelled().await;
                            self.coordinator.shutdown().await;
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&self, submission: Submission) {
        let Submission {
            event_type,
            data,
            metadata,
        } = submission;

        if let Err(e) = self.coordinator.publish(&event_type, data, metadata).await {
            tracing::warn!(event_type = %event_type, error = %e, "Submitted event rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliverySettings;
    use crate::delivery::publisher::MemoryPublisher;
    use serde_json::json;
    use shared::event::EnvelopeBuilder;
    use std::time::Duration;

    #[tokio::test]
    async fn test_submissions_are_published_and_flushed_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Arc::new(MemoryPublisher::default());
        let coordinator = Arc::new(DeliveryCoordinator::new(
            EnvelopeBuilder::default(),
            publisher.clone(),
            DeliverySettings {
                retry_interval: Duration::from_secs(60),
                ..DeliverySettings::default()
            },
            dir.path().join("queue.json"),
            None,
        ));

        let token = CancellationToken::new();
        let (submitter, rx) = DeliveryWorker::channel(8);
        let handle = tokio::spawn(DeliveryWorker::new(coordinator.clone(), token.clone()).run(rx));

        for n in 0..3 {
            submitter.submit(Submission {
                event_type: "evidence.uploaded".into(),
                data: json!({ "n": n }),
                metadata: None,
            });
        }

        token.cancel();
        handle.await.unwrap();

        assert_eq!(publisher.delivered().len(), 3);
        assert!(submitter.is_closed());
        assert!(dir.path().join("queue.json").exists());
    }

    #[tokio::test]
    async fn test_startup_contacts_down_broker_once() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Arc::new(MemoryPublisher::default());
        publisher.set_online(false);
        let coordinator = Arc::new(DeliveryCoordinator::new(
            EnvelopeBuilder::default(),
            publisher.clone(),
            DeliverySettings {
                retry_interval: Duration::from_secs(60),
                ..DeliverySettings::default()
            },
            dir.path().join("queue.json"),
            None,
        ));

        let token = CancellationToken::new();
        let (_submitter, rx) = DeliveryWorker::channel(8);
        token.cancel();
        DeliveryWorker::new(coordinator, token).run(rx).await;

        assert_eq!(publisher.connect_count(), 1);
    }
}
