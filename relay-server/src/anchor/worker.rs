//! 锚定定时任务

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::coordinator::BatchAnchorCoordinator;

pub struct AnchorWorker {
    coordinator: Arc<BatchAnchorCoordinator>,
    shutdown: CancellationToken,
}

impl AnchorWorker {
    pub fn new(coordinator: Arc<BatchAnchorCoordinator>, shutdown: CancellationToken) -> Self {
        Self {
            coordinator,
            shutdown,
        }
    }

    /// 定时 flush，取消时再 flush 一次
    pub async fn run(self) {
        let interval = self.coordinator.settings().interval;
        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            batch_size = self.coordinator.settings().batch_size,
            "⏰ Audit anchor worker started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let report = self.coordinator.flush_batch().await;
                    tracing::info!(
                        anchored = report.anchored,
                        remaining = report.remaining,
                        "Audit anchor worker stopped"
                    );
                    break;
                }
                _ = ticker.tick() => {
                    if self.coordinator.pending_count() > 0 {
                        self.coordinator.flush_batch().await;
                    }
                }
            }
        }
    }
}
