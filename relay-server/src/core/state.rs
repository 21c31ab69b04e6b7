use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::anchor::{AnchorClient, AnchorWorker, BatchAnchorCoordinator, HttpAnchorClient, MockChainAnchor};
use crate::audit::{AuditRecordStore, AuditService, MemoryAuditStore};
use crate::core::Config;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::delivery::publisher::{HttpBrokerPublisher, Publisher, QueueOnlyPublisher};
use crate::delivery::{DeliveryCoordinator, DeliverySubmitter, DeliveryWorker, Submission};

/// 服务器状态 - 持有所有服务的共享引用
///
/// 使用 Arc 实现浅拷贝，handler 通过 `State<ServerState>` 获取。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | delivery | 投递协调器 |
/// | submitter | fire-and-forget 发布入口 |
/// | audit | 审计日志服务 |
/// | anchor | 批量锚定协调器 |
#[derive(Clone, Debug)]
pub struct ServerState {
    pub config: Config,
    pub delivery: Arc<DeliveryCoordinator>,
    pub submitter: DeliverySubmitter,
    pub audit: AuditService,
    pub anchor: Arc<BatchAnchorCoordinator>,
    /// 投递 worker 的接收端，`start_background_tasks` 时取走
    submissions: Arc<Mutex<Option<mpsc::Receiver<Submission>>>>,
}

impl ServerState {
    /// 按配置初始化
    ///
    /// - `BROKER_ENABLED=false` 或 broker 客户端构建失败 → 仅队列模式
    /// - 未设置 `ANCHOR_RPC_URL` → 模拟链
    pub fn initialize(config: &Config) -> Self {
        let publisher = build_publisher(config);
        let anchor_client = build_anchor_client(config);
        Self::with_components(config, publisher, anchor_client, Arc::new(MemoryAuditStore::new()))
    }

    /// 用指定组件构造 (测试注入内存实现)
    pub fn with_components(
        config: &Config,
        publisher: Arc<dyn Publisher>,
        anchor_client: Arc<dyn AnchorClient>,
        store: Arc<dyn AuditRecordStore>,
    ) -> Self {
        let delivery = Arc::new(DeliveryCoordinator::new(
            config.envelope_builder(),
            publisher,
            config.delivery_settings(),
            config.queue_file(),
            config.dead_letter_file(),
        ));
        let (submitter, rx) = DeliveryWorker::channel(config.submit_buffer);

        let anchor = Arc::new(BatchAnchorCoordinator::new(
            anchor_client,
            store.clone(),
            config.anchor_settings(),
        ));
        let audit = AuditService::new(store, anchor.clone());

        Self {
            config: config.clone(),
            delivery,
            submitter,
            audit,
            anchor,
            submissions: Arc::new(Mutex::new(Some(rx))),
        }
    }

    /// 启动后台任务
    ///
    /// 启动的任务：
    /// - 投递 worker (连接 broker、恢复快照、定时重投、消费提交通道)
    /// - 锚定 worker (定时 flush)
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        match self.submissions.lock().take() {
            Some(rx) => {
                let worker = DeliveryWorker::new(self.delivery.clone(), tasks.shutdown_token());
                tasks.spawn("delivery_worker", TaskKind::Worker, worker.run(rx));
            }
            None => tracing::warn!("Delivery worker already started"),
        }

        let anchor_worker = AnchorWorker::new(self.anchor.clone(), tasks.shutdown_token());
        tasks.spawn("anchor_worker", TaskKind::Periodic, anchor_worker.run());

        tasks.log_summary();
        tasks
    }
}

fn build_publisher(config: &Config) -> Arc<dyn Publisher> {
    if !config.broker_enabled {
        tracing::info!("Broker disabled, events will stay in the local queue");
        return Arc::new(QueueOnlyPublisher::new(&config.broker_topic));
    }

    match HttpBrokerPublisher::new(config.broker_settings()) {
        Ok(publisher) => Arc::new(publisher),
        Err(e) => {
            tracing::warn!(error = %e, "Broker client unavailable, falling back to queue-only mode");
            Arc::new(QueueOnlyPublisher::new(&config.broker_topic))
        }
    }
}

fn build_anchor_client(config: &Config) -> Arc<dyn AnchorClient> {
    let Some(rpc_url) = config.anchor_rpc_url.as_deref() else {
        tracing::info!("ANCHOR_RPC_URL not set, using mock chain");
        return Arc::new(MockChainAnchor::new());
    };

    match HttpAnchorClient::new(rpc_url, Duration::from_millis(config.anchor_timeout_ms)) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "Anchor client unavailable, using mock chain");
            Arc::new(MockChainAnchor::new())
        }
    }
}
