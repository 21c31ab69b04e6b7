//! Delivery Coordinator - 投递状态机
//!
//! 每条事件的状态：
//!
//! ```text
//! CREATED → VALIDATED ─┬─► SENT                      (broker 在线)
//!                      └─► QUEUED → RETRYING ─┬─► SENT
//!                                             └─► ABANDONED
//! ```
//!
//! Broker 连接状态：`Disconnected → Connecting → Connected`，
//! 任何一次发送失败都回到 `Disconnected`，等下一个重试周期再重连。
//!
//! # 并发约束
//!
//! - 同一时刻最多一个重投 pass (`pass_guard`，`try_lock` 抢不到直接跳过)
//! - 队列锁从不跨 `.await` 持有：pass 先拷贝快照，发送完成后按 eventId 回写结果
//! - `enqueue` 同步落盘，调用方拿到 `queued` 时事件已经写入快照

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared::error::AppError;
use shared::event::{EnvelopeBuilder, EnvelopeError, EventEnvelope, Priority};
use thiserror::Error;

use super::DeliverySettings;
use super::dead_letter::{AbandonReason, DeadLetterEntry, DeadLetterSink};
use super::publisher::{DeliveryHeaders, Publisher};
use super::queue::{DurableQueue, QueuedItem};
use crate::utils::logger::DELIVERY_LOG_TARGET;

/// Broker 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerState {
    Disconnected,
    Connecting,
    Connected,
}

/// 事件最终走的路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryRoute {
    Broker,
    Queued,
}

/// `publish` 的返回值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub success: bool,
    pub event_id: String,
    pub published: DeliveryRoute,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub will_retry: Option<bool>,
}

impl PublishReceipt {
    fn broker(event_id: String, topic: String) -> Self {
        Self {
            success: true,
            event_id,
            published: DeliveryRoute::Broker,
            topic: Some(topic),
            queue_size: None,
            will_retry: None,
        }
    }

    fn queued(event_id: String, queue_size: usize) -> Self {
        Self {
            success: true,
            event_id,
            published: DeliveryRoute::Queued,
            topic: None,
            queue_size: Some(queue_size),
            will_retry: Some(true),
        }
    }
}

/// `publish` 只会因为信封非法而失败
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(#[from] EnvelopeError),
}

impl From<PublishError> for AppError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::InvalidEnvelope(e) => e.into(),
        }
    }
}

/// 一次重投 pass 的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    /// 已有 pass 在运行，本次跳过
    pub skipped: bool,
    pub reconnected: bool,
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub abandoned: usize,
    pub remaining: usize,
}

impl PassReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// `clear` 的返回值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub cleared_count: usize,
}

/// 队列中单条事件的摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedEventSummary {
    pub event_id: String,
    pub event_type: String,
    pub priority: Priority,
    pub retry_count: u32,
    pub added_at: String,
}

/// 累计计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCounters {
    pub published_direct: u64,
    pub queued: u64,
    pub redelivered: u64,
    pub abandoned: u64,
    pub evicted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    published_direct: AtomicU64,
    queued: AtomicU64,
    redelivered: AtomicU64,
    abandoned: AtomicU64,
    evicted: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DeliveryCounters {
        DeliveryCounters {
            published_direct: self.published_direct.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

/// 队列统计 (运维接口)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queue_size: usize,
    pub oldest_event_timestamp: Option<String>,
    pub newest_event_timestamp: Option<String>,
    /// 最旧事件在队列中停留的毫秒数
    pub oldest_age_ms: Option<i64>,
    pub broker_connected: bool,
    pub broker_available: bool,
    pub broker_state: BrokerState,
    pub topic: String,
    pub retry_interval_ms: u64,
    pub max_retries: u32,
    pub max_queue_size: usize,
    pub dead_letter_count: usize,
    pub counters: DeliveryCounters,
    pub events: Vec<QueuedEventSummary>,
}

/// 连续重连失败时按 tick 指数退避：1, 2, 4, ... 个周期，封顶
#[derive(Debug)]
struct ReconnectBackoff {
    consecutive_failures: u32,
    skip_remaining: u32,
    max_skip: u32,
}

impl ReconnectBackoff {
    fn new(retry_interval: Duration, max_backoff: Duration) -> Self {
        let interval_ms = retry_interval.as_millis().max(1);
        let max_ticks = (max_backoff.as_millis() / interval_ms).max(1);
        Self {
            consecutive_failures: 0,
            skip_remaining: 0,
            max_skip: u32::try_from(max_ticks - 1).unwrap_or(u32::MAX),
        }
    }

    /// 本周期是否允许重连 (不允许时消耗一个跳过计数)
    fn should_attempt(&mut self) -> bool {
        if self.skip_remaining > 0 {
            self.skip_remaining -= 1;
            false
        } else {
            true
        }
    }

    /// 记录一次失败，返回接下来要跳过的周期数
    fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let exp = (self.consecutive_failures - 1).min(16);
        self.skip_remaining = (2u32.pow(exp) - 1).min(self.max_skip);
        self.skip_remaining
    }

    fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.skip_remaining = 0;
    }
}

enum Outcome {
    Delivered,
    Failed(String),
    Abandon(AbandonReason, Option<String>),
}

/// 投递协调器
///
/// 进程启动时构造一次，通过 `Arc` 共享给 HTTP 层和后台 worker。
pub struct DeliveryCoordinator {
    builder: EnvelopeBuilder,
    publisher: Arc<dyn Publisher>,
    settings: DeliverySettings,
    state: RwLock<BrokerState>,
    queue: Mutex<DurableQueue>,
    dead_letters: Option<Mutex<DeadLetterSink>>,
    pass_guard: tokio::sync::Mutex<()>,
    reconnect: Mutex<ReconnectBackoff>,
    counters: Counters,
}

impl std::fmt::Debug for DeliveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryCoordinator")
            .field("publisher", &self.publisher)
            .field("state", &*self.state.read())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl DeliveryCoordinator {
    /// 创建协调器 (不加载快照，也不连接 broker)
    ///
    /// `dead_letter_path` 为 None 时放弃的事件只记录日志。
    pub fn new(
        builder: EnvelopeBuilder,
        publisher: Arc<dyn Publisher>,
        settings: DeliverySettings,
        queue_path: impl Into<std::path::PathBuf>,
        dead_letter_path: Option<std::path::PathBuf>,
    ) -> Self {
        let queue = DurableQueue::new(queue_path, settings.max_queue_size);
        let reconnect =
            ReconnectBackoff::new(settings.retry_interval, settings.reconnect_max_backoff);

        Self {
            builder,
            publisher,
            state: RwLock::new(BrokerState::Disconnected),
            queue: Mutex::new(queue),
            dead_letters: dead_letter_path.map(|p| Mutex::new(DeadLetterSink::open(p))),
            pass_guard: tokio::sync::Mutex::new(()),
            reconnect: Mutex::new(reconnect),
            counters: Counters::default(),
            settings,
        }
    }

    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    pub fn builder(&self) -> &EnvelopeBuilder {
        &self.builder
    }

    pub fn broker_state(&self) -> BrokerState {
        *self.state.read()
    }

    pub fn queue_size(&self) -> usize {
        self.queue.lock().len()
    }

    fn set_state(&self, state: BrokerState) {
        *self.state.write() = state;
    }

    // ========== 连接管理 ==========

    /// 尝试连接 broker (受退避限制)，返回是否已连接
    pub async fn connect(&self) -> bool {
        if self.broker_state() == BrokerState::Connected {
            return true;
        }
        self.try_reconnect().await
    }

    async fn try_reconnect(&self) -> bool {
        if !self.reconnect.lock().should_attempt() {
            tracing::debug!("Broker reconnect backing off this cycle");
            return false;
        }

        self.set_state(BrokerState::Connecting);
        match self.publisher.connect().await {
            Ok(session) => {
                self.set_state(BrokerState::Connected);
                self.reconnect.lock().reset();
                tracing::info!(
                    endpoint = %session.endpoint,
                    topic = %session.topic,
                    "✅ Broker connected"
                );
                true
            }
            Err(e) => {
                self.set_state(BrokerState::Disconnected);
                let skip = self.reconnect.lock().record_failure();
                if self.publisher.is_available() {
                    tracing::warn!(error = %e, skip_cycles = skip, "Broker connect failed, events will be queued");
                } else {
                    tracing::debug!("No broker configured, running in queue-only mode");
                }
                false
            }
        }
    }

    fn mark_disconnected(&self) {
        let mut state = self.state.write();
        if *state == BrokerState::Connected {
            tracing::warn!("Broker marked disconnected after send failure");
        }
        *state = BrokerState::Disconnected;
    }

    // ========== 发布 ==========

    /// 构建、校验并投递事件
    ///
    /// 结构合法的事件永远返回成功 (`broker` 或 `queued`)，
    /// 只有信封非法时返回错误，且不会入队。
    pub async fn publish(
        &self,
        event_type: &str,
        data: Value,
        metadata: Option<Map<String, Value>>,
    ) -> Result<PublishReceipt, PublishError> {
        let envelope = self.builder.build(event_type, data, metadata);
        self.publish_envelope(envelope).await
    }

    /// 投递一个已构建好的信封
    pub async fn publish_envelope(
        &self,
        envelope: EventEnvelope,
    ) -> Result<PublishReceipt, PublishError> {
        envelope.check()?;

        if self.broker_state() == BrokerState::Connected {
            let headers = DeliveryHeaders::for_envelope(&envelope, None);
            match self.publisher.send(&envelope, &headers).await {
                Ok(ack) => {
                    self.counters.published_direct.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        event_id = %envelope.event_id,
                        event_type = %envelope.event_type,
                        "Event published to broker"
                    );
                    return Ok(PublishReceipt::broker(envelope.event_id, ack.topic));
                }
                Err(e) => {
                    tracing::warn!(
                        event_id = %envelope.event_id,
                        error = %e,
                        "Broker send failed, falling back to local queue"
                    );
                    if e.is_transport() {
                        self.mark_disconnected();
                    }
                }
            }
        }

        let event_id = envelope.event_id.clone();
        let queue_size = self.enqueue(envelope);
        Ok(PublishReceipt::queued(event_id, queue_size))
    }

    fn enqueue(&self, envelope: EventEnvelope) -> usize {
        let event_id = envelope.event_id.clone();
        let item = QueuedItem::new(envelope, self.settings.max_retries);

        let (evicted, size) = {
            let mut queue = self.queue.lock();
            let evicted = queue.enqueue(item);
            (evicted, queue.len())
        };
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        tracing::info!(event_id = %event_id, queue_size = size, "Event queued for retry");

        if !evicted.is_empty() {
            self.counters
                .evicted
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            tracing::warn!(
                evicted = evicted.len(),
                max_queue_size = self.settings.max_queue_size,
                "Local queue full, dropped oldest events"
            );
            self.abandon(
                evicted
                    .into_iter()
                    .map(|item| (item, AbandonReason::QueueOverflow))
                    .collect(),
            );
        }

        size
    }

    // ========== 重投 ==========

    /// 启动恢复：加载快照后立即跑一次重投
    ///
    /// 队列为空时只建立 broker 连接。
    pub async fn recover(&self) -> PassReport {
        let loaded = self.queue.lock().load_from_disk();
        if loaded > 0 {
            tracing::info!(count = loaded, "📦 Loaded pending events from disk");
        }
        if self.queue_size() == 0 {
            let reconnected = self.connect().await;
            return PassReport {
                reconnected,
                ..PassReport::default()
            };
        }
        self.process_queue().await
    }

    /// 重投 pass
    ///
    /// 1. 队列为空直接返回 (不重连)
    /// 2. 未连接时尝试一次重连，失败直接返回
    /// 3. 按 FIFO 逐条发送；达到上限或信封损坏的条目直接放弃
    /// 4. 发送失败：retryCount+1，位置不变。单条消息被拒继续下一条，
    ///    传输层故障则把 broker 标记为断开并结束本次 pass
    /// 5. 回写结果后落盘
    pub async fn process_queue(&self) -> PassReport {
        let Ok(_pass) = self.pass_guard.try_lock() else {
            tracing::debug!("Queue pass already in flight, skipping");
            return PassReport::skipped();
        };

        let mut report = PassReport::default();

        if self.queue_size() == 0 {
            return report;
        }

        if self.broker_state() != BrokerState::Connected {
            if !self.try_reconnect().await {
                report.remaining = self.queue_size();
                return report;
            }
            report.reconnected = true;
        }

        let snapshot = self.queue.lock().snapshot();
        if snapshot.is_empty() {
            return report;
        }
        tracing::debug!(count = snapshot.len(), "Processing local queue");

        let mut outcomes: Vec<(String, Outcome)> = Vec::with_capacity(snapshot.len());
        for item in snapshot {
            let event_id = item.event_id().to_string();

            if item.is_exhausted() {
                outcomes.push((event_id, Outcome::Abandon(AbandonReason::RetriesExhausted, None)));
                continue;
            }
            if let Err(e) = item.envelope.check() {
                outcomes.push((
                    event_id,
                    Outcome::Abandon(AbandonReason::InvalidEnvelope, Some(e.to_string())),
                ));
                continue;
            }

            report.attempted += 1;
            let headers = DeliveryHeaders::for_envelope(&item.envelope, Some(item.retry_count));
            match self.publisher.send(&item.envelope, &headers).await {
                Ok(_) => outcomes.push((event_id, Outcome::Delivered)),
                Err(e) => {
                    tracing::warn!(
                        event_id = %event_id,
                        retry_count = item.retry_count,
                        error = %e,
                        "Redelivery failed"
                    );
                    let transport = e.is_transport();
                    outcomes.push((event_id, Outcome::Failed(e.to_string())));
                    if transport {
                        self.mark_disconnected();
                        break;
                    }
                }
            }
        }

        let abandoned = self.apply_outcomes(outcomes, &mut report);
        self.abandon(abandoned);

        if report.delivered > 0 || report.abandoned > 0 {
            tracing::info!(
                delivered = report.delivered,
                failed = report.failed,
                abandoned = report.abandoned,
                remaining = report.remaining,
                "Queue pass finished"
            );
        }
        report
    }

    /// 在队列锁内回写结果并落盘，返回需要放弃的条目
    fn apply_outcomes(
        &self,
        outcomes: Vec<(String, Outcome)>,
        report: &mut PassReport,
    ) -> Vec<(QueuedItem, AbandonReason)> {
        let mut abandoned = Vec::new();
        let mut queue = self.queue.lock();

        for (event_id, outcome) in outcomes {
            match outcome {
                Outcome::Delivered => {
                    if queue.remove(&event_id).is_some() {
                        report.delivered += 1;
                        self.counters.redelivered.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Outcome::Failed(error) => {
                    let exhausted = match queue.get_mut(&event_id) {
                        Some(item) => {
                            item.retry_count += 1;
                            item.last_error = Some(error);
                            report.failed += 1;
                            item.is_exhausted()
                        }
                        None => false,
                    };
                    if exhausted && let Some(item) = queue.remove(&event_id) {
                        abandoned.push((item, AbandonReason::RetriesExhausted));
                    }
                }
                Outcome::Abandon(reason, error) => {
                    if let Some(mut item) = queue.remove(&event_id) {
                        if error.is_some() {
                            item.last_error = error;
                        }
                        abandoned.push((item, reason));
                    }
                }
            }
        }

        queue.persist();
        report.abandoned = abandoned
            .iter()
            .filter(|(_, reason)| *reason != AbandonReason::QueueOverflow)
            .count();
        report.remaining = queue.len();
        abandoned
    }

    /// 放弃条目：记录到 delivery 日志，写入死信 (若启用)
    fn abandon(&self, items: Vec<(QueuedItem, AbandonReason)>) {
        if items.is_empty() {
            return;
        }

        let mut entries = Vec::with_capacity(items.len());
        for (item, reason) in items {
            if reason != AbandonReason::QueueOverflow {
                self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
            }
            tracing::error!(
                target: DELIVERY_LOG_TARGET,
                event_id = %item.event_id(),
                event_type = %item.envelope.event_type,
                retry_count = item.retry_count,
                max_retries = item.max_retries,
                reason = %reason,
                last_error = ?item.last_error,
                "Event abandoned"
            );
            entries.push(DeadLetterEntry::from_item(item, reason));
        }

        if let Some(sink) = &self.dead_letters
            && let Err(e) = sink.lock().record(entries)
        {
            tracing::error!(error = %e, "Failed to write dead letter entries");
        }
    }

    // ========== 运维接口 ==========

    pub fn stats(&self) -> QueueStats {
        let now = shared::util::now_millis();

        let (queue_size, oldest, newest, events) = {
            let queue = self.queue.lock();
            let events = queue
                .iter()
                .map(|item| QueuedEventSummary {
                    event_id: item.envelope.event_id.clone(),
                    event_type: item.envelope.event_type.clone(),
                    priority: item.envelope.priority,
                    retry_count: item.retry_count,
                    added_at: item.added_at.clone(),
                })
                .collect::<Vec<_>>();
            (
                queue.len(),
                queue.front().map(|i| i.added_at.clone()),
                queue.back().map(|i| i.added_at.clone()),
                events,
            )
        };

        let oldest_age_ms = oldest
            .as_deref()
            .and_then(shared::util::parse_rfc3339_millis)
            .map(|t| (now - t).max(0));
        let dead_letter_count = self
            .dead_letters
            .as_ref()
            .map(|sink| sink.lock().len())
            .unwrap_or(0);
        let broker_state = self.broker_state();

        QueueStats {
            queue_size,
            oldest_event_timestamp: oldest,
            newest_event_timestamp: newest,
            oldest_age_ms,
            broker_connected: broker_state == BrokerState::Connected,
            broker_available: self.publisher.is_available(),
            broker_state,
            topic: self.publisher.topic().to_string(),
            retry_interval_ms: self.settings.retry_interval.as_millis() as u64,
            max_retries: self.settings.max_retries,
            max_queue_size: self.settings.max_queue_size,
            dead_letter_count,
            counters: self.counters.snapshot(),
            events,
        }
    }

    /// 清空本地队列 (管理操作，不可恢复)
    pub fn clear(&self) -> ClearReport {
        let cleared_count = self.queue.lock().clear();
        tracing::warn!(
            target: DELIVERY_LOG_TARGET,
            cleared_count,
            "Local queue cleared by operator"
        );
        ClearReport { cleared_count }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.dead_letters
            .as_ref()
            .map(|sink| sink.lock().entries())
            .unwrap_or_default()
    }

    /// 关闭：等待进行中的 pass，最终落盘，尽力断开 broker
    pub async fn shutdown(&self) {
        let _pass = self.pass_guard.lock().await;

        {
            let queue = self.queue.lock();
            match queue.drain_to_disk() {
                Ok(()) => tracing::info!(queue_size = queue.len(), "Local queue flushed on shutdown"),
                Err(e) => tracing::error!(error = %e, "Final queue flush failed"),
            }
        }

        if self.broker_state() == BrokerState::Connected
            && let Err(e) = self.publisher.disconnect().await
        {
            tracing::warn!(error = %e, "Broker disconnect failed");
        }
        self.set_state(BrokerState::Disconnected);
    }
}
