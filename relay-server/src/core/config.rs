use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use shared::event::EnvelopeBuilder;

use crate::anchor::{AnchorRetryPolicy, AnchorSettings};
use crate::delivery::DeliverySettings;
use crate::delivery::publisher::BrokerSettings;

/// 队列快照文件 (相对 work_dir)
const QUEUE_FILE: &str = "queue/pending_events.json";
/// 死信文件 (相对 work_dir)
const DEAD_LETTER_FILE: &str = "queue/dead_letter.json";

/// 服务器配置 - 投递与锚定子系统的所有配置项
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./work_dir | 工作目录 (队列快照、死信、日志) |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境，写入 metadata.environment |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | false | 控制台 JSON 日志 |
/// | EVENT_SOURCE | fraud-evidence-backend | metadata.source |
/// | EVENT_SCHEMA_VERSION | 1.0.0 | metadata.version |
/// | BROKER_ENABLED | true | false 时只写本地队列 |
/// | BROKER_ENDPOINTS | http://localhost:8082 | broker 地址列表 (逗号分隔) |
/// | BROKER_TOPIC | fraud.events | 主题 |
/// | BROKER_TIMEOUT_MS | 5000 | 单次请求超时 |
/// | RETRY_INTERVAL_MS | 10000 | 重试定时器间隔 |
/// | MAX_RETRIES | 10 | 单条事件最大重试次数 |
/// | MAX_QUEUE_SIZE | 1000 | 本地队列上限 (超出丢弃最旧) |
/// | RECONNECT_MAX_BACKOFF_MS | 300000 | 重连退避上限 |
/// | DEAD_LETTER_ENABLED | true | 放弃的事件写入死信文件 |
/// | SUBMIT_BUFFER | 1024 | fire-and-forget 通道容量 |
/// | ANCHOR_BATCH_SIZE | 10 | 每批锚定条数 |
/// | ANCHOR_INTERVAL_MS | 30000 | 锚定间隔 |
/// | ANCHOR_MAX_RETRIES | 0 | 0 = 无限重试 |
/// | ANCHOR_RPC_URL | (未设置) | 未设置时使用确定性 mock 链 |
/// | ANCHOR_TIMEOUT_MS | 30000 | 锚定请求超时 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/relay BROKER_ENDPOINTS=http://kafka-rest:8082 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    pub event_source: String,
    pub event_schema_version: String,

    // === Broker ===
    pub broker_enabled: bool,
    pub broker_endpoints: Vec<String>,
    pub broker_topic: String,
    pub broker_timeout_ms: u64,

    // === 本地队列 / 重试 ===
    pub retry_interval_ms: u64,
    pub max_retries: u32,
    pub max_queue_size: usize,
    pub reconnect_max_backoff_ms: u64,
    pub dead_letter_enabled: bool,
    pub submit_buffer: usize,

    // === 审计锚定 ===
    pub anchor_batch_size: usize,
    pub anchor_interval_ms: u64,
    /// 0 表示无限重试
    pub anchor_max_retries: u32,
    pub anchor_rpc_url: Option<String>,
    pub anchor_timeout_ms: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./work_dir".into()),
            http_port: env_or("HTTP_PORT", 3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_or("LOG_JSON", false),
            event_source: std::env::var("EVENT_SOURCE")
                .unwrap_or_else(|_| "fraud-evidence-backend".into()),
            event_schema_version: std::env::var("EVENT_SCHEMA_VERSION")
                .unwrap_or_else(|_| "1.0.0".into()),

            broker_enabled: env_or("BROKER_ENABLED", true),
            broker_endpoints: std::env::var("BROKER_ENDPOINTS")
                .map(|v| parse_endpoints(&v))
                .unwrap_or_else(|_| vec!["http://localhost:8082".into()]),
            broker_topic: std::env::var("BROKER_TOPIC").unwrap_or_else(|_| "fraud.events".into()),
            broker_timeout_ms: env_or("BROKER_TIMEOUT_MS", 5000),

            retry_interval_ms: env_or("RETRY_INTERVAL_MS", 10_000),
            max_retries: env_or("MAX_RETRIES", 10),
            max_queue_size: env_or("MAX_QUEUE_SIZE", 1000),
            reconnect_max_backoff_ms: env_or("RECONNECT_MAX_BACKOFF_MS", 300_000),
            dead_letter_enabled: env_or("DEAD_LETTER_ENABLED", true),
            submit_buffer: env_or("SUBMIT_BUFFER", 1024),

            anchor_batch_size: env_or("ANCHOR_BATCH_SIZE", 10),
            anchor_interval_ms: env_or("ANCHOR_INTERVAL_MS", 30_000),
            anchor_max_retries: env_or("ANCHOR_MAX_RETRIES", 0),
            anchor_rpc_url: std::env::var("ANCHOR_RPC_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            anchor_timeout_ms: env_or("ANCHOR_TIMEOUT_MS", 30_000),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn queue_file(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join(QUEUE_FILE)
    }

    pub fn dead_letter_file(&self) -> Option<PathBuf> {
        self.dead_letter_enabled
            .then(|| PathBuf::from(&self.work_dir).join(DEAD_LETTER_FILE))
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    pub fn envelope_builder(&self) -> EnvelopeBuilder {
        EnvelopeBuilder::new(
            &self.event_source,
            &self.event_schema_version,
            &self.environment,
        )
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            endpoints: self.broker_endpoints.clone(),
            topic: self.broker_topic.clone(),
            timeout: Duration::from_millis(self.broker_timeout_ms),
        }
    }

    pub fn delivery_settings(&self) -> DeliverySettings {
        DeliverySettings {
            retry_interval: Duration::from_millis(self.retry_interval_ms.max(1)),
            max_retries: self.max_retries,
            max_queue_size: self.max_queue_size.max(1),
            reconnect_max_backoff: Duration::from_millis(self.reconnect_max_backoff_ms),
        }
    }

    pub fn anchor_settings(&self) -> AnchorSettings {
        AnchorSettings {
            batch_size: self.anchor_batch_size.max(1),
            interval: Duration::from_millis(self.anchor_interval_ms.max(1)),
            retry_policy: AnchorRetryPolicy::from_max_retries(self.anchor_max_retries),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
