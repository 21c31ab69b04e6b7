//! Evidence Relay - 证据系统事件投递与审计锚定服务
//!
//! # 架构概述
//!
//! - **事件投递** (`delivery`): 信封校验 → broker 直投，失败时进入持久化本地队列定时重投
//! - **审计锚定** (`anchor`): high/critical 审计记录批量上链，`mark_synced` 幂等写回
//! - **审计日志** (`audit`): 严重级别推导、摘要计算、记录存储
//! - **HTTP API** (`api`): 发布、队列运维、审计查询
//!
//! # 模块结构
//!
//! ```text
//! relay-server/src/
//! ├── core/          # 配置、状态、后台任务、服务器
//! ├── delivery/      # 本地队列、publisher、投递协调器
//! ├── anchor/        # 锚定客户端、批量协调器
//! ├── audit/         # 审计服务和存储
//! ├── api/           # HTTP 路由和处理器
//! └── utils/         # 日志
//! ```

pub mod anchor;
pub mod api;
pub mod audit;
pub mod core;
pub mod delivery;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use delivery::{DeliveryCoordinator, PublishReceipt, QueueStats};
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ApiResponse, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};

/// 应用日志保留天数
const LOG_RETENTION_DAYS: u64 = 30;

/// 设置运行环境
///
/// 1. 加载 `.env`
/// 2. 读取配置并创建工作目录
/// 3. 初始化日志 (控制台 + 滚动文件 + delivery 日志)
pub fn setup_environment() -> std::io::Result<Config> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&config.work_dir)?;
    std::fs::create_dir_all(&log_dir)?;

    init_logger_with_file(Some(&config.log_level), config.log_json, Some(&log_dir));

    match cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS) {
        Ok(0) => {}
        Ok(n) => tracing::info!(removed = n, "Old log files cleaned up"),
        Err(e) => tracing::warn!(error = %e, "Failed to clean up old logs"),
    }

    Ok(config)
}

pub fn print_banner() {
    println!(
        r#"
    ____       __
   / __ \___  / /___ ___  __
  / /_/ / _ \/ / __ `/ / / /
 / _, _/  __/ / /_/ / /_/ /
/_/ |_|\___/_/\__,_/\__, /
                   /____/
    "#
    );
}
