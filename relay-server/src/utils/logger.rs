//! Logging Infrastructure
//!
//! 控制台 + 按天滚动的应用日志文件，另有一个不滚动的 `delivery.log`
//! 专门记录 `target: "delivery"` 的事件 (放弃投递、清空队列等数据丢失路径)。
//!
//! `RUST_LOG` 优先于传入的级别。

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// 数据丢失路径使用的日志 target
pub const DELIVERY_LOG_TARGET: &str = "delivery";

/// 应用日志文件前缀
const APP_LOG_PREFIX: &str = "relay-server";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the logger
pub fn init_logger() {
    init_logger_with_file(None, false, None);
}

/// Initialize the logger with optional file output
///
/// 重复初始化 (例如多个测试) 会被忽略。
pub fn init_logger_with_file(log_level: Option<&str>, json: bool, log_dir: Option<&Path>) {
    let level = log_level.unwrap_or("info");
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console = if json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_filter(env_filter(level))
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_filter(env_filter(level))
            .boxed()
    };
    layers.push(console);

    if let Some(dir) = log_dir {
        match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let app_file = tracing_appender::rolling::daily(dir, APP_LOG_PREFIX);
                layers.push(
                    fmt::layer()
                        .json()
                        .with_ansi(false)
                        .with_writer(app_file)
                        .with_filter(env_filter(level))
                        .boxed(),
                );

                let delivery_file = tracing_appender::rolling::never(dir, "delivery.log");
                layers.push(
                    fmt::layer()
                        .json()
                        .with_ansi(false)
                        .with_writer(delivery_file)
                        .with_filter(Targets::new().with_target(DELIVERY_LOG_TARGET, Level::INFO))
                        .boxed(),
                );
            }
            Err(e) => {
                eprintln!("Failed to create log dir {}: {e}", dir.display());
            }
        }
    }

    let _ = tracing_subscriber::registry().with(layers).try_init();
}

/// Clean up rotated application logs older than `days`
///
/// `delivery.log` 永久保留。返回删除的文件数。
pub fn cleanup_old_logs(log_dir: &Path, days: u64) -> std::io::Result<usize> {
    let max_age = Duration::from_secs(days * 24 * 60 * 60);
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(APP_LOG_PREFIX) {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        let age = now.duration_since(modified).unwrap_or_default();
        if age >= max_age {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_keeps_recent_and_delivery_logs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("relay-server.2024-01-01"), "old").unwrap();
        std::fs::write(dir.path().join("delivery.log"), "keep").unwrap();

        // Nothing is older than a day yet
        let removed = cleanup_old_logs(dir.path(), 1).unwrap();
        assert_eq!(removed, 0);

        // Zero-day retention removes rotated app logs only
        let removed = cleanup_old_logs(dir.path(), 0).unwrap();
        assert_eq!(removed, 1);
        assert!(dir.path().join("delivery.log").exists());
    }
}
