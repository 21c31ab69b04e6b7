//! 核心模块 - 配置、状态、后台任务和服务器
//!
//! # 模块结构
//!
//! - [`Config`] - 环境变量配置
//! - [`ServerState`] - 共享服务状态
//! - [`BackgroundTasks`] - 后台任务生命周期
//! - [`Server`] - HTTP 服务器

pub mod config;
pub mod error;
pub mod server;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use error::{Result, ServerError};
pub use server::Server;
pub use state::ServerState;
pub use tasks::{BackgroundTasks, TaskKind};
