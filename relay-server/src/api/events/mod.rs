//! Event API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/events | POST | 发布事件 |
//! | /api/events/test | POST | 发布一条测试事件 |
//! | /api/events/queue/stats | GET | 本地队列统计 |
//! | /api/events/queue | DELETE | 清空本地队列 |
//! | /api/events/queue/process | POST | 立即执行一次重投 |
//! | /api/events/dead-letters | GET | 死信列表 |

mod handler;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::core::ServerState;

pub use handler::PublishEventRequest;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/events", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::publish))
        .route("/test", post(handler::publish_test))
        .route("/queue/stats", get(handler::queue_stats))
        .route("/queue", delete(handler::clear_queue))
        .route("/queue/process", post(handler::process_queue))
        .route("/dead-letters", get(handler::dead_letters))
}
