//! Audit API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/audit | POST | 写入审计记录 |
//! | /api/audit/{id} | GET | 查询审计记录 (含链上字段) |
//! | /api/audit/{id}/verify | GET | 重新计算摘要并核对链上回执 |
//! | /api/audit/anchor/stats | GET | 锚定统计 |
//! | /api/audit/anchor/flush | POST | 立即锚定一个批次 |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/audit", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::create))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/verify", get(handler::verify))
        .route("/anchor/stats", get(handler::anchor_stats))
        .route("/anchor/flush", post(handler::anchor_flush))
}
