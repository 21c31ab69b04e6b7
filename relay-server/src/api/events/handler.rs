//! Event API Handlers

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use validator::Validate;

use crate::api::extract::ValidatedJson;
use crate::core::ServerState;
use crate::delivery::{ClearReport, DeadLetterEntry, PassReport, PublishReceipt, QueueStats};
use crate::utils::AppResult;
use shared::event::EventType;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PublishEventRequest {
    #[validate(length(min = 1, max = 128))]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// POST /api/events - 发布事件
///
/// 结构合法的事件总是成功 (`broker` 或 `queued`)，`data` 缺失返回 400。
pub async fn publish(
    State(state): State<ServerState>,
    ValidatedJson(payload): ValidatedJson<PublishEventRequest>,
) -> AppResult<Json<PublishReceipt>> {
    let receipt = state
        .delivery
        .publish(&payload.event_type, payload.data, payload.metadata)
        .await?;
    Ok(Json(receipt))
}

/// POST /api/events/test - 发布一条 system.alert 测试事件
pub async fn publish_test(State(state): State<ServerState>) -> AppResult<Json<PublishReceipt>> {
    let mut metadata = Map::new();
    metadata.insert("test".into(), Value::Bool(true));

    let receipt = state
        .delivery
        .publish(
            EventType::SystemAlert.as_str(),
            json!({
                "message": "Test event from evidence relay",
                "test": true,
            }),
            Some(metadata),
        )
        .await?;

    tracing::info!(event_id = %receipt.event_id, route = ?receipt.published, "Test event published");
    Ok(Json(receipt))
}

/// GET /api/events/queue/stats
pub async fn queue_stats(State(state): State<ServerState>) -> Json<QueueStats> {
    Json(state.delivery.stats())
}

/// DELETE /api/events/queue
pub async fn clear_queue(State(state): State<ServerState>) -> Json<ClearReport> {
    Json(state.delivery.clear())
}

/// POST /api/events/queue/process
pub async fn process_queue(State(state): State<ServerState>) -> Json<PassReport> {
    Json(state.delivery.process_queue().await)
}

/// GET /api/events/dead-letters
pub async fn dead_letters(State(state): State<ServerState>) -> Json<Vec<DeadLetterEntry>> {
    Json(state.delivery.dead_letters())
}
