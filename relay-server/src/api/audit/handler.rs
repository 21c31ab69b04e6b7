//! Audit API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Map, Value, json};

use crate::anchor::{AnchorStats, AnchorVerification, FlushReport};
use crate::api::extract::ValidatedJson;
use crate::audit::{AuditLogRequest, AuditRecord};
use crate::core::ServerState;
use crate::delivery::Submission;
use crate::utils::{AppError, AppResult, ErrorCode};
use shared::event::EventType;

/// 审计操作 → 对外事件类型
fn event_type_for(action: &str) -> Option<EventType> {
    match action {
        "evidence_upload" => Some(EventType::EvidenceUploaded),
        "evidence_anchor" => Some(EventType::EvidenceAnchored),
        "evidence_delete" => Some(EventType::EvidenceDeleted),
        "case_escalate" => Some(EventType::CaseEscalated),
        "unauthorized_access" => Some(EventType::UnauthorizedAccess),
        "rl_feedback" => Some(EventType::FeedbackReceived),
        _ => None,
    }
}

/// POST /api/audit - 写入审计记录
///
/// 有对应事件类型的操作会同时提交一条事件 (不等待投递结果)。
pub async fn create(
    State(state): State<ServerState>,
    ValidatedJson(payload): ValidatedJson<AuditLogRequest>,
) -> AppResult<Json<AuditRecord>> {
    let record = state.audit.record(payload).await?;

    if let Some(event_type) = event_type_for(&record.action) {
        let mut metadata = Map::new();
        metadata.insert("priority".into(), Value::String(record.severity.as_str().into()));
        metadata.insert("auditId".into(), Value::String(record.id.clone()));

        state.submitter.submit(Submission {
            event_type: event_type.as_str().to_string(),
            data: json!({
                "auditId": record.id,
                "action": record.action,
                "resourceType": record.resource_type,
                "resourceId": record.resource_id,
                "userId": record.user_id,
                "status": record.status,
            }),
            metadata: Some(metadata),
        });
    }

    Ok(Json(record))
}

/// GET /api/audit/{id}
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<AuditRecord>> {
    let record = state.audit.get(&id).await?.ok_or_else(|| not_found(&id))?;
    Ok(Json(record))
}

/// GET /api/audit/{id}/verify
pub async fn verify(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<AnchorVerification>> {
    let result = state.audit.verify(&id).await?.ok_or_else(|| not_found(&id))?;
    Ok(Json(result))
}

fn not_found(id: &str) -> AppError {
    AppError::with_message(
        ErrorCode::AuditRecordNotFound,
        format!("Audit record {} not found", id),
    )
}

/// GET /api/audit/anchor/stats
pub async fn anchor_stats(State(state): State<ServerState>) -> Json<AnchorStats> {
    Json(state.anchor.stats())
}

/// POST /api/audit/anchor/flush
pub async fn anchor_flush(State(state): State<ServerState>) -> Json<FlushReport> {
    Json(state.anchor.flush_batch().await)
}
