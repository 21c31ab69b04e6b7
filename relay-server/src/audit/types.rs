//! 审计记录类型

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// 审计严重级别
///
/// `high` / `critical` 的记录会进入锚定批次。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// 是否需要上链锚定
    pub fn requires_anchor(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }

    /// 按操作名推导严重级别
    ///
    /// 失败的普通操作提升为 `high`。
    pub fn derive(action: &str, status: AuditStatus) -> Self {
        // ═══ 关键操作 ═══
        const CRITICAL: &[&str] = &[
            "evidence_delete",
            "case_escalate",
            "user_delete",
            "system_config",
            "unauthorized_access",
        ];
        // ═══ 高危操作 ═══
        const HIGH: &[&str] = &["evidence_anchor", "case_delete", "user_create", "rl_feedback"];

        if CRITICAL.contains(&action) {
            Severity::Critical
        } else if HIGH.contains(&action) || status == AuditStatus::Failure {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    #[default]
    Success,
    Failure,
}

/// 审计写入请求 (HTTP body)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogRequest {
    #[validate(length(min = 1, max = 128))]
    pub action: String,
    #[validate(length(min = 1, max = 64))]
    pub resource_type: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    /// 缺省为 "system"
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub status: AuditStatus,
    /// 显式指定时覆盖推导结果
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub details: Value,
}

/// 已落库的审计记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub user_id: String,
    pub user_email: Option<String>,
    pub status: AuditStatus,
    pub severity: Severity,
    pub details: Value,
    pub timestamp: String,
    /// SHA256(action:resource_type:resource_id:user_id:timestamp)
    pub digest: String,
    pub blockchain_tx_hash: Option<String>,
    pub blockchain_block_number: Option<u64>,
    pub anchored_at: Option<String>,
    /// 一旦为 true 不再回退
    pub blockchain_synced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_rules() {
        assert_eq!(Severity::derive("evidence_delete", AuditStatus::Success), Severity::Critical);
        assert_eq!(Severity::derive("unauthorized_access", AuditStatus::Failure), Severity::Critical);
        assert_eq!(Severity::derive("rl_feedback", AuditStatus::Success), Severity::High);
        assert_eq!(Severity::derive("case_view", AuditStatus::Success), Severity::Medium);
        assert_eq!(Severity::derive("case_view", AuditStatus::Failure), Severity::High);
    }

    #[test]
    fn test_anchor_threshold() {
        assert!(!Severity::Low.requires_anchor());
        assert!(!Severity::Medium.requires_anchor());
        assert!(Severity::High.requires_anchor());
        assert!(Severity::Critical.requires_anchor());
    }

    #[test]
    fn test_request_defaults() {
        let req: AuditLogRequest =
            serde_json::from_str(r#"{"action":"case_view","resourceType":"case"}"#).unwrap();
        assert_eq!(req.status, AuditStatus::Success);
        assert!(req.severity.is_none());
        assert!(req.validate().is_ok());

        let empty: AuditLogRequest =
            serde_json::from_str(r#"{"action":"","resourceType":"case"}"#).unwrap();
        assert!(empty.validate().is_err());
    }
}
