//! 事件类型与优先级
//!
//! 业务事件的封闭枚举。线上格式为点分字符串 (`evidence.uploaded`)，
//! 未知类型不会被拒绝，只是按 `medium` 优先级处理。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 业务事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    // Evidence
    #[serde(rename = "evidence.uploaded")]
    EvidenceUploaded,
    #[serde(rename = "evidence.verified")]
    EvidenceVerified,
    #[serde(rename = "evidence.anchored")]
    EvidenceAnchored,
    #[serde(rename = "evidence.downloaded")]
    EvidenceDownloaded,
    #[serde(rename = "evidence.deleted")]
    EvidenceDeleted,

    // Case
    #[serde(rename = "case.created")]
    CaseCreated,
    #[serde(rename = "case.updated")]
    CaseUpdated,
    #[serde(rename = "case.assigned")]
    CaseAssigned,
    #[serde(rename = "case.escalated")]
    CaseEscalated,
    #[serde(rename = "case.closed")]
    CaseClosed,

    // Risk model
    #[serde(rename = "rl.prediction.made")]
    PredictionMade,
    #[serde(rename = "rl.feedback.received")]
    FeedbackReceived,
    #[serde(rename = "rl.model.updated")]
    ModelUpdated,

    // User
    #[serde(rename = "user.login")]
    UserLogin,
    #[serde(rename = "user.logout")]
    UserLogout,
    #[serde(rename = "user.unauthorized_access")]
    UnauthorizedAccess,

    // System
    #[serde(rename = "system.alert")]
    SystemAlert,
    #[serde(rename = "system.error")]
    SystemError,
}

impl EventType {
    pub const ALL: [EventType; 18] = [
        EventType::EvidenceUploaded,
        EventType::EvidenceVerified,
        EventType::EvidenceAnchored,
        EventType::EvidenceDownloaded,
        EventType::EvidenceDeleted,
        EventType::CaseCreated,
        EventType::CaseUpdated,
        EventType::CaseAssigned,
        EventType::CaseEscalated,
        EventType::CaseClosed,
        EventType::PredictionMade,
        EventType::FeedbackReceived,
        EventType::ModelUpdated,
        EventType::UserLogin,
        EventType::UserLogout,
        EventType::UnauthorizedAccess,
        EventType::SystemAlert,
        EventType::SystemError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EvidenceUploaded => "evidence.uploaded",
            EventType::EvidenceVerified => "evidence.verified",
            EventType::EvidenceAnchored => "evidence.anchored",
            EventType::EvidenceDownloaded => "evidence.downloaded",
            EventType::EvidenceDeleted => "evidence.deleted",
            EventType::CaseCreated => "case.created",
            EventType::CaseUpdated => "case.updated",
            EventType::CaseAssigned => "case.assigned",
            EventType::CaseEscalated => "case.escalated",
            EventType::CaseClosed => "case.closed",
            EventType::PredictionMade => "rl.prediction.made",
            EventType::FeedbackReceived => "rl.feedback.received",
            EventType::ModelUpdated => "rl.model.updated",
            EventType::UserLogin => "user.login",
            EventType::UserLogout => "user.logout",
            EventType::UnauthorizedAccess => "user.unauthorized_access",
            EventType::SystemAlert => "system.alert",
            EventType::SystemError => "system.error",
        }
    }

    /// 静态优先级表
    pub fn default_priority(&self) -> Priority {
        match self {
            EventType::EvidenceDeleted
            | EventType::CaseEscalated
            | EventType::SystemAlert
            | EventType::UnauthorizedAccess => Priority::Critical,
            EventType::EvidenceAnchored | EventType::FeedbackReceived | EventType::CaseClosed => {
                Priority::High
            }
            _ => Priority::Medium,
        }
    }

    /// 根据线上字符串推导优先级，未知类型返回 `medium`
    pub fn priority_of(event_type: &str) -> Priority {
        event_type
            .parse::<EventType>()
            .map(|t| t.default_priority())
            .unwrap_or_default()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未登记的事件类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType(pub String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// 事件优先级
///
/// 只影响发往 broker 的 header/metadata，本地队列始终 FIFO。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_serde() {
        for t in EventType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
    }

    #[test]
    fn test_priority_table() {
        assert_eq!(EventType::priority_of("evidence.deleted"), Priority::Critical);
        assert_eq!(EventType::priority_of("case.escalated"), Priority::Critical);
        assert_eq!(EventType::priority_of("system.alert"), Priority::Critical);
        assert_eq!(
            EventType::priority_of("user.unauthorized_access"),
            Priority::Critical
        );
        assert_eq!(EventType::priority_of("evidence.anchored"), Priority::High);
        assert_eq!(EventType::priority_of("rl.feedback.received"), Priority::High);
        assert_eq!(EventType::priority_of("case.closed"), Priority::High);
        assert_eq!(EventType::priority_of("evidence.uploaded"), Priority::Medium);
        assert_eq!(EventType::priority_of("user.login"), Priority::Medium);
    }

    #[test]
    fn test_unknown_type_defaults_to_medium() {
        assert!("evidence.shredded".parse::<EventType>().is_err());
        assert_eq!(EventType::priority_of("evidence.shredded"), Priority::Medium);
        assert_eq!(EventType::priority_of(""), Priority::Medium);
    }

    #[test]
    fn test_priority_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Priority::Critical).unwrap(), "\"critical\"");
        let p: Priority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(p, Priority::Low);
        assert!(Priority::Critical > Priority::High);
    }
}
