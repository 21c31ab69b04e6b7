//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// - 0xxx: General errors
/// - 1xxx: Event envelope errors
/// - 2xxx: Delivery errors
/// - 3xxx: Anchor errors
/// - 9xxx: System errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Event envelope errors (1xxx)
    Event,
    /// Delivery errors (2xxx)
    Delivery,
    /// Anchor errors (3xxx)
    Anchor,
    /// System errors (everything else)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Event,
            2000..3000 => Self::Delivery,
            3000..4000 => Self::Anchor,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Event => "event",
            Self::Delivery => "delivery",
            Self::Anchor => "anchor",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_code() {
        assert_eq!(ErrorCategory::from_code(0), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(999), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(1001), ErrorCategory::Event);
        assert_eq!(ErrorCategory::from_code(2004), ErrorCategory::Delivery);
        assert_eq!(ErrorCategory::from_code(3002), ErrorCategory::Anchor);
        assert_eq!(ErrorCategory::from_code(9001), ErrorCategory::System);
        assert_eq!(ErrorCategory::from_code(5000), ErrorCategory::System);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(
            ErrorCode::EventDataMissing.category(),
            ErrorCategory::Event
        );
        assert_eq!(
            ErrorCode::QueuePersistFailed.category(),
            ErrorCategory::Delivery
        );
        assert_eq!(ErrorCode::AnchorFailed.category(), ErrorCategory::Anchor);
        assert_eq!(ErrorCode::ConfigError.category(), ErrorCategory::System);
    }

    #[test]
    fn test_category_serialize() {
        let json = serde_json::to_string(&ErrorCategory::Delivery).unwrap();
        assert_eq!(json, "\"delivery\"");
        assert_eq!(ErrorCategory::Anchor.name(), "anchor");
    }
}
