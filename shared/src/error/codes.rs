//! Unified error codes for the relay workspace
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Event envelope errors
//! - 2xxx: Delivery errors (broker, local queue)
//! - 3xxx: Anchor errors (audit records, chain anchoring)
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values so they serialize the same
/// way for Rust callers and the JSON consumers of the operational API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,

    // ==================== 1xxx: Event ====================
    /// Envelope failed structural validation
    EnvelopeInvalid = 1001,
    /// Envelope has no payload
    EventDataMissing = 1002,
    /// Envelope has no event type
    EventTypeMissing = 1003,

    // ==================== 2xxx: Delivery ====================
    /// Broker could not be reached
    BrokerUnavailable = 2001,
    /// Broker rejected or failed a send
    BrokerSendFailed = 2002,
    /// Queue snapshot could not be written or read
    QueuePersistFailed = 2003,
    /// Queue reached its capacity
    QueueOverflow = 2004,
    /// Delivery subsystem is shutting down
    DeliveryShuttingDown = 2005,

    // ==================== 3xxx: Anchor ====================
    /// Anchoring request failed
    AnchorFailed = 3001,
    /// Audit record not found
    AuditRecordNotFound = 3002,
    /// Anchoring service unreachable
    AnchorServiceUnavailable = 3003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Configuration error
    ConfigError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Operation timed out
    TimeoutError = 9004,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",

            // Event
            ErrorCode::EnvelopeInvalid => "Event envelope is invalid",
            ErrorCode::EventDataMissing => "Event data is required",
            ErrorCode::EventTypeMissing => "Event type is required",

            // Delivery
            ErrorCode::BrokerUnavailable => "Message broker is unavailable",
            ErrorCode::BrokerSendFailed => "Message broker send failed",
            ErrorCode::QueuePersistFailed => "Local queue persistence failed",
            ErrorCode::QueueOverflow => "Local queue is full",
            ErrorCode::DeliveryShuttingDown => "Delivery is shutting down",

            // Anchor
            ErrorCode::AnchorFailed => "Blockchain anchoring failed",
            ErrorCode::AuditRecordNotFound => "Audit record not found",
            ErrorCode::AnchorServiceUnavailable => "Anchoring service is unavailable",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),

            // Event
            1001 => Ok(ErrorCode::EnvelopeInvalid),
            1002 => Ok(ErrorCode::EventDataMissing),
            1003 => Ok(ErrorCode::EventTypeMissing),

            // Delivery
            2001 => Ok(ErrorCode::BrokerUnavailable),
            2002 => Ok(ErrorCode::BrokerSendFailed),
            2003 => Ok(ErrorCode::QueuePersistFailed),
            2004 => Ok(ErrorCode::QueueOverflow),
            2005 => Ok(ErrorCode::DeliveryShuttingDown),

            // Anchor
            3001 => Ok(ErrorCode::AnchorFailed),
            3002 => Ok(ErrorCode::AuditRecordNotFound),
            3003 => Ok(ErrorCode::AnchorServiceUnavailable),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::ConfigError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::ValidationFailed.code(), 2);
        assert_eq!(ErrorCode::EnvelopeInvalid.code(), 1001);
        assert_eq!(ErrorCode::BrokerUnavailable.code(), 2001);
        assert_eq!(ErrorCode::QueuePersistFailed.code(), 2003);
        assert_eq!(ErrorCode::AnchorFailed.code(), 3001);
        assert_eq!(ErrorCode::InternalError.code(), 9001);
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(1999), Err(InvalidErrorCode(1999)));
        assert_eq!(ErrorCode::try_from(4001), Err(InvalidErrorCode(4001)));
    }

    #[test]
    fn test_serialize_as_number() {
        let json = serde_json::to_string(&ErrorCode::BrokerSendFailed).unwrap();
        assert_eq!(json, "2002");

        let parsed: ErrorCode = serde_json::from_str("3002").unwrap();
        assert_eq!(parsed, ErrorCode::AuditRecordNotFound);

        assert!(serde_json::from_str::<ErrorCode>("12345").is_err());
    }

    #[test]
    fn test_every_code_roundtrips_through_u16() {
        let codes = [
            ErrorCode::Success,
            ErrorCode::Unknown,
            ErrorCode::ValidationFailed,
            ErrorCode::NotFound,
            ErrorCode::AlreadyExists,
            ErrorCode::InvalidRequest,
            ErrorCode::InvalidFormat,
            ErrorCode::RequiredField,
            ErrorCode::EnvelopeInvalid,
            ErrorCode::EventDataMissing,
            ErrorCode::EventTypeMissing,
            ErrorCode::BrokerUnavailable,
            ErrorCode::BrokerSendFailed,
            ErrorCode::QueuePersistFailed,
            ErrorCode::QueueOverflow,
            ErrorCode::DeliveryShuttingDown,
            ErrorCode::AnchorFailed,
            ErrorCode::AuditRecordNotFound,
            ErrorCode::AnchorServiceUnavailable,
            ErrorCode::InternalError,
            ErrorCode::ConfigError,
            ErrorCode::NetworkError,
            ErrorCode::TimeoutError,
        ];

        for code in codes {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ErrorCode::BrokerUnavailable), "2001");
        assert_eq!(
            format!("{}", InvalidErrorCode(999)),
            "invalid error code: 999"
        );
    }
}
