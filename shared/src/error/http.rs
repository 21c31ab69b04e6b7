//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound | Self::AuditRecordNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::AlreadyExists => StatusCode::CONFLICT,

            // 503 Service Unavailable (transient, client can retry)
            Self::BrokerUnavailable
            | Self::QueueOverflow
            | Self::AnchorServiceUnavailable
            | Self::DeliveryShuttingDown
            | Self::NetworkError
            | Self::TimeoutError => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::Unknown
            | Self::InternalError
            | Self::ConfigError
            | Self::BrokerSendFailed
            | Self::QueuePersistFailed
            | Self::AnchorFailed => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request (validation and envelope errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
