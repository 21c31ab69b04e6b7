//! Shared types for the relay workspace
//!
//! Event envelope model, error system and small utilities used by
//! the relay server and by any producer that builds envelopes itself.

pub mod error;
pub mod event;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
pub use event::{EnvelopeBuilder, EventEnvelope, EventType, Priority};
