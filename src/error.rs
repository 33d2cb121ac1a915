//! Error handling for the events API
//!
//! This module provides:
//! - `EventsError`, the typed failure of every event operation
//! - Error codes with a category label for the `events_errors_total` counter
//! - The fixed caller-facing messages of the response envelope

use crate::metrics::METRICS;
use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::fmt;
use thiserror::Error;

/// Message returned to callers whose phrase did not resolve to a known actor.
pub const NOT_AUTHORIZED_MESSAGE: &str = "Not Authorized";

/// Message returned to callers for every other failure. Internal detail is logged, never sent.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong";

// =============================================================================
// ERROR CODES
// =============================================================================

/// Classification of event operation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// The request's actor is the unknown sentinel
    NotAuthorized = -32001,
    /// The request body did not carry the expected fields
    InvalidPayload = -32002,
    /// The initial connection to the document store failed
    ConnectionFailed = -32003,
    /// A document store call failed
    StoreFailure = -32004,
    /// A payload could not be encoded as a store document or response
    EncodingFailure = -32005,
}

impl ErrorCode {
    /// Get the integer code
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Get the error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::NotAuthorized => "authorization_error",
            ErrorCode::InvalidPayload | ErrorCode::EncodingFailure => "client_error",
            ErrorCode::ConnectionFailed => "connection_error",
            ErrorCode::StoreFailure => "store_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

// =============================================================================
// ERROR TYPE
// =============================================================================

/// Failure of an event operation.
#[derive(Debug, Error)]
pub enum EventsError {
    #[error("request actor is not authorized")]
    NotAuthorized,

    #[error("invalid request payload: {0}")]
    InvalidPayload(String),

    #[error("failed to connect to the document store")]
    Connection(#[source] mongodb::error::Error),

    #[error("document store operation failed")]
    Store(#[from] mongodb::error::Error),

    #[error("failed to encode event document")]
    Encoding(#[from] mongodb::bson::ser::Error),

    #[error("failed to render response data")]
    Render(#[from] serde_json::Error),
}

impl EventsError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EventsError::NotAuthorized => ErrorCode::NotAuthorized,
            EventsError::InvalidPayload(_) => ErrorCode::InvalidPayload,
            EventsError::Connection(_) => ErrorCode::ConnectionFailed,
            EventsError::Store(_) => ErrorCode::StoreFailure,
            EventsError::Encoding(_) | EventsError::Render(_) => ErrorCode::EncodingFailure,
        }
    }

    /// The message sent to the caller in the failure envelope.
    pub fn public_message(&self) -> &'static str {
        match self {
            EventsError::NotAuthorized => NOT_AUTHORIZED_MESSAGE,
            _ => GENERIC_FAILURE_MESSAGE,
        }
    }

    /// Full error chain, for logs only.
    pub fn chain_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }

    /// Count this error against `operation` in the Prometheus registry.
    pub fn track(&self, operation: &str) {
        let code = self.code();
        METRICS.record_error(operation, code.category());
        tracing::debug!(error_code = %code, operation, "error recorded");
    }
}

pub type Result<T, E = EventsError> = std::result::Result<T, E>;
