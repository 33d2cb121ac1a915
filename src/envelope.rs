//! Uniform response envelope.
//!
//! Every event route answers HTTP 200 with one of two JSON shapes:
//! `{"status": 1, "data": ...}` or `{"status": -1, "message": "..."}`.
//! Internally operations return `Result`; the translation happens here.

use crate::error::EventsError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

pub const STATUS_SUCCESS: i8 = 1;
pub const STATUS_FAILURE: i8 = -1;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Success { status: i8, data: Value },
    Failure { status: i8, message: String },
}

impl Envelope {
    pub fn success(data: impl Into<Value>) -> Self {
        Envelope::Success {
            status: STATUS_SUCCESS,
            data: data.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Envelope::Failure {
            status: STATUS_FAILURE,
            message: message.into(),
        }
    }
}

impl From<EventsError> for Envelope {
    fn from(error: EventsError) -> Self {
        Envelope::failure(error.public_message())
    }
}

impl<T: Into<Value>> From<Result<T, EventsError>> for Envelope {
    fn from(outcome: Result<T, EventsError>) -> Self {
        match outcome {
            Ok(data) => Envelope::success(data),
            Err(error) => error.into(),
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
