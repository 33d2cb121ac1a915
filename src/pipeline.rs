//! Per-request pipeline: read the body once, resolve the caller's actor from
//! its `phrase` field, and attach both to the request before routing.
//!
//! Bodies are JSON unless the request declares
//! `application/x-www-form-urlencoded`, in which case nested keys such as
//! `event[name]=Gala` decode into nested objects with string leaves.

use crate::model::parse_event_id;
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use mongodb::bson::oid::ObjectId;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Parsed top-level fields of a request body. Missing or malformed bodies
/// parse as empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestBody(Map<String, Value>);

impl RequestBody {
    pub fn parse(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::default();
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(fields)) => Self(fields),
            Ok(_) => {
                debug!("request body is not a JSON object, ignoring");
                Self::default()
            }
            Err(error) => {
                debug!(%error, "request body is not valid JSON, ignoring");
                Self::default()
            }
        }
    }

    pub fn parse_form(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::default();
        }
        match serde_qs::from_bytes::<Map<String, Value>>(bytes) {
            Ok(fields) => Self(fields),
            Err(error) => {
                debug!(%error, "form body is malformed, ignoring");
                Self::default()
            }
        }
    }

    /// Parse according to the request's declared content type.
    pub fn from_request(headers: &HeaderMap, bytes: &[u8]) -> Self {
        if is_form(headers) {
            Self::parse_form(bytes)
        } else {
            Self::parse(bytes)
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn phrase(&self) -> Option<&str> {
        self.get("phrase").and_then(Value::as_str)
    }

    pub fn event_id(&self) -> Option<ObjectId> {
        parse_event_id(self.get("id"))
    }

    pub fn event(&self) -> Option<&Value> {
        self.get("event")
    }

    pub fn visible(&self) -> Option<&Value> {
        self.get("visible")
    }
}

impl From<Map<String, Value>> for RequestBody {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

/// Middleware attaching [`RequestBody`] and the resolved
/// [`Actor`](crate::actor::Actor) as request extensions.
pub async fn attach_actor(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, state.config().max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(%error, "request body unreadable, treating as empty");
            Bytes::new()
        }
    };

    let parsed = RequestBody::from_request(&parts.headers, &bytes);
    let actor = state.resolver().resolve(parsed.phrase());
    debug!(
        actor = %actor,
        resolver = state.resolver().name(),
        "request actor resolved"
    );

    parts.extensions.insert(actor);
    parts.extensions.insert(parsed);
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
