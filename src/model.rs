//! Event document fields, audit stamping and JSON/BSON conversion.

use crate::error::{EventsError, Result};
use mongodb::bson::{self, Bson, Document, doc, oid::ObjectId};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

/// Store-assigned identifier field.
pub const ID_FIELD: &str = "_id";
pub const VISIBLE_FIELD: &str = "visible";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const LAST_MODIFIED_FIELD: &str = "lastModified";
pub const CREATED_BY_FIELD: &str = "createdBy";
pub const CHANGED_BY_FIELD: &str = "changedBy";
pub const VISIBILITY_CHANGED_BY_FIELD: &str = "visibilityChangedBy";

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Audit timestamp in epoch milliseconds. Strictly greater than every stamp
/// previously issued by this process, even within one millisecond or across
/// a backwards clock step.
pub fn next_stamp() -> i64 {
    let now = now_millis();
    let previous = LAST_STAMP
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(previous + 1)
}

/// Who changed an event, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditStamp<'a> {
    pub actor: &'a str,
    pub at: i64,
}

impl<'a> AuditStamp<'a> {
    pub fn new(actor: &'a str, at: i64) -> Self {
        Self { actor, at }
    }

    pub fn now(actor: &'a str) -> Self {
        Self::new(actor, next_stamp())
    }

    /// System fields of a new event. Overrides any caller-supplied values,
    /// including `visible`.
    pub fn apply_created(&self, event: &mut Document) {
        event.insert(CREATED_AT_FIELD, self.at);
        event.insert(LAST_MODIFIED_FIELD, self.at);
        event.insert(CHANGED_BY_FIELD, self.actor);
        event.insert(CREATED_BY_FIELD, self.actor);
        event.insert(VISIBLE_FIELD, false);
    }

    pub fn apply_modified(&self, event: &mut Document) {
        event.insert(LAST_MODIFIED_FIELD, self.at);
        event.insert(CHANGED_BY_FIELD, self.actor);
    }

    /// Fields set by a visibility change.
    pub fn visibility_change(&self, visible: Bson) -> Document {
        doc! {
            VISIBLE_FIELD: visible,
            LAST_MODIFIED_FIELD: self.at,
            CHANGED_BY_FIELD: self.actor,
            VISIBILITY_CHANGED_BY_FIELD: self.actor,
        }
    }
}

/// Parse an `id` body value into the store's identifier type. Anything but a
/// 24 hex digit string yields `None`.
pub fn parse_event_id(value: Option<&Value>) -> Option<ObjectId> {
    value
        .and_then(Value::as_str)
        .and_then(|raw| ObjectId::parse_str(raw.trim()).ok())
}

/// Convert the `event` body value into a store document with any caller
/// identifier removed.
pub fn event_document(value: Option<&Value>) -> Result<Document> {
    let Some(Value::Object(fields)) = value else {
        return Err(EventsError::InvalidPayload(
            "`event` must be a JSON object".to_string(),
        ));
    };
    let mut event = bson::to_document(fields)?;
    event.remove(ID_FIELD);
    Ok(event)
}

/// Convert a single JSON value for storage; `None` is stored as null.
pub fn json_to_bson(value: Option<&Value>) -> Result<Bson> {
    match value {
        Some(value) => Ok(bson::to_bson(value)?),
        None => Ok(Bson::Null),
    }
}

/// Render a stored document for the response envelope. Identifiers become
/// their hex string; everything else uses relaxed extended JSON.
pub fn document_to_json(event: Document) -> Value {
    Value::Object(
        event
            .into_iter()
            .map(|(key, value)| (key, bson_to_json(value)))
            .collect(),
    )
}

pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        Bson::Document(nested) => document_to_json(nested),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}
