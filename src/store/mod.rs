//! Document store seam for the events collection
//!
//! Every event operation performs exactly one call on an [`EventStore`]:
//! - `MongoEventStore` talks to MongoDB through a lazily opened, shared connection
//! - `MemoryEventStore` keeps documents in process, for development and tests
//!
//! Both rely on per-document atomicity only; there are no multi-document
//! transactions.

use crate::error::Result;
use async_trait::async_trait;
use mongodb::bson::{Document, oid::ObjectId};
use serde::Serialize;
use serde_json::Value;

mod memory;
mod mongo;

pub use memory::MemoryEventStore;
pub use mongo::{ConnectionProvider, MongoEventStore};

/// Which events a list call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    All,
    VisibleOnly,
}

/// Result of a single-document `$set` update, shaped like the driver's
/// update result so it can be returned to callers verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
    pub upserted_id: Option<Value>,
}

impl UpdateOutcome {
    pub fn new(matched_count: u64, modified_count: u64) -> Self {
        Self {
            acknowledged: true,
            matched_count,
            modified_count,
            upserted_count: 0,
            upserted_id: None,
        }
    }

    /// Outcome for an identifier that cannot match any document.
    pub fn unmatched() -> Self {
        Self::new(0, 0)
    }

    pub fn matched_one(&self) -> bool {
        self.matched_count == 1
    }
}

/// Single-call operations on the events collection.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn list(&self, filter: EventFilter) -> Result<Vec<Document>>;

    async fn find(&self, id: ObjectId) -> Result<Option<Document>>;

    /// Insert a new event; returns the assigned identifier.
    async fn insert(&self, event: Document) -> Result<ObjectId>;

    /// Merge `fields` into the event with `$set` semantics.
    async fn set_fields(&self, id: ObjectId, fields: Document) -> Result<UpdateOutcome>;

    /// Returns whether exactly one document was removed.
    async fn delete(&self, id: ObjectId) -> Result<bool>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Get store name for logging
    fn name(&self) -> &str;
}
