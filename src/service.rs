//! The seven event operations.
//!
//! Each operation checks authorization first (where required), then stamps
//! audit fields and performs exactly one store call. Outcomes are typed
//! results; the HTTP layer turns them into envelopes.

use crate::actor::Actor;
use crate::error::Result;
use crate::model::{AuditStamp, event_document, json_to_bson};
use crate::store::{EventFilter, EventStore, UpdateOutcome};
use mongodb::bson::{Document, oid::ObjectId};
use serde_json::Value;
use std::sync::Arc;
use strum::{Display, EnumIter, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum EventOperation {
    ListVisible,
    ListAll,
    Delete,
    SetVisibility,
    Create,
    Update,
    Fetch,
}

impl EventOperation {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn EventStore>,
}

impl EventService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub async fn list_visible(&self) -> Result<Vec<Document>> {
        self.store.list(EventFilter::VisibleOnly).await
    }

    pub async fn list_all(&self) -> Result<Vec<Document>> {
        self.store.list(EventFilter::All).await
    }

    /// True when exactly one event was removed. Deleting an unknown id is
    /// not an error.
    pub async fn delete(&self, actor: &Actor, id: Option<ObjectId>) -> Result<bool> {
        actor.require_known()?;
        let Some(id) = id else {
            return Ok(false);
        };
        self.store.delete(id).await
    }

    pub async fn set_visibility(
        &self,
        actor: &Actor,
        id: Option<ObjectId>,
        visible: Option<&Value>,
    ) -> Result<UpdateOutcome> {
        let actor = actor.require_known()?;
        let Some(id) = id else {
            return Ok(UpdateOutcome::unmatched());
        };
        let fields = AuditStamp::now(actor).visibility_change(json_to_bson(visible)?);
        self.store.set_fields(id, fields).await
    }

    /// Insert a new event. System fields always win over caller values and
    /// new events start hidden.
    pub async fn create(&self, actor: &Actor, event: Option<&Value>) -> Result<bool> {
        let actor = actor.require_known()?;
        let mut event = event_document(event)?;
        AuditStamp::now(actor).apply_created(&mut event);

        let id = self.store.insert(event).await?;
        tracing::debug!(event_id = %id, "event created");
        Ok(true)
    }

    /// Merge caller fields into an existing event. The identifier is never
    /// part of the merge.
    pub async fn update(
        &self,
        actor: &Actor,
        id: Option<ObjectId>,
        event: Option<&Value>,
    ) -> Result<bool> {
        let actor = actor.require_known()?;
        let mut fields = event_document(event)?;
        let Some(id) = id else {
            return Ok(false);
        };
        AuditStamp::now(actor).apply_modified(&mut fields);

        let outcome = self.store.set_fields(id, fields).await?;
        Ok(outcome.matched_one())
    }

    pub async fn fetch(&self, id: Option<ObjectId>) -> Result<Option<Document>> {
        let Some(id) = id else {
            return Ok(None);
        };
        self.store.find(id).await
    }
}
