use super::{EventFilter, EventStore, UpdateOutcome};
use crate::error::Result;
use crate::model::{ID_FIELD, VISIBLE_FIELD};
use async_trait::async_trait;
use indexmap::IndexMap;
use mongodb::bson::{Document, oid::ObjectId};
use parking_lot::RwLock;

/// In-process events collection in insertion order.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<IndexMap<ObjectId, Document>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn list(&self, filter: EventFilter) -> Result<Vec<Document>> {
        let events = self.events.read();
        Ok(events
            .values()
            .filter(|event| match filter {
                EventFilter::All => true,
                EventFilter::VisibleOnly => event.get_bool(VISIBLE_FIELD).unwrap_or(false),
            })
            .cloned()
            .collect())
    }

    async fn find(&self, id: ObjectId) -> Result<Option<Document>> {
        Ok(self.events.read().get(&id).cloned())
    }

    async fn insert(&self, event: Document) -> Result<ObjectId> {
        let id = ObjectId::new();
        let mut stored = Document::new();
        stored.insert(ID_FIELD, id);
        for (key, value) in event {
            if key != ID_FIELD {
                stored.insert(key, value);
            }
        }
        self.events.write().insert(id, stored);
        Ok(id)
    }

    async fn set_fields(&self, id: ObjectId, fields: Document) -> Result<UpdateOutcome> {
        let mut events = self.events.write();
        let Some(event) = events.get_mut(&id) else {
            return Ok(UpdateOutcome::unmatched());
        };

        let mut modified = false;
        for (key, value) in fields {
            if key == ID_FIELD {
                continue;
            }
            if event.get(&key) != Some(&value) {
                modified = true;
                event.insert(key, value);
            }
        }

        Ok(UpdateOutcome::new(1, u64::from(modified)))
    }

    async fn delete(&self, id: ObjectId) -> Result<bool> {
        Ok(self.events.write().shift_remove(&id).is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
