use super::{EventFilter, EventStore, UpdateOutcome};
use crate::error::{EventsError, Result};
use crate::metrics::METRICS;
use crate::model::{ID_FIELD, VISIBLE_FIELD, bson_to_json};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Document, doc, oid::ObjectId};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use std::fmt;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Lazily opened database handle shared for the life of the process.
///
/// The first caller opens the connection; concurrent first callers wait on
/// the same attempt instead of racing to open their own. A failed attempt
/// leaves the cell empty so a later request can try again. The handle is
/// never explicitly closed.
pub struct ConnectionProvider {
    uri: String,
    database: String,
    connect_timeout: Duration,
    handle: OnceCell<Database>,
}

impl ConnectionProvider {
    pub fn new(uri: impl Into<String>, database: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            connect_timeout,
            handle: OnceCell::new(),
        }
    }

    /// Get the shared handle, opening it on first use.
    pub async fn database(&self) -> Result<&Database> {
        self.handle.get_or_try_init(|| self.connect()).await
    }

    pub fn is_connected(&self) -> bool {
        self.handle.initialized()
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    async fn connect(&self) -> Result<Database> {
        debug!(database = %self.database, "opening document store connection");

        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(EventsError::Connection)?;
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.connect_timeout);
        if options.app_name.is_none() {
            options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        }

        let client = Client::with_options(options).map_err(EventsError::Connection)?;
        let database = client.database(&self.database);

        // The driver connects lazily; ping so an unreachable store fails here.
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(EventsError::Connection)?;

        METRICS.store_connections_opened_total.inc();
        info!(database = %self.database, "document store connection established");
        Ok(database)
    }
}

impl fmt::Debug for ConnectionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProvider")
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Events collection in MongoDB.
#[derive(Debug)]
pub struct MongoEventStore {
    connections: ConnectionProvider,
    collection: String,
}

impl MongoEventStore {
    pub fn new(connections: ConnectionProvider, collection: impl Into<String>) -> Self {
        Self {
            connections,
            collection: collection.into(),
        }
    }

    pub fn connections(&self) -> &ConnectionProvider {
        &self.connections
    }

    async fn collection(&self) -> Result<Collection<Document>> {
        let database = self.connections.database().await?;
        Ok(database.collection::<Document>(&self.collection))
    }
}

fn by_id(id: ObjectId) -> Document {
    doc! { ID_FIELD: id }
}

#[async_trait]
impl EventStore for MongoEventStore {
    async fn list(&self, filter: EventFilter) -> Result<Vec<Document>> {
        let query = match filter {
            EventFilter::All => doc! {},
            EventFilter::VisibleOnly => doc! { VISIBLE_FIELD: true },
        };
        let cursor = self.collection().await?.find(query).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find(&self, id: ObjectId) -> Result<Option<Document>> {
        Ok(self.collection().await?.find_one(by_id(id)).await?)
    }

    async fn insert(&self, event: Document) -> Result<ObjectId> {
        let inserted = self.collection().await?.insert_one(event).await?;
        inserted.inserted_id.as_object_id().ok_or_else(|| {
            EventsError::InvalidPayload(format!(
                "store assigned a non-ObjectId identifier: {}",
                inserted.inserted_id
            ))
        })
    }

    async fn set_fields(&self, id: ObjectId, fields: Document) -> Result<UpdateOutcome> {
        let result = self
            .collection()
            .await?
            .update_one(by_id(id), doc! { "$set": fields })
            .await?;

        Ok(UpdateOutcome {
            acknowledged: true,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_count: u64::from(result.upserted_id.is_some()),
            upserted_id: result.upserted_id.map(bson_to_json),
        })
    }

    async fn delete(&self, id: ObjectId) -> Result<bool> {
        let result = self.collection().await?.delete_one(by_id(id)).await?;
        Ok(result.deleted_count == 1)
    }

    async fn ping(&self) -> Result<()> {
        self.connections
            .database()
            .await?
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "mongodb"
    }
}
