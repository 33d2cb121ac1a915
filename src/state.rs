use crate::actor::{ActorResolver, PassphraseTable};
use crate::config::{ServerConfig, StoreKind};
use crate::service::EventService;
use crate::store::{ConnectionProvider, EventStore, MemoryEventStore, MongoEventStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state handed to every route.
pub struct AppState {
    config: Arc<ServerConfig>,
    resolver: Arc<dyn ActorResolver>,
    service: EventService,
}

impl AppState {
    pub fn new(
        config: Arc<ServerConfig>,
        store: Arc<dyn EventStore>,
        resolver: Arc<dyn ActorResolver>,
    ) -> Self {
        Self {
            config,
            resolver,
            service: EventService::new(store),
        }
    }

    /// Build the configured store and passphrase table.
    pub fn from_config(config: Arc<ServerConfig>) -> Result<Self> {
        let store = build_store(&config)?;
        let resolver = Arc::new(build_passphrase_table(&config)?);
        Ok(Self::new(config, store, resolver))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &dyn ActorResolver {
        self.resolver.as_ref()
    }

    pub fn service(&self) -> &EventService {
        &self.service
    }

    pub fn store(&self) -> &dyn EventStore {
        self.service.store().as_ref()
    }
}

fn build_store(config: &ServerConfig) -> Result<Arc<dyn EventStore>> {
    match config.store {
        StoreKind::Mongo => {
            let uri = config
                .mongo_uri
                .clone()
                .context("mongo store selected without a connection string")?;
            let connections =
                ConnectionProvider::new(uri, config.database.clone(), config.connect_timeout());
            info!(
                database = %config.database,
                collection = %config.collection,
                "using MongoDB event store (connects on first request)"
            );
            Ok(Arc::new(MongoEventStore::new(
                connections,
                config.collection.clone(),
            )))
        }
        StoreKind::Memory => {
            warn!("using in-memory event store; events are lost on exit");
            Ok(Arc::new(MemoryEventStore::new()))
        }
    }
}

/// Inline config entries, then the passphrase file, then the environment.
pub fn build_passphrase_table(config: &ServerConfig) -> Result<PassphraseTable> {
    let mut table = PassphraseTable::from_entries(config.passphrases.clone())
        .context("invalid inline passphrase entry")?;
    if let Some(path) = config.passphrases_file.as_ref() {
        table.load_file(path)?;
    }
    table.load_env()?;

    if table.is_empty() {
        warn!("no passphrases registered; every mutating request will be rejected");
    }
    Ok(table)
}
