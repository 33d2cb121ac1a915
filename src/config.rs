use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

const DEFAULT_HTTP_PORT: u16 = 3000;
const DEFAULT_DATABASE: &str = "osgoode";
const DEFAULT_COLLECTION: &str = "events";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_BODY_BYTES: usize = 100 * 1024;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[value(alias = "mongodb")]
    #[serde(alias = "mongodb")]
    Mongo,
    Memory,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Mongo => write!(f, "mongo"),
            StoreKind::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_bind_address: SocketAddr,
    pub store: StoreKind,
    pub mongo_uri: Option<String>,
    pub database: String,
    pub collection: String,
    pub connect_timeout_ms: u64,
    /// Inline phrase to actor entries from the config file.
    pub passphrases: HashMap<String, String>,
    pub passphrases_file: Option<PathBuf>,
    pub max_body_bytes: usize,
    pub graceful_shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_bind_address: default_bind_address(),
            store: StoreKind::Mongo,
            mongo_uri: None,
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            passphrases: HashMap::new(),
            passphrases_file: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            graceful_shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_HTTP_PORT))
}

impl ServerConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            http_bind: cli_http_bind,
            store: cli_store,
            mongo_uri: cli_mongo_uri,
            database: cli_database,
            collection: cli_collection,
            connect_timeout_ms: cli_connect_timeout_ms,
            passphrases: cli_passphrases_file,
            max_body_bytes: cli_max_body_bytes,
            shutdown_timeout_secs: cli_shutdown_timeout_secs,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_structured_file::<PartialConfig>(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            http_bind: file_http_bind,
            store: file_store,
            mongo_uri: file_mongo_uri,
            database: file_database,
            collection: file_collection,
            connect_timeout_ms: file_connect_timeout_ms,
            passphrases: file_passphrases,
            passphrases_file: file_passphrases_file,
            max_body_bytes: file_max_body_bytes,
            shutdown_timeout_secs: file_shutdown_timeout_secs,
        } = file_config;

        let defaults = Self::default();

        let mongo_uri = cli_mongo_uri
            .or(file_mongo_uri)
            .map(|uri| uri.trim().to_string())
            .filter(|uri| !uri.is_empty());

        // Relative passphrase files in a config file resolve against that file.
        let file_passphrases_file = file_passphrases_file.map(|path| {
            match config.as_ref().and_then(|c| c.parent()) {
                Some(parent) if path.is_relative() => parent.join(path),
                _ => path,
            }
        });

        Ok(Self {
            http_bind_address: cli_http_bind
                .or(file_http_bind)
                .unwrap_or(defaults.http_bind_address),
            store: cli_store.or(file_store).unwrap_or(defaults.store),
            mongo_uri,
            database: cli_database
                .or(file_database)
                .unwrap_or(defaults.database),
            collection: cli_collection
                .or(file_collection)
                .unwrap_or(defaults.collection),
            connect_timeout_ms: cli_connect_timeout_ms
                .or(file_connect_timeout_ms)
                .unwrap_or(defaults.connect_timeout_ms)
                .max(1),
            passphrases: file_passphrases.unwrap_or_default(),
            passphrases_file: cli_passphrases_file.or(file_passphrases_file),
            max_body_bytes: cli_max_body_bytes
                .or(file_max_body_bytes)
                .unwrap_or(defaults.max_body_bytes),
            graceful_shutdown_timeout_secs: cli_shutdown_timeout_secs
                .or(file_shutdown_timeout_secs)
                .unwrap_or(defaults.graceful_shutdown_timeout_secs),
        })
    }

    /// Fail fast on settings the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.store == StoreKind::Mongo {
            anyhow::ensure!(
                self.mongo_uri.is_some(),
                "a MongoDB connection string is required for the mongo store \
                 (--mongo-uri or OSGOODE_EVENTS_MONGO_URI)"
            );
        }
        anyhow::ensure!(
            !self.database.trim().is_empty(),
            "database name must not be empty"
        );
        anyhow::ensure!(
            !self.collection.trim().is_empty(),
            "collection name must not be empty"
        );
        anyhow::ensure!(self.max_body_bytes > 0, "max body size must be positive");
        if let Some(path) = self.passphrases_file.as_ref() {
            anyhow::ensure!(
                path.is_file(),
                "configured passphrase file {:?} does not exist",
                path
            );
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(name = "osgoode-events", about = "Osgoode events HTTP API", version)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "OSGOODE_EVENTS_HTTP_BIND",
        value_name = "ADDR",
        help = "HTTP bind address"
    )]
    pub http_bind: Option<SocketAddr>,

    #[arg(
        long,
        env = "OSGOODE_EVENTS_STORE",
        value_enum,
        value_name = "STORE",
        help = "Document store backend (mongo or memory)"
    )]
    pub store: Option<StoreKind>,

    #[arg(
        long,
        env = "OSGOODE_EVENTS_MONGO_URI",
        value_name = "URI",
        help = "MongoDB connection string",
        hide_env_values = true
    )]
    pub mongo_uri: Option<String>,

    #[arg(
        long,
        env = "OSGOODE_EVENTS_DATABASE",
        value_name = "NAME",
        help = "Database holding the events collection"
    )]
    pub database: Option<String>,

    #[arg(
        long,
        env = "OSGOODE_EVENTS_COLLECTION",
        value_name = "NAME",
        help = "Events collection name"
    )]
    pub collection: Option<String>,

    #[arg(
        long,
        env = "OSGOODE_EVENTS_CONNECT_TIMEOUT_MS",
        value_name = "MS",
        help = "Timeout for establishing the store connection",
        value_parser = clap::value_parser!(u64)
    )]
    pub connect_timeout_ms: Option<u64>,

    #[arg(
        long,
        env = "OSGOODE_EVENTS_PASSPHRASES_FILE",
        value_name = "FILE",
        help = "YAML or JSON map of passphrase to actor name"
    )]
    pub passphrases: Option<PathBuf>,

    #[arg(
        long,
        env = "OSGOODE_EVENTS_MAX_BODY_BYTES",
        value_name = "BYTES",
        help = "Largest request body that is parsed",
        value_parser = clap::value_parser!(usize)
    )]
    pub max_body_bytes: Option<usize>,

    #[arg(
        long,
        env = "OSGOODE_EVENTS_SHUTDOWN_TIMEOUT_SECS",
        value_name = "SECS",
        help = "How long in-flight requests may drain on shutdown",
        value_parser = clap::value_parser!(u64)
    )]
    pub shutdown_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    http_bind: Option<SocketAddr>,
    store: Option<StoreKind>,
    mongo_uri: Option<String>,
    database: Option<String>,
    collection: Option<String>,
    connect_timeout_ms: Option<u64>,
    passphrases: Option<HashMap<String, String>>,
    passphrases_file: Option<PathBuf>,
    max_body_bytes: Option<usize>,
    shutdown_timeout_secs: Option<u64>,
}

/// Read a YAML or JSON file, chosen by extension.
pub fn load_structured_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        anyhow::bail!("file {:?} does not exist", path);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn default_settings() {
        let config = ServerConfig::from_args(CliArgs::default()).unwrap();
        assert_eq!(config.http_bind_address.port(), 3000);
        assert_eq!(config.database, "osgoode");
        assert_eq!(config.collection, "events");
        assert_eq!(config.store, StoreKind::Mongo);
        assert_eq!(config.max_body_bytes, 100 * 1024);
    }

    #[test]
    fn mongo_store_requires_uri() {
        let config = ServerConfig::from_args(CliArgs::default()).unwrap();
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("connection string"));

        let config = ServerConfig::from_args(CliArgs {
            store: Some(StoreKind::Memory),
            ..CliArgs::default()
        })
        .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn blank_uri_is_treated_as_missing() {
        let config = ServerConfig::from_args(CliArgs {
            mongo_uri: Some("   ".to_string()),
            ..CliArgs::default()
        })
        .unwrap();
        assert!(config.mongo_uri.is_none());
    }

    #[test]
    fn cli_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "store: memory\ndatabase: staging\ncollection: gala_events\npassphrases:\n  swordfish: bob"
        )
        .unwrap();

        let config = ServerConfig::from_args(CliArgs {
            config: Some(file.path().to_path_buf()),
            database: Some("production".to_string()),
            ..CliArgs::default()
        })
        .unwrap();

        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.database, "production");
        assert_eq!(config.collection, "gala_events");
        assert_eq!(config.passphrases.get("swordfish").map(String::as_str), Some("bob"));
    }

    #[test]
    fn rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let result = load_structured_file::<PartialConfig>(file.path());
        assert!(result.is_err());
    }
}
