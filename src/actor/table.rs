//! Static passphrase table - phrase to actor lookup loaded at startup

use super::{Actor, ActorResolver, UNKNOWN_ACTOR};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Environment variable holding a JSON object of phrase to actor name.
pub const PASSPHRASES_ENV: &str = "OSGOODE_EVENTS_PASSPHRASES";

/// Resolver backed by an in-memory map of passphrase to actor name.
#[derive(Debug, Default, Clone)]
pub struct PassphraseTable {
    entries: HashMap<String, String>,
}

impl PassphraseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table, rejecting empty phrases and actor names that collide
    /// with the unknown sentinel.
    pub fn from_entries<I, P, A>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, A)>,
        P: Into<String>,
        A: Into<String>,
    {
        let mut table = Self::new();
        table.extend(entries)?;
        Ok(table)
    }

    /// Add entries; later entries replace earlier ones for the same phrase.
    pub fn extend<I, P, A>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (P, A)>,
        P: Into<String>,
        A: Into<String>,
    {
        for (phrase, actor) in entries {
            let phrase = phrase.into();
            let actor = actor.into();
            anyhow::ensure!(!phrase.is_empty(), "passphrase must not be empty");
            anyhow::ensure!(
                !actor.trim().is_empty(),
                "actor name for a passphrase must not be empty"
            );
            anyhow::ensure!(
                actor != UNKNOWN_ACTOR,
                "actor name {UNKNOWN_ACTOR:?} is reserved for unknown callers"
            );
            self.entries.insert(phrase, actor);
        }
        Ok(())
    }

    /// Load a YAML or JSON map of phrase to actor name.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let entries: HashMap<String, String> = crate::config::load_structured_file(path)
            .with_context(|| format!("failed to load passphrases from {:?}", path))?;
        let count = entries.len();
        self.extend(entries)?;
        tracing::info!(path = %path.display(), count, "passphrases loaded from file");
        Ok(())
    }

    /// Merge entries from [`PASSPHRASES_ENV`] if it is set.
    pub fn load_env(&mut self) -> Result<()> {
        let Ok(raw) = std::env::var(PASSPHRASES_ENV) else {
            return Ok(());
        };
        let entries: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {PASSPHRASES_ENV} as a JSON object"))?;
        let count = entries.len();
        self.extend(entries)?;
        tracing::info!(count, "passphrases loaded from environment");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ActorResolver for PassphraseTable {
    fn resolve(&self, phrase: Option<&str>) -> Actor {
        phrase
            .filter(|phrase| !phrase.is_empty())
            .and_then(|phrase| self.entries.get(phrase))
            .map(|actor| Actor::Known(actor.clone()))
            .unwrap_or(Actor::Unknown)
    }

    fn registered(&self) -> usize {
        self.entries.len()
    }

    fn name(&self) -> &str {
        "passphrase_table"
    }
}
