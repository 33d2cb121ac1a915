//! Actor identification for audit stamping
//!
//! A request's actor is resolved once from the optional `phrase` body field:
//! - a registered passphrase maps to a known actor name
//! - anything else (missing, empty, unregistered) maps to the unknown sentinel
//!
//! Resolution is pluggable through [`ActorResolver`] so the lookup can be
//! replaced without touching request handling.
//!
//! ```rust,ignore
//! let resolver = PassphraseTable::from_entries([("open sesame", "alice")])?;
//! assert_eq!(resolver.resolve(Some("open sesame")), Actor::known("alice"));
//! assert_eq!(resolver.resolve(None), Actor::Unknown);
//! ```

use crate::error::EventsError;
use serde::{Serialize, Serializer};
use std::fmt;

mod table;

pub use table::{PASSPHRASES_ENV, PassphraseTable};

/// Actor name stamped when a request carries no recognised phrase.
pub const UNKNOWN_ACTOR: &str = "n/a";

// =============================================================================
// ACTOR
// =============================================================================

/// Identity attached to a single request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Actor {
    Known(String),
    #[default]
    Unknown,
}

impl Actor {
    pub fn known(name: impl Into<String>) -> Self {
        Actor::Known(name.into())
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Actor::Known(_))
    }

    /// Name stamped into audit fields.
    pub fn as_str(&self) -> &str {
        match self {
            Actor::Known(name) => name,
            Actor::Unknown => UNKNOWN_ACTOR,
        }
    }

    /// Reject the unknown sentinel.
    pub fn require_known(&self) -> Result<&str, EventsError> {
        match self {
            Actor::Known(name) => Ok(name),
            Actor::Unknown => Err(EventsError::NotAuthorized),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Actor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// =============================================================================
// RESOLVER TRAIT
// =============================================================================

/// Maps a caller-supplied phrase to an actor. Never fails: a miss is the
/// unknown actor, which downstream authorization checks reject.
pub trait ActorResolver: Send + Sync {
    fn resolve(&self, phrase: Option<&str>) -> Actor;

    /// Number of registered phrases, for health reporting.
    fn registered(&self) -> usize;

    /// Get resolver name for logging
    fn name(&self) -> &str;
}
