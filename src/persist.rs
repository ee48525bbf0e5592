//! Versioned save/load of the derived conversation state.
//!
//! The saved layout carries the synchronized store plus the gate ledger's
//! latched gates. A version mismatch on load is a hard error so the caller
//! can fall back to rebuilding from the transcript instead of trusting a
//! stale layout.

use crate::catalog::FactCategory;
use crate::gates::Gate;
use crate::identity::{EntityId, EntityRecord};
use crate::store::{CurrentContext, StateStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::warn;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current save file version.
const SAVE_VERSION: u32 = 1;

/// A saved conversation with everything needed to resume tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedConversation {
    /// Save format version for compatibility checking.
    pub version: u32,

    /// When the save was created (unix seconds as a string).
    pub saved_at: String,

    /// The singleton context slice.
    pub current: CurrentContext,

    /// Every entity registry keyed by category.
    pub registries: BTreeMap<FactCategory, BTreeMap<EntityId, EntityRecord>>,

    /// Tags accumulated from visited locations.
    pub tags: BTreeSet<String>,

    /// Index of the last message folded in, if any.
    pub cursor: Option<u64>,

    /// Latched gate states.
    pub gates: BTreeMap<String, Gate>,

    /// Metadata about the save.
    pub metadata: SaveMetadata,
}

/// Metadata about the save file, readable without the full state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveMetadata {
    /// Current location at save time, if known.
    pub location: Option<String>,

    /// Number of known entities across all registries.
    pub entity_count: usize,

    /// Index of the last message folded in, if any.
    pub cursor: Option<u64>,

    /// When the save was created (duplicated from parent for peek access).
    #[serde(default)]
    pub saved_at: String,
}

impl SavedConversation {
    /// Capture the store and gate ledger into a saveable snapshot.
    pub fn capture(store: &StateStore, gates: &crate::gates::GateLedger) -> Self {
        let saved_at = unix_now();
        let metadata = SaveMetadata {
            location: store.current().location.clone(),
            entity_count: store.entity_count(),
            cursor: store.cursor(),
            saved_at: saved_at.clone(),
        };

        Self {
            version: SAVE_VERSION,
            saved_at,
            current: store.current().clone(),
            registries: store.registries().clone(),
            tags: store.tags().clone(),
            cursor: store.cursor(),
            gates: gates.snapshot(),
            metadata,
        }
    }

    /// Reconstitute the store from this snapshot. Gates are restored
    /// separately via [`crate::gates::GateLedger::restore`].
    pub fn into_store(self) -> StateStore {
        StateStore::from_parts(self.current, self.registries, self.tags, self.cursor)
    }

    /// Serialize to a JSON value, for hosts that own their own storage.
    pub fn to_value(&self) -> Result<serde_json::Value, PersistError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserialize from a JSON value, with the same version check as
    /// [`Self::load_json`].
    pub fn from_value(value: serde_json::Value) -> Result<Self, PersistError> {
        let saved: Self = serde_json::from_value(value)?;
        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }
        Ok(saved)
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;

        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }

    /// Read a save file's metadata without deserializing the full state.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<SaveMetadata, PersistError> {
        let content = fs::read_to_string(path).await?;

        // Parse just enough to get metadata
        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: SaveMetadata,
        }

        let partial: Partial = serde_json::from_str(&content)?;

        if partial.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: partial.version,
            });
        }

        Ok(partial.metadata)
    }

    /// Fire-and-forget save. The transcript remains the source of truth,
    /// so a failed write is a warning, never an error for the caller.
    pub async fn save_best_effort(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if let Err(err) = self.save_json(path).await {
            warn!(path = %path.display(), error = %err, "state save failed");
        }
    }
}

/// Current timestamp as unix seconds.
fn unix_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    format!("{}", now.as_secs())
}
