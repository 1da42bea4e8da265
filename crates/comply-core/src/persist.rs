//! Persistence adapter — JSON store documents over a storage backend.
//!
//! Each feature module owns one storage key and persists its whole state
//! as a single [`StoreDocument`]: a versioned envelope around the record
//! map. Loads fail soft — a missing key or a corrupt stored value yields
//! the default empty document (with a logged warning), never an error.
//! Only a real backend I/O failure surfaces as an error, and the caller
//! turns that into a non-fatal notification.
//!
//! Documents carry an explicit `schema_version`; [`PersistenceAdapter::load`]
//! migrates older documents before any caller sees them, so render and
//! store code never has to guess at missing fields.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use comply_storage::StorageBackend;

use crate::error::StoreError;
use crate::store::Record;

/// Current store document schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// The persisted shape of one store: a versioned record map.
///
/// Documents written before versioning was introduced deserialize with
/// `schema_version == 0` and are upgraded on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    /// Version of the document layout, for forward migration on load.
    #[serde(default)]
    pub schema_version: u32,
    /// All records in the store, keyed by record ID.
    #[serde(default)]
    pub records: BTreeMap<String, Record>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            records: BTreeMap::new(),
        }
    }
}

/// Wraps a [`StorageBackend`] with JSON (de)serialization and
/// default-value fallback.
#[derive(Clone)]
pub struct PersistenceAdapter {
    backend: Arc<dyn StorageBackend>,
}

impl PersistenceAdapter {
    /// Create an adapter over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Load the document stored under `key`.
    ///
    /// Missing key → default empty document. Corrupt stored JSON → warning
    /// logged, default empty document. Older documents are migrated to the
    /// current schema version before being returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] only if the backend itself fails to
    /// read — never for a missing or unparseable value.
    pub async fn load(&self, key: &str) -> Result<StoreDocument, StoreError> {
        let Some(bytes) = self.backend.get(key).await? else {
            return Ok(StoreDocument::default());
        };

        match serde_json::from_slice::<StoreDocument>(&bytes) {
            Ok(mut doc) => {
                migrate(key, &mut doc);
                Ok(doc)
            }
            Err(e) => {
                warn!(
                    key,
                    error = %e,
                    "stored document is not valid JSON; falling back to empty store"
                );
                Ok(StoreDocument::default())
            }
        }
    }

    /// Serialize and write the whole document under `key`.
    ///
    /// Capping of history/array fields is the caller's responsibility and
    /// must happen before this call.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the document cannot be
    /// serialized, or [`StoreError::Storage`] if the backend write fails.
    pub async fn save(&self, key: &str, doc: &StoreDocument) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(doc).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })?;
        self.backend.put(key, &bytes).await?;
        debug!(key, records = doc.records.len(), "store document written");
        Ok(())
    }

    /// Read the raw JSON value stored under `key`, without interpreting it
    /// as a store document. Used by export, which snapshots values verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend read fails.
    pub async fn read_raw(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let Some(bytes) = self.backend.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "stored value is not valid JSON; skipping");
                Ok(None)
            }
        }
    }

    /// Write a raw JSON value under `key` verbatim. Used by import, which
    /// merges top-level keys without reinterpreting them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] or [`StoreError::Storage`].
    pub async fn write_raw(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })?;
        self.backend.put(key, &bytes).await?;
        Ok(())
    }

    /// Delete the value stored under `key`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend delete fails.
    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.backend.delete(key).await?;
        Ok(())
    }

    /// List all keys under a prefix.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend list fails.
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.backend.list(prefix).await?)
    }
}

impl std::fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceAdapter").finish_non_exhaustive()
    }
}

/// Upgrade an older document to [`SCHEMA_VERSION`] in place.
///
/// Version 0 documents predate the envelope: records could be stored with
/// an empty `id` and no mutation stamps. Serde defaults fill the stamps;
/// this fills each record's `id` from its map key.
fn migrate(key: &str, doc: &mut StoreDocument) {
    if doc.schema_version > SCHEMA_VERSION {
        // Written by a newer build. Keep the data untouched rather than
        // guessing at a downgrade.
        warn!(
            key,
            version = doc.schema_version,
            supported = SCHEMA_VERSION,
            "store document is newer than this build supports"
        );
        return;
    }
    if doc.schema_version == SCHEMA_VERSION {
        return;
    }

    for (id, record) in &mut doc.records {
        if record.id.is_empty() {
            record.id.clone_from(id);
        }
    }
    debug!(key, from = doc.schema_version, to = SCHEMA_VERSION, "store document migrated");
    doc.schema_version = SCHEMA_VERSION;
}
