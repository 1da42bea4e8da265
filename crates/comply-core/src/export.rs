//! Export and import of the full local state.
//!
//! Export is a pure snapshot: every store value under the `comply/`
//! prefix, verbatim, wrapped in an envelope with a generation timestamp.
//! Import accepts that exact shape back (or a bare key→value object),
//! counts the keys for a user confirmation step, and merges them into
//! storage verbatim. A parse failure aborts the whole import before a
//! single key is written — there is no partial merge.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ImportError, StoreError};
use crate::persist::PersistenceAdapter;

/// Prefix under which every comply store lives.
pub const STORE_PREFIX: &str = "comply/";

/// Metadata keys in an export envelope that are not store data.
const ENVELOPE_META_KEYS: &[&str] = &["generated_at", "generatedAt", "exportDate"];

/// A full snapshot of local state, ready to serialize for download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    /// When the snapshot was generated.
    pub generated_at: DateTime<Utc>,
    /// Store values keyed by storage key, verbatim.
    pub stores: BTreeMap<String, Value>,
}

impl ExportBundle {
    /// Pretty-printed UTF-8 JSON, the on-disk export format.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if serialization fails.
    pub fn to_pretty_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })
    }
}

/// Snapshot every store under `prefix`. Pure — reads only.
///
/// # Errors
///
/// Returns [`StoreError::Storage`] if the backend fails.
pub async fn export_all(
    adapter: &PersistenceAdapter,
    prefix: &str,
) -> Result<ExportBundle, StoreError> {
    let mut stores = BTreeMap::new();
    for key in adapter.list_keys(prefix).await? {
        if let Some(value) = adapter.read_raw(&key).await? {
            stores.insert(key, value);
        }
    }
    Ok(ExportBundle {
        generated_at: Utc::now(),
        stores,
    })
}

/// Delete every store under `prefix`. Returns the number of keys removed.
///
/// # Errors
///
/// Returns [`StoreError::Storage`] if the backend fails.
pub async fn clear_stores(adapter: &PersistenceAdapter, prefix: &str) -> Result<usize, StoreError> {
    let keys = adapter.list_keys(prefix).await?;
    let count = keys.len();
    for key in keys {
        adapter.remove(&key).await?;
    }
    Ok(count)
}

/// A parsed, not-yet-applied import: the keys that would be merged.
///
/// Parsing and applying are separate steps so the caller can show the
/// user what is about to happen and get confirmation in between.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPlan {
    entries: BTreeMap<String, Value>,
}

impl ImportPlan {
    /// Parse an import payload.
    ///
    /// Accepts the export envelope (`{generated_at, stores: {...}}`) or a
    /// bare top-level object of key→value pairs; envelope metadata keys
    /// are not treated as store data.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::InvalidJson`] or [`ImportError::NotAnObject`];
    /// in either case nothing has been merged.
    pub fn parse(payload: &str) -> Result<Self, ImportError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| ImportError::InvalidJson {
                reason: e.to_string(),
            })?;

        let Value::Object(top) = value else {
            return Err(ImportError::NotAnObject {
                found: json_type_name(&value).to_owned(),
            });
        };

        let entries = match top.get("stores") {
            Some(Value::Object(stores)) => stores
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => top
                .iter()
                .filter(|(k, _)| !ENVELOPE_META_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };

        Ok(Self { entries })
    }

    /// The keys that would be merged, in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Number of keys that would be merged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the payload contained no store data at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge every key into storage verbatim. Returns the number written.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Storage`] if a backend write fails.
    pub async fn apply(&self, adapter: &PersistenceAdapter) -> Result<usize, ImportError> {
        for (key, value) in &self.entries {
            adapter
                .write_raw(key, value)
                .await
                .map_err(|e| match e {
                    StoreError::Storage(inner) => ImportError::Storage(inner),
                    other => ImportError::InvalidJson {
                        reason: other.to_string(),
                    },
                })?;
        }
        Ok(self.entries.len())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
