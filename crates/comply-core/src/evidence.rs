//! Objective tracker — per-objective implementation status, notes, and
//! evidence collection.
//!
//! Records are keyed by assessment objective ID (e.g. `AC.L2-3.1.1`).
//! Looking up an objective that has never been touched creates it with
//! defaults, so every objective in the guidance material can be rendered
//! and annotated without an explicit "create" step.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StoreError, ValidationError};
use crate::persist::PersistenceAdapter;
use crate::store::{ActorSource, Record, RecordStore, StoreSchema, UNKNOWN_ACTOR};

/// Storage key owned by the objective tracker.
pub const TRACKER_STORE_KEY: &str = "comply/tracker";

/// Implementation status of one assessment objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    NotStarted,
    InProgress,
    Implemented,
    NotApplicable,
}

impl ObjectiveStatus {
    /// The wire/storage form of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Implemented => "implemented",
            Self::NotApplicable => "not_applicable",
        }
    }

    /// Parse a stored status string. Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "implemented" => Some(Self::Implemented),
            "not_applicable" => Some(Self::NotApplicable),
            _ => None,
        }
    }
}

impl Default for ObjectiveStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

/// Kind of a piece of evidence attached to an objective.
///
/// Unknown stored values parse as [`EvidenceKind::Other`] so records
/// written by a newer build still render instead of being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Document,
    Screenshot,
    Log,
    Configuration,
    Policy,
    Certificate,
    Report,
    #[serde(other)]
    Other,
}

impl EvidenceKind {
    /// The wire/storage form of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Screenshot => "screenshot",
            Self::Log => "log",
            Self::Configuration => "configuration",
            Self::Policy => "policy",
            Self::Certificate => "certificate",
            Self::Report => "report",
            Self::Other => "other",
        }
    }

    /// Parse a kind string, mapping anything unrecognized to `Other`.
    #[must_use]
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "document" => Self::Document,
            "screenshot" => Self::Screenshot,
            "log" => Self::Log,
            "configuration" => Self::Configuration,
            "policy" => Self::Policy,
            "certificate" => Self::Certificate,
            "report" => Self::Report,
            _ => Self::Other,
        }
    }

    /// All known kinds, in display order.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[
            Self::Document,
            Self::Screenshot,
            Self::Log,
            Self::Configuration,
            Self::Policy,
            Self::Certificate,
            Self::Report,
            Self::Other,
        ]
    }
}

impl Default for EvidenceKind {
    fn default() -> Self {
        Self::Other
    }
}

/// One item in an objective's evidence collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Generated at insert time; never reused after removal.
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub kind: EvidenceKind,
    #[serde(default)]
    pub description: String,
    /// Free-form pointer to the underlying artifact (path, URL, ticket).
    #[serde(default)]
    pub file_reference: String,
    pub date_added: DateTime<Utc>,
    #[serde(default = "default_actor")]
    pub added_by: String,
}

fn default_actor() -> String {
    UNKNOWN_ACTOR.to_owned()
}

impl EvidenceItem {
    /// Lenient parse from a stored collection item. Items missing a title
    /// still parse (empty title) so they remain visible and deletable.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            id: str_field(obj, "id"),
            title: str_field(obj, "title"),
            kind: obj
                .get("kind")
                .and_then(Value::as_str)
                .map_or(EvidenceKind::Other, EvidenceKind::parse_lossy),
            description: str_field(obj, "description"),
            file_reference: str_field(obj, "file_reference"),
            date_added: obj
                .get("date_added")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or(DateTime::UNIX_EPOCH),
            added_by: obj
                .get("added_by")
                .and_then(Value::as_str)
                .map_or_else(default_actor, ToOwned::to_owned),
        })
    }
}

fn str_field(obj: &Map<String, Value>, name: &str) -> String {
    obj.get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Input for adding a new evidence item. The ID, timestamp, and actor
/// attribution are assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewEvidence {
    pub title: String,
    pub kind: EvidenceKind,
    pub description: String,
    pub file_reference: String,
}

/// Schema for the objective tracker store.
#[derive(Debug, Clone, Copy)]
pub struct TrackerSchema;

impl StoreSchema for TrackerSchema {
    fn store_key(&self) -> &'static str {
        TRACKER_STORE_KEY
    }

    fn defaults(&self, _id: &str) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(
            "status".to_owned(),
            Value::String(ObjectiveStatus::default().as_str().to_owned()),
        );
        fields.insert("notes".to_owned(), Value::String(String::new()));
        fields.insert("evidence".to_owned(), Value::Array(Vec::new()));
        fields
    }

    fn label_field(&self) -> Option<&'static str> {
        // Objectives are labeled by their ID; no record field is required.
        None
    }

    fn validate_field(&self, field: &str, value: &Value) -> Result<(), ValidationError> {
        match field {
            "status" => {
                let s = value.as_str().ok_or_else(|| ValidationError::InvalidValue {
                    field: field.to_owned(),
                    reason: "must be a string".to_owned(),
                })?;
                if ObjectiveStatus::parse(s).is_none() {
                    return Err(ValidationError::InvalidValue {
                        field: field.to_owned(),
                        reason: format!(
                            "unknown status '{s}' (expected not_started, in_progress, \
                             implemented, or not_applicable)"
                        ),
                    });
                }
                Ok(())
            }
            "notes" if !value.is_string() => Err(ValidationError::InvalidValue {
                field: field.to_owned(),
                reason: "must be a string".to_owned(),
            }),
            "evidence" if !value.is_array() => Err(ValidationError::InvalidValue {
                field: field.to_owned(),
                reason: "must be a list".to_owned(),
            }),
            _ => Ok(()),
        }
    }
}

/// Typed facade over the objective tracker record store.
pub struct TrackerStore {
    inner: RecordStore<TrackerSchema>,
    actor: Arc<dyn ActorSource>,
}

impl TrackerStore {
    /// Create the tracker store over the given adapter.
    #[must_use]
    pub fn new(adapter: PersistenceAdapter, actor: Arc<dyn ActorSource>) -> Self {
        Self {
            inner: RecordStore::new(adapter, TrackerSchema, Arc::clone(&actor)),
            actor,
        }
    }

    /// The generic store underneath, for form sessions and export.
    pub fn store(&self) -> &RecordStore<TrackerSchema> {
        &self.inner
    }

    /// The tracker record for an objective, created with defaults on first
    /// access.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn objective(&self, objective_id: &str) -> Result<Record, StoreError> {
        self.inner.get_or_create(objective_id).await
    }

    /// Set an objective's implementation status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn set_status(
        &self,
        objective_id: &str,
        status: ObjectiveStatus,
    ) -> Result<(), StoreError> {
        self.inner
            .update_field(objective_id, "status", Value::String(status.as_str().to_owned()))
            .await
    }

    /// Replace an objective's free-form notes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn set_notes(&self, objective_id: &str, notes: &str) -> Result<(), StoreError> {
        self.inner
            .update_field(objective_id, "notes", Value::String(notes.to_owned()))
            .await
    }

    /// Attach a new evidence item to an objective. Returns the generated
    /// evidence ID.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingRequired`] (as a [`StoreError`])
    /// if the title is empty, before anything is written.
    pub async fn add_evidence(
        &self,
        objective_id: &str,
        new: NewEvidence,
    ) -> Result<String, StoreError> {
        if new.title.trim().is_empty() {
            return Err(ValidationError::MissingRequired {
                field: "title".to_owned(),
            }
            .into());
        }

        let item = EvidenceItem {
            id: String::new(),
            title: new.title,
            kind: new.kind,
            description: new.description,
            file_reference: new.file_reference,
            date_added: Utc::now(),
            added_by: self.actor.current_actor(),
        };
        let fields = match serde_json::to_value(&item) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => Map::new(),
        };

        self.inner
            .add_to_collection(objective_id, "evidence", fields)
            .await
    }

    /// The evidence items attached to an objective, in insertion order.
    /// Items that fail to parse are skipped rather than failing the list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend read fails.
    pub async fn evidence(&self, objective_id: &str) -> Result<Vec<EvidenceItem>, StoreError> {
        let record = self.inner.get_or_create(objective_id).await?;
        Ok(record
            .collection("evidence")
            .map(|items| items.iter().filter_map(EvidenceItem::from_value).collect())
            .unwrap_or_default())
    }

    /// Remove one evidence item. Removing an absent item is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn remove_evidence(
        &self,
        objective_id: &str,
        evidence_id: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .remove_from_collection(objective_id, "evidence", evidence_id)
            .await
    }
}

impl std::fmt::Debug for TrackerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerStore").finish_non_exhaustive()
    }
}
