//! Generic record store — CRUD over ID-keyed records with get-or-create
//! semantics.
//!
//! Every feature module (objective tracker, client portfolio, settings)
//! is a [`RecordStore`] parameterized by its [`StoreSchema`]. The store is
//! write-through: each mutation loads the whole document, mutates it in
//! memory, and writes the whole document back before returning, so rapid
//! successive operations never interleave partial writes.
//!
//! Lookup of an unknown ID auto-creates a record with schema defaults.
//! That is deliberate, load-bearing behavior: callers render objectives
//! and settings that have never been touched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{StoreError, ValidationError};
use crate::persist::{PersistenceAdapter, StoreDocument};

/// Actor name recorded when no current user is configured.
pub const UNKNOWN_ACTOR: &str = "Unknown";

fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

fn unknown_actor() -> String {
    UNKNOWN_ACTOR.to_owned()
}

/// One entity managed by a record store.
///
/// `fields` is a JSON object whose layout is described by the store's
/// schema. Fields this build does not know about are preserved verbatim —
/// a schema change must never make old data unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique within the store; immutable once created.
    pub id: String,
    /// Named attributes specific to the entity kind.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Stamped on every mutation, together with `updated_by`.
    #[serde(default = "epoch")]
    pub last_updated: DateTime<Utc>,
    /// Actor name resolved at mutation time.
    #[serde(default = "unknown_actor")]
    pub updated_by: String,
}

impl Record {
    /// Build an unstamped record from raw fields. Used by persistence
    /// tests and migration; stores stamp on mutation.
    #[must_use]
    pub fn with_fields(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
            last_updated: epoch(),
            updated_by: unknown_actor(),
        }
    }

    /// Look up a single field value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Look up a list-valued field, if present and actually a list.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&Vec<Value>> {
        self.fields.get(name).and_then(Value::as_array)
    }
}

/// Source of the actor name stamped into `updated_by`.
///
/// The settings store provides a live implementation that resolves the
/// configured assessor at mutation time; tests and one-shot commands use
/// [`StaticActor`].
pub trait ActorSource: Send + Sync {
    /// The name to record on the next mutation.
    fn current_actor(&self) -> String;
}

/// A fixed actor name.
#[derive(Debug, Clone)]
pub struct StaticActor(pub String);

impl StaticActor {
    /// The default attribution when no user is configured.
    #[must_use]
    pub fn unknown() -> Self {
        Self(UNKNOWN_ACTOR.to_owned())
    }
}

impl ActorSource for StaticActor {
    fn current_actor(&self) -> String {
        self.0.clone()
    }
}

/// Describes one store: its storage key, record defaults, and field
/// validation rules.
pub trait StoreSchema: Send + Sync + 'static {
    /// The storage key this store owns. No other module reads or writes it.
    fn store_key(&self) -> &'static str;

    /// Field defaults for a freshly created record.
    fn defaults(&self, id: &str) -> Map<String, Value>;

    /// The primary label field that must be non-empty on form submission,
    /// for entity kinds that have one.
    fn label_field(&self) -> Option<&'static str> {
        None
    }

    /// Validate one field value before it is written.
    ///
    /// Unknown fields pass — stored documents may carry fields this build
    /// does not know about, and rejecting them would make old data
    /// unwritable after a schema change.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the first rule violated.
    fn validate_field(&self, field: &str, value: &Value) -> Result<(), ValidationError>;
}

/// A snapshot of a store's full contents, for export and reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// When the snapshot was taken.
    pub exported_at: DateTime<Utc>,
    /// All records at snapshot time, keyed by ID.
    pub records: std::collections::BTreeMap<String, Record>,
}

/// CRUD operations over records keyed by ID.
pub struct RecordStore<S: StoreSchema> {
    adapter: PersistenceAdapter,
    schema: S,
    actor: Arc<dyn ActorSource>,
}

impl<S: StoreSchema> RecordStore<S> {
    /// Create a store over the given adapter with an injected actor source.
    #[must_use]
    pub fn new(adapter: PersistenceAdapter, schema: S, actor: Arc<dyn ActorSource>) -> Self {
        Self {
            adapter,
            schema,
            actor,
        }
    }

    /// The schema describing this store's records.
    pub fn schema(&self) -> &S {
        &self.schema
    }

    /// The storage key this store owns.
    #[must_use]
    pub fn store_key(&self) -> &'static str {
        self.schema.store_key()
    }

    /// Return the record for `id`, creating and persisting one with schema
    /// defaults if none exists. Never fails for an unknown ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only if the backend read or write fails.
    pub async fn get_or_create(&self, id: &str) -> Result<Record, StoreError> {
        let mut doc = self.adapter.load(self.store_key()).await?;
        if let Some(record) = doc.records.get(id) {
            return Ok(record.clone());
        }

        let record = self.fresh_record(id);
        doc.records.insert(id.to_owned(), record.clone());
        self.adapter.save(self.store_key(), &doc).await?;
        Ok(record)
    }

    /// Set one field on the record for `id`, creating the record if needed.
    ///
    /// The value is validated against the schema before anything is
    /// loaded or written; a rejected value leaves the store untouched.
    /// On success the field change and the `last_updated`/`updated_by`
    /// stamps land in a single document write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a rejected value, or
    /// [`StoreError::Storage`] if persistence fails.
    pub async fn update_field(&self, id: &str, field: &str, value: Value) -> Result<(), StoreError> {
        self.schema.validate_field(field, &value)?;

        let mut doc = self.adapter.load(self.store_key()).await?;
        let record = self.entry(&mut doc, id);
        record.fields.insert(field.to_owned(), value);
        self.stamp(record);
        self.adapter.save(self.store_key(), &doc).await
    }

    /// Apply several field edits to one record, all-or-nothing.
    ///
    /// Every edit is validated before any write; if one is rejected, none
    /// are applied. Used by form submission, which must not partially
    /// commit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for the first rejected edit, or
    /// [`StoreError::Storage`] if persistence fails.
    pub async fn commit_fields(
        &self,
        id: &str,
        edits: &[(String, Value)],
    ) -> Result<(), StoreError> {
        for (field, value) in edits {
            self.schema.validate_field(field, value)?;
        }

        let mut doc = self.adapter.load(self.store_key()).await?;
        let record = self.entry(&mut doc, id);
        for (field, value) in edits {
            record.fields.insert(field.clone(), value.clone());
        }
        self.stamp(record);
        self.adapter.save(self.store_key(), &doc).await
    }

    /// Append an item to a list-valued field on the record for `id`,
    /// creating the record if needed. Returns the item's ID, generating a
    /// fresh one when the item does not carry a non-empty `id` of its own.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if persistence fails.
    pub async fn add_to_collection(
        &self,
        id: &str,
        collection: &str,
        mut item: Map<String, Value>,
    ) -> Result<String, StoreError> {
        let item_id = match item.get("id").and_then(Value::as_str) {
            Some(existing) if !existing.is_empty() => existing.to_owned(),
            _ => {
                let generated = uuid::Uuid::new_v4().to_string();
                item.insert("id".to_owned(), Value::String(generated.clone()));
                generated
            }
        };

        let mut doc = self.adapter.load(self.store_key()).await?;
        let record = self.entry(&mut doc, id);

        match record.fields.get(collection) {
            Some(Value::Array(_)) => {}
            Some(other) => {
                warn!(
                    store = self.store_key(),
                    record = id,
                    collection,
                    found = %json_type_name(other),
                    "collection field is not a list; resetting to a list"
                );
                record
                    .fields
                    .insert(collection.to_owned(), Value::Array(Vec::new()));
            }
            None => {
                record
                    .fields
                    .insert(collection.to_owned(), Value::Array(Vec::new()));
            }
        }
        if let Some(Value::Array(items)) = record.fields.get_mut(collection) {
            items.push(Value::Object(item));
        }

        self.stamp(record);
        self.adapter.save(self.store_key(), &doc).await?;
        Ok(item_id)
    }

    /// Remove the item with `item_id` from a list-valued field.
    ///
    /// A missing record, missing collection, or already-absent item is a
    /// no-op, not an error. Nothing is created or stamped unless an item
    /// is actually removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if persistence fails.
    pub async fn remove_from_collection(
        &self,
        id: &str,
        collection: &str,
        item_id: &str,
    ) -> Result<(), StoreError> {
        let mut doc = self.adapter.load(self.store_key()).await?;
        let Some(record) = doc.records.get_mut(id) else {
            return Ok(());
        };

        let Some(Value::Array(items)) = record.fields.get_mut(collection) else {
            warn!(
                store = self.store_key(),
                record = id,
                collection,
                "collection missing or not a list; treating removal as a no-op"
            );
            return Ok(());
        };

        let before = items.len();
        items.retain(|item| item.get("id").and_then(Value::as_str) != Some(item_id));
        if items.len() == before {
            return Ok(());
        }

        self.stamp(record);
        self.adapter.save(self.store_key(), &doc).await
    }

    /// Delete the record for `id` entirely. Idempotent — deleting an
    /// unknown ID changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if persistence fails.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut doc = self.adapter.load(self.store_key()).await?;
        if doc.records.remove(id).is_none() {
            return Ok(());
        }
        self.adapter.save(self.store_key(), &doc).await
    }

    /// All current records, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend read fails.
    pub async fn list(&self) -> Result<Vec<Record>, StoreError> {
        let doc = self.adapter.load(self.store_key()).await?;
        Ok(doc.records.into_values().collect())
    }

    /// Snapshot the entire store for export or reporting. Pure — reads
    /// only, mutates nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the backend read fails.
    pub async fn export_snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let doc = self.adapter.load(self.store_key()).await?;
        Ok(StoreSnapshot {
            exported_at: Utc::now(),
            records: doc.records,
        })
    }

    fn fresh_record(&self, id: &str) -> Record {
        Record {
            id: id.to_owned(),
            fields: self.schema.defaults(id),
            last_updated: Utc::now(),
            updated_by: self.actor.current_actor(),
        }
    }

    fn entry<'doc>(&self, doc: &'doc mut StoreDocument, id: &str) -> &'doc mut Record {
        doc.records
            .entry(id.to_owned())
            .or_insert_with(|| self.fresh_record(id))
    }

    fn stamp(&self, record: &mut Record) {
        record.last_updated = Utc::now();
        record.updated_by = self.actor.current_actor();
    }
}

impl<S: StoreSchema> std::fmt::Debug for RecordStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("store_key", &self.store_key())
            .finish_non_exhaustive()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use comply_storage::{MemoryBackend, StorageBackend};
    use serde_json::json;

    struct TestSchema;

    impl StoreSchema for TestSchema {
        fn store_key(&self) -> &'static str {
            "comply/test"
        }

        fn defaults(&self, _id: &str) -> Map<String, Value> {
            let mut fields = Map::new();
            fields.insert("title".to_owned(), Value::String(String::new()));
            fields.insert("items".to_owned(), Value::Array(Vec::new()));
            fields.insert("score".to_owned(), Value::Null);
            fields
        }

        fn label_field(&self) -> Option<&'static str> {
            Some("title")
        }

        fn validate_field(&self, field: &str, value: &Value) -> Result<(), ValidationError> {
            if field == "score" && !value.is_null() {
                let score = value.as_i64().ok_or_else(|| ValidationError::InvalidValue {
                    field: field.to_owned(),
                    reason: "must be an integer".to_owned(),
                })?;
                if !(0..=10).contains(&score) {
                    return Err(ValidationError::OutOfRange {
                        field: field.to_owned(),
                        value: score,
                        min: 0,
                        max: 10,
                    });
                }
            }
            Ok(())
        }
    }

    fn make_store() -> (Arc<MemoryBackend>, RecordStore<TestSchema>) {
        let backend = Arc::new(MemoryBackend::new());
        let adapter = PersistenceAdapter::new(Arc::clone(&backend) as Arc<dyn StorageBackend>);
        let store = RecordStore::new(
            adapter,
            TestSchema,
            Arc::new(StaticActor("alice".to_owned())),
        );
        (backend, store)
    }

    #[tokio::test]
    async fn get_or_create_creates_with_defaults() {
        let (_backend, store) = make_store();
        let record = store.get_or_create("r1").await.unwrap();
        assert_eq!(record.id, "r1");
        assert_eq!(record.field("title"), Some(&json!("")));
        assert_eq!(record.collection("items"), Some(&Vec::new()));
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (_backend, store) = make_store();
        let first = store.get_or_create("r1").await.unwrap();
        let second = store.get_or_create("r1").await.unwrap();
        assert_eq!(first.fields, second.fields);
        assert_eq!(first.last_updated, second.last_updated);
    }

    #[tokio::test]
    async fn update_field_stamps_attribution() {
        let (_backend, store) = make_store();
        store
            .update_field("r1", "title", json!("Access Control"))
            .await
            .unwrap();

        let record = store.get_or_create("r1").await.unwrap();
        assert_eq!(record.field("title"), Some(&json!("Access Control")));
        assert_eq!(record.updated_by, "alice");
        assert!(record.last_updated > DateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn update_field_accepts_unknown_fields() {
        let (_backend, store) = make_store();
        store
            .update_field("r1", "not_in_schema", json!("kept"))
            .await
            .unwrap();
        let record = store.get_or_create("r1").await.unwrap();
        assert_eq!(record.field("not_in_schema"), Some(&json!("kept")));
    }

    #[tokio::test]
    async fn rejected_value_leaves_store_untouched() {
        let (backend, store) = make_store();
        store.update_field("r1", "title", json!("x")).await.unwrap();
        let before = backend.get("comply/test").await.unwrap();

        let result = store.update_field("r1", "score", json!(42)).await;
        assert!(matches!(
            result,
            Err(StoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        let after = backend.get("comply/test").await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn commit_fields_is_all_or_nothing() {
        let (backend, store) = make_store();
        store.get_or_create("r1").await.unwrap();
        let before = backend.get("comply/test").await.unwrap();

        let edits = vec![
            ("title".to_owned(), json!("valid")),
            ("score".to_owned(), json!(99)),
        ];
        let result = store.commit_fields("r1", &edits).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));

        // The valid edit must not have landed either.
        let after = backend.get("comply/test").await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn commit_fields_applies_all_edits_in_one_write() {
        let (_backend, store) = make_store();
        let edits = vec![
            ("title".to_owned(), json!("Access Policy")),
            ("score".to_owned(), json!(7)),
        ];
        store.commit_fields("r1", &edits).await.unwrap();

        let record = store.get_or_create("r1").await.unwrap();
        assert_eq!(record.field("title"), Some(&json!("Access Policy")));
        assert_eq!(record.field("score"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn add_to_collection_generates_nonempty_id() {
        let (_backend, store) = make_store();
        let mut item = Map::new();
        item.insert("name".to_owned(), json!("first"));

        let item_id = store.add_to_collection("r1", "items", item).await.unwrap();
        assert!(!item_id.is_empty());

        let record = store.get_or_create("r1").await.unwrap();
        let items = record.collection("items").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get("id"), Some(&json!(item_id)));
    }

    #[tokio::test]
    async fn add_to_collection_keeps_caller_id() {
        let (_backend, store) = make_store();
        let mut item = Map::new();
        item.insert("id".to_owned(), json!("ev-7"));

        let item_id = store.add_to_collection("r1", "items", item).await.unwrap();
        assert_eq!(item_id, "ev-7");
    }

    #[tokio::test]
    async fn add_to_collection_creates_missing_collection() {
        let (_backend, store) = make_store();
        let id = store
            .add_to_collection("r1", "attachments", Map::new())
            .await
            .unwrap();
        let record = store.get_or_create("r1").await.unwrap();
        let items = record.collection("attachments").unwrap();
        assert_eq!(items[0].get("id"), Some(&json!(id)));
    }

    #[tokio::test]
    async fn removal_is_absence_and_idempotent() {
        let (_backend, store) = make_store();
        let item_id = store
            .add_to_collection("r1", "items", Map::new())
            .await
            .unwrap();

        store
            .remove_from_collection("r1", "items", &item_id)
            .await
            .unwrap();
        let record = store.get_or_create("r1").await.unwrap();
        assert!(
            record
                .collection("items")
                .unwrap()
                .iter()
                .all(|item| item.get("id").and_then(Value::as_str) != Some(item_id.as_str()))
        );

        // Removing again is a no-op, not an error.
        store
            .remove_from_collection("r1", "items", &item_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn remove_from_missing_record_does_not_create_it() {
        let (_backend, store) = make_store();
        store
            .remove_from_collection("ghost", "items", "x")
            .await
            .unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_from_missing_collection_is_noop() {
        let (_backend, store) = make_store();
        store.get_or_create("r1").await.unwrap();
        store
            .remove_from_collection("r1", "nonexistent", "x")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_removes_record_from_listing_and_export() {
        let (_backend, store) = make_store();
        store.get_or_create("r1").await.unwrap();
        store.get_or_create("r2").await.unwrap();

        store.delete("r1").await.unwrap();
        store.delete("r1").await.unwrap(); // idempotent

        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["r2"]);

        let snapshot = store.export_snapshot().await.unwrap();
        assert!(!snapshot.records.contains_key("r1"));
    }

    #[tokio::test]
    async fn export_snapshot_does_not_mutate_storage() {
        let (backend, store) = make_store();
        store.get_or_create("r1").await.unwrap();
        let before = backend.get("comply/test").await.unwrap();

        let snapshot = store.export_snapshot().await.unwrap();
        assert_eq!(snapshot.records.len(), 1);

        let after = backend.get("comply/test").await.unwrap();
        assert_eq!(before, after);
    }
}
