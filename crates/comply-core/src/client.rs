//! Client portfolio — the roster of assessed organizations.
//!
//! One record per client, keyed by a generated ID. SPRS score and
//! completion bounds are enforced here in the schema, on every write
//! path — the add form, the edit form, and direct field updates all go
//! through the same validation.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{StoreError, ValidationError};
use crate::persist::PersistenceAdapter;
use crate::store::{ActorSource, Record, RecordStore, StoreSchema};

/// Storage key owned by the client portfolio.
pub const CLIENTS_STORE_KEY: &str = "comply/clients";

/// Valid SPRS self-assessment score range.
pub const SPRS_MIN: i64 = -203;
/// Valid SPRS self-assessment score range.
pub const SPRS_MAX: i64 = 110;

/// CMMC assessment level a client is pursuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentLevel {
    Level1,
    Level2,
    Level3,
}

impl AssessmentLevel {
    /// The numeric form stored on the record.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Level1 => 1,
            Self::Level2 => 2,
            Self::Level3 => 3,
        }
    }

    /// Parse a stored level number. Returns `None` for anything outside 1-3.
    #[must_use]
    pub fn parse(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Level1),
            2 => Some(Self::Level2),
            3 => Some(Self::Level3),
            _ => None,
        }
    }
}

impl Default for AssessmentLevel {
    fn default() -> Self {
        Self::Level1
    }
}

/// Typed view of one client record, derived leniently from stored fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRecord {
    pub id: String,
    pub name: String,
    pub assessment_level: AssessmentLevel,
    pub industry: String,
    pub sprs_score: Option<i64>,
    pub completion_percent: u8,
    pub contact: String,
    pub email: String,
    pub notes: String,
    pub updated_by: String,
}

impl ClientRecord {
    /// Derive the typed view from a stored record. Missing fields take
    /// their defaults; a malformed level falls back to level 1.
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        let str_field = |name: &str| {
            record
                .field(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };
        Self {
            id: record.id.clone(),
            name: str_field("name"),
            assessment_level: record
                .field("assessment_level")
                .and_then(Value::as_u64)
                .and_then(|n| u8::try_from(n).ok())
                .and_then(AssessmentLevel::parse)
                .unwrap_or_default(),
            industry: str_field("industry"),
            sprs_score: record.field("sprs_score").and_then(Value::as_i64),
            completion_percent: record
                .field("completion_percent")
                .and_then(Value::as_u64)
                .and_then(|n| u8::try_from(n).ok())
                .map_or(0, |n| n.min(100)),
            contact: str_field("contact"),
            email: str_field("email"),
            notes: str_field("notes"),
            updated_by: record.updated_by.clone(),
        }
    }
}

/// Input for adding a client to the portfolio.
#[derive(Debug, Clone, Default)]
pub struct NewClient {
    pub name: String,
    pub assessment_level: AssessmentLevel,
    pub industry: String,
    pub sprs_score: Option<i64>,
    pub contact: String,
    pub email: String,
    pub notes: String,
}

/// Schema for the client portfolio store.
#[derive(Debug, Clone, Copy)]
pub struct ClientSchema;

impl StoreSchema for ClientSchema {
    fn store_key(&self) -> &'static str {
        CLIENTS_STORE_KEY
    }

    fn defaults(&self, _id: &str) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("name".to_owned(), Value::String(String::new()));
        fields.insert(
            "assessment_level".to_owned(),
            Value::from(AssessmentLevel::default().as_u8()),
        );
        fields.insert("industry".to_owned(), Value::String(String::new()));
        fields.insert("sprs_score".to_owned(), Value::Null);
        fields.insert("completion_percent".to_owned(), Value::from(0));
        fields.insert("contact".to_owned(), Value::String(String::new()));
        fields.insert("email".to_owned(), Value::String(String::new()));
        fields.insert("notes".to_owned(), Value::String(String::new()));
        fields
    }

    fn label_field(&self) -> Option<&'static str> {
        Some("name")
    }

    fn validate_field(&self, field: &str, value: &Value) -> Result<(), ValidationError> {
        let expect_int = |value: &Value| {
            value.as_i64().ok_or_else(|| ValidationError::InvalidValue {
                field: field.to_owned(),
                reason: "must be an integer".to_owned(),
            })
        };
        let check_range = |n: i64, min: i64, max: i64| {
            if (min..=max).contains(&n) {
                Ok(())
            } else {
                Err(ValidationError::OutOfRange {
                    field: field.to_owned(),
                    value: n,
                    min,
                    max,
                })
            }
        };

        match field {
            "assessment_level" => check_range(expect_int(value)?, 1, 3),
            "sprs_score" => {
                if value.is_null() {
                    return Ok(());
                }
                check_range(expect_int(value)?, SPRS_MIN, SPRS_MAX)
            }
            "completion_percent" => check_range(expect_int(value)?, 0, 100),
            "email" => {
                let email = value.as_str().ok_or_else(|| ValidationError::InvalidValue {
                    field: field.to_owned(),
                    reason: "must be a string".to_owned(),
                })?;
                if !email.is_empty() && !email.contains('@') {
                    return Err(ValidationError::InvalidValue {
                        field: field.to_owned(),
                        reason: format!("'{email}' is not an email address"),
                    });
                }
                Ok(())
            }
            "name" | "industry" | "contact" | "notes" if !value.is_string() => {
                Err(ValidationError::InvalidValue {
                    field: field.to_owned(),
                    reason: "must be a string".to_owned(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Typed facade over the client portfolio record store.
pub struct ClientPortfolio {
    inner: RecordStore<ClientSchema>,
}

impl ClientPortfolio {
    /// Create the portfolio store over the given adapter.
    #[must_use]
    pub fn new(adapter: PersistenceAdapter, actor: Arc<dyn ActorSource>) -> Self {
        Self {
            inner: RecordStore::new(adapter, ClientSchema, actor),
        }
    }

    /// The generic store underneath, for form sessions and export.
    pub fn store(&self) -> &RecordStore<ClientSchema> {
        &self.inner
    }

    /// Add a client and return its generated ID.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingRequired`] (as a [`StoreError`])
    /// if the name is empty, or a validation error for out-of-range
    /// scores, before anything is written.
    pub async fn add_client(&self, new: NewClient) -> Result<String, StoreError> {
        if new.name.trim().is_empty() {
            return Err(ValidationError::MissingRequired {
                field: "name".to_owned(),
            }
            .into());
        }

        let id = uuid::Uuid::new_v4().to_string();
        let edits = vec![
            ("name".to_owned(), Value::String(new.name)),
            (
                "assessment_level".to_owned(),
                Value::from(new.assessment_level.as_u8()),
            ),
            ("industry".to_owned(), Value::String(new.industry)),
            (
                "sprs_score".to_owned(),
                new.sprs_score.map_or(Value::Null, Value::from),
            ),
            ("contact".to_owned(), Value::String(new.contact)),
            ("email".to_owned(), Value::String(new.email)),
            ("notes".to_owned(), Value::String(new.notes)),
        ];
        self.inner.commit_fields(&id, &edits).await?;
        Ok(id)
    }

    /// The client record for `id`, in typed form.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn client(&self, id: &str) -> Result<ClientRecord, StoreError> {
        let record = self.inner.get_or_create(id).await?;
        Ok(ClientRecord::from_record(&record))
    }

    /// All clients, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend read fails.
    pub async fn clients(&self) -> Result<Vec<ClientRecord>, StoreError> {
        let records = self.inner.list().await?;
        Ok(records.iter().map(ClientRecord::from_record).collect())
    }

    /// Update one field on a client. Goes through the same schema
    /// validation as every other write path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for a rejected value.
    pub async fn update_client(
        &self,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        self.inner.update_field(id, field, value).await
    }

    /// Remove a client from the portfolio. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn remove_client(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }
}

impl std::fmt::Debug for ClientPortfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPortfolio").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use comply_storage::{MemoryBackend, StorageBackend};
    use crate::store::StaticActor;
    use serde_json::json;

    fn make_portfolio() -> (Arc<MemoryBackend>, ClientPortfolio) {
        let backend = Arc::new(MemoryBackend::new());
        let adapter = PersistenceAdapter::new(Arc::clone(&backend) as Arc<dyn StorageBackend>);
        let portfolio = ClientPortfolio::new(adapter, Arc::new(StaticActor("msp".to_owned())));
        (backend, portfolio)
    }

    fn sample_client() -> NewClient {
        NewClient {
            name: "Globex Manufacturing".to_owned(),
            assessment_level: AssessmentLevel::Level2,
            industry: "Defense manufacturing".to_owned(),
            sprs_score: Some(88),
            contact: "J. Doe".to_owned(),
            email: "jdoe@globex.example".to_owned(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn add_and_list_clients() {
        let (_backend, portfolio) = make_portfolio();
        let id = portfolio.add_client(sample_client()).await.unwrap();
        assert!(!id.is_empty());

        let clients = portfolio.clients().await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name, "Globex Manufacturing");
        assert_eq!(clients[0].assessment_level, AssessmentLevel::Level2);
        assert_eq!(clients[0].sprs_score, Some(88));
        assert_eq!(clients[0].updated_by, "msp");
    }

    #[tokio::test]
    async fn add_client_requires_name() {
        let (backend, portfolio) = make_portfolio();
        let result = portfolio
            .add_client(NewClient {
                name: "  ".to_owned(),
                ..NewClient::default()
            })
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Validation(ValidationError::MissingRequired { .. }))
        ));
        assert_eq!(backend.get(CLIENTS_STORE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sprs_out_of_range_rejected_on_add() {
        let (backend, portfolio) = make_portfolio();
        let result = portfolio
            .add_client(NewClient {
                sprs_score: Some(150),
                ..sample_client()
            })
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
        // Nothing was written.
        assert_eq!(backend.get(CLIENTS_STORE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sprs_out_of_range_rejected_on_edit_too() {
        let (_backend, portfolio) = make_portfolio();
        let id = portfolio.add_client(sample_client()).await.unwrap();

        let result = portfolio.update_client(&id, "sprs_score", json!(-204)).await;
        assert!(matches!(
            result,
            Err(StoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        // Prior value is intact.
        let client = portfolio.client(&id).await.unwrap();
        assert_eq!(client.sprs_score, Some(88));
    }

    #[tokio::test]
    async fn sprs_bounds_are_inclusive_and_nullable() {
        let (_backend, portfolio) = make_portfolio();
        let id = portfolio.add_client(sample_client()).await.unwrap();

        portfolio
            .update_client(&id, "sprs_score", json!(SPRS_MIN))
            .await
            .unwrap();
        portfolio
            .update_client(&id, "sprs_score", json!(SPRS_MAX))
            .await
            .unwrap();
        portfolio
            .update_client(&id, "sprs_score", Value::Null)
            .await
            .unwrap();

        let client = portfolio.client(&id).await.unwrap();
        assert_eq!(client.sprs_score, None);
    }

    #[tokio::test]
    async fn completion_percent_bounds() {
        let (_backend, portfolio) = make_portfolio();
        let id = portfolio.add_client(sample_client()).await.unwrap();

        portfolio
            .update_client(&id, "completion_percent", json!(100))
            .await
            .unwrap();
        let result = portfolio
            .update_client(&id, "completion_percent", json!(101))
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn email_shape_is_checked() {
        let (_backend, portfolio) = make_portfolio();
        let id = portfolio.add_client(sample_client()).await.unwrap();

        let result = portfolio
            .update_client(&id, "email", json!("not-an-email"))
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));

        // Empty email is allowed.
        portfolio.update_client(&id, "email", json!("")).await.unwrap();
    }

    #[tokio::test]
    async fn assessment_level_rejects_level_four() {
        let (_backend, portfolio) = make_portfolio();
        let id = portfolio.add_client(sample_client()).await.unwrap();
        let result = portfolio
            .update_client(&id, "assessment_level", json!(4))
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[tokio::test]
    async fn remove_client_is_absent_afterwards() {
        let (_backend, portfolio) = make_portfolio();
        let id = portfolio.add_client(sample_client()).await.unwrap();
        portfolio.remove_client(&id).await.unwrap();
        assert!(portfolio.clients().await.unwrap().is_empty());
        // Idempotent.
        portfolio.remove_client(&id).await.unwrap();
    }

    #[tokio::test]
    async fn from_record_tolerates_missing_fields() {
        let record = Record::with_fields("c1", Map::new());
        let client = ClientRecord::from_record(&record);
        assert_eq!(client.assessment_level, AssessmentLevel::Level1);
        assert_eq!(client.sprs_score, None);
        assert_eq!(client.completion_percent, 0);
    }
}
