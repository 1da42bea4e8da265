//! Form sessions — the add/edit/delete surface bound to one record.
//!
//! A [`FormSession`] is the transient editing state behind a modal or
//! panel: it loads the record's current persisted values on open, buffers
//! edits without touching the store, and commits everything in one write
//! on submit. Per session the lifecycle is
//! `editing → {committing → closed} | closed`, with validation failures
//! returning to `editing` — there is no error state that traps the user.
//!
//! Destructive actions go through [`DeleteConfirmation`], which requires
//! a second explicit gesture before the store is mutated.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{StoreError, ValidationError};
use crate::store::{RecordStore, StoreSchema};

/// Lifecycle state of a form session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormState {
    /// Open with the record's values loaded; edits are being buffered.
    Editing,
    /// Submit in flight — edits validated, store write pending.
    Committing,
    /// Terminal. Reached by a successful submit or any cancel gesture.
    Closed,
}

/// Result of a submit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// All edits validated and were written in one commit.
    Committed,
    /// Validation rejected the submission; the session stays open with an
    /// inline message and the store was not touched.
    Rejected,
}

/// Buffered editing state for one record.
#[derive(Debug)]
pub struct FormSession {
    record_id: String,
    loaded: Map<String, Value>,
    edits: BTreeMap<String, Value>,
    state: FormState,
    error: Option<String>,
}

impl FormSession {
    /// Open a session on the record for `id`, loading its current
    /// persisted values (read-through — never a stale cache).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record cannot be loaded.
    pub async fn open<S: StoreSchema>(
        store: &RecordStore<S>,
        id: &str,
    ) -> Result<Self, StoreError> {
        let record = store.get_or_create(id).await?;
        Ok(Self {
            record_id: record.id,
            loaded: record.fields,
            edits: BTreeMap::new(),
            state: FormState::Editing,
            error: None,
        })
    }

    /// The record this session edits.
    #[must_use]
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> FormState {
        self.state
    }

    /// The inline validation message from the last rejected submit.
    #[must_use]
    pub fn inline_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Buffer an edit. Nothing is persisted until submit. Ignored (with a
    /// warning) once the session has left the editing state.
    pub fn set_field(&mut self, name: &str, value: Value) {
        if self.state != FormState::Editing {
            warn!(record = %self.record_id, field = name, "edit after session closed; ignoring");
            return;
        }
        self.edits.insert(name.to_owned(), value);
    }

    /// The effective value of a field: the buffered edit if present,
    /// otherwise the value loaded at open.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.edits.get(name).or_else(|| self.loaded.get(name))
    }

    /// Whether any edits are buffered.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Validate and commit the buffered edits in one write, then close.
    ///
    /// Validation checks the schema's required label field (the effective
    /// value must be a non-empty string) and every buffered edit. On
    /// rejection the session stays open in the editing state with an
    /// inline message, and the store is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only if persistence itself fails; the
    /// session then returns to the editing state so the user can retry.
    pub async fn submit<S: StoreSchema>(
        &mut self,
        store: &RecordStore<S>,
    ) -> Result<SubmitOutcome, StoreError> {
        if self.state != FormState::Editing {
            return Ok(SubmitOutcome::Rejected);
        }

        if let Err(e) = self.validate(store.schema()) {
            self.error = Some(e.to_string());
            return Ok(SubmitOutcome::Rejected);
        }
        self.error = None;

        if self.edits.is_empty() {
            self.state = FormState::Closed;
            return Ok(SubmitOutcome::Committed);
        }

        let edits: Vec<(String, Value)> = self
            .edits
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        self.state = FormState::Committing;
        match store.commit_fields(&self.record_id, &edits).await {
            Ok(()) => {
                self.state = FormState::Closed;
                Ok(SubmitOutcome::Committed)
            }
            Err(e) => {
                self.state = FormState::Editing;
                Err(e)
            }
        }
    }

    /// Discard all buffered edits and close. Explicit close, overlay
    /// click, and Escape all land here — none of them commit anything.
    pub fn cancel(&mut self) {
        self.edits.clear();
        self.error = None;
        self.state = FormState::Closed;
    }

    fn validate<S: StoreSchema>(&self, schema: &S) -> Result<(), ValidationError> {
        if let Some(label) = schema.label_field() {
            let effective = self.field(label);
            let is_empty = match effective {
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
                None => true,
            };
            if is_empty {
                return Err(ValidationError::MissingRequired {
                    field: label.to_owned(),
                });
            }
        }
        for (field, value) in &self.edits {
            schema.validate_field(field, value)?;
        }
        Ok(())
    }
}

/// Two-gesture confirmation for destructive actions.
///
/// The first gesture constructs the confirmation; only the second —
/// [`DeleteConfirmation::confirm_record`] or
/// [`DeleteConfirmation::confirm_item`] — issues the store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteConfirmation {
    record_id: String,
    pending: bool,
}

impl DeleteConfirmation {
    /// First gesture: request deletion of a record (or one of its
    /// collection items). Nothing is mutated yet.
    #[must_use]
    pub fn request(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            pending: true,
        }
    }

    /// Whether the confirmation is still awaiting the second gesture.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Second gesture: delete the whole record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn confirm_record<S: StoreSchema>(
        &mut self,
        store: &RecordStore<S>,
    ) -> Result<(), StoreError> {
        if !self.pending {
            warn!(record = %self.record_id, "delete confirmation reused; ignoring");
            return Ok(());
        }
        self.pending = false;
        store.delete(&self.record_id).await
    }

    /// Second gesture: remove one item from a collection on the record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if persistence fails.
    pub async fn confirm_item<S: StoreSchema>(
        &mut self,
        store: &RecordStore<S>,
        collection: &str,
        item_id: &str,
    ) -> Result<(), StoreError> {
        if !self.pending {
            warn!(record = %self.record_id, "delete confirmation reused; ignoring");
            return Ok(());
        }
        self.pending = false;
        store
            .remove_from_collection(&self.record_id, collection, item_id)
            .await
    }

    /// Back out without mutating anything.
    pub fn cancel(&mut self) {
        self.pending = false;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use comply_storage::{MemoryBackend, StorageBackend};
    use serde_json::json;

    use crate::client::{ClientPortfolio, NewClient};
    use crate::persist::PersistenceAdapter;
    use crate::store::StaticActor;

    async fn make_portfolio() -> (Arc<MemoryBackend>, ClientPortfolio, String) {
        let backend = Arc::new(MemoryBackend::new());
        let adapter = PersistenceAdapter::new(Arc::clone(&backend) as Arc<dyn StorageBackend>);
        let portfolio = ClientPortfolio::new(adapter, Arc::new(StaticActor("msp".to_owned())));
        let id = portfolio
            .add_client(NewClient {
                name: "Initech".to_owned(),
                ..NewClient::default()
            })
            .await
            .unwrap();
        (backend, portfolio, id)
    }

    #[tokio::test]
    async fn open_shows_current_persisted_values() {
        let (_backend, portfolio, id) = make_portfolio().await;

        // Mutate outside the session, then open: the session must see the
        // new value, not anything cached.
        portfolio
            .update_client(&id, "industry", json!("Aerospace"))
            .await
            .unwrap();

        let session = FormSession::open(portfolio.store(), &id).await.unwrap();
        assert_eq!(session.field("industry"), Some(&json!("Aerospace")));
        assert_eq!(session.state(), FormState::Editing);
    }

    #[tokio::test]
    async fn cancel_discards_edits() {
        let (backend, portfolio, id) = make_portfolio().await;
        let before = backend.get("comply/clients").await.unwrap();

        let mut session = FormSession::open(portfolio.store(), &id).await.unwrap();
        session.set_field("notes", json!("scratch"));
        session.cancel();

        assert_eq!(session.state(), FormState::Closed);
        let after = backend.get("comply/clients").await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn rejected_submit_keeps_store_byte_identical() {
        let (backend, portfolio, id) = make_portfolio().await;
        let before = backend.get("comply/clients").await.unwrap();

        let mut session = FormSession::open(portfolio.store(), &id).await.unwrap();
        // Clearing the required label and adding an otherwise-valid edit:
        // neither may land.
        session.set_field("name", json!(""));
        session.set_field("notes", json!("valid note"));

        let outcome = session.submit(portfolio.store()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Rejected);
        assert_eq!(session.state(), FormState::Editing);
        assert!(session.inline_error().unwrap().contains("name"));

        let after = backend.get("comply/clients").await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn rejected_field_value_reports_inline() {
        let (_backend, portfolio, id) = make_portfolio().await;
        let mut session = FormSession::open(portfolio.store(), &id).await.unwrap();
        session.set_field("sprs_score", json!(150));

        let outcome = session.submit(portfolio.store()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Rejected);
        assert!(session.inline_error().unwrap().contains("sprs_score"));

        // Fixing the value lets the same session submit.
        session.set_field("sprs_score", json!(95));
        let outcome = session.submit(portfolio.store()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Committed);
        assert_eq!(session.state(), FormState::Closed);
        assert!(session.inline_error().is_none());
    }

    #[tokio::test]
    async fn submit_commits_all_edits_at_once() {
        let (_backend, portfolio, id) = make_portfolio().await;
        let mut session = FormSession::open(portfolio.store(), &id).await.unwrap();
        session.set_field("industry", json!("Logistics"));
        session.set_field("completion_percent", json!(40));

        let outcome = session.submit(portfolio.store()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Committed);

        let client = portfolio.client(&id).await.unwrap();
        assert_eq!(client.industry, "Logistics");
        assert_eq!(client.completion_percent, 40);
    }

    #[tokio::test]
    async fn submit_with_no_edits_just_closes() {
        let (backend, portfolio, id) = make_portfolio().await;
        let before = backend.get("comply/clients").await.unwrap();

        let mut session = FormSession::open(portfolio.store(), &id).await.unwrap();
        let outcome = session.submit(portfolio.store()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Committed);
        assert_eq!(session.state(), FormState::Closed);

        let after = backend.get("comply/clients").await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn edits_after_close_are_ignored() {
        let (_backend, portfolio, id) = make_portfolio().await;
        let mut session = FormSession::open(portfolio.store(), &id).await.unwrap();
        session.cancel();
        session.set_field("notes", json!("too late"));
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn delete_requires_second_gesture() {
        let (_backend, portfolio, id) = make_portfolio().await;

        let mut confirmation = DeleteConfirmation::request(id.clone());
        // First gesture alone must not mutate.
        assert_eq!(portfolio.clients().await.unwrap().len(), 1);
        assert!(confirmation.is_pending());

        confirmation.confirm_record(portfolio.store()).await.unwrap();
        assert!(portfolio.clients().await.unwrap().is_empty());
        assert!(!confirmation.is_pending());
    }

    #[tokio::test]
    async fn cancelled_confirmation_never_mutates() {
        let (_backend, portfolio, id) = make_portfolio().await;

        let mut confirmation = DeleteConfirmation::request(id.clone());
        confirmation.cancel();
        confirmation.confirm_record(portfolio.store()).await.unwrap();

        assert_eq!(portfolio.clients().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn confirm_item_removes_collection_entry() {
        use crate::evidence::{NewEvidence, TrackerStore};

        let backend = Arc::new(MemoryBackend::new());
        let adapter = PersistenceAdapter::new(Arc::clone(&backend) as Arc<dyn StorageBackend>);
        let tracker = TrackerStore::new(adapter, Arc::new(StaticActor("msp".to_owned())));
        let evidence_id = tracker
            .add_evidence(
                "AC.L2-3.1.1",
                NewEvidence {
                    title: "Policy doc".to_owned(),
                    ..NewEvidence::default()
                },
            )
            .await
            .unwrap();

        let mut confirmation = DeleteConfirmation::request("AC.L2-3.1.1");
        confirmation
            .confirm_item(tracker.store(), "evidence", &evidence_id)
            .await
            .unwrap();
        assert!(tracker.evidence("AC.L2-3.1.1").await.unwrap().is_empty());
    }
}
