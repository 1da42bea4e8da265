//! List/table view models — pure derivations from store state.
//!
//! The UI layer renders these; nothing here touches storage or a
//! terminal, so counts, badges, and empty states are testable on their
//! own. After a mutation the caller re-derives the affected view from
//! current store state — views never cache.

use crate::client::ClientRecord;
use crate::evidence::{EvidenceItem, EvidenceKind, ObjectiveStatus};
use crate::store::Record;

/// Accent color for a badge. The UI layer maps these to whatever its
/// medium supports (ANSI codes, CSS classes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accent {
    Blue,
    Green,
    Yellow,
    Red,
    Magenta,
    Cyan,
    Gray,
}

/// A typed visual tag for an enumerated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub label: &'static str,
    pub accent: Accent,
}

/// The badge for an evidence kind. Deterministic — the same kind always
/// gets the same badge; anything unrecognized upstream parses as
/// [`EvidenceKind::Other`] and lands in the gray bucket.
#[must_use]
pub fn evidence_badge(kind: EvidenceKind) -> Badge {
    match kind {
        EvidenceKind::Document => Badge { label: "Document", accent: Accent::Blue },
        EvidenceKind::Screenshot => Badge { label: "Screenshot", accent: Accent::Cyan },
        EvidenceKind::Log => Badge { label: "Log", accent: Accent::Magenta },
        EvidenceKind::Configuration => Badge { label: "Configuration", accent: Accent::Yellow },
        EvidenceKind::Policy => Badge { label: "Policy", accent: Accent::Green },
        EvidenceKind::Certificate => Badge { label: "Certificate", accent: Accent::Green },
        EvidenceKind::Report => Badge { label: "Report", accent: Accent::Blue },
        EvidenceKind::Other => Badge { label: "Other", accent: Accent::Gray },
    }
}

/// The badge for an objective's implementation status.
#[must_use]
pub fn status_badge(status: ObjectiveStatus) -> Badge {
    match status {
        ObjectiveStatus::NotStarted => Badge { label: "Not started", accent: Accent::Gray },
        ObjectiveStatus::InProgress => Badge { label: "In progress", accent: Accent::Yellow },
        ObjectiveStatus::Implemented => Badge { label: "Implemented", accent: Accent::Green },
        ObjectiveStatus::NotApplicable => Badge { label: "N/A", accent: Accent::Blue },
    }
}

/// One evidence item, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceRow {
    pub id: String,
    pub title: String,
    pub badge: Badge,
    pub description: String,
    pub file_reference: String,
    pub added_by: String,
}

/// The evidence panel for one objective.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceListView {
    pub objective_id: String,
    pub status_badge: Badge,
    pub notes: String,
    pub rows: Vec<EvidenceRow>,
    /// e.g. `"1 evidence"` — kept consistent with `rows`.
    pub count_label: String,
    /// Present exactly when there are no rows.
    pub empty_state: Option<&'static str>,
}

/// Message shown instead of a blank region when an objective has no
/// evidence yet.
pub const EVIDENCE_EMPTY_STATE: &str =
    "No evidence yet. Attach your first item with 'evidence add'.";

/// Derive the evidence panel from an objective's tracker record.
#[must_use]
pub fn evidence_list(record: &Record) -> EvidenceListView {
    let status = record
        .field("status")
        .and_then(serde_json::Value::as_str)
        .and_then(ObjectiveStatus::parse)
        .unwrap_or_default();
    let notes = record
        .field("notes")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let rows: Vec<EvidenceRow> = record
        .collection("evidence")
        .map(|items| {
            items
                .iter()
                .filter_map(EvidenceItem::from_value)
                .map(|item| EvidenceRow {
                    badge: evidence_badge(item.kind),
                    id: item.id,
                    title: item.title,
                    description: item.description,
                    file_reference: item.file_reference,
                    added_by: item.added_by,
                })
                .collect()
        })
        .unwrap_or_default();

    let count_label = format!("{} evidence", rows.len());
    let empty_state = rows.is_empty().then_some(EVIDENCE_EMPTY_STATE);

    EvidenceListView {
        objective_id: record.id.clone(),
        status_badge: status_badge(status),
        notes,
        rows,
        count_label,
        empty_state,
    }
}

/// One client, ready to render as a table row.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRow {
    pub id: String,
    pub name: String,
    /// e.g. `"Level 2"`.
    pub level_label: String,
    pub industry: String,
    /// The score, or `"—"` when none is recorded.
    pub sprs_label: String,
    /// e.g. `"40%"`.
    pub completion_label: String,
    pub contact: String,
    pub email: String,
}

/// The client portfolio table.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientTableView {
    pub rows: Vec<ClientRow>,
    /// e.g. `"3 clients"` — kept consistent with `rows`.
    pub total_label: String,
    /// Present exactly when there are no rows.
    pub empty_state: Option<&'static str>,
}

/// Message shown instead of a blank region when the portfolio is empty.
pub const CLIENTS_EMPTY_STATE: &str =
    "No clients yet. Add your first with 'client add --name <name>'.";

/// Derive the portfolio table from the current client records.
#[must_use]
pub fn client_table(clients: &[ClientRecord]) -> ClientTableView {
    let rows: Vec<ClientRow> = clients
        .iter()
        .map(|client| ClientRow {
            id: client.id.clone(),
            name: client.name.clone(),
            level_label: format!("Level {}", client.assessment_level.as_u8()),
            industry: client.industry.clone(),
            sprs_label: client
                .sprs_score
                .map_or_else(|| "—".to_owned(), |score| score.to_string()),
            completion_label: format!("{}%", client.completion_percent),
            contact: client.contact.clone(),
            email: client.email.clone(),
        })
        .collect();

    let total_label = if rows.len() == 1 {
        "1 client".to_owned()
    } else {
        format!("{} clients", rows.len())
    };
    let empty_state = rows.is_empty().then_some(CLIENTS_EMPTY_STATE);

    ClientTableView {
        rows,
        total_label,
        empty_state,
    }
}

/// Per-status objective counts for the summary line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerSummary {
    pub objectives: usize,
    pub not_started: usize,
    pub in_progress: usize,
    pub implemented: usize,
    pub not_applicable: usize,
    pub evidence_items: usize,
}

/// Tally tracker records for the status overview.
#[must_use]
pub fn tracker_summary(records: &[Record]) -> TrackerSummary {
    let mut summary = TrackerSummary {
        objectives: records.len(),
        ..TrackerSummary::default()
    };
    for record in records {
        let status = record
            .field("status")
            .and_then(serde_json::Value::as_str)
            .and_then(ObjectiveStatus::parse)
            .unwrap_or_default();
        match status {
            ObjectiveStatus::NotStarted => summary.not_started += 1,
            ObjectiveStatus::InProgress => summary.in_progress += 1,
            ObjectiveStatus::Implemented => summary.implemented += 1,
            ObjectiveStatus::NotApplicable => summary.not_applicable += 1,
        }
        summary.evidence_items += record.collection("evidence").map_or(0, Vec::len);
    }
    summary
}
