//! Progress reporting
//!
//! The engine never logs directly; every table pass reports through an injected
//! [`SyncReporter`]. [`TracingReporter`] forwards events to `tracing`.

use std::fmt;

use tracing::{error, info, warn, Span};

use crate::error::Error;

/// What happened to one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowAction {
    /// Row added for a new value
    Inserted,
    /// Row rewritten to match its value
    Updated,
    /// Orphaned row deleted
    Deleted,
    /// Orphaned row marked inactive
    Deactivated,
    /// Orphaned row kept because a foreign key still references it
    Skipped,
}

impl fmt::Display for RowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inserted => write!(f, "inserted"),
            Self::Updated => write!(f, "updated"),
            Self::Deleted => write!(f, "deleted"),
            Self::Deactivated => write!(f, "deactivated"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// A row-level state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOutcome {
    /// What happened
    pub action: RowAction,
    /// `schema.table`
    pub table: String,
    /// Member name, or `#id` when the row has no name
    pub member: String,
    /// Row identity
    pub id: i64,
}

/// Per-table counts of row outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSummary {
    /// Rows inserted
    pub inserted: usize,
    /// Rows updated
    pub updated: usize,
    /// Rows deleted
    pub deleted: usize,
    /// Rows marked inactive
    pub deactivated: usize,
    /// Deletes skipped due to foreign keys
    pub skipped: usize,
}

impl TableSummary {
    /// Count one outcome
    pub fn record(&mut self, action: RowAction) {
        match action {
            RowAction::Inserted => self.inserted += 1,
            RowAction::Updated => self.updated += 1,
            RowAction::Deleted => self.deleted += 1,
            RowAction::Deactivated => self.deactivated += 1,
            RowAction::Skipped => self.skipped += 1,
        }
    }

    /// Number of rows changed (skips excluded)
    pub fn changed(&self) -> usize {
        self.inserted + self.updated + self.deleted + self.deactivated
    }

    /// Whether nothing happened
    pub fn is_noop(&self) -> bool {
        self.changed() == 0 && self.skipped == 0
    }
}

impl fmt::Display for TableSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} deleted, {} deactivated, {} skipped",
            self.inserted, self.updated, self.deleted, self.deactivated, self.skipped
        )
    }
}

/// Receiver for synchronization events.
///
/// `begin_table`/`end_table` bracket the statements of one table and are only
/// emitted when the table needs changes. `error` is emitted once per failed table.
pub trait SyncReporter: Send + Sync {
    /// A table is about to be changed
    fn begin_table(&self, table: &str);

    /// One row changed state (or was skipped)
    fn row_outcome(&self, outcome: &RowOutcome);

    /// All statements for a table completed
    fn end_table(&self, table: &str, summary: &TableSummary);

    /// A table pass failed
    fn error(&self, table: &str, error: &Error);
}

/// Reporter that writes `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl SyncReporter for TracingReporter {
    fn begin_table(&self, table: &str) {
        info!(table, "Updating {}", table);
    }

    fn row_outcome(&self, outcome: &RowOutcome) {
        let table = outcome.table.as_str();
        let member = outcome.member.as_str();
        match outcome.action {
            RowAction::Inserted => info!(table, member, id = outcome.id, "Added {}", member),
            RowAction::Updated => info!(table, member, id = outcome.id, "Updated {}", member),
            RowAction::Deleted => info!(table, member, id = outcome.id, "Deleted {}", member),
            RowAction::Deactivated => info!(
                table,
                member,
                id = outcome.id,
                "Marked deleted value \"{}\" as inactive",
                member
            ),
            RowAction::Skipped => warn!(
                table,
                member,
                id = outcome.id,
                "Attempted to delete {}, but a foreign key still references it",
                member
            ),
        }
    }

    fn end_table(&self, table: &str, summary: &TableSummary) {
        info!(table, "Finished {}: {}", table, summary);
    }

    fn error(&self, table: &str, err: &Error) {
        error!(table, category = %err.category(), "Failed to update table {}: {}", table, err);
    }
}

/// Reporter that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl SyncReporter for NullReporter {
    fn begin_table(&self, _table: &str) {}
    fn row_outcome(&self, _outcome: &RowOutcome) {}
    fn end_table(&self, _table: &str, _summary: &TableSummary) {}
    fn error(&self, _table: &str, _error: &Error) {}
}

/// Span for one database pass
pub fn database_span(target: &str) -> Span {
    tracing::info_span!("enumsql.database", db.target = target)
}

/// Span for one table pass
pub fn table_span(table: &str, enum_name: &str) -> Span {
    tracing::info_span!("enumsql.table", db.table = table, enum_name)
}
