//! Plan execution
//!
//! Applies an [`UpdatePlan`] one parameterized statement per row, reporting
//! each row outcome. Under `TryDelete` a foreign key violation on delete is
//! downgraded to a skipped row; every other failure aborts the table.

use tracing::debug;

use crate::connection::Connection;
use crate::descriptor::{ColumnRole, DeletionPolicy, EnumDescriptor, TableRow};
use crate::dialect::SqlDialect;
use crate::error::{Error, Result};
use crate::plan::UpdatePlan;
use crate::report::{RowAction, RowOutcome, SyncReporter, TableSummary};
use crate::types::Value;

/// Value of one column for a row
fn column_value(role: ColumnRole, row: &TableRow) -> Value {
    match role {
        ColumnRole::Id => Value::Int64(row.id),
        ColumnRole::Name => Value::String(row.name.clone()),
        ColumnRole::DisplayName => Value::String(row.display_name.clone()),
        ColumnRole::Description => Value::String(row.description.clone()),
        ColumnRole::IsActive => Value::Bool(row.is_active),
    }
}

/// Parameters for [`SqlDialect::insert_sql`]: every enabled column in order
pub fn insert_params(descriptor: &EnumDescriptor, row: &TableRow) -> Vec<Value> {
    descriptor
        .columns()
        .iter()
        .map(|c| column_value(c.role, row))
        .collect()
}

/// Parameters for [`SqlDialect::update_sql`]: non-Id columns, then the identity
pub fn update_params(descriptor: &EnumDescriptor, row: &TableRow) -> Vec<Value> {
    descriptor
        .columns()
        .non_id()
        .map(|c| column_value(c.role, row))
        .chain(std::iter::once(Value::Int64(row.id)))
        .collect()
}

/// Apply a plan to one table.
///
/// An empty plan issues no statements and reports nothing.
pub async fn execute_plan(
    conn: &dyn Connection,
    dialect: &dyn SqlDialect,
    descriptor: &EnumDescriptor,
    plan: &UpdatePlan,
    reporter: &dyn SyncReporter,
) -> Result<TableSummary> {
    let mut summary = TableSummary::default();
    if plan.is_empty() {
        return Ok(summary);
    }

    let table = descriptor.qualified_name();
    reporter.begin_table(&table);

    let report = |summary: &mut TableSummary, action: RowAction, row: &TableRow| {
        summary.record(action);
        reporter.row_outcome(&RowOutcome {
            action,
            table: table.clone(),
            member: row.label(),
            id: row.id,
        });
    };

    if !plan.to_insert.is_empty() {
        let sql = dialect.insert_sql(descriptor);
        for row in &plan.to_insert {
            conn.execute(&sql, &insert_params(descriptor, row)).await?;
            report(&mut summary, RowAction::Inserted, row);
        }
    }

    if !plan.to_update.is_empty() {
        let sql = dialect.update_sql(descriptor).ok_or_else(|| {
            Error::internal(format!("{} has no columns to update", table))
        })?;
        for row in &plan.to_update {
            conn.execute(&sql, &update_params(descriptor, row)).await?;
            report(&mut summary, RowAction::Updated, row);
        }
    }

    if !plan.to_remove.is_empty() {
        let (sql, action) = match plan.policy {
            DeletionPolicy::MarkInactive => (
                dialect.deactivate_sql(descriptor).ok_or_else(|| {
                    Error::config(format!(
                        "{} cannot mark rows inactive without an IsActive column",
                        table
                    ))
                })?,
                RowAction::Deactivated,
            ),
            DeletionPolicy::TryDelete | DeletionPolicy::Delete => {
                (dialect.delete_sql(descriptor), RowAction::Deleted)
            }
            DeletionPolicy::Ignore => {
                return Err(Error::internal(format!(
                    "plan for {} removes rows under the Ignore policy",
                    table
                )))
            }
        };

        for row in &plan.to_remove {
            match conn.execute(&sql, &[Value::Int64(row.id)]).await {
                Ok(affected) => {
                    debug!(table = %table, id = row.id, affected, "Applied {}", action);
                    report(&mut summary, action, row);
                }
                Err(e)
                    if plan.policy == DeletionPolicy::TryDelete && e.is_foreign_key_violation() =>
                {
                    debug!(table = %table, id = row.id, error = %e, "Delete rejected by constraint");
                    report(&mut summary, RowAction::Skipped, row);
                }
                Err(e) => return Err(e),
            }
        }
    }

    reporter.end_table(&table, &summary);
    Ok(summary)
}
