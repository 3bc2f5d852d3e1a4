//! Diff planning between the values in code and the rows in a table.

use std::cmp::Ordering;

use crate::descriptor::{ColumnRole, ColumnSet, DeletionPolicy, EnumDescriptor, TableRow, ValueRecord};

/// The statements one table pass needs, as rows.
///
/// Built by [`UpdatePlan::create`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    /// Rows for values with no persisted row
    pub to_insert: Vec<TableRow>,
    /// Target rows for values whose persisted row differs
    pub to_update: Vec<TableRow>,
    /// Persisted rows with no value in code, filtered by the deletion policy
    pub to_remove: Vec<TableRow>,
    /// Policy that decides how `to_remove` is applied
    pub policy: DeletionPolicy,
}

impl UpdatePlan {
    /// Diff the descriptor's values against a row snapshot.
    ///
    /// Both inputs must be strictly ascending by identity. Values are by
    /// construction; snapshots are checked when read.
    pub fn create(descriptor: &EnumDescriptor, rows: &[TableRow]) -> Self {
        Self::diff(
            descriptor.values(),
            rows,
            descriptor.columns(),
            descriptor.deletion_policy(),
        )
    }

    /// Linear merge over both sorted inputs.
    pub fn diff(
        values: &[ValueRecord],
        rows: &[TableRow],
        columns: &ColumnSet,
        policy: DeletionPolicy,
    ) -> Self {
        debug_assert!(values.windows(2).all(|w| w[0].identity < w[1].identity));
        debug_assert!(rows.windows(2).all(|w| w[0].id < w[1].id));

        let mut plan = Self {
            to_insert: Vec::new(),
            to_update: Vec::new(),
            to_remove: Vec::new(),
            policy,
        };

        let mut vi = 0;
        let mut ri = 0;
        loop {
            let order = match (values.get(vi), rows.get(ri)) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(value), Some(row)) => value.identity.cmp(&row.id),
            };

            match order {
                // value with no row
                Ordering::Less => {
                    plan.to_insert.push(values[vi].to_row());
                    vi += 1;
                }
                // row with no value
                Ordering::Greater => {
                    let row = &rows[ri];
                    if policy.removes(row.is_active) {
                        plan.to_remove.push(row.clone());
                    }
                    ri += 1;
                }
                Ordering::Equal => {
                    let value = &values[vi];
                    if differs(columns, value, &rows[ri]) {
                        plan.to_update.push(value.to_row());
                    }
                    vi += 1;
                    ri += 1;
                }
            }
        }

        plan
    }

    /// Whether the plan has nothing to do
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }

    /// Total number of row operations
    pub fn len(&self) -> usize {
        self.to_insert.len() + self.to_update.len() + self.to_remove.len()
    }
}

/// Compare only the fields backed by an enabled column
fn differs(columns: &ColumnSet, value: &ValueRecord, row: &TableRow) -> bool {
    (columns.has(ColumnRole::Name) && value.name != row.name)
        || (columns.has(ColumnRole::DisplayName) && value.display_name != row.display_name)
        || (columns.has(ColumnRole::Description) && value.description != row.description)
        || (columns.has(ColumnRole::IsActive) && value.is_active != row.is_active)
}
