//! Live table inspection
//!
//! Decodes the column metadata and row result sets of the preparation batch,
//! checks the live shape against a descriptor, and reads the row snapshot the
//! planner diffs against.

use std::fmt;

use crate::descriptor::{ColumnDescriptor, ColumnRole, ColumnSize, EnumDescriptor, SqlType, TableRow};
use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// One column of the live table, as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    /// Column name
    pub name: String,
    /// Catalog type name (e.g. `nvarchar`)
    pub data_type: String,
    /// Character length; 0 for non-text types, -1 for `max`
    pub max_length: i32,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Whether the column is an identity column
    pub identity: bool,
}

impl LiveColumn {
    /// Column as the descriptor would create it
    pub fn from_descriptor(column: &ColumnDescriptor) -> Self {
        let max_length = match column.size {
            ColumnSize::Chars(n) => i32::from(n),
            ColumnSize::Max => -1,
            ColumnSize::Bytes(_) => 0,
        };
        Self {
            name: column.name.clone(),
            data_type: column.sql_type.name().to_string(),
            max_length,
            nullable: false,
            identity: false,
        }
    }

    fn matches(&self, column: &ColumnDescriptor) -> bool {
        let expected = Self::from_descriptor(column);
        !self.nullable
            && !self.identity
            && SqlType::parse(&self.data_type) == Some(column.sql_type)
            && (column.sql_type != SqlType::NVarChar || self.max_length == expected.max_length)
    }
}

impl fmt::Display for LiveColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.name, self.data_type.to_ascii_lowercase())?;
        match self.max_length {
            0 => {}
            -1 => write!(f, "(max)")?,
            n => write!(f, "({})", n)?,
        }
        if self.identity {
            write!(f, " identity")?;
        }
        if self.nullable {
            write!(f, " null")
        } else {
            write!(f, " not null")
        }
    }
}

/// Decode the column metadata result set
pub fn live_columns_from_rows(rows: &[Row]) -> Result<Vec<LiveColumn>> {
    rows.iter()
        .map(|row| -> Result<LiveColumn> {
            let text = |idx: usize, what: &str| -> Result<String> {
                row.get(idx)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| Error::type_conversion(format!("column metadata is missing {}", what)))
            };
            let flag = |idx: usize, what: &str| -> Result<bool> {
                match row.get(idx) {
                    Some(Value::Bool(b)) => Ok(*b),
                    Some(other) => other
                        .as_i64()
                        .map(|n| n != 0)
                        .ok_or_else(|| Error::type_conversion(format!("column metadata {} is not a flag", what))),
                    None => Err(Error::type_conversion(format!("column metadata is missing {}", what))),
                }
            };

            let max_length = row
                .get(2)
                .and_then(Value::as_i64)
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| Error::type_conversion("column metadata is missing the length"))?;

            Ok(LiveColumn {
                name: text(0, "the column name")?,
                data_type: text(1, "the data type")?,
                max_length,
                nullable: flag(3, "nullable")?,
                identity: flag(4, "identity")?,
            })
        })
        .collect()
}

/// Positions of each enabled role in the live table (0-based, ordinal order)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    /// Id position
    pub id: usize,
    /// Name position
    pub name: Option<usize>,
    /// DisplayName position
    pub display_name: Option<usize>,
    /// Description position
    pub description: Option<usize>,
    /// IsActive position
    pub is_active: Option<usize>,
}

/// Check the live table shape and map each role to its position.
///
/// The live table must have exactly the enabled columns, in any order, each
/// not null, not identity, with the expected type and size.
pub fn reconcile(descriptor: &EnumDescriptor, live: &[LiveColumn]) -> Result<ColumnMap> {
    let columns = descriptor.columns();
    let mismatch = || {
        let expected: Vec<String> = columns
            .iter()
            .map(|c| LiveColumn::from_descriptor(c).to_string())
            .collect();
        let observed: Vec<String> = live.iter().map(LiveColumn::to_string).collect();
        Error::schema_mismatch(
            descriptor.qualified_name(),
            expected.join(", "),
            if observed.is_empty() {
                "no columns".to_string()
            } else {
                observed.join(", ")
            },
        )
    };

    if live.len() != columns.len() {
        return Err(mismatch());
    }

    let mut positions: [Option<usize>; 5] = [None; 5];
    for (idx, live_col) in live.iter().enumerate() {
        let mut candidates = columns.iter().filter(|c| c.name == live_col.name);
        let column = match (candidates.next(), candidates.next()) {
            (Some(c), None) => c,
            _ => return Err(mismatch()),
        };
        if !live_col.matches(column) {
            return Err(mismatch());
        }

        let slot = &mut positions[role_slot(column.role)];
        if slot.is_some() {
            return Err(mismatch());
        }
        *slot = Some(idx);
    }

    let map = ColumnMap {
        id: positions[role_slot(ColumnRole::Id)].ok_or_else(mismatch)?,
        name: positions[role_slot(ColumnRole::Name)],
        display_name: positions[role_slot(ColumnRole::DisplayName)],
        description: positions[role_slot(ColumnRole::Description)],
        is_active: positions[role_slot(ColumnRole::IsActive)],
    };
    Ok(map)
}

fn role_slot(role: ColumnRole) -> usize {
    match role {
        ColumnRole::Id => 0,
        ColumnRole::Name => 1,
        ColumnRole::DisplayName => 2,
        ColumnRole::Description => 3,
        ColumnRole::IsActive => 4,
    }
}

/// Read the row snapshot.
///
/// Disabled columns read as empty text and `is_active = true`. The Id must
/// arrive with the declared width, and rows must be strictly ascending by Id.
pub fn read_snapshot(
    descriptor: &EnumDescriptor,
    map: &ColumnMap,
    rows: &[Row],
) -> Result<Vec<TableRow>> {
    let id_width = match descriptor.columns().id.size {
        ColumnSize::Bytes(w) => w,
        _ => return Err(Error::internal("Id column has no byte width")),
    };

    let mut snapshot: Vec<TableRow> = Vec::with_capacity(rows.len());
    for row in rows {
        let id_value = row.get(map.id).unwrap_or(&Value::Null);
        let id = match (id_value.integer_width(), id_value.as_i64()) {
            (Some(w), Some(id)) if w == id_width => id,
            _ => {
                return Err(Error::type_conversion(format!(
                    "Id of table {} read as {}, expected a {}-byte integer",
                    descriptor.qualified_name(),
                    id_value.sql_type(),
                    id_width
                )))
            }
        };

        let text = |idx: Option<usize>, role: ColumnRole| -> Result<String> {
            let Some(idx) = idx else {
                return Ok(String::new());
            };
            match row.get(idx) {
                Some(Value::String(s)) => Ok(s.clone()),
                other => Err(Error::type_conversion(format!(
                    "{} of row {} in table {} read as {}, expected text",
                    role,
                    id,
                    descriptor.qualified_name(),
                    other.map_or("nothing", Value::sql_type)
                ))),
            }
        };

        let is_active = match map.is_active {
            None => true,
            Some(idx) => match row.get(idx) {
                Some(Value::Bool(b)) => *b,
                other => {
                    return Err(Error::type_conversion(format!(
                        "IsActive of row {} in table {} read as {}, expected bit",
                        id,
                        descriptor.qualified_name(),
                        other.map_or("nothing", Value::sql_type)
                    )))
                }
            },
        };

        let current = TableRow {
            id,
            name: text(map.name, ColumnRole::Name)?,
            display_name: text(map.display_name, ColumnRole::DisplayName)?,
            description: text(map.description, ColumnRole::Description)?,
            is_active,
        };

        if let Some(prev) = snapshot.last() {
            if prev.id >= current.id {
                return Err(Error::query(format!(
                    "rows of table {} are not strictly ascending by Id ({} then {})",
                    descriptor.qualified_name(),
                    prev.id,
                    current.id
                )));
            }
        }
        snapshot.push(current);
    }

    Ok(snapshot)
}
