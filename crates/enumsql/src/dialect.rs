//! SQL generation for enum tables
//!
//! - SqlDialect: trait for database-specific statement text
//! - SqlServerDialect: T-SQL with bracket quoting and `@PN` placeholders
//!
//! Identifiers come from a validated [`EnumDescriptor`] and are always quoted.
//! Row values are never inlined; each statement documents its parameter order.

use crate::descriptor::{ColumnDescriptor, EnumDescriptor};
use crate::security::escape_string_literal;

/// SQL dialect for vendor-specific SQL generation
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Quote an identifier (table, column name)
    fn quote_identifier(&self, name: &str) -> String;

    /// Get the placeholder for a 1-based parameter index
    fn placeholder(&self, index: usize) -> String;

    /// Batch run once per table, producing three result sets:
    /// the (empty) result of creating the table if it is missing, the live
    /// column metadata, and the current rows ordered by identity.
    fn prepare_table_sql(&self, descriptor: &EnumDescriptor) -> String;

    /// Insert one row. Parameters: every enabled column, in column order.
    fn insert_sql(&self, descriptor: &EnumDescriptor) -> String;

    /// Update one row. Parameters: every enabled non-Id column in column
    /// order, then the identity. `None` when only the Id column is enabled.
    fn update_sql(&self, descriptor: &EnumDescriptor) -> Option<String>;

    /// Delete one row. Parameters: the identity.
    fn delete_sql(&self, descriptor: &EnumDescriptor) -> String;

    /// Clear the active flag of one row. Parameters: the identity.
    /// `None` when the IsActive column is disabled.
    fn deactivate_sql(&self, descriptor: &EnumDescriptor) -> Option<String>;
}

/// SQL Server dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    fn qualified_table(&self, descriptor: &EnumDescriptor) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(descriptor.schema()),
            self.quote_identifier(descriptor.table())
        )
    }

    fn column_definition(&self, column: &ColumnDescriptor) -> String {
        format!(
            "{} {} not null",
            self.quote_identifier(&column.name),
            column.sized_sql_type()
        )
    }

    fn id_predicate(&self, descriptor: &EnumDescriptor, index: usize) -> String {
        format!(
            "{} = {}",
            self.quote_identifier(&descriptor.columns().id.name),
            self.placeholder(index)
        )
    }

    /// `create table` guarded by an existence check
    pub fn create_if_missing_sql(&self, descriptor: &EnumDescriptor) -> String {
        let schema = escape_string_literal(descriptor.schema());
        let table = escape_string_literal(descriptor.table());

        let mut definitions: Vec<String> = descriptor
            .columns()
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        definitions.push(format!(
            "constraint {} primary key clustered ({})",
            self.quote_identifier(&format!("PK_{}", descriptor.table())),
            self.quote_identifier(&descriptor.columns().id.name)
        ));

        format!(
            "if not exists (select * from INFORMATION_SCHEMA.TABLES where TABLE_SCHEMA = N'{}' and TABLE_NAME = N'{}')\n\
             begin\n    create table {} (\n        {}\n    );\nend;",
            schema,
            table,
            self.qualified_table(descriptor),
            definitions.join(",\n        ")
        )
    }

    /// Column metadata in ordinal order.
    ///
    /// Result columns: name (nvarchar), type (nvarchar), length (int, 0 for
    /// non-text, -1 for `max`), nullable (bit), identity (bit).
    pub fn columns_sql(&self, descriptor: &EnumDescriptor) -> String {
        let schema = escape_string_literal(descriptor.schema());
        let table = escape_string_literal(descriptor.table());
        format!(
            "select c.COLUMN_NAME, c.DATA_TYPE, \
             cast(isnull(c.CHARACTER_MAXIMUM_LENGTH, 0) as int) as CHARACTER_MAXIMUM_LENGTH, \
             cast(case c.IS_NULLABLE when 'YES' then 1 else 0 end as bit) as IS_NULLABLE, \
             cast(isnull(columnproperty(object_id(quotename(c.TABLE_SCHEMA) + '.' + quotename(c.TABLE_NAME)), c.COLUMN_NAME, 'IsIdentity'), 0) as bit) as IS_IDENTITY \
             from INFORMATION_SCHEMA.COLUMNS c \
             where c.TABLE_SCHEMA = N'{}' and c.TABLE_NAME = N'{}' \
             order by c.ORDINAL_POSITION;",
            schema, table
        )
    }

    /// Every row ordered by identity
    pub fn select_rows_sql(&self, descriptor: &EnumDescriptor) -> String {
        format!(
            "select * from {} order by {} asc;",
            self.qualified_table(descriptor),
            self.quote_identifier(&descriptor.columns().id.name)
        )
    }
}

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "SQL Server"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn prepare_table_sql(&self, descriptor: &EnumDescriptor) -> String {
        format!(
            "{}\n{}\n{}",
            self.create_if_missing_sql(descriptor),
            self.columns_sql(descriptor),
            self.select_rows_sql(descriptor)
        )
    }

    fn insert_sql(&self, descriptor: &EnumDescriptor) -> String {
        let columns = descriptor.columns();
        let names: Vec<String> = columns
            .iter()
            .map(|c| self.quote_identifier(&c.name))
            .collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| self.placeholder(i)).collect();

        format!(
            "insert into {} ({}) values ({});",
            self.qualified_table(descriptor),
            names.join(", "),
            placeholders.join(", ")
        )
    }

    fn update_sql(&self, descriptor: &EnumDescriptor) -> Option<String> {
        let assignments: Vec<String> = descriptor
            .columns()
            .non_id()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "{} = {}",
                    self.quote_identifier(&c.name),
                    self.placeholder(i + 1)
                )
            })
            .collect();

        if assignments.is_empty() {
            return None;
        }

        Some(format!(
            "update {} set {} where {};",
            self.qualified_table(descriptor),
            assignments.join(", "),
            self.id_predicate(descriptor, assignments.len() + 1)
        ))
    }

    fn delete_sql(&self, descriptor: &EnumDescriptor) -> String {
        format!(
            "delete from {} where {};",
            self.qualified_table(descriptor),
            self.id_predicate(descriptor, 1)
        )
    }

    fn deactivate_sql(&self, descriptor: &EnumDescriptor) -> Option<String> {
        let is_active = descriptor.columns().is_active.as_ref()?;
        Some(format!(
            "update {} set {} = 0 where {};",
            self.qualified_table(descriptor),
            self.quote_identifier(&is_active.name),
            self.id_predicate(descriptor, 1)
        ))
    }
}
