//! Identifier and literal handling for generated SQL.
//!
//! Table, schema and column names come from configuration and are inlined into
//! statement text, so they are validated once when a descriptor is built and
//! always emitted bracket-delimited. Values are never inlined; they are bound
//! as parameters. The only string literals in generated SQL are the schema and
//! table names in the existence check, which go through [`escape_string_literal`].

use crate::error::Error;

/// Longest identifier SQL Server accepts (`sysname`).
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Normalize a configured SQL name.
///
/// Surrounding whitespace is removed, and a single enclosing `[...]` pair is
/// stripped so that `"[dbo]"` and `"dbo"` configure the same schema.
///
/// ```
/// use enumsql::security::trim_sql_name;
///
/// assert_eq!(trim_sql_name("  Color "), "Color");
/// assert_eq!(trim_sql_name("[dbo]"), "dbo");
/// assert_eq!(trim_sql_name("[]"), "[]");
/// ```
pub fn trim_sql_name(name: &str) -> &str {
    let name = name.trim();
    if name.len() > 2 && name.starts_with('[') && name.ends_with(']') {
        &name[1..name.len() - 1]
    } else {
        name
    }
}

/// Validate a trimmed SQL name (schema, table or column).
///
/// Rules:
/// - Must not be empty
/// - At most 128 characters
/// - No identifier delimiters (`[`, `]`) and no control characters
///
/// `what` names the setting in the error message.
///
/// ```
/// use enumsql::security::validate_sql_name;
///
/// assert!(validate_sql_name("table", "OrderStatus").is_ok());
/// assert!(validate_sql_name("table", "Order Status").is_ok());
/// assert!(validate_sql_name("table", "").is_err());
/// assert!(validate_sql_name("table", "x]; drop table y --").is_err());
/// ```
pub fn validate_sql_name(what: &str, name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::config(format!("{} name cannot be empty", what)));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(Error::config(format!(
            "{} name '{}' is too long (max {} characters)",
            what, name, MAX_IDENTIFIER_LENGTH
        )));
    }

    if name != name.trim() {
        return Err(Error::config(format!(
            "{} name '{}' has leading or trailing whitespace",
            what, name
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| *c == '[' || *c == ']' || c.is_control())
    {
        return Err(Error::config(format!(
            "{} name '{}' contains invalid character {:?}",
            what, name, c
        )));
    }

    Ok(())
}

/// Bracket-delimit an identifier, doubling any embedded `]`.
///
/// ```
/// use enumsql::security::bracket_identifier;
///
/// assert_eq!(bracket_identifier("Id"), "[Id]");
/// assert_eq!(bracket_identifier("a]b"), "[a]]b]");
/// ```
pub fn bracket_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Escape a string value for a single-quoted SQL string literal.
///
/// ```
/// use enumsql::security::escape_string_literal;
///
/// assert_eq!(escape_string_literal("dbo"), "dbo");
/// assert_eq!(escape_string_literal("o'brien"), "o''brien");
/// ```
pub fn escape_string_literal(value: &str) -> String {
    // Fast path: no escaping needed (common case)
    if !value.contains('\'') {
        return value.to_string();
    }
    value.replace('\'', "''")
}
