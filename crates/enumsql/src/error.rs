//! Error types for enumsql
//!
//! Errors are classified so callers can decide what a failure means for a run:
//! - Configuration errors are raised before any database is contacted
//! - Schema mismatches are fatal for one table only
//! - Constraint violations may be tolerated under `TryDelete`
//! - Connection and query failures are fatal for the affected table

use std::fmt;
use thiserror::Error;

/// Result type for enumsql operations
pub type Result<T> = std::result::Result<T, Error>;

/// SQL Server error number for a constraint conflict (FK, CHECK, REFERENCE).
pub const SQLSERVER_CONSTRAINT_CONFLICT: u32 = 547;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed descriptor or run configuration
    Configuration,
    /// Live table shape disagrees with the descriptor
    Schema,
    /// Constraint violation reported by the server
    Constraint,
    /// Connection-related errors
    Connection,
    /// Statement execution errors
    Query,
    /// A value read from the database had an unexpected type
    TypeConversion,
    /// A caller-imposed deadline expired
    Timeout,
    /// Unknown/other errors
    Other,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable by a caller
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection | Self::Timeout)
    }
}

/// Kind of constraint that rejected a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// Referential integrity (foreign key)
    ForeignKey,
    /// Primary key or unique index
    Unique,
    /// Anything else the server classifies as a constraint
    Other,
}

/// Main error type for enumsql
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Descriptor or run configuration is invalid
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The live table does not have the expected shape
    #[error("table {table} does not match the expected schema (expected: {expected}; observed: {observed})")]
    SchemaMismatch {
        table: String,
        expected: String,
        observed: String,
    },

    /// Constraint violation
    #[error("constraint violation ({code}): {message}")]
    Constraint {
        kind: ConstraintKind,
        code: u32,
        message: String,
    },

    /// Connection failed
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Statement execution failed
    #[error("query error: {message}")]
    Query {
        message: String,
        sql: Option<String>,
    },

    /// Type conversion failed
    #[error("type conversion error: {message}")]
    TypeConversion { message: String },

    /// Operation timed out
    #[error("timeout: {message}")]
    Timeout { message: String },

    /// A table pass failed; carries the table identity
    #[error("failed to update table {table}: {source}")]
    Table {
        table: String,
        #[source]
        source: Box<Error>,
    },

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::SchemaMismatch { .. } => ErrorCategory::Schema,
            Self::Constraint { .. } => ErrorCategory::Constraint,
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Query { .. } => ErrorCategory::Query,
            Self::TypeConversion { .. } => ErrorCategory::TypeConversion,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Table { source, .. } => source.category(),
            Self::Internal { .. } => ErrorCategory::Other,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Whether this error is a referential-integrity violation
    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            Self::Constraint { kind, .. } => *kind == ConstraintKind::ForeignKey,
            Self::Table { source, .. } => source.is_foreign_key_violation(),
            _ => false,
        }
    }

    /// Name of the table a failure belongs to, if known
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Table { table, .. } | Self::SchemaMismatch { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a schema mismatch error
    pub fn schema_mismatch(
        table: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
    ) -> Self {
        Self::SchemaMismatch {
            table: table.into(),
            expected: expected.into(),
            observed: observed.into(),
        }
    }

    /// Create a foreign key violation error
    pub fn foreign_key(code: u32, message: impl Into<String>) -> Self {
        Self::Constraint {
            kind: ConstraintKind::ForeignKey,
            code,
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: None,
        }
    }

    /// Create a query error with SQL
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
        }
    }

    /// Create a type conversion error
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach the identity of the table this failure belongs to
    pub fn in_table(self, table: impl Into<String>) -> Self {
        match self {
            already @ Self::Table { .. } => already,
            other => Self::Table {
                table: table.into(),
                source: Box::new(other),
            },
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Schema => write!(f, "schema"),
            Self::Constraint => write!(f, "constraint"),
            Self::Connection => write!(f, "connection"),
            Self::Query => write!(f, "query"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Timeout => write!(f, "timeout"),
            Self::Other => write!(f, "other"),
        }
    }
}
