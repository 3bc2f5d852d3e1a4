//! Enum descriptors: the resolved, validated replication target for one enum.
//!
//! A descriptor is built once from a [`TableConfig`] plus the enum's members and
//! is immutable afterwards. Every configuration mistake (bad names, undersized
//! columns, duplicate identities, `MarkInactive` without an `IsActive` column)
//! is rejected here, before any database is contacted.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::security::{bracket_identifier, trim_sql_name, validate_sql_name};

/// Largest bounded `nvarchar` length.
pub const MAX_NVARCHAR_LENGTH: u16 = 4000;

/// Default size of the Name and DisplayName columns.
pub const DEFAULT_NAME_SIZE: u16 = 250;

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// Logical role of a column in an enum table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnRole {
    /// Numeric identity (primary key)
    Id,
    /// Member name as written in code
    Name,
    /// Human-readable name
    DisplayName,
    /// Member description
    Description,
    /// Whether the member is still in use
    IsActive,
}

impl ColumnRole {
    /// All roles in table order
    pub const ALL: [ColumnRole; 5] = [
        Self::Id,
        Self::Name,
        Self::DisplayName,
        Self::Description,
        Self::IsActive,
    ];

    /// Default column name for this role
    pub const fn canonical_name(self) -> &'static str {
        match self {
            Self::Id => "Id",
            Self::Name => "Name",
            Self::DisplayName => "DisplayName",
            Self::Description => "Description",
            Self::IsActive => "IsActive",
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Physical SQL type of an enum table column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// 1-byte unsigned integer
    TinyInt,
    /// 2-byte signed integer
    SmallInt,
    /// 4-byte signed integer
    Int,
    /// 8-byte signed integer
    BigInt,
    /// Variable-length unicode text
    NVarChar,
    /// Single bit flag
    Bit,
}

impl SqlType {
    /// Integer type for a byte width
    pub fn for_integer_width(width: u8) -> Result<Self> {
        match width {
            1 => Ok(Self::TinyInt),
            2 => Ok(Self::SmallInt),
            4 => Ok(Self::Int),
            8 => Ok(Self::BigInt),
            other => Err(Error::config(format!(
                "{} is not a valid Id column size; must be 1, 2, 4 or 8",
                other
            ))),
        }
    }

    /// Type name as reported by `INFORMATION_SCHEMA.COLUMNS.DATA_TYPE`
    pub const fn name(self) -> &'static str {
        match self {
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::NVarChar => "nvarchar",
            Self::Bit => "bit",
        }
    }

    /// Parse a catalog type name (case-insensitive)
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "tinyint" => Some(Self::TinyInt),
            "smallint" => Some(Self::SmallInt),
            "int" => Some(Self::Int),
            "bigint" => Some(Self::BigInt),
            "nvarchar" => Some(Self::NVarChar),
            "bit" => Some(Self::Bit),
            _ => None,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Size of a column: bytes for integers, UTF-16 code units for text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnSize {
    /// Fixed byte width
    Bytes(u8),
    /// Bounded text length
    Chars(u16),
    /// `nvarchar(max)`
    Max,
}

impl ColumnSize {
    /// Whether a text of `len` code units fits
    pub fn fits(self, len: usize) -> bool {
        match self {
            Self::Chars(limit) => len <= usize::from(limit),
            Self::Max => true,
            Self::Bytes(_) => false,
        }
    }
}

impl fmt::Display for ColumnSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(n) => write!(f, "{} bytes", n),
            Self::Chars(n) => write!(f, "{}", n),
            Self::Max => f.write_str("max"),
        }
    }
}

impl<'de> Deserialize<'de> for ColumnSize {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => u16::try_from(n)
                .map(Self::Chars)
                .map_err(|_| serde::de::Error::custom(format!("column size {} is too large", n))),
            Raw::Text(s) if s.eq_ignore_ascii_case("max") => Ok(Self::Max),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "invalid column size '{}', expected a number or \"max\"",
                s
            ))),
        }
    }
}

/// One physical column of an enum table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Logical role
    pub role: ColumnRole,
    /// Resolved column name (trimmed, validated)
    pub name: String,
    /// Column size
    pub size: ColumnSize,
    /// SQL type
    pub sql_type: SqlType,
}

impl ColumnDescriptor {
    /// Type with its length, as used in `create table`
    pub fn sized_sql_type(&self) -> String {
        match (self.sql_type, self.size) {
            (SqlType::NVarChar, ColumnSize::Chars(n)) => format!("nvarchar({})", n),
            (SqlType::NVarChar, _) => "nvarchar(max)".to_string(),
            (other, _) => other.name().to_string(),
        }
    }
}

/// The enabled columns of an enum table.
///
/// Id is always present; the other roles are present only when enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSet {
    /// Id column
    pub id: ColumnDescriptor,
    /// Name column
    pub name: Option<ColumnDescriptor>,
    /// DisplayName column
    pub display_name: Option<ColumnDescriptor>,
    /// Description column
    pub description: Option<ColumnDescriptor>,
    /// IsActive column
    pub is_active: Option<ColumnDescriptor>,
}

impl ColumnSet {
    /// Enabled columns in table order (Id first)
    pub fn iter(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        std::iter::once(&self.id)
            .chain(self.name.as_ref())
            .chain(self.display_name.as_ref())
            .chain(self.description.as_ref())
            .chain(self.is_active.as_ref())
    }

    /// Enabled columns other than Id, in table order
    pub fn non_id(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.iter().skip(1)
    }

    /// Number of enabled columns
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Always false: the Id column is always present
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Column for a role, if enabled
    pub fn get(&self, role: ColumnRole) -> Option<&ColumnDescriptor> {
        match role {
            ColumnRole::Id => Some(&self.id),
            ColumnRole::Name => self.name.as_ref(),
            ColumnRole::DisplayName => self.display_name.as_ref(),
            ColumnRole::Description => self.description.as_ref(),
            ColumnRole::IsActive => self.is_active.as_ref(),
        }
    }

    /// Whether a role is enabled
    pub fn has(&self, role: ColumnRole) -> bool {
        self.get(role).is_some()
    }
}

// ---------------------------------------------------------------------------
// Deletion policy and backing types
// ---------------------------------------------------------------------------

/// What to do with rows whose value no longer exists in code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionPolicy {
    /// Set IsActive = 0 on orphaned rows
    #[default]
    #[serde(alias = "mark_as_inactive")]
    MarkInactive,
    /// Delete orphaned rows; rows still referenced by a foreign key are skipped
    TryDelete,
    /// Delete orphaned rows; a foreign key violation fails the table
    Delete,
    /// Leave orphaned rows untouched
    #[serde(alias = "do_nothing")]
    Ignore,
}

impl DeletionPolicy {
    /// Whether an orphaned row with the given active flag must be acted upon
    #[inline]
    pub fn removes(self, row_is_active: bool) -> bool {
        match self {
            Self::Delete | Self::TryDelete => true,
            Self::MarkInactive => row_is_active,
            Self::Ignore => false,
        }
    }
}

impl FromStr for DeletionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "markinactive" | "markasinactive" => Ok(Self::MarkInactive),
            "trydelete" => Ok(Self::TryDelete),
            "delete" => Ok(Self::Delete),
            "ignore" | "donothing" => Ok(Self::Ignore),
            _ => Err(Error::config(format!("deletion mode \"{}\" is not valid", s))),
        }
    }
}

impl fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkInactive => write!(f, "MarkInactive"),
            Self::TryDelete => write!(f, "TryDelete"),
            Self::Delete => write!(f, "Delete"),
            Self::Ignore => write!(f, "Ignore"),
        }
    }
}

/// Underlying integer type of an enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackingType {
    /// Signed 8-bit
    I8,
    /// Unsigned 8-bit
    U8,
    /// Signed 16-bit
    I16,
    /// Unsigned 16-bit
    U16,
    /// Signed 32-bit
    #[default]
    I32,
    /// Unsigned 32-bit
    U32,
    /// Signed 64-bit
    I64,
    /// Unsigned 64-bit
    U64,
}

/// A member value as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    /// Any value that fits an i64
    Signed(i64),
    /// Values above i64::MAX
    Unsigned(u64),
}

macro_rules! raw_id_from {
    ($variant:ident: $($t:ty),*) => {
        $(
            impl From<$t> for RawId {
                fn from(v: $t) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

raw_id_from!(Signed: i8, i16, i32, i64);
raw_id_from!(Unsigned: u8, u16, u32, u64);

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
        }
    }
}

impl BackingType {
    /// Size in bytes
    pub const fn width(self) -> u8 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 => 4,
            Self::I64 | Self::U64 => 8,
        }
    }

    /// Whether the type is signed
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Widen a member value to the canonical i64 identity.
    ///
    /// Values must fit the backing type. `u64` values above `i64::MAX` wrap,
    /// keeping the bit pattern the way the enum stores it.
    pub fn widen(self, raw: RawId) -> Result<i64> {
        let (min, max): (i128, i128) = match self {
            Self::I8 => (i8::MIN.into(), i8::MAX.into()),
            Self::U8 => (0, u8::MAX.into()),
            Self::I16 => (i16::MIN.into(), i16::MAX.into()),
            Self::U16 => (0, u16::MAX.into()),
            Self::I32 => (i32::MIN.into(), i32::MAX.into()),
            Self::U32 => (0, u32::MAX.into()),
            Self::I64 => (i64::MIN.into(), i64::MAX.into()),
            Self::U64 => (0, u64::MAX.into()),
        };

        let value: i128 = match raw {
            RawId::Signed(v) => v.into(),
            RawId::Unsigned(v) => v.into(),
        };

        if value < min || value > max {
            return Err(Error::config(format!(
                "value {} does not fit the enum's backing type {}",
                raw, self
            )));
        }

        Ok(value as i64)
    }
}

impl fmt::Display for BackingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
        };
        f.write_str(name)
    }
}

impl FromStr for BackingType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "i8" | "sbyte" => Ok(Self::I8),
            "u8" | "byte" => Ok(Self::U8),
            "i16" | "short" => Ok(Self::I16),
            "u16" | "ushort" => Ok(Self::U16),
            "i32" | "int" => Ok(Self::I32),
            "u32" | "uint" => Ok(Self::U32),
            "i64" | "long" => Ok(Self::I64),
            "u64" | "ulong" => Ok(Self::U64),
            _ => Err(Error::config(format!("unknown backing type \"{}\"", s))),
        }
    }
}

// ---------------------------------------------------------------------------
// Table configuration (the provider-facing descriptor struct)
// ---------------------------------------------------------------------------

/// Id column settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdColumnConfig {
    /// Column name
    pub name: String,
    /// Byte width; `None` uses the backing type's width
    pub size: Option<u8>,
}

impl Default for IdColumnConfig {
    fn default() -> Self {
        Self {
            name: ColumnRole::Id.canonical_name().into(),
            size: None,
        }
    }
}

/// Settings for an optional text column
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextColumnConfig {
    /// Column name
    pub name: String,
    /// Maximum length
    pub size: ColumnSize,
    /// Whether the column exists
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl TextColumnConfig {
    /// Enabled column with the given name and size
    pub fn new(name: impl Into<String>, size: ColumnSize) -> Self {
        Self {
            name: name.into(),
            size,
            enabled: true,
        }
    }

    /// Same column, disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Settings for the IsActive column
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlagColumnConfig {
    /// Column name
    pub name: String,
    /// Whether the column exists
    pub enabled: bool,
}

impl Default for FlagColumnConfig {
    fn default() -> Self {
        Self {
            name: ColumnRole::IsActive.canonical_name().into(),
            enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_schema() -> String {
    "dbo".to_string()
}

fn default_name_column() -> TextColumnConfig {
    TextColumnConfig::new(
        ColumnRole::Name.canonical_name(),
        ColumnSize::Chars(DEFAULT_NAME_SIZE),
    )
}

fn default_display_name_column() -> TextColumnConfig {
    TextColumnConfig::new(
        ColumnRole::DisplayName.canonical_name(),
        ColumnSize::Chars(DEFAULT_NAME_SIZE),
    )
}

fn default_description_column() -> TextColumnConfig {
    TextColumnConfig::new(ColumnRole::Description.canonical_name(), ColumnSize::Max)
}

/// Per-enum replication settings, as yielded by a configuration provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// Target table name
    pub table: String,
    /// Target schema name
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Handling of rows removed from code
    #[serde(default, alias = "deletion_mode")]
    pub deletion_policy: DeletionPolicy,
    /// Id column
    #[serde(default)]
    pub id_column: IdColumnConfig,
    /// Name column
    #[serde(default = "default_name_column")]
    pub name_column: TextColumnConfig,
    /// DisplayName column
    #[serde(default = "default_display_name_column")]
    pub display_name_column: TextColumnConfig,
    /// Description column
    #[serde(default = "default_description_column")]
    pub description_column: TextColumnConfig,
    /// IsActive column
    #[serde(default)]
    pub is_active_column: FlagColumnConfig,
}

impl TableConfig {
    /// Default settings for a table in `dbo`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: default_schema(),
            deletion_policy: DeletionPolicy::default(),
            id_column: IdColumnConfig::default(),
            name_column: default_name_column(),
            display_name_column: default_display_name_column(),
            description_column: default_description_column(),
            is_active_column: FlagColumnConfig::default(),
        }
    }

    /// Set the schema
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Set the deletion policy
    pub fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = policy;
        self
    }
}

/// One enum member as extracted from code
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumMember {
    /// Underlying value
    pub id: RawId,
    /// Member name
    pub name: String,
    /// Display name; defaults to the member name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Description; defaults to empty
    #[serde(default)]
    pub description: Option<String>,
    /// Deprecated members are replicated as inactive
    #[serde(default)]
    pub deprecated: bool,
}

impl EnumMember {
    /// Member with just a value and a name
    pub fn new(id: impl Into<RawId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            display_name: None,
            description: None,
            deprecated: false,
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark as deprecated
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Values and rows
// ---------------------------------------------------------------------------

/// Persisted state of one enum table row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRow {
    /// Identity
    pub id: i64,
    /// Name (empty when the column is disabled)
    pub name: String,
    /// Display name (empty when the column is disabled)
    pub display_name: String,
    /// Description (empty when the column is disabled)
    pub description: String,
    /// Active flag (true when the column is disabled)
    pub is_active: bool,
}

impl TableRow {
    /// Label used in reports: the name when known, otherwise the identity
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("#{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

/// One enum member's replication payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRecord {
    /// Identity widened to i64
    pub identity: i64,
    /// Member name
    pub name: String,
    /// Display name
    pub display_name: String,
    /// Description
    pub description: String,
    /// False for deprecated members
    pub is_active: bool,
}

impl ValueRecord {
    /// Resolve a member's defaults against its widened identity
    pub fn from_member(identity: i64, member: &EnumMember) -> Self {
        let description = member
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_default()
            .to_string();

        Self {
            identity,
            name: member.name.clone(),
            display_name: member
                .display_name
                .clone()
                .unwrap_or_else(|| member.name.clone()),
            description,
            is_active: !member.deprecated,
        }
    }

    /// Row this value should be persisted as
    pub fn to_row(&self) -> TableRow {
        TableRow {
            id: self.identity,
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            is_active: self.is_active,
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Validated replication target for one enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    enum_name: String,
    backing: BackingType,
    schema: String,
    table: String,
    deletion_policy: DeletionPolicy,
    columns: ColumnSet,
    values: Vec<ValueRecord>,
}

impl EnumDescriptor {
    /// Build and validate a descriptor.
    ///
    /// `enum_name` identifies the enum in error messages and reports.
    pub fn new(
        enum_name: impl Into<String>,
        backing: BackingType,
        config: &TableConfig,
        members: &[EnumMember],
    ) -> Result<Self> {
        let enum_name = enum_name.into();
        let with_enum = |e: Error| match e {
            Error::Configuration { message } => {
                Error::config(format!("{} (enum: {})", message, enum_name))
            }
            other => other,
        };

        let schema = trim_sql_name(&config.schema).to_string();
        validate_sql_name("schema", &schema).map_err(with_enum)?;
        let table = trim_sql_name(&config.table).to_string();
        validate_sql_name("table", &table).map_err(with_enum)?;

        let mut values = members
            .iter()
            .map(|m| {
                backing
                    .widen(m.id)
                    .map(|identity| ValueRecord::from_member(identity, m))
                    .map_err(|e| match e {
                        Error::Configuration { message } => {
                            Error::config(format!("{} (member: {})", message, m.name))
                        }
                        other => other,
                    })
            })
            .collect::<Result<Vec<_>>>()
            .map_err(with_enum)?;

        values.sort_by_key(|v| v.identity);
        if let Some(pair) = values.windows(2).find(|w| w[0].identity == w[1].identity) {
            return Err(with_enum(Error::config(format!(
                "members {} and {} share the identity {}",
                pair[0].name, pair[1].name, pair[0].identity
            ))));
        }

        let columns = build_columns(backing, config, &values).map_err(with_enum)?;

        if config.deletion_policy == DeletionPolicy::MarkInactive && columns.is_active.is_none() {
            return Err(with_enum(Error::config(format!(
                "deletion policy is {}, but the {} column is disabled",
                DeletionPolicy::MarkInactive,
                ColumnRole::IsActive
            ))));
        }

        Ok(Self {
            enum_name,
            backing,
            schema,
            table,
            deletion_policy: config.deletion_policy,
            columns,
            values,
        })
    }

    /// Enum name (e.g. `MyApp.OrderStatus`)
    pub fn enum_name(&self) -> &str {
        &self.enum_name
    }

    /// Backing integer type
    pub fn backing(&self) -> BackingType {
        self.backing
    }

    /// Schema name
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// `schema.table`, for reports
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// `[schema].[table]`, for statements
    pub fn sql_table(&self) -> String {
        format!(
            "{}.{}",
            bracket_identifier(&self.schema),
            bracket_identifier(&self.table)
        )
    }

    /// Deletion policy
    pub fn deletion_policy(&self) -> DeletionPolicy {
        self.deletion_policy
    }

    /// Enabled columns
    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    /// Values sorted ascending by identity
    pub fn values(&self) -> &[ValueRecord] {
        &self.values
    }
}

fn build_columns(
    backing: BackingType,
    config: &TableConfig,
    values: &[ValueRecord],
) -> Result<ColumnSet> {
    let id_width = config.id_column.size.unwrap_or_else(|| backing.width());
    let id_type = SqlType::for_integer_width(id_width)?;
    if id_width < backing.width() {
        return Err(Error::config(format!(
            "Id column size {} is smaller than the backing type {} ({} bytes)",
            id_width,
            backing,
            backing.width()
        )));
    }

    let id_name = trim_sql_name(&config.id_column.name).to_string();
    validate_sql_name("Id column", &id_name)?;

    let (min, max) = id_range(id_type);
    if let Some(v) = values.iter().find(|v| v.identity < min || v.identity > max) {
        return Err(Error::config(format!(
            "member {} has identity {} which does not fit the {} Id column",
            v.name, v.identity, id_type
        )));
    }

    let id = ColumnDescriptor {
        role: ColumnRole::Id,
        name: id_name,
        size: ColumnSize::Bytes(id_width),
        sql_type: id_type,
    };

    let name = text_column(ColumnRole::Name, &config.name_column, values, |v| &v.name)?;
    let display_name = text_column(
        ColumnRole::DisplayName,
        &config.display_name_column,
        values,
        |v| &v.display_name,
    )?;
    let description = text_column(
        ColumnRole::Description,
        &config.description_column,
        values,
        |v| &v.description,
    )?;

    let is_active = if config.is_active_column.enabled {
        let name = trim_sql_name(&config.is_active_column.name).to_string();
        validate_sql_name("IsActive column", &name)?;
        Some(ColumnDescriptor {
            role: ColumnRole::IsActive,
            name,
            size: ColumnSize::Bytes(1),
            sql_type: SqlType::Bit,
        })
    } else {
        None
    };

    let columns = ColumnSet {
        id,
        name,
        display_name,
        description,
        is_active,
    };

    let mut seen: Vec<&str> = Vec::with_capacity(columns.len());
    for col in columns.iter() {
        if seen.iter().any(|s| s.eq_ignore_ascii_case(&col.name)) {
            return Err(Error::config(format!(
                "column name {} is used by more than one column",
                col.name
            )));
        }
        seen.push(&col.name);
    }

    Ok(columns)
}

fn text_column(
    role: ColumnRole,
    config: &TextColumnConfig,
    values: &[ValueRecord],
    field: impl Fn(&ValueRecord) -> &String,
) -> Result<Option<ColumnDescriptor>> {
    if !config.enabled {
        return Ok(None);
    }

    let what = format!("{} column", role);
    let name = trim_sql_name(&config.name).to_string();
    validate_sql_name(&what, &name)?;

    match config.size {
        ColumnSize::Chars(n) if n == 0 || n > MAX_NVARCHAR_LENGTH => {
            return Err(Error::config(format!(
                "{} size must be between 1 and {} or \"max\", got {}",
                what, MAX_NVARCHAR_LENGTH, n
            )));
        }
        ColumnSize::Bytes(_) => {
            return Err(Error::config(format!("{} size must be a length", what)));
        }
        _ => {}
    }

    for value in values {
        let len = field(value).encode_utf16().count();
        if !config.size.fits(len) {
            return Err(Error::config(format!(
                "{} of member {} is {} characters, exceeding the {} size of {}",
                role, value.name, len, what, config.size
            )));
        }
    }

    Ok(Some(ColumnDescriptor {
        role,
        name,
        size: config.size,
        sql_type: SqlType::NVarChar,
    }))
}

fn id_range(sql_type: SqlType) -> (i64, i64) {
    match sql_type {
        SqlType::TinyInt => (0, u8::MAX.into()),
        SqlType::SmallInt => (i16::MIN.into(), i16::MAX.into()),
        SqlType::Int => (i32::MIN.into(), i32::MAX.into()),
        _ => (i64::MIN, i64::MAX),
    }
}
