//! Enum configuration providers
//!
//! Anything that can yield [`EnumDescriptor`]s is a [`DescriptorProvider`]:
//! - [`EnumManifest`]: enums described in a YAML document
//! - [`EnumRegistry`]: Rust enums implementing [`ReplicatedEnum`]

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::descriptor::{BackingType, EnumDescriptor, EnumMember, TableConfig};
use crate::error::{Error, Result};

/// Source of enum descriptors
pub trait DescriptorProvider {
    /// Build every descriptor this provider knows about
    fn descriptors(&self) -> Result<Vec<EnumDescriptor>>;
}

/// A Rust enum that is replicated to a lookup table
///
/// ```
/// use enumsql::descriptor::{BackingType, EnumDescriptor, EnumMember, TableConfig};
/// use enumsql::manifest::ReplicatedEnum;
///
/// #[repr(u8)]
/// enum Color {
///     Red = 1,
///     Green = 2,
/// }
///
/// impl ReplicatedEnum for Color {
///     const NAME: &'static str = "Color";
///     const BACKING: BackingType = BackingType::U8;
///
///     fn table_config() -> TableConfig {
///         TableConfig::new("Color")
///     }
///
///     fn members() -> Vec<EnumMember> {
///         vec![
///             EnumMember::new(Color::Red as u8, "Red"),
///             EnumMember::new(Color::Green as u8, "Green"),
///         ]
///     }
/// }
///
/// let descriptor = EnumDescriptor::from_enum::<Color>().unwrap();
/// assert_eq!(descriptor.values().len(), 2);
/// ```
pub trait ReplicatedEnum {
    /// Name used in reports
    const NAME: &'static str;
    /// Underlying integer type
    const BACKING: BackingType;

    /// Target table settings
    fn table_config() -> TableConfig;

    /// All members, including deprecated ones
    fn members() -> Vec<EnumMember>;
}

impl EnumDescriptor {
    /// Build the descriptor of a [`ReplicatedEnum`]
    pub fn from_enum<T: ReplicatedEnum>() -> Result<Self> {
        Self::new(T::NAME, T::BACKING, &T::table_config(), &T::members())
    }
}

/// Collects [`ReplicatedEnum`] types
#[derive(Default)]
pub struct EnumRegistry {
    builders: Vec<fn() -> Result<EnumDescriptor>>,
}

impl EnumRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an enum type
    pub fn register<T: ReplicatedEnum>(mut self) -> Self {
        self.builders.push(EnumDescriptor::from_enum::<T>);
        self
    }

    /// Number of registered enums
    pub fn len(&self) -> usize {
        self.builders.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

impl DescriptorProvider for EnumRegistry {
    fn descriptors(&self) -> Result<Vec<EnumDescriptor>> {
        self.builders.iter().map(|build| build()).collect()
    }
}

/// One enum in a manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEnum {
    /// Enum name
    pub name: String,
    /// Underlying integer type
    #[serde(default)]
    pub backing: BackingType,
    /// Target table settings
    pub sql: TableConfig,
    /// Members
    #[serde(default)]
    pub members: Vec<EnumMember>,
}

/// YAML document describing enums
///
/// ```yaml
/// enums:
///   - name: Shop.OrderStatus
///     backing: u8
///     sql:
///       table: OrderStatus
///       deletion_policy: try_delete
///     members:
///       - { id: 1, name: Pending }
///       - { id: 2, name: Paid, description: Payment received }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumManifest {
    /// Enums in document order
    #[serde(default)]
    pub enums: Vec<ManifestEnum>,
}

impl EnumManifest {
    /// Parse a manifest from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid enum manifest: {}", e)))
    }

    /// Read and parse a manifest file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read manifest {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            Error::Configuration { message } => {
                Error::config(format!("{} ({})", message, path.display()))
            }
            other => other,
        })
    }

    /// Append the enums of another manifest
    pub fn merge(&mut self, other: EnumManifest) {
        self.enums.extend(other.enums);
    }
}

impl DescriptorProvider for EnumManifest {
    fn descriptors(&self) -> Result<Vec<EnumDescriptor>> {
        self.enums
            .iter()
            .map(|e| EnumDescriptor::new(&e.name, e.backing, &e.sql, &e.members))
            .collect()
    }
}

/// Reject two enums that target the same table
pub fn ensure_distinct_tables(descriptors: &[EnumDescriptor]) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(descriptors.len());
    for d in descriptors {
        let key = d.qualified_name().to_lowercase();
        if let Some(previous) = seen.insert(key, d.enum_name()) {
            return Err(Error::config(format!(
                "enums {} and {} both replicate to {}",
                previous,
                d.enum_name(),
                d.qualified_name()
            )));
        }
    }
    Ok(())
}
