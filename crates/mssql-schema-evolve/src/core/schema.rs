//! Type-shape model: the physical contract of one dynamically defined data type.
//!
//! A [`TypeShape`] is an immutable snapshot. Migrations always compare an old
//! snapshot with a new one; nothing here is mutated in place.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EvolveError, Result};

/// Canonical identity of a data type, as resolved by a
/// [`TypeResolver`](super::traits::TypeResolver).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeIdentity {
    /// Stable type id.
    pub id: Uuid,

    /// Dotted namespace (e.g. "Shop.Catalog").
    pub namespace: String,

    /// Type name (e.g. "Product").
    pub name: String,
}

impl TypeIdentity {
    pub fn new(id: Uuid, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Get the fully qualified type name.
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// A named partition of storage for one logical type (e.g. draft vs published).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataScope(String);

impl DataScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn published() -> Self {
        Self::new("Published")
    }

    pub fn draft() -> Self {
        Self::new("Draft")
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A culture identifier such as "en-US". The empty locale is the invariant
/// locale used by types that are not localizable.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(String);

impl Locale {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn invariant() -> Self {
        Self(String::new())
    }

    pub fn is_invariant(&self) -> bool {
        self.0.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invariant() {
            f.write_str("(invariant)")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Logical store type of a field.
///
/// Every variant maps to exactly one native column type in
/// [`typemap`](crate::typemap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreType {
    Boolean,
    Int16,
    Int32,
    Int64,
    Decimal {
        precision: u8,
        scale: u8,
    },
    Double,
    /// Unicode string; `None` is unbounded.
    String {
        #[serde(default)]
        max_length: Option<u32>,
    },
    DateTime,
    Guid,
    /// Binary data; `None` is unbounded.
    Binary {
        #[serde(default)]
        max_length: Option<u32>,
    },
}

impl StoreType {
    pub fn string(max_length: u32) -> Self {
        StoreType::String {
            max_length: Some(max_length),
        }
    }

    pub fn text() -> Self {
        StoreType::String { max_length: None }
    }

    pub fn decimal(precision: u8, scale: u8) -> Self {
        StoreType::Decimal { precision, scale }
    }
}

/// Default value of a field. Exactly one kind per value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    /// Current timestamp at insert time.
    Now,
    /// Literal string.
    String(String),
    /// Freshly generated identifier at insert time.
    NewGuid,
    /// Literal identifier.
    Guid(Uuid),
    Integer(i64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Decimal(Decimal),
}

impl DefaultValue {
    /// Kind name used in configuration and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            DefaultValue::Now => "now",
            DefaultValue::String(_) => "string",
            DefaultValue::NewGuid => "new_guid",
            DefaultValue::Guid(_) => "guid",
            DefaultValue::Integer(_) => "integer",
            DefaultValue::Boolean(_) => "boolean",
            DefaultValue::DateTime(_) => "date_time",
            DefaultValue::Decimal(_) => "decimal",
        }
    }
}

/// One field of a type shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field (and column) name.
    pub name: String,

    /// Logical store type.
    pub store_type: StoreType,

    /// Whether the column allows NULL.
    #[serde(default)]
    pub is_nullable: bool,

    /// Default value, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<DefaultValue>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, store_type: StoreType) -> Self {
        Self {
            name: name.into(),
            store_type,
            is_nullable: false,
            default_value: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn with_default(mut self, default_value: DefaultValue) -> Self {
        self.default_value = Some(default_value);
        self
    }

    /// Whether the physical column definition differs: store type,
    /// nullability or default value. Names are compared separately.
    pub fn has_physical_change(&self, other: &FieldDescriptor) -> bool {
        self.store_type != other.store_type
            || self.is_nullable != other.is_nullable
            || self.default_value != other.default_value
    }
}

/// The physical contract of one data type at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeShape {
    /// Configured type name, resolved to a [`TypeIdentity`] by the planner.
    pub type_name: String,

    /// Ordered field definitions.
    pub fields: Vec<FieldDescriptor>,

    /// Key field names (primary key, in order).
    pub key_fields: Vec<String>,

    /// Whether the type declares its own physical sort order; the primary
    /// key is then created non-clustered.
    #[serde(default)]
    pub has_custom_sort_order: bool,

    /// Whether the type has one store per locale.
    #[serde(default)]
    pub localizable: bool,

    /// Applicable data scopes.
    pub scopes: Vec<DataScope>,
}

impl TypeShape {
    /// Find a field by name (case-insensitive, as SQL Server compares column names).
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Check if a field is part of the key.
    pub fn is_key(&self, name: &str) -> bool {
        self.key_fields.iter().any(|k| k.eq_ignore_ascii_case(name))
    }

    /// Check if the shape declares a scope.
    pub fn has_scope(&self, scope: &DataScope) -> bool {
        self.scopes.contains(scope)
    }

    /// Validate internal consistency of the shape.
    pub fn validate(&self) -> Result<()> {
        if self.type_name.trim().is_empty() {
            return Err(EvolveError::Config("Type shape has no type name".into()));
        }
        if self.fields.is_empty() {
            return Err(EvolveError::Config(format!(
                "Type {} has no fields",
                self.type_name
            )));
        }
        if self.scopes.is_empty() {
            return Err(EvolveError::Config(format!(
                "Type {} declares no data scopes",
                self.type_name
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.to_lowercase()) {
                return Err(EvolveError::Config(format!(
                    "Type {} declares field {} more than once",
                    self.type_name, field.name
                )));
            }
        }

        let mut scopes = HashSet::new();
        for scope in &self.scopes {
            if !scopes.insert(scope) {
                return Err(EvolveError::Config(format!(
                    "Type {} declares scope {} more than once",
                    self.type_name, scope
                )));
            }
        }

        for key in &self.key_fields {
            match self.field(key) {
                None => {
                    return Err(EvolveError::Config(format!(
                        "Key field {} is not a field of type {}",
                        key, self.type_name
                    )))
                }
                Some(f) if f.is_nullable => {
                    return Err(EvolveError::Config(format!(
                        "Key field {} of type {} cannot be nullable",
                        key, self.type_name
                    )))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_shape() -> TypeShape {
        TypeShape {
            type_name: "Shop.Product".to_string(),
            fields: vec![
                FieldDescriptor::new("Id", StoreType::Guid),
                FieldDescriptor::new("Title", StoreType::string(128)),
                FieldDescriptor::new("Price", StoreType::decimal(18, 2)).nullable(),
            ],
            key_fields: vec!["Id".to_string()],
            has_custom_sort_order: false,
            localizable: true,
            scopes: vec![DataScope::published(), DataScope::draft()],
        }
    }

    #[test]
    fn test_type_identity_full_name() {
        let identity = TypeIdentity::new(Uuid::nil(), "Shop.Catalog", "Product");
        assert_eq!(identity.full_name(), "Shop.Catalog.Product");

        let bare = TypeIdentity::new(Uuid::nil(), "", "Product");
        assert_eq!(bare.full_name(), "Product");
    }

    #[test]
    fn test_field_lookup_is_case_insensitive() {
        let shape = product_shape();
        assert_eq!(shape.field("title").map(|f| f.name.as_str()), Some("Title"));
        assert!(shape.is_key("ID"));
        assert!(!shape.is_key("Title"));
    }

    #[test]
    fn test_validate_accepts_valid_shape() {
        assert!(product_shape().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_field() {
        let mut shape = product_shape();
        shape.fields.push(FieldDescriptor::new("TITLE", StoreType::Int32));
        let err = shape.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_validate_rejects_unknown_or_nullable_key() {
        let mut shape = product_shape();
        shape.key_fields = vec!["Missing".to_string()];
        assert!(shape.validate().is_err());

        let mut shape = product_shape();
        shape.key_fields = vec!["Price".to_string()];
        assert!(shape.validate().unwrap_err().to_string().contains("nullable"));
    }

    #[test]
    fn test_validate_rejects_missing_scopes() {
        let mut shape = product_shape();
        shape.scopes.clear();
        assert!(shape.validate().is_err());
    }

    #[test]
    fn test_physical_change_ignores_name() {
        let a = FieldDescriptor::new("A", StoreType::Int32);
        let renamed = FieldDescriptor::new("B", StoreType::Int32);
        assert!(!a.has_physical_change(&renamed));

        let not_null_default = a.clone().with_default(DefaultValue::Integer(0));
        assert!(a.has_physical_change(&not_null_default));
        assert!(a.has_physical_change(&a.clone().nullable()));
        assert!(a.has_physical_change(&FieldDescriptor::new("A", StoreType::Int64)));
    }

    #[test]
    fn test_shape_yaml_roundtrip_fields() {
        let yaml = r#"
type_name: Shop.Product
key_fields: [Id]
localizable: true
scopes: [Published, Draft]
fields:
  - name: Id
    store_type: { kind: guid }
    default_value: { kind: new_guid }
  - name: Title
    store_type: { kind: string, max_length: 128 }
    default_value: { kind: string, value: "Untitled" }
  - name: Price
    store_type: { kind: decimal, precision: 18, scale: 2 }
    is_nullable: true
"#;
        let shape: TypeShape = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(shape.fields.len(), 3);
        assert_eq!(shape.fields[0].default_value, Some(DefaultValue::NewGuid));
        assert_eq!(shape.fields[1].store_type, StoreType::string(128));
        assert_eq!(
            shape.fields[1].default_value,
            Some(DefaultValue::String("Untitled".to_string()))
        );
        assert!(shape.fields[2].is_nullable);
        assert_eq!(shape.scopes, vec![DataScope::published(), DataScope::draft()]);
    }
}
