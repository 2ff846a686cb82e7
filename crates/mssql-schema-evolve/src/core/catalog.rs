//! Type catalog for explicit type-name resolution.
//!
//! The [`TypeCatalog`] is a registry of known data types. It is explicitly
//! constructed and injected into the planner, rather than resolving type
//! names through any global lookup.

use std::collections::HashMap;

use crate::error::{EvolveError, Result};

use super::schema::TypeIdentity;
use super::traits::TypeResolver;

/// Registry of known data types.
///
/// Resolution is case-insensitive and accepts, in order:
/// - the full name (`Namespace.Name`)
/// - a registered alias
/// - the short name, when exactly one registered type carries it
///
/// # Example
///
/// ```rust,ignore
/// let mut catalog = TypeCatalog::new();
/// catalog.register(TypeIdentity::new(id, "Shop.Catalog", "Product"));
/// catalog.register_alias("Product", "Shop.Catalog.Product")?;
///
/// let planner = Planner::new(naming, Arc::new(catalog));
/// ```
#[derive(Debug, Default, Clone)]
pub struct TypeCatalog {
    /// Registered types keyed by lowercased full name.
    types: HashMap<String, TypeIdentity>,

    /// Aliases keyed by lowercased alias, pointing at lowercased full names.
    aliases: HashMap<String, String>,
}

impl TypeCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type under its full name.
    pub fn register(&mut self, identity: TypeIdentity) {
        self.types.insert(identity.full_name().to_lowercase(), identity);
    }

    /// Register an alias for an already registered type.
    pub fn register_alias(&mut self, alias: impl Into<String>, full_name: &str) -> Result<()> {
        let key = full_name.to_lowercase();
        if !self.types.contains_key(&key) {
            return Err(EvolveError::Config(format!(
                "Cannot alias unknown data type: {}",
                full_name
            )));
        }
        self.aliases.insert(alias.into().to_lowercase(), key);
        Ok(())
    }

    /// Resolve a type name, returning an error if not found.
    pub fn require(&self, type_name: &str) -> Result<TypeIdentity> {
        self.resolve(type_name)
            .ok_or_else(|| EvolveError::Config(format!("Unknown data type: {}", type_name)))
    }

    /// Check if a type is registered under its full name.
    pub fn contains(&self, full_name: &str) -> bool {
        self.types.contains_key(&full_name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeResolver for TypeCatalog {
    fn resolve(&self, type_name: &str) -> Option<TypeIdentity> {
        let key = type_name.trim().to_lowercase();

        if let Some(identity) = self.types.get(&key) {
            return Some(identity.clone());
        }
        if let Some(full) = self.aliases.get(&key) {
            return self.types.get(full).cloned();
        }

        let mut by_short_name = self
            .types
            .values()
            .filter(|t| t.name.eq_ignore_ascii_case(&key));
        match (by_short_name.next(), by_short_name.next()) {
            (Some(identity), None) => Some(identity.clone()),
            _ => None,
        }
    }
}
