//! YAML shape documents.
//!
//! A [`ShapeDocument`] describes one type at one point in time, the way an
//! operator feeds it to the CLI:
//!
//! ```yaml
//! identity:
//!   id: 6f1f7a52-3c1e-4c55-9a3e-2f1d0a9b7c11
//!   namespace: Shop.Catalog
//!   name: Product
//! shape:
//!   type_name: Shop.Catalog.Product
//!   key_fields: [Id]
//!   scopes: [Published, Draft]
//!   fields:
//!     - name: Id
//!       store_type: { kind: guid }
//!     - name: Count
//!       store_type: { kind: int32 }
//!       default_value: { kind: integer, value: 0 }
//! locales: [en-US]
//! renames:
//!   Qty: Count
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::catalog::TypeCatalog;
use crate::core::schema::{Locale, TypeIdentity, TypeShape};
use crate::error::Result;
use crate::planner::{FieldRenames, TypeSnapshot};

/// One type shape as read from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDocument {
    /// Identity the shape's type name resolves to.
    pub identity: TypeIdentity,

    pub shape: TypeShape,

    #[serde(default)]
    pub locales: Vec<Locale>,

    /// Field renames, old name to new name. Only read from the new document
    /// of an alter.
    #[serde(default)]
    pub renames: FieldRenames,
}

impl ShapeDocument {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let doc: ShapeDocument = serde_yaml::from_str(yaml)?;
        doc.shape.validate()?;
        Ok(doc)
    }

    pub fn snapshot(&self) -> TypeSnapshot {
        TypeSnapshot::new(self.shape.clone(), self.locales.clone())
    }
}

/// Build a catalog holding every document's identity plus configured aliases.
pub fn build_catalog<'a>(
    documents: impl IntoIterator<Item = &'a ShapeDocument>,
    aliases: &BTreeMap<String, String>,
) -> Result<TypeCatalog> {
    let mut catalog = TypeCatalog::new();
    for doc in documents {
        catalog.register(doc.identity.clone());
    }
    for (alias, full_name) in aliases {
        catalog.register_alias(alias.clone(), full_name)?;
    }
    Ok(catalog)
}
