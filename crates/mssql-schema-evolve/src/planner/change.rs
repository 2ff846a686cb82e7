//! Change descriptor: the diff between an old and a new type shape.
//!
//! Renames are never inferred. The caller supplies an explicit mapping from
//! old field names to new field names; every other field is matched by name.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::schema::{DataScope, FieldDescriptor, TypeShape};
use crate::error::{EvolveError, Result};

/// Explicit field renames, old name to new name.
pub type FieldRenames = BTreeMap<String, String>;

/// A field present in both shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingField {
    pub old: FieldDescriptor,
    pub new: FieldDescriptor,

    /// Store type, nullability or default differs; the column must be altered.
    pub has_effective_change: bool,
}

impl ExistingField {
    fn new(old: &FieldDescriptor, new: &FieldDescriptor) -> Self {
        Self {
            has_effective_change: old.has_physical_change(new),
            old: old.clone(),
            new: new.clone(),
        }
    }

    pub fn is_renamed(&self) -> bool {
        self.old.name != self.new.name
    }

    /// Whether existing NULLs must be replaced before tightening the column.
    pub fn needs_null_backfill(&self) -> bool {
        self.old.is_nullable && !self.new.is_nullable && self.new.default_value.is_some()
    }
}

/// Per-field classification of a shape change.
///
/// Every field of the new shape lands in exactly one of `unchanged`,
/// `changed` or `added`. Every field of the old shape not matched by name or
/// rename lands in `deleted`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldChanges {
    pub unchanged: Vec<FieldDescriptor>,
    pub changed: Vec<ExistingField>,
    pub added: Vec<FieldDescriptor>,
    pub deleted: Vec<FieldDescriptor>,
}

impl FieldChanges {
    /// Classify the fields of `new` against `old`.
    ///
    /// # Errors
    ///
    /// Returns `EvolveError::Config` when a rename names an unknown field, or
    /// when two renames share a source or a target.
    pub fn compute(old: &TypeShape, new: &TypeShape, renames: &FieldRenames) -> Result<Self> {
        // new field name (lowercase) -> old field
        let mut renamed_from: BTreeMap<String, &FieldDescriptor> = BTreeMap::new();
        let mut rename_sources = HashSet::new();

        for (from, to) in renames {
            let old_field = old.field(from).ok_or_else(|| {
                EvolveError::Config(format!(
                    "Rename source {} is not a field of type {}",
                    from, old.type_name
                ))
            })?;
            if new.field(to).is_none() {
                return Err(EvolveError::Config(format!(
                    "Rename target {} is not a field of type {}",
                    to, new.type_name
                )));
            }
            if !rename_sources.insert(old_field.name.to_lowercase()) {
                return Err(EvolveError::Config(format!(
                    "Field {} is renamed more than once",
                    old_field.name
                )));
            }
            if renamed_from.insert(to.to_lowercase(), old_field).is_some() {
                return Err(EvolveError::Config(format!(
                    "Field {} is the target of more than one rename",
                    to
                )));
            }
        }

        let mut changes = FieldChanges::default();
        let mut matched_old = HashSet::new();

        for field in &new.fields {
            let key = field.name.to_lowercase();
            let old_field = match renamed_from.get(&key) {
                Some(source) => Some(*source),
                // A field renamed away frees its name; it never matches by name.
                None => old.field(&field.name).filter(|f| !rename_sources.contains(&f.name.to_lowercase())),
            };

            match old_field {
                Some(old_field) => {
                    matched_old.insert(old_field.name.to_lowercase());
                    let existing = ExistingField::new(old_field, field);
                    if existing.has_effective_change || existing.is_renamed() {
                        changes.changed.push(existing);
                    } else {
                        changes.unchanged.push(field.clone());
                    }
                }
                None => changes.added.push(field.clone()),
            }
        }

        changes.deleted = old
            .fields
            .iter()
            .filter(|f| !matched_old.contains(&f.name.to_lowercase()))
            .cloned()
            .collect();

        Ok(changes)
    }

    /// No column is renamed, altered, added or dropped.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.deleted.is_empty()
    }
}

/// Partition of data scopes between two shapes, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeChanges {
    pub existing: Vec<DataScope>,
    pub added: Vec<DataScope>,
    pub deleted: Vec<DataScope>,
}

impl ScopeChanges {
    pub fn compute(old: &TypeShape, new: &TypeShape) -> Self {
        Self {
            existing: new.scopes.iter().filter(|s| old.has_scope(s)).cloned().collect(),
            added: new.scopes.iter().filter(|s| !old.has_scope(s)).cloned().collect(),
            deleted: old.scopes.iter().filter(|s| !new.has_scope(s)).cloned().collect(),
        }
    }
}

/// Derived diff of two type shapes. Computed on demand, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeDescriptor {
    pub scopes: ScopeChanges,
    pub fields: FieldChanges,
}

impl ChangeDescriptor {
    pub fn compute(old: &TypeShape, new: &TypeShape, renames: &FieldRenames) -> Result<Self> {
        Ok(Self {
            scopes: ScopeChanges::compute(old, new),
            fields: FieldChanges::compute(old, new, renames)?,
        })
    }
}
