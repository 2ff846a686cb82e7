//! Schema change planner.
//!
//! Turns type snapshots into a [`MigrationPlan`]: an ordered list of store
//! operations with every table name computed up front. The plan is pure data;
//! nothing here touches the database.

pub mod change;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::schema::{DataScope, Locale, TypeIdentity, TypeShape};
use crate::core::traits::TypeResolver;
use crate::error::{EvolveError, Result};
use crate::naming::NamingEngine;
use crate::typemap;

pub use change::{ChangeDescriptor, ExistingField, FieldChanges, FieldRenames, ScopeChanges};

/// A type shape together with the locales it is stored for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSnapshot {
    pub shape: TypeShape,

    /// Locales of a localizable type. Ignored for non-localizable types.
    #[serde(default)]
    pub locales: Vec<Locale>,
}

impl TypeSnapshot {
    pub fn new(shape: TypeShape, locales: Vec<Locale>) -> Self {
        Self { shape, locales }
    }

    /// Locales that get a store: the configured set for localizable types,
    /// otherwise only the invariant locale.
    pub fn store_locales(&self) -> Result<Vec<Locale>> {
        if !self.shape.localizable {
            return Ok(vec![Locale::invariant()]);
        }

        let mut seen = HashSet::new();
        let locales: Vec<Locale> = self
            .locales
            .iter()
            .filter(|l| !l.is_invariant() && seen.insert((*l).clone()))
            .cloned()
            .collect();

        if locales.is_empty() {
            return Err(EvolveError::Config(format!(
                "Localizable type {} has no locales",
                self.shape.type_name
            )));
        }
        Ok(locales)
    }
}

/// Create the store for one (type, scope, locale).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateStore {
    pub identity: TypeIdentity,
    pub shape: TypeShape,
    pub scope: DataScope,
    pub locale: Locale,
    pub table: String,
}

/// Drop the store for one (type, scope, locale).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropStore {
    pub identity: TypeIdentity,
    pub scope: DataScope,
    pub locale: Locale,
    pub table: String,
}

/// Alter an existing store in place, renaming it when its name changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterStore {
    pub identity: TypeIdentity,
    pub shape: TypeShape,
    pub scope: DataScope,
    pub old_locale: Locale,
    pub new_locale: Locale,
    pub old_table: String,
    pub new_table: String,
    pub fields: FieldChanges,
}

impl AlterStore {
    pub fn is_renamed(&self) -> bool {
        self.old_table != self.new_table
    }
}

/// One structural operation on one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreOperation {
    Create(CreateStore),
    Drop(DropStore),
    Alter(AlterStore),
}

impl StoreOperation {
    /// The table this operation leaves behind (or removes, for a drop).
    pub fn table(&self) -> &str {
        match self {
            StoreOperation::Create(op) => &op.table,
            StoreOperation::Drop(op) => &op.table,
            StoreOperation::Alter(op) => &op.new_table,
        }
    }

    fn order(&self) -> u8 {
        match self {
            StoreOperation::Drop(_) => 0,
            StoreOperation::Alter(_) => 1,
            StoreOperation::Create(_) => 2,
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOperation::Create(op) => write!(
                f,
                "CREATE {} (scope {}, locale {})",
                op.table, op.scope, op.locale
            ),
            StoreOperation::Drop(op) => write!(
                f,
                "DROP   {} (scope {}, locale {})",
                op.table, op.scope, op.locale
            ),
            StoreOperation::Alter(op) => {
                if op.is_renamed() {
                    write!(f, "ALTER  {} -> {}", op.old_table, op.new_table)?;
                } else {
                    write!(f, "ALTER  {}", op.new_table)?;
                }
                write!(
                    f,
                    " (scope {}, {} changed, {} added, {} deleted)",
                    op.scope,
                    op.fields.changed.len(),
                    op.fields.added.len(),
                    op.fields.deleted.len()
                )
            }
        }
    }
}

/// Ordered operations for one type. Drops run first, then alters, then
/// creates, so names freed by a drop are available to later operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub type_name: String,
    pub operations: Vec<StoreOperation>,
}

impl MigrationPlan {
    fn new(type_name: impl Into<String>, mut operations: Vec<StoreOperation>) -> Self {
        operations.sort_by_key(StoreOperation::order);
        Self {
            type_name: type_name.into(),
            operations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

impl fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plan for {} ({} operations)", self.type_name, self.operations.len())?;
        for op in &self.operations {
            writeln!(f, "  {}", op)?;
        }
        Ok(())
    }
}

/// Plans store operations for type registrations, alterations and removals.
#[derive(Clone)]
pub struct Planner {
    naming: NamingEngine,
    resolver: Arc<dyn TypeResolver>,
    default_locale: Option<Locale>,
}

impl Planner {
    pub fn new(naming: NamingEngine, resolver: Arc<dyn TypeResolver>) -> Self {
        Self {
            naming,
            resolver,
            default_locale: None,
        }
    }

    /// Set the locale whose store is kept when a type toggles localizability.
    pub fn with_default_locale(mut self, locale: Option<Locale>) -> Self {
        self.default_locale = locale.filter(|l| !l.is_invariant());
        self
    }

    pub fn naming(&self) -> &NamingEngine {
        &self.naming
    }

    /// Plan the stores of a newly registered type.
    pub fn plan_create(&self, snapshot: &TypeSnapshot) -> Result<MigrationPlan> {
        let identity = self.prepare(&snapshot.shape)?;
        let locales = snapshot.store_locales()?;

        let mut ops = Vec::new();
        for scope in &snapshot.shape.scopes {
            for locale in &locales {
                ops.push(self.create(&identity, &snapshot.shape, scope, locale));
            }
        }
        self.finish(&snapshot.shape.type_name, ops)
    }

    /// Plan the removal of every store of a type.
    pub fn plan_drop(&self, snapshot: &TypeSnapshot) -> Result<MigrationPlan> {
        let identity = self.resolve(&snapshot.shape)?;
        let locales = snapshot.store_locales()?;

        let mut ops = Vec::new();
        for scope in &snapshot.shape.scopes {
            for locale in &locales {
                ops.push(self.drop(&identity, scope, locale)?);
            }
        }
        Ok(MigrationPlan::new(snapshot.shape.type_name.clone(), ops))
    }

    /// Plan the stores for a locale added to the system. Non-localizable
    /// types have no per-locale stores and yield an empty plan.
    pub fn plan_create_locale(&self, shape: &TypeShape, locale: &Locale) -> Result<MigrationPlan> {
        if !shape.localizable || locale.is_invariant() {
            return Ok(MigrationPlan::new(shape.type_name.clone(), Vec::new()));
        }

        let identity = self.prepare(shape)?;
        let ops = shape
            .scopes
            .iter()
            .map(|scope| self.create(&identity, shape, scope, locale))
            .collect();
        self.finish(&shape.type_name, ops)
    }

    /// Plan the removal of a locale's stores.
    pub fn plan_drop_locale(&self, shape: &TypeShape, locale: &Locale) -> Result<MigrationPlan> {
        if !shape.localizable || locale.is_invariant() {
            return Ok(MigrationPlan::new(shape.type_name.clone(), Vec::new()));
        }

        let identity = self.resolve(shape)?;
        let ops = shape
            .scopes
            .iter()
            .map(|scope| self.drop(&identity, scope, locale))
            .collect::<Result<Vec<_>>>()?;
        Ok(MigrationPlan::new(shape.type_name.clone(), ops))
    }

    /// Plan the alteration of a type from `old` to `new`.
    ///
    /// # Errors
    ///
    /// - `Config` for unresolvable types, invalid shapes or renames, or an
    ///   existing store whose random-suffixed name cannot be recomputed
    /// - `KeyColumnChanged` when the diff touches a key column
    /// - `NameCollision` when two planned stores share a table name
    pub fn plan_alter(
        &self,
        old: &TypeSnapshot,
        new: &TypeSnapshot,
        renames: &FieldRenames,
    ) -> Result<MigrationPlan> {
        let old_identity = self.resolve(&old.shape)?;
        let new_identity = self.prepare(&new.shape)?;

        let changes = ChangeDescriptor::compute(&old.shape, &new.shape, renames)?;
        check_key_columns(&old.shape, &new.shape, &changes.fields)?;

        let old_locales = old.store_locales()?;
        let new_locales = new.store_locales()?;

        let mut ops = Vec::new();

        for scope in &changes.scopes.deleted {
            for locale in &old_locales {
                ops.push(self.drop(&old_identity, scope, locale)?);
            }
        }

        for scope in &changes.scopes.added {
            for locale in &new_locales {
                ops.push(self.create(&new_identity, &new.shape, scope, locale));
            }
        }

        let transitions = self.locale_transitions(&old.shape, &new.shape, &old_locales, &new_locales);
        for scope in &changes.scopes.existing {
            for transition in &transitions {
                let op = match transition {
                    LocaleTransition::Keep(from, to) => StoreOperation::Alter(AlterStore {
                        identity: new_identity.clone(),
                        shape: new.shape.clone(),
                        scope: scope.clone(),
                        old_locale: from.clone(),
                        new_locale: to.clone(),
                        old_table: self.naming.existing_table_name(&old_identity, scope, from)?,
                        new_table: self.naming.table_name(&new_identity, scope, to),
                        fields: changes.fields.clone(),
                    }),
                    LocaleTransition::Drop(locale) => self.drop(&old_identity, scope, locale)?,
                    LocaleTransition::Create(locale) => {
                        self.create(&new_identity, &new.shape, scope, locale)
                    }
                };
                ops.push(op);
            }
        }

        self.finish(&new.shape.type_name, ops)
    }

    /// Map old store locales onto new ones for a retained scope.
    fn locale_transitions(
        &self,
        old: &TypeShape,
        new: &TypeShape,
        old_locales: &[Locale],
        new_locales: &[Locale],
    ) -> Vec<LocaleTransition> {
        let default = self.default_locale.as_ref();

        match (old.localizable, new.localizable) {
            (false, false) => vec![LocaleTransition::Keep(Locale::invariant(), Locale::invariant())],
            (true, true) => {
                let mut transitions: Vec<LocaleTransition> = old_locales
                    .iter()
                    .map(|l| {
                        if new_locales.contains(l) {
                            LocaleTransition::Keep(l.clone(), l.clone())
                        } else {
                            LocaleTransition::Drop(l.clone())
                        }
                    })
                    .collect();
                transitions.extend(
                    new_locales
                        .iter()
                        .filter(|l| !old_locales.contains(l))
                        .map(|l| LocaleTransition::Create(l.clone())),
                );
                transitions
            }
            (false, true) => match default.filter(|d| new_locales.contains(*d)) {
                Some(default) => {
                    let mut transitions =
                        vec![LocaleTransition::Keep(Locale::invariant(), default.clone())];
                    transitions.extend(
                        new_locales
                            .iter()
                            .filter(|l| *l != default)
                            .map(|l| LocaleTransition::Create(l.clone())),
                    );
                    transitions
                }
                None => {
                    debug!("No default locale to keep for {}, recreating stores", new.type_name);
                    let mut transitions = vec![LocaleTransition::Drop(Locale::invariant())];
                    transitions.extend(new_locales.iter().map(|l| LocaleTransition::Create(l.clone())));
                    transitions
                }
            },
            (true, false) => match default.filter(|d| old_locales.contains(*d)) {
                Some(default) => {
                    let mut transitions: Vec<LocaleTransition> = old_locales
                        .iter()
                        .filter(|l| *l != default)
                        .map(|l| LocaleTransition::Drop(l.clone()))
                        .collect();
                    transitions.push(LocaleTransition::Keep(default.clone(), Locale::invariant()));
                    transitions
                }
                None => {
                    debug!("No default locale to keep for {}, recreating stores", new.type_name);
                    let mut transitions: Vec<LocaleTransition> =
                        old_locales.iter().map(|l| LocaleTransition::Drop(l.clone())).collect();
                    transitions.push(LocaleTransition::Create(Locale::invariant()));
                    transitions
                }
            },
        }
    }

    fn create(&self, identity: &TypeIdentity, shape: &TypeShape, scope: &DataScope, locale: &Locale) -> StoreOperation {
        StoreOperation::Create(CreateStore {
            identity: identity.clone(),
            shape: shape.clone(),
            scope: scope.clone(),
            locale: locale.clone(),
            table: self.naming.table_name(identity, scope, locale),
        })
    }

    fn drop(&self, identity: &TypeIdentity, scope: &DataScope, locale: &Locale) -> Result<StoreOperation> {
        Ok(StoreOperation::Drop(DropStore {
            identity: identity.clone(),
            scope: scope.clone(),
            locale: locale.clone(),
            table: self.naming.existing_table_name(identity, scope, locale)?,
        }))
    }

    fn resolve(&self, shape: &TypeShape) -> Result<TypeIdentity> {
        self.resolver.resolve(&shape.type_name).ok_or_else(|| {
            EvolveError::Config(format!("Unknown data type: {}", shape.type_name))
        })
    }

    /// Resolve a shape that will be materialized and validate its contents.
    fn prepare(&self, shape: &TypeShape) -> Result<TypeIdentity> {
        shape.validate()?;
        for field in &shape.fields {
            typemap::check_default(field)?;
        }
        self.resolve(shape)
    }

    /// Order the operations and reject duplicate target names.
    fn finish(&self, type_name: &str, ops: Vec<StoreOperation>) -> Result<MigrationPlan> {
        let mut targets = HashSet::new();
        for op in &ops {
            if matches!(op, StoreOperation::Drop(_)) {
                continue;
            }
            if !targets.insert(op.table().to_lowercase()) {
                return Err(EvolveError::collision("table", op.table()));
            }
        }

        let plan = MigrationPlan::new(type_name, ops);
        debug!("Planned {} operations for {}", plan.len(), type_name);
        Ok(plan)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum LocaleTransition {
    Keep(Locale, Locale),
    Drop(Locale),
    Create(Locale),
}

/// Reject alters that touch the primary key. The key is never re-created
/// during an alter, so its columns must stay exactly as they are.
fn check_key_columns(old: &TypeShape, new: &TypeShape, fields: &FieldChanges) -> Result<()> {
    let key_error = |column: &str| EvolveError::KeyColumnChanged {
        table: new.type_name.clone(),
        column: column.to_string(),
    };

    for key in &new.key_fields {
        if !old.is_key(key) {
            return Err(key_error(key));
        }
    }
    for key in &old.key_fields {
        if !new.is_key(key) {
            return Err(key_error(key));
        }
    }

    for changed in &fields.changed {
        if old.is_key(&changed.old.name) || new.is_key(&changed.new.name) {
            return Err(key_error(&changed.new.name));
        }
    }
    for added in &fields.added {
        if new.is_key(&added.name) {
            return Err(key_error(&added.name));
        }
    }

    Ok(())
}
