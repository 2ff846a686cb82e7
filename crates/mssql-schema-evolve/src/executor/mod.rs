//! Schema change executor.
//!
//! [`StoreManipulator`] applies planned store operations against the live
//! database. Structural entry points are serialized by a guard owned by the
//! manipulator; two manipulators over the same database are not coordinated.

pub mod ddl;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::schema::{FieldDescriptor, Locale, TypeShape};
use crate::core::traits::SqlExecutor;
use crate::core::value::SqlCommand;
use crate::error::{EvolveError, Result};
use crate::inspector::StoreInspector;
use crate::naming::ConstraintKind;
use crate::planner::{
    AlterStore, CreateStore, DropStore, FieldRenames, MigrationPlan, Planner, StoreOperation,
    TypeSnapshot,
};

use ddl::RENAME_PROCEDURE;

/// Applies store operations for one database schema.
pub struct StoreManipulator {
    executor: Arc<dyn SqlExecutor>,
    inspector: StoreInspector,
    planner: Planner,
    schema: String,
    guard: Mutex<()>,
}

impl StoreManipulator {
    pub fn new(executor: Arc<dyn SqlExecutor>, planner: Planner, schema: impl Into<String>) -> Self {
        let schema = schema.into();
        Self {
            inspector: StoreInspector::new(executor.clone(), schema.clone()),
            executor,
            planner,
            schema,
            guard: Mutex::new(()),
        }
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn inspector(&self) -> &StoreInspector {
        &self.inspector
    }

    /// Create every store of a newly registered type.
    pub async fn create_stores_for_type(&self, snapshot: &TypeSnapshot) -> Result<MigrationPlan> {
        let _guard = self.guard.lock().await;
        let plan = self.planner.plan_create(snapshot)?;
        self.apply_operations(&plan).await?;
        Ok(plan)
    }

    /// Migrate the stores of a type from `old` to `new`.
    pub async fn alter_stores_for_type(
        &self,
        old: &TypeSnapshot,
        new: &TypeSnapshot,
        renames: &FieldRenames,
    ) -> Result<MigrationPlan> {
        let _guard = self.guard.lock().await;
        let plan = self.planner.plan_alter(old, new, renames)?;
        self.apply_operations(&plan).await?;
        Ok(plan)
    }

    /// Drop every store of a removed type.
    pub async fn drop_stores_for_type(&self, snapshot: &TypeSnapshot) -> Result<MigrationPlan> {
        let _guard = self.guard.lock().await;
        let plan = self.planner.plan_drop(snapshot)?;
        self.apply_operations(&plan).await?;
        Ok(plan)
    }

    /// Create the stores of a localizable type for a newly added locale.
    pub async fn create_stores_for_locale(&self, shape: &TypeShape, locale: &Locale) -> Result<MigrationPlan> {
        let _guard = self.guard.lock().await;
        let plan = self.planner.plan_create_locale(shape, locale)?;
        self.apply_operations(&plan).await?;
        Ok(plan)
    }

    /// Drop the stores of a localizable type for a removed locale.
    pub async fn drop_stores_for_locale(&self, shape: &TypeShape, locale: &Locale) -> Result<MigrationPlan> {
        let _guard = self.guard.lock().await;
        let plan = self.planner.plan_drop_locale(shape, locale)?;
        self.apply_operations(&plan).await?;
        Ok(plan)
    }

    /// Apply a previously computed plan.
    pub async fn apply_plan(&self, plan: &MigrationPlan) -> Result<()> {
        let _guard = self.guard.lock().await;
        self.apply_operations(plan).await
    }

    /// Apply a single operation.
    pub async fn apply(&self, operation: &StoreOperation) -> Result<()> {
        let _guard = self.guard.lock().await;
        self.apply_operation(operation).await
    }

    async fn apply_operations(&self, plan: &MigrationPlan) -> Result<()> {
        info!(
            "Applying {} store operations for {}",
            plan.len(),
            plan.type_name
        );
        for operation in &plan.operations {
            self.apply_operation(operation).await?;
        }
        Ok(())
    }

    async fn apply_operation(&self, operation: &StoreOperation) -> Result<()> {
        match operation {
            StoreOperation::Create(op) => self.create_store(op).await,
            StoreOperation::Drop(op) => self.drop_store(op).await,
            StoreOperation::Alter(op) => self.alter_store(op).await,
        }
    }

    async fn create_store(&self, op: &CreateStore) -> Result<()> {
        if self.inspector.table_exists(&op.table).await? {
            return Err(EvolveError::collision("table", &op.table));
        }

        let sql = ddl::create_table(&self.schema, &op.table, &op.shape, self.planner.naming())?;
        self.run(&sql)
            .await
            .map_err(|e| EvolveError::structural(format!("Failed to create store {}", op.table), &e))?;

        info!(
            "Created store {} for {} (scope {}, locale {})",
            op.table, op.identity, op.scope, op.locale
        );
        Ok(())
    }

    async fn drop_store(&self, op: &DropStore) -> Result<()> {
        if !self.inspector.table_exists(&op.table).await? {
            warn!("Store {} does not exist, nothing to drop", op.table);
            return Ok(());
        }

        self.run(&ddl::drop_table(&self.schema, &op.table)?).await?;
        info!("Dropped store {} for {}", op.table, op.identity);
        Ok(())
    }

    async fn alter_store(&self, op: &AlterStore) -> Result<()> {
        match self.alter_store_steps(op).await {
            Ok(()) => {
                info!(
                    "Altered store {} ({} changed, {} added, {} deleted)",
                    op.new_table,
                    op.fields.changed.len(),
                    op.fields.added.len(),
                    op.fields.deleted.len()
                );
                Ok(())
            }
            Err(e) if e.is_precondition() => Err(e),
            Err(e) => Err(EvolveError::structural(
                format!("Failed to alter store {}", op.old_table),
                &e,
            )),
        }
    }

    /// Drops, then renames and retypes, then additions.
    async fn alter_store_steps(&self, op: &AlterStore) -> Result<()> {
        if !self.inspector.table_exists(&op.old_table).await? {
            return Err(EvolveError::MissingStore(op.old_table.clone()));
        }

        // 1. Non-key constraints. The primary key stays in place.
        for constraint in self.inspector.constraints(&op.old_table).await? {
            if StoreInspector::is_primary_key(&constraint) {
                continue;
            }
            self.run(&ddl::drop_constraint(&self.schema, &op.old_table, &constraint.name)?)
                .await?;
        }

        // 2. Table name.
        if op.is_renamed() {
            self.rename_table(op).await?;
        }
        let table = op.new_table.as_str();

        // 3. Deleted columns.
        let columns = self.inspector.list_columns(table).await?;
        for field in &op.fields.deleted {
            if has_column(&columns, &field.name) {
                self.run(&ddl::drop_column(&self.schema, table, &field.name)?).await?;
            } else {
                warn!("Column {} is already gone from {}", field.name, table);
            }
        }

        // 4. Retained columns: renames, then retypes, then defaults.
        let columns = self.inspector.list_columns(table).await?;
        let mut renames = Vec::new();
        for changed in op.fields.changed.iter().filter(|c| c.is_renamed()) {
            if has_column(&columns, &changed.old.name) {
                renames.push((changed.old.name.clone(), changed.new.name.clone()));
            } else if has_column(&columns, &changed.new.name) {
                warn!(
                    "Column {} of {} is already renamed to {}",
                    changed.old.name, table, changed.new.name
                );
            }
        }
        for (from, to) in order_renames(renames, &columns)? {
            let args = ddl::rename_column_args(&self.schema, table, &from, &to)?;
            debug!("Renaming column {}.{} to {}", table, from, to);
            self.executor.execute_procedure(RENAME_PROCEDURE, &args).await?;
        }

        for changed in &op.fields.changed {
            if changed.has_effective_change {
                if changed.needs_null_backfill() {
                    self.backfill(table, &changed.new).await?;
                }
                self.run(&ddl::alter_column(&self.schema, table, &changed.new)?).await?;
            }
            self.apply_default(table, &changed.new).await?;
        }
        for field in &op.fields.unchanged {
            self.apply_default(table, field).await?;
        }

        // 5. New columns.
        let columns = self.inspector.list_columns(table).await?;
        for field in &op.fields.added {
            if has_column(&columns, &field.name) {
                warn!(
                    "Column {} already exists in {}, altering it in place",
                    field.name, table
                );
                if !field.is_nullable {
                    self.backfill(table, field).await?;
                }
                self.run(&ddl::alter_column(&self.schema, table, field)?).await?;
                self.apply_default(table, field).await?;
            } else {
                self.run(&ddl::add_column(&self.schema, table, field, self.planner.naming())?)
                    .await?;
            }
        }

        Ok(())
    }

    /// Rename the table and its primary key to the new store name.
    async fn rename_table(&self, op: &AlterStore) -> Result<()> {
        let case_only = op.old_table.eq_ignore_ascii_case(&op.new_table);
        if !case_only && self.inspector.table_exists(&op.new_table).await? {
            return Err(EvolveError::collision("table", &op.new_table));
        }

        let args = ddl::rename_table_args(&self.schema, &op.old_table, &op.new_table)?;
        self.executor.execute_procedure(RENAME_PROCEDURE, &args).await?;
        info!("Renamed store {} to {}", op.old_table, op.new_table);

        let key_name = self
            .planner
            .naming()
            .constraint_name(ConstraintKind::PrimaryKey, &op.new_table, None);
        for constraint in self.inspector.constraints(&op.new_table).await? {
            if StoreInspector::is_primary_key(&constraint) && constraint.name != key_name {
                let args = ddl::rename_constraint_args(&self.schema, &constraint.name, &key_name)?;
                self.executor.execute_procedure(RENAME_PROCEDURE, &args).await?;
                debug!("Renamed primary key {} to {}", constraint.name, key_name);
            }
        }
        Ok(())
    }

    async fn apply_default(&self, table: &str, field: &FieldDescriptor) -> Result<()> {
        if let Some(sql) = ddl::add_default_constraint(&self.schema, table, field, self.planner.naming())? {
            self.run(&sql).await?;
        }
        Ok(())
    }

    async fn backfill(&self, table: &str, field: &FieldDescriptor) -> Result<()> {
        if let Some(command) = ddl::backfill_nulls(&self.schema, table, field)? {
            self.run_command(&command).await?;
        }
        Ok(())
    }

    async fn run(&self, sql: &str) -> Result<()> {
        debug!("Executing: {}", sql);
        self.executor.execute_non_query(sql).await?;
        Ok(())
    }

    async fn run_command(&self, command: &SqlCommand) -> Result<()> {
        debug!("Executing: {} ({} params)", command.text, command.params.len());
        let rows = self.executor.execute_command(command).await?;
        debug!("{} rows affected", rows);
        Ok(())
    }
}

fn has_column(columns: &[String], name: &str) -> bool {
    columns.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// Order column renames so no rename targets a name still in use.
///
/// Renames whose target is free run first; each frees its source name for
/// the next. A cycle (e.g. swapping two columns) is broken by moving one
/// column to a temporary name. A target held by a column that is not
/// itself being renamed can never be freed and is a collision.
fn order_renames(
    mut pending: Vec<(String, String)>,
    columns: &[String],
) -> Result<Vec<(String, String)>> {
    let mut live: Vec<String> = columns.to_vec();
    let mut ordered = Vec::with_capacity(pending.len());
    let mut temp_counter = 0;

    while !pending.is_empty() {
        let ready = pending.iter().position(|(from, to)| {
            from.eq_ignore_ascii_case(to) || !has_column(&live, to)
        });

        if let Some(idx) = ready {
            let (from, to) = pending.remove(idx);
            rename_live(&mut live, &from, &to);
            ordered.push((from, to));
            continue;
        }

        // Every target is taken. Only a target held by another pending
        // source can be freed.
        let blocking = pending.iter().position(|(from, _)| {
            pending.iter().any(|(other, to)| {
                !other.eq_ignore_ascii_case(from) && to.eq_ignore_ascii_case(from)
            })
        });
        let Some(idx) = blocking else {
            let (_, to) = &pending[0];
            return Err(EvolveError::collision("column", to));
        };

        let temp = loop {
            temp_counter += 1;
            let candidate = format!("__rename_{}", temp_counter);
            if !has_column(&live, &candidate) {
                break candidate;
            }
        };
        let from = std::mem::replace(&mut pending[idx].0, temp.clone());
        rename_live(&mut live, &from, &temp);
        ordered.push((from, temp));
    }

    Ok(ordered)
}

fn rename_live(live: &mut [String], from: &str, to: &str) {
    if let Some(slot) = live.iter_mut().find(|c| c.eq_ignore_ascii_case(from)) {
        *slot = to.to_string();
    }
}
