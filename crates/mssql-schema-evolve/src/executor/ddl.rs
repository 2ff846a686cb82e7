//! SQL text for every statement the executor issues.
//!
//! Pure functions: they render statements and never run them.

use crate::core::identifier::{qualify_mssql, quote_mssql};
use crate::core::schema::{FieldDescriptor, TypeShape};
use crate::core::value::{SqlCommand, SqlValue};
use crate::error::{EvolveError, Result};
use crate::naming::{ConstraintKind, NamingEngine};
use crate::typemap::{column_definition, default_parameter, default_value_expression, DefaultPlacement};

/// System procedure renaming tables, columns and constraints.
pub const RENAME_PROCEDURE: &str = "sp_rename";

/// `CREATE TABLE` with inline defaults and the primary key.
///
/// The key is clustered unless the type declares its own sort order.
pub fn create_table(schema: &str, table: &str, shape: &TypeShape, naming: &NamingEngine) -> Result<String> {
    let mut lines = Vec::with_capacity(shape.fields.len() + 1);
    for field in &shape.fields {
        let constraint = naming.constraint_name(ConstraintKind::Default, table, Some(&field.name));
        lines.push(column_definition(field, DefaultPlacement::Inline(&constraint))?);
    }

    if !shape.key_fields.is_empty() {
        let columns = shape
            .key_fields
            .iter()
            .map(|key| {
                let name = shape.field(key).map(|f| f.name.as_str()).unwrap_or(key);
                quote_mssql(name)
            })
            .collect::<Result<Vec<_>>>()?;
        let clustering = if shape.has_custom_sort_order {
            "NONCLUSTERED"
        } else {
            "CLUSTERED"
        };
        lines.push(format!(
            "CONSTRAINT {} PRIMARY KEY {} ({})",
            quote_mssql(&naming.constraint_name(ConstraintKind::PrimaryKey, table, None))?,
            clustering,
            columns.join(", ")
        ));
    }

    Ok(format!(
        "CREATE TABLE {} (\n    {}\n)",
        qualify_mssql(schema, table)?,
        lines.join(",\n    ")
    ))
}

pub fn drop_table(schema: &str, table: &str) -> Result<String> {
    Ok(format!("DROP TABLE {}", qualify_mssql(schema, table)?))
}

pub fn drop_constraint(schema: &str, table: &str, constraint: &str) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} DROP CONSTRAINT {}",
        qualify_mssql(schema, table)?,
        quote_mssql(constraint)?
    ))
}

pub fn drop_column(schema: &str, table: &str, column: &str) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} DROP COLUMN {}",
        qualify_mssql(schema, table)?,
        quote_mssql(column)?
    ))
}

/// `ALTER COLUMN` never carries a default; see [`add_default_constraint`].
pub fn alter_column(schema: &str, table: &str, field: &FieldDescriptor) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ALTER COLUMN {}",
        qualify_mssql(schema, table)?,
        column_definition(field, DefaultPlacement::Excluded)?
    ))
}

pub fn add_column(schema: &str, table: &str, field: &FieldDescriptor, naming: &NamingEngine) -> Result<String> {
    let constraint = naming.constraint_name(ConstraintKind::Default, table, Some(&field.name));
    Ok(format!(
        "ALTER TABLE {} ADD {}",
        qualify_mssql(schema, table)?,
        column_definition(field, DefaultPlacement::Inline(&constraint))?
    ))
}

/// Named default constraint for a field, or `None` if it has no default.
pub fn add_default_constraint(
    schema: &str,
    table: &str,
    field: &FieldDescriptor,
    naming: &NamingEngine,
) -> Result<Option<String>> {
    let Some(default) = &field.default_value else {
        return Ok(None);
    };

    let constraint = naming.constraint_name(ConstraintKind::Default, table, Some(&field.name));
    Ok(Some(format!(
        "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT ({}) FOR {}",
        qualify_mssql(schema, table)?,
        quote_mssql(&constraint)?,
        default_value_expression(default),
        quote_mssql(&field.name)?
    )))
}

/// Replace NULLs with the field's default before the column becomes NOT NULL.
///
/// Literal defaults are bound as a parameter; function defaults are inlined.
pub fn backfill_nulls(schema: &str, table: &str, field: &FieldDescriptor) -> Result<Option<SqlCommand>> {
    let Some(default) = &field.default_value else {
        return Ok(None);
    };

    let column = quote_mssql(&field.name)?;
    let target = qualify_mssql(schema, table)?;
    let command = match default_parameter(default) {
        Some(value) => SqlCommand::new(format!(
            "UPDATE {} SET {} = @P1 WHERE {} IS NULL",
            target, column, column
        ))
        .bind(value),
        None => SqlCommand::new(format!(
            "UPDATE {} SET {} = {} WHERE {} IS NULL",
            target,
            column,
            default_value_expression(default),
            column
        )),
    };
    Ok(Some(command))
}

/// Arguments of `sp_rename` for a table.
pub fn rename_table_args(schema: &str, table: &str, new_name: &str) -> Result<Vec<SqlValue>> {
    Ok(vec![
        SqlValue::Text(qualify_mssql(schema, table)?),
        SqlValue::Text(checked_name(new_name)?),
    ])
}

/// Arguments of `sp_rename` for a column.
pub fn rename_column_args(schema: &str, table: &str, column: &str, new_name: &str) -> Result<Vec<SqlValue>> {
    Ok(vec![
        SqlValue::Text(format!("{}.{}", qualify_mssql(schema, table)?, quote_mssql(column)?)),
        SqlValue::Text(checked_name(new_name)?),
        SqlValue::Text("COLUMN".to_string()),
    ])
}

/// Arguments of `sp_rename` for a constraint.
pub fn rename_constraint_args(schema: &str, constraint: &str, new_name: &str) -> Result<Vec<SqlValue>> {
    Ok(vec![
        SqlValue::Text(qualify_mssql(schema, constraint)?),
        SqlValue::Text(checked_name(new_name)?),
        SqlValue::Text("OBJECT".to_string()),
    ])
}

/// The new name of `sp_rename` is taken literally, brackets included.
fn checked_name(name: &str) -> Result<String> {
    quote_mssql(name)?;
    if name.starts_with('[') {
        return Err(EvolveError::Config(format!(
            "Rename target must not be bracket-quoted: {}",
            name
        )));
    }
    Ok(name.to_string())
}
