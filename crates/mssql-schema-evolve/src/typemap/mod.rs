//! Column and type mapping from field descriptors to SQL Server DDL.
//!
//! Each [`StoreType`] maps to exactly one native column type. Default values
//! render as SQL literals or engine functions, culture-invariant.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::core::identifier::{quote_mssql, string_literal, unicode_literal};
use crate::core::schema::{DefaultValue, FieldDescriptor, StoreType};
use crate::core::value::SqlValue;
use crate::error::{EvolveError, Result};

/// Longest bounded `nvarchar`; longer strings map to `nvarchar(max)`.
const NVARCHAR_MAX_BOUNDED: u32 = 4000;

/// Longest bounded `varbinary`; longer data maps to `varbinary(max)`.
const VARBINARY_MAX_BOUNDED: u32 = 8000;

/// Minimum fractional digits of a rendered decimal default.
const DECIMAL_MIN_SCALE: u32 = 2;

/// Whether a column definition carries its default constraint inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPlacement<'a> {
    /// Embed `CONSTRAINT [name] DEFAULT (...)` (CREATE TABLE, ADD COLUMN).
    Inline(&'a str),

    /// Leave the default out; it is added separately (ALTER COLUMN).
    Excluded,
}

/// Map a logical store type to its native column type.
pub fn native_type(store_type: &StoreType) -> String {
    match store_type {
        StoreType::Boolean => "bit".to_string(),
        StoreType::Int16 => "smallint".to_string(),
        StoreType::Int32 => "int".to_string(),
        StoreType::Int64 => "bigint".to_string(),
        StoreType::Decimal { precision, scale } => format!("decimal({}, {})", precision, scale),
        StoreType::Double => "float".to_string(),
        StoreType::String { max_length } => match max_length {
            Some(n) if *n > 0 && *n <= NVARCHAR_MAX_BOUNDED => format!("nvarchar({})", n),
            _ => "nvarchar(max)".to_string(),
        },
        StoreType::DateTime => "datetime".to_string(),
        StoreType::Guid => "uniqueidentifier".to_string(),
        StoreType::Binary { max_length } => match max_length {
            Some(n) if *n > 0 && *n <= VARBINARY_MAX_BOUNDED => format!("varbinary({})", n),
            _ => "varbinary(max)".to_string(),
        },
    }
}

/// Check that a default value kind is usable for a store type.
///
/// # Errors
///
/// Returns `EvolveError::Config` naming the field when the kind is unsupported.
pub fn check_default(field: &FieldDescriptor) -> Result<()> {
    let Some(default) = &field.default_value else {
        return Ok(());
    };

    let supported = match default {
        DefaultValue::Now | DefaultValue::DateTime(_) => {
            matches!(field.store_type, StoreType::DateTime)
        }
        DefaultValue::NewGuid => matches!(field.store_type, StoreType::Guid),
        DefaultValue::Guid(_) => {
            matches!(field.store_type, StoreType::Guid | StoreType::String { .. })
        }
        DefaultValue::String(_) => matches!(field.store_type, StoreType::String { .. }),
        DefaultValue::Integer(_) => matches!(
            field.store_type,
            StoreType::Int16
                | StoreType::Int32
                | StoreType::Int64
                | StoreType::Decimal { .. }
                | StoreType::Double
        ),
        DefaultValue::Boolean(_) => matches!(
            field.store_type,
            StoreType::Boolean | StoreType::Int16 | StoreType::Int32 | StoreType::Int64
        ),
        DefaultValue::Decimal(_) => {
            matches!(field.store_type, StoreType::Decimal { .. } | StoreType::Double)
        }
    };

    if supported {
        Ok(())
    } else {
        Err(EvolveError::Config(format!(
            "Unsupported default value kind '{}' for field {} of type {}",
            default.kind(),
            field.name,
            native_type(&field.store_type)
        )))
    }
}

/// Render a default value as a SQL expression.
pub fn default_value_expression(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Now => "GETDATE()".to_string(),
        DefaultValue::NewGuid => "NEWID()".to_string(),
        DefaultValue::String(s) => unicode_literal(s),
        DefaultValue::Guid(g) => string_literal(&g.to_string()),
        DefaultValue::Integer(i) => i.to_string(),
        DefaultValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
        DefaultValue::DateTime(dt) => string_literal(&format_datetime(dt)),
        DefaultValue::Decimal(d) => format_decimal(d),
    }
}

/// The value of a literal default as a command parameter. Function defaults
/// (`now`, `new_guid`) have no parameter form.
pub fn default_parameter(default: &DefaultValue) -> Option<SqlValue> {
    match default {
        DefaultValue::Now | DefaultValue::NewGuid => None,
        DefaultValue::String(s) => Some(SqlValue::Text(s.clone())),
        DefaultValue::Guid(g) => Some(SqlValue::Uuid(*g)),
        DefaultValue::Integer(i) => Some(SqlValue::I64(*i)),
        DefaultValue::Boolean(b) => Some(SqlValue::Bool(*b)),
        DefaultValue::DateTime(dt) => Some(SqlValue::DateTime(*dt)),
        DefaultValue::Decimal(d) => Some(SqlValue::Decimal(*d)),
    }
}

/// Build the DDL fragment for a column: `[Name] type NULL|NOT NULL [default]`.
pub fn column_definition(field: &FieldDescriptor, placement: DefaultPlacement<'_>) -> Result<String> {
    check_default(field)?;

    let mut def = format!(
        "{} {} {}",
        quote_mssql(&field.name)?,
        native_type(&field.store_type),
        if field.is_nullable { "NULL" } else { "NOT NULL" }
    );

    if let (DefaultPlacement::Inline(constraint), Some(default)) = (placement, &field.default_value) {
        def.push_str(&format!(
            " CONSTRAINT {} DEFAULT ({})",
            quote_mssql(constraint)?,
            default_value_expression(default)
        ));
    }

    Ok(def)
}

fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_decimal(d: &Decimal) -> String {
    let mut fixed = *d;
    fixed.rescale(fixed.scale().max(DECIMAL_MIN_SCALE));
    fixed.to_string()
}
