//! Core abstractions shared by every component of the engine.
//!
//! - [`schema`]: type shapes, fields, scopes, locales and default values
//! - [`identifier`]: identifier quoting and literal escaping
//! - [`value`]: SQL values, rows and parameterized commands
//! - [`traits`]: the SQL execution capability and the type resolver
//! - [`catalog`]: type registry implementing the resolver

pub mod catalog;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use catalog::TypeCatalog;
pub use schema::{
    DataScope, DefaultValue, FieldDescriptor, Locale, StoreType, TypeIdentity, TypeShape,
};
pub use traits::{SqlExecutor, TypeResolver};
pub use value::{SqlCommand, SqlRow, SqlValue};
