//! # mssql-schema-evolve
//!
//! Online schema evolution for dynamically defined data types stored in
//! SQL Server.
//!
//! Every data type owns one table per data scope (and per locale, for
//! localizable types). When a type is registered, altered or removed, this
//! library plans the affected stores and transforms the live tables in
//! place:
//!
//! - **Naming** of tables and constraints within the identifier limit
//! - **Type mapping** from logical store types to native column types
//! - **Inspection** of live tables, columns and constraints
//! - **Planning** of create / drop / alter operations per store
//! - **Execution** of ordered DDL sequences, including renames
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mssql_schema_evolve::{Config, MssqlExecutor, Planner, ShapeDocument, StoreManipulator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let doc = ShapeDocument::load("product.yaml")?;
//!
//!     let catalog = mssql_schema_evolve::build_catalog([&doc], &config.evolve.aliases)?;
//!     let planner = Planner::new(config.evolve.naming_engine(), Arc::new(catalog));
//!     let executor = Arc::new(MssqlExecutor::connect(&config.target).await?);
//!
//!     let manipulator = StoreManipulator::new(executor, planner, config.target.schema.clone());
//!     let plan = manipulator.create_stores_for_type(&doc.snapshot()).await?;
//!     println!("{}", plan);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod document;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod inspector;
pub mod naming;
pub mod planner;
pub mod typemap;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{Config, EvolveConfig, TargetConfig};
pub use core::{
    DataScope, DefaultValue, FieldDescriptor, Locale, SqlCommand, SqlExecutor, SqlRow, SqlValue,
    StoreType, TypeCatalog, TypeIdentity, TypeResolver, TypeShape,
};
pub use document::{build_catalog, ShapeDocument};
pub use drivers::MssqlExecutor;
pub use error::{EvolveError, Result};
pub use executor::StoreManipulator;
pub use inspector::StoreInspector;
pub use naming::{NameSuffix, NamingEngine};
pub use planner::{FieldRenames, MigrationPlan, Planner, StoreOperation, TypeSnapshot};
