//! Database driver implementations.
//!
//! - [`mssql`]: Microsoft SQL Server execution over Tiberius

pub mod mssql;

pub use mssql::{MssqlExecutor, TiberiusConnectionManager};
