//! Microsoft SQL Server driver.
//!
//! - [`MssqlExecutor`]: pooled [`SqlExecutor`](crate::core::SqlExecutor) implementation
//! - [`TiberiusConnectionManager`]: bb8 connection manager for Tiberius

mod executor;

pub use executor::{MssqlExecutor, TiberiusConnectionManager};
