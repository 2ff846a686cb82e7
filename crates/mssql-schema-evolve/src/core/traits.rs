//! Core traits at the engine's seams.
//!
//! - [`SqlExecutor`]: the SQL execution capability the engine runs DDL and
//!   catalog queries through
//! - [`TypeResolver`]: normalizes configured type names to canonical identities
//!
//! Both are injected; the engine never looks up connections or types globally.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::TypeIdentity;
use super::value::{SqlCommand, SqlRow, SqlValue};

/// Execute statements against one named connection.
///
/// Implementations apply their own command-timeout policy; the engine adds
/// no timeout or cancellation of its own.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute a statement batch that returns no rows.
    ///
    /// Returns the number of affected rows, when the engine reports one.
    async fn execute_non_query(&self, sql: &str) -> Result<u64>;

    /// Execute a parameterized statement that returns no rows.
    async fn execute_command(&self, command: &SqlCommand) -> Result<u64>;

    /// Run a query and collect its first result set.
    async fn execute_reader(&self, sql: &str) -> Result<Vec<SqlRow>>;

    /// Call a stored procedure with positional arguments.
    async fn execute_procedure(&self, name: &str, args: &[SqlValue]) -> Result<()>;
}

/// Resolve a configured type name to its canonical identity.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, type_name: &str) -> Option<TypeIdentity>;
}
