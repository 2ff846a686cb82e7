//! Read-only view of the live schema through the system catalog.
//!
//! Nothing is cached: every call re-queries, so each step of an alter
//! observes the effects of the steps before it.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::core::identifier::{qualify_mssql, unicode_literal};
use crate::core::traits::SqlExecutor;
use crate::error::Result;
use crate::naming::{is_primary_key_name, ConstraintKind};

/// A constraint as reported by `sys.objects`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintInfo {
    pub name: String,
    /// `None` for object types this engine never creates.
    pub kind: Option<ConstraintKind>,
}

/// Queries tables, constraints and columns of one database schema.
#[derive(Clone)]
pub struct StoreInspector {
    executor: Arc<dyn SqlExecutor>,
    schema: String,
}

impl StoreInspector {
    pub fn new(executor: Arc<dyn SqlExecutor>, schema: impl Into<String>) -> Self {
        Self {
            executor,
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// List all user tables in the schema.
    pub async fn list_tables(&self) -> Result<BTreeSet<String>> {
        let sql = format!(
            "SELECT name FROM sys.objects WHERE type = 'U' AND schema_id = SCHEMA_ID({}) ORDER BY name",
            unicode_literal(&self.schema)
        );
        let rows = self.executor.execute_reader(&sql).await?;

        let tables: BTreeSet<String> = rows
            .iter()
            .filter_map(|row| row.text(0).map(str::to_string))
            .collect();
        debug!("Found {} tables in schema {}", tables.len(), self.schema);
        Ok(tables)
    }

    /// Check whether a table exists. Names compare case-insensitively, as
    /// under the default collation.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let tables = self.list_tables().await?;
        Ok(tables.iter().any(|t| t.eq_ignore_ascii_case(table)))
    }

    /// List constraint names on a table, optionally restricted to one kind.
    pub async fn list_constraints(
        &self,
        table: &str,
        kind: Option<ConstraintKind>,
    ) -> Result<Vec<String>> {
        let constraints = self.constraints(table).await?;
        Ok(constraints
            .into_iter()
            .filter(|c| kind.is_none() || c.kind == kind)
            .map(|c| c.name)
            .collect())
    }

    /// List constraints on a table with their kinds.
    pub async fn constraints(&self, table: &str) -> Result<Vec<ConstraintInfo>> {
        let sql = format!(
            "SELECT name, type FROM sys.objects \
             WHERE parent_object_id = OBJECT_ID({}) AND type IN ('PK', 'D', 'F', 'UQ', 'C') \
             ORDER BY name",
            self.object_ref(table)?
        );
        let rows = self.executor.execute_reader(&sql).await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.text(0)?.to_string();
                let kind = row.text(1).and_then(ConstraintKind::from_type_code);
                Some(ConstraintInfo { name, kind })
            })
            .collect())
    }

    /// List column names of a table, in ordinal order.
    pub async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT name FROM sys.columns WHERE object_id = OBJECT_ID({}) ORDER BY column_id",
            self.object_ref(table)?
        );
        let rows = self.executor.execute_reader(&sql).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.text(0).map(str::to_string))
            .collect())
    }

    /// Whether a constraint is the table's primary key.
    ///
    /// Constraints created by this engine are classified by name prefix alone;
    /// the catalog type is consulted for constraints with foreign names.
    pub fn is_primary_key(constraint: &ConstraintInfo) -> bool {
        is_primary_key_name(&constraint.name) || constraint.kind == Some(ConstraintKind::PrimaryKey)
    }

    fn object_ref(&self, table: &str) -> Result<String> {
        Ok(unicode_literal(&qualify_mssql(&self.schema, table)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;

    fn inspector(store: &Arc<FakeStore>) -> StoreInspector {
        StoreInspector::new(store.clone(), "dbo")
    }

    #[tokio::test]
    async fn test_list_tables_reflects_latest_state() {
        let store = Arc::new(FakeStore::new());
        let inspector = inspector(&store);
        assert!(inspector.list_tables().await.unwrap().is_empty());

        store.add_table("Shop_Product_Published", &["Id", "Title"]);
        let tables = inspector.list_tables().await.unwrap();
        assert!(tables.contains("Shop_Product_Published"));
        assert!(inspector.table_exists("Shop_Product_Published").await.unwrap());
        assert!(!inspector.table_exists("Shop_Product_Draft").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_constraints_with_kind_filter() {
        let store = Arc::new(FakeStore::new());
        store.add_table("T", &["Id", "A"]);
        store.add_constraint("T", "PK_T", "PK");
        store.add_constraint("T", "DF_T_A", "D");

        let inspector = inspector(&store);
        let all = inspector.list_constraints("T", None).await.unwrap();
        assert_eq!(all, vec!["DF_T_A".to_string(), "PK_T".to_string()]);

        let defaults = inspector
            .list_constraints("T", Some(ConstraintKind::Default))
            .await
            .unwrap();
        assert_eq!(defaults, vec!["DF_T_A".to_string()]);
    }

    #[tokio::test]
    async fn test_list_columns_in_ordinal_order() {
        let store = Arc::new(FakeStore::new());
        store.add_table("T", &["Id", "B", "A"]);
        let columns = inspector(&store).list_columns("T").await.unwrap();
        assert_eq!(columns, vec!["Id", "B", "A"]);
    }

    #[tokio::test]
    async fn test_queries_quote_table_names() {
        let store = Arc::new(FakeStore::new());
        let inspector = inspector(&store);
        inspector.list_constraints("O'Brien]s", None).await.unwrap();

        let sql = store.statements().pop().unwrap();
        assert!(sql.contains("OBJECT_ID(N'[dbo].[O''Brien]]s]')"), "{}", sql);
    }

    #[test]
    fn test_primary_key_classification() {
        let by_name = ConstraintInfo {
            name: "PK_T".into(),
            kind: None,
        };
        let by_type = ConstraintInfo {
            name: "Custom_Key".into(),
            kind: Some(ConstraintKind::PrimaryKey),
        };
        let default = ConstraintInfo {
            name: "DF_T_A".into(),
            kind: Some(ConstraintKind::Default),
        };
        assert!(StoreInspector::is_primary_key(&by_name));
        assert!(StoreInspector::is_primary_key(&by_type));
        assert!(!StoreInspector::is_primary_key(&default));
    }
}
