//! In-memory stand-in for SQL Server used by unit tests.
//!
//! [`FakeStore`] records every statement and interprets the DDL shapes the
//! executor emits, so catalog queries observe the effects of earlier steps.
//! It enforces the failures a real server raises for those statements
//! (duplicate tables, columns and constraint names, missing objects).

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::traits::SqlExecutor;
use crate::core::value::{SqlCommand, SqlRow, SqlValue};
use crate::error::{EvolveError, Result};

#[derive(Debug, Default, Clone)]
struct FakeTable {
    columns: Vec<String>,
    /// Constraint name and `sys.objects.type` code.
    constraints: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, FakeTable>,
    statements: Vec<String>,
    fail_on: Option<String>,
}

impl State {
    fn table_key(&self, name: &str) -> Option<String> {
        self.tables
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut FakeTable> {
        let key = self
            .table_key(name)
            .ok_or_else(|| server_error(format!("Cannot find the object \"{}\"", name)))?;
        self.tables
            .get_mut(&key)
            .ok_or_else(|| server_error(format!("Cannot find the object \"{}\"", name)))
    }

    fn constraint_exists(&self, name: &str) -> bool {
        self.tables
            .values()
            .any(|t| t.constraints.iter().any(|(c, _)| c.eq_ignore_ascii_case(name)))
    }

    fn add_constraint(&mut self, table: &str, name: &str, code: &str) -> Result<()> {
        if self.constraint_exists(name) {
            return Err(server_error(format!(
                "There is already an object named '{}' in the database",
                name
            )));
        }
        self.table_mut(table)?
            .constraints
            .push((name.to_string(), code.to_string()));
        Ok(())
    }
}

/// Records statements and simulates the catalog of one schema.
#[derive(Debug, Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with columns.
    pub fn add_table(&self, name: &str, columns: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.tables.insert(
            name.to_string(),
            FakeTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                constraints: Vec::new(),
            },
        );
    }

    /// Seed a constraint with its `sys.objects.type` code.
    pub fn add_constraint(&self, table: &str, name: &str, code: &str) {
        let mut state = self.state.lock().unwrap();
        state.add_constraint(table, name, code).unwrap();
    }

    /// Make every statement containing `fragment` fail.
    pub fn fail_on(&self, fragment: &str) {
        self.state.lock().unwrap().fail_on = Some(fragment.to_string());
    }

    /// Every statement issued so far, queries included.
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    /// Statements that change the schema or data (no catalog queries).
    pub fn ddl(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| !s.starts_with("SELECT"))
            .collect()
    }

    pub fn clear_statements(&self) {
        self.state.lock().unwrap().statements.clear();
    }

    pub fn tables(&self) -> Vec<String> {
        self.state.lock().unwrap().tables.keys().cloned().collect()
    }

    pub fn columns(&self, table: &str) -> Option<Vec<String>> {
        let state = self.state.lock().unwrap();
        let key = state.table_key(table)?;
        state.tables.get(&key).map(|t| t.columns.clone())
    }

    pub fn constraints(&self, table: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .table_key(table)
            .and_then(|key| state.tables.get(&key))
            .map(|t| t.constraints.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    fn record(&self, statement: String) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let failing = state
            .fail_on
            .as_ref()
            .is_some_and(|fragment| statement.contains(fragment.as_str()));
        state.statements.push(statement.clone());
        if failing {
            return Err(server_error(format!("Statement rejected: {}", statement)));
        }
        Ok(())
    }

    fn apply_ddl(&self, sql: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let idents = bracket_idents(sql);

        if sql.starts_with("CREATE TABLE") {
            let table = ident(&idents, 1)?;
            if state.table_key(&table).is_some() {
                return Err(server_error(format!(
                    "There is already an object named '{}' in the database",
                    table
                )));
            }
            let mut created = FakeTable::default();
            for line in sql.lines().skip(1) {
                let line = line.trim().trim_end_matches(',');
                let parts = bracket_idents(line);
                if line.starts_with("CONSTRAINT") {
                    let code = if line.contains("PRIMARY KEY") { "PK" } else { "C" };
                    created.constraints.push((ident(&parts, 0)?, code.to_string()));
                } else if line.starts_with('[') {
                    created.columns.push(ident(&parts, 0)?);
                    if line.contains(" CONSTRAINT [") {
                        created.constraints.push((ident(&parts, 1)?, "D".to_string()));
                    }
                }
            }

            if let Some((name, _)) = created.constraints.iter().find(|(c, _)| state.constraint_exists(c)) {
                return Err(server_error(format!(
                    "There is already an object named '{}' in the database",
                    name
                )));
            }
            state.tables.insert(table, created);
            return Ok(());
        }

        if sql.starts_with("DROP TABLE") {
            let table = ident(&idents, 1)?;
            let key = state
                .table_key(&table)
                .ok_or_else(|| server_error(format!("Cannot drop the table '{}'", table)))?;
            state.tables.remove(&key);
            return Ok(());
        }

        if sql.starts_with("ALTER TABLE") {
            let table = ident(&idents, 1)?;
            let rest = after_idents(sql, 2);

            if rest.starts_with("DROP CONSTRAINT") {
                let name = ident(&idents, 2)?;
                let t = state.table_mut(&table)?;
                let before = t.constraints.len();
                t.constraints.retain(|(c, _)| !c.eq_ignore_ascii_case(&name));
                if t.constraints.len() == before {
                    return Err(server_error(format!("'{}' is not a constraint", name)));
                }
            } else if rest.starts_with("DROP COLUMN") {
                let name = ident(&idents, 2)?;
                let t = state.table_mut(&table)?;
                let before = t.columns.len();
                t.columns.retain(|c| !c.eq_ignore_ascii_case(&name));
                if t.columns.len() == before {
                    return Err(server_error(format!("Invalid column name '{}'", name)));
                }
            } else if rest.starts_with("ALTER COLUMN") {
                let name = ident(&idents, 2)?;
                if !state.table_mut(&table)?.columns.iter().any(|c| c.eq_ignore_ascii_case(&name)) {
                    return Err(server_error(format!("Invalid column name '{}'", name)));
                }
            } else if rest.starts_with("ADD CONSTRAINT") {
                let name = ident(&idents, 2)?;
                let column = ident(&idents, 3)?;
                if !state.table_mut(&table)?.columns.iter().any(|c| c.eq_ignore_ascii_case(&column)) {
                    return Err(server_error(format!("Invalid column name '{}'", column)));
                }
                state.add_constraint(&table, &name, "D")?;
            } else if rest.starts_with("ADD") {
                let column = ident(&idents, 2)?;
                let t = state.table_mut(&table)?;
                if t.columns.iter().any(|c| c.eq_ignore_ascii_case(&column)) {
                    return Err(server_error(format!(
                        "Column names in each table must be unique: '{}'",
                        column
                    )));
                }
                t.columns.push(column);
                if rest.contains(" CONSTRAINT [") {
                    state.add_constraint(&table, &ident(&idents, 3)?, "D")?;
                }
            }
            return Ok(());
        }

        // UPDATE backfills change data only.
        Ok(())
    }

    fn rename(&self, args: &[SqlValue]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let object = args.first().and_then(SqlValue::as_str).unwrap_or_default();
        let new_name = args
            .get(1)
            .and_then(SqlValue::as_str)
            .unwrap_or_default()
            .to_string();
        let parts = bracket_idents(object);

        match args.get(2).and_then(SqlValue::as_str) {
            Some("COLUMN") => {
                let table = ident(&parts, 1)?;
                let column = ident(&parts, 2)?;
                let t = state.table_mut(&table)?;
                if t.columns.iter().any(|c| c.eq_ignore_ascii_case(&new_name) && !c.eq_ignore_ascii_case(&column)) {
                    return Err(server_error(format!("Column name '{}' already exists", new_name)));
                }
                let slot = t
                    .columns
                    .iter_mut()
                    .find(|c| c.eq_ignore_ascii_case(&column))
                    .ok_or_else(|| server_error(format!("Invalid column name '{}'", column)))?;
                *slot = new_name;
            }
            Some("OBJECT") => {
                let old = ident(&parts, 1)?;
                if state.constraint_exists(&new_name) {
                    return Err(server_error(format!("Object '{}' already exists", new_name)));
                }
                let slot = state
                    .tables
                    .values_mut()
                    .flat_map(|t| t.constraints.iter_mut())
                    .find(|entry| entry.0.eq_ignore_ascii_case(&old))
                    .ok_or_else(|| server_error(format!("No item by the name of '{}'", old)))?;
                slot.0 = new_name;
            }
            _ => {
                let table = ident(&parts, 1)?;
                if state.table_key(&new_name).is_some_and(|k| !k.eq_ignore_ascii_case(&table)) {
                    return Err(server_error(format!("Object '{}' already exists", new_name)));
                }
                let key = state
                    .table_key(&table)
                    .ok_or_else(|| server_error(format!("No item by the name of '{}'", table)))?;
                let moved = state.tables.remove(&key).unwrap_or_default();
                state.tables.insert(new_name, moved);
            }
        }
        Ok(())
    }

    fn query(&self, sql: &str) -> Vec<SqlRow> {
        let state = self.state.lock().unwrap();

        if sql.contains("sys.columns") || sql.contains("parent_object_id") {
            let table = object_id_argument(sql)
                .and_then(|arg| bracket_idents(&arg).pop())
                .and_then(|name| state.table_key(&name))
                .and_then(|key| state.tables.get(&key));
            let Some(table) = table else {
                return Vec::new();
            };

            if sql.contains("sys.columns") {
                return table
                    .columns
                    .iter()
                    .map(|c| SqlRow::new(vec![SqlValue::from(c.as_str())]))
                    .collect();
            }

            let mut constraints = table.constraints.clone();
            constraints.sort();
            return constraints
                .into_iter()
                .map(|(name, code)| SqlRow::new(vec![SqlValue::Text(name), SqlValue::Text(code)]))
                .collect();
        }

        if sql.contains("sys.objects") {
            return state
                .tables
                .keys()
                .map(|t| SqlRow::new(vec![SqlValue::from(t.as_str())]))
                .collect();
        }

        vec![SqlRow::new(vec![SqlValue::I64(1)])]
    }
}

#[async_trait]
impl SqlExecutor for FakeStore {
    async fn execute_non_query(&self, sql: &str) -> Result<u64> {
        self.record(sql.to_string())?;
        self.apply_ddl(sql)?;
        Ok(0)
    }

    async fn execute_command(&self, command: &SqlCommand) -> Result<u64> {
        self.record(command.text.clone())?;
        self.apply_ddl(&command.text)?;
        Ok(0)
    }

    async fn execute_reader(&self, sql: &str) -> Result<Vec<SqlRow>> {
        self.record(sql.to_string())?;
        Ok(self.query(sql))
    }

    async fn execute_procedure(&self, name: &str, args: &[SqlValue]) -> Result<()> {
        let rendered: Vec<String> = args
            .iter()
            .map(|a| a.as_str().map(str::to_string).unwrap_or_else(|| format!("{:?}", a)))
            .collect();
        self.record(format!("EXEC {} {}", name, rendered.join(", ")))?;
        if name == "sp_rename" {
            self.rename(args)?;
        }
        Ok(())
    }
}

fn server_error(message: String) -> EvolveError {
    EvolveError::Io(std::io::Error::new(std::io::ErrorKind::Other, message))
}

fn ident(idents: &[String], idx: usize) -> Result<String> {
    idents
        .get(idx)
        .cloned()
        .ok_or_else(|| server_error(format!("Incorrect syntax: missing identifier {}", idx)))
}

/// Bracket-quoted identifiers in order of appearance, unescaped.
fn bracket_idents(sql: &str) -> Vec<String> {
    let mut idents = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '[' {
            continue;
        }
        let mut name = String::new();
        while let Some(c) = chars.next() {
            if c == ']' {
                if chars.peek() == Some(&']') {
                    chars.next();
                    name.push(']');
                } else {
                    break;
                }
            } else {
                name.push(c);
            }
        }
        idents.push(name);
    }
    idents
}

/// Text following the first `count` bracket identifiers.
fn after_idents(sql: &str, count: usize) -> &str {
    let mut seen = 0;
    let mut in_ident = false;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match (in_ident, bytes[i]) {
            (false, b'[') => in_ident = true,
            (true, b']') if bytes.get(i + 1) == Some(&b']') => i += 1,
            (true, b']') => {
                in_ident = false;
                seen += 1;
                if seen == count {
                    return sql[i + 1..].trim_start();
                }
            }
            _ => {}
        }
        i += 1;
    }
    ""
}

/// The unescaped string inside `OBJECT_ID(N'...')`.
fn object_id_argument(sql: &str) -> Option<String> {
    let start = sql.find("OBJECT_ID(N'")? + "OBJECT_ID(N'".len();
    let mut value = String::new();
    let mut chars = sql[start..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
                value.push('\'');
            } else {
                return Some(value);
            }
        } else {
            value.push(c);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_idents_unescape() {
        assert_eq!(
            bracket_idents("ALTER TABLE [dbo].[a]]b] DROP COLUMN [c]"),
            vec!["dbo", "a]b", "c"]
        );
    }

    #[test]
    fn test_after_idents() {
        assert_eq!(
            after_idents("ALTER TABLE [dbo].[T] ADD CONSTRAINT [DF] DEFAULT (0) FOR [A]", 2),
            "ADD CONSTRAINT [DF] DEFAULT (0) FOR [A]"
        );
    }

    #[test]
    fn test_object_id_argument() {
        assert_eq!(
            object_id_argument("WHERE object_id = OBJECT_ID(N'[dbo].[O''Brien]') ORDER BY 1"),
            Some("[dbo].[O'Brien]".to_string())
        );
    }

    #[tokio::test]
    async fn test_interprets_create_and_alter() {
        let store = FakeStore::new();
        store
            .execute_non_query(
                "CREATE TABLE [dbo].[T] (\n    [Id] int NOT NULL,\n    [A] int NOT NULL CONSTRAINT [DF_T_A] DEFAULT (0),\n    CONSTRAINT [PK_T] PRIMARY KEY CLUSTERED ([Id])\n)",
            )
            .await
            .unwrap();
        assert_eq!(store.columns("T").unwrap(), vec!["Id", "A"]);
        assert_eq!(store.constraints("T"), vec!["DF_T_A", "PK_T"]);

        store
            .execute_non_query("ALTER TABLE [dbo].[T] DROP CONSTRAINT [DF_T_A]")
            .await
            .unwrap();
        store.execute_non_query("ALTER TABLE [dbo].[T] ADD [B] int NULL").await.unwrap();
        assert!(store
            .execute_non_query("ALTER TABLE [dbo].[T] ADD [b] int NULL")
            .await
            .is_err());
        assert_eq!(store.columns("T").unwrap(), vec!["Id", "A", "B"]);
    }
}
