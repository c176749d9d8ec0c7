//! Schema metadata cache.
//!
//! Loaded once per connection so repositories can check that the tables
//! they need exist without querying `sqlite_master` on every request.

use std::collections::BTreeMap;

use sqlx::SqliteConnection;

use coffee_core::error::{AppError, ErrorKind};
use coffee_core::result::AppResult;

/// Table and column names reflected from the live database.
#[derive(Debug, Clone, Default)]
pub struct SchemaMetadata {
    tables: BTreeMap<String, Vec<String>>,
}

impl SchemaMetadata {
    /// Reflect every user table and its columns.
    pub async fn load(conn: &mut SqliteConnection) -> AppResult<Self> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' \
             ORDER BY name",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list tables", e))?;

        let mut tables = BTreeMap::new();
        for name in names {
            let columns: Vec<String> =
                sqlx::query_scalar("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
                    .bind(&name)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|e| {
                        AppError::with_source(
                            ErrorKind::Database,
                            format!("Failed to read columns of table '{name}'"),
                            e,
                        )
                    })?;
            tables.insert(name, columns);
        }

        Ok(Self { tables })
    }

    /// Number of reflected tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Whether the table exists.
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Fail with a database error when the table is missing.
    pub fn require_table(&self, table: &str) -> AppResult<()> {
        if self.has_table(table) {
            Ok(())
        } else {
            Err(AppError::database(format!(
                "Table '{table}' does not exist; run migrations first"
            )))
        }
    }

    /// Fail with a database error when the table or any of `columns` is
    /// missing.
    pub fn require_columns(&self, table: &str, columns: &[&str]) -> AppResult<()> {
        self.require_table(table)?;
        let present = self.tables.get(table).map(Vec::as_slice).unwrap_or_default();
        match columns.iter().find(|c| !present.iter().any(|p| p == *c)) {
            None => Ok(()),
            Some(missing) => Err(AppError::database(format!(
                "Table '{table}' has no column '{missing}'; run migrations first"
            ))),
        }
    }
}
