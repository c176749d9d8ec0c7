//! Local author repository implementation.

use sqlx::SqliteConnection;

use coffee_core::error::{AppError, ErrorKind};
use coffee_core::result::AppResult;
use coffee_entity::author::LocalAuthor;

use crate::metadata::SchemaMetadata;

/// Repository for the local author list.
#[derive(Debug)]
pub struct AuthorRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> AuthorRepository<'c> {
    /// Create an author repository over a worker's connection.
    pub fn new(conn: &'c mut SqliteConnection, metadata: &SchemaMetadata) -> AppResult<Self> {
        metadata.require_table("local_authors")?;
        Ok(Self { conn })
    }

    /// All local authors, sorted by name.
    pub async fn list(&mut self) -> AppResult<Vec<LocalAuthor>> {
        sqlx::query_as::<_, LocalAuthor>(
            "SELECT id, author, email, affiliation FROM local_authors ORDER BY author ASC",
        )
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list local authors", e))
    }

    /// Register a local author.
    pub async fn add(
        &mut self,
        author: &str,
        email: Option<&str>,
        affiliation: Option<&str>,
    ) -> AppResult<LocalAuthor> {
        sqlx::query_as::<_, LocalAuthor>(
            "INSERT INTO local_authors (author, email, affiliation) VALUES (?1, ?2, ?3) \
             RETURNING id, author, email, affiliation",
        )
        .bind(author)
        .bind(email)
        .bind(affiliation)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db) = e {
                if db.is_unique_violation() {
                    return AppError::conflict(format!("Local author '{author}' already exists"));
                }
            }
            AppError::with_source(ErrorKind::Database, "Failed to add local author", e)
        })
    }
}
