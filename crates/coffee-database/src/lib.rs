//! # coffee-database
//!
//! SQLite connection management, schema metadata caching, migrations, and
//! repository implementations for listings and local authors.
//!
//! Repositories borrow a single `SqliteConnection` rather than a pool: each
//! worker owns exactly one connection for its whole life.

pub mod connection;
pub mod metadata;
pub mod migration;
pub mod repositories;

pub use connection::{DatabaseEngine, dispose_connection, get_connection};
pub use metadata::SchemaMetadata;
