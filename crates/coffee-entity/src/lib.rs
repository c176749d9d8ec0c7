//! # coffee-entity
//!
//! Domain entity models for the Astro-Coffee server. Every struct in this
//! crate represents a database table row or a domain value object. Database
//! entities additionally derive `sqlx::FromRow`.

pub mod author;
pub mod listing;
