//! # coffee-core
//!
//! Core crate for the Astro-Coffee server. Contains the typed configuration
//! schema and the unified error system shared by every other crate.
//!
//! This crate has **no** internal dependencies on other Astro-Coffee crates.

pub mod config;
pub mod error;
pub mod result;

pub use config::AppConfig;
pub use error::AppError;
pub use result::AppResult;
