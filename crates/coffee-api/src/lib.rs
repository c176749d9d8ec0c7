//! # coffee-api
//!
//! HTTP API layer for the Astro-Coffee server built on Axum.
//!
//! Provides the JSON endpoints, request logging, error mapping, and the
//! port-binding helper that walks forward past busy ports. Every database
//! read is submitted to the worker pool; no handler touches the database
//! directly.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;
pub mod state;

pub use router::build_router;
pub use server::bind_with_retry;
pub use state::AppState;
