//! Repository implementations for Astro-Coffee entities.

pub mod author;
pub mod listing;

pub use author::AuthorRepository;
pub use listing::{InsertSummary, ListingRepository};
