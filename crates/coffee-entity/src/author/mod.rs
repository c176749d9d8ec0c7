//! Local author domain entities.

pub mod model;

pub use model::{AuthorMatcher, LocalAuthor, MATCH_THRESHOLD};
