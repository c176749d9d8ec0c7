//! Local author entity model and name matching.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An author affiliated with the local institution.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LocalAuthor {
    /// Row identifier.
    pub id: i64,
    /// Author name as registered.
    pub author: String,
    /// Contact email.
    pub email: Option<String>,
    /// Department or institute.
    pub affiliation: Option<String>,
}

/// Similarity a paper author must reach against a local author to match.
pub const MATCH_THRESHOLD: f64 = 0.83;

/// Matches paper author names against the local author list.
///
/// Names are compared after normalisation (case-folded, punctuation
/// stripped, whitespace collapsed) by normalised Levenshtein similarity. A
/// paper author is local when it scores at least [`MATCH_THRESHOLD`] against
/// any registered name, so small typos and accent variants still match but a
/// different first name with the same surname does not.
#[derive(Debug, Clone, Default)]
pub struct AuthorMatcher {
    names: Vec<String>,
}

impl AuthorMatcher {
    /// Build a matcher from the registered local authors.
    pub fn new<'a>(authors: impl IntoIterator<Item = &'a str>) -> Self {
        let mut names: Vec<String> = authors
            .into_iter()
            .map(normalize)
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    /// Whether no local authors are registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The registered name closest to `name`, if it clears the threshold.
    pub fn closest(&self, name: &str) -> Option<(&str, f64)> {
        let candidate = normalize(name);
        if candidate.is_empty() {
            return None;
        }
        self.names
            .iter()
            .map(|local| (local.as_str(), strsim::normalized_levenshtein(&candidate, local)))
            .filter(|(_, score)| *score >= MATCH_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Whether this single name belongs to a local author.
    pub fn is_local(&self, name: &str) -> bool {
        self.closest(name).is_some()
    }

    /// Whether any of the given names belongs to a local author.
    pub fn any_local<S: AsRef<str>>(&self, names: &[S]) -> bool {
        !self.is_empty() && names.iter().any(|name| self.is_local(name.as_ref()))
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
