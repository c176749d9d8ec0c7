//! Article type enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a paper belongs to the home listing or was cross-listed into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleKind {
    /// Primary category is one of the configured home categories.
    Astronomy,
    /// Primary category is elsewhere; the paper was cross-listed.
    Crosslist,
}

impl ArticleKind {
    /// Return the kind as stored in the `article_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Astronomy => "astronomy",
            Self::Crosslist => "crosslist",
        }
    }

    /// Classify a paper by its primary category.
    pub fn classify(primary_category: &str, home_categories: &[String]) -> Self {
        if home_categories
            .iter()
            .any(|home| primary_category.starts_with(home.as_str()))
        {
            Self::Astronomy
        } else {
            Self::Crosslist
        }
    }
}

impl fmt::Display for ArticleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ArticleKind {
    type Err = coffee_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "astronomy" => Ok(Self::Astronomy),
            "crosslist" => Ok(Self::Crosslist),
            _ => Err(coffee_core::AppError::validation(format!(
                "Invalid article type: '{s}'. Expected one of: astronomy, crosslist"
            ))),
        }
    }
}
