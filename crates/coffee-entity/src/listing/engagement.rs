//! User engagement with a listing: votes, presenters and reservations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Up,
    Down,
}

/// A per-paper list of user names other than the voters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Roster {
    /// Users who will present the paper.
    Presenters,
    /// Users who reserved the paper for themselves.
    Reservers,
}

impl Roster {
    /// Column holding this roster.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Presenters => "presenters",
            Self::Reservers => "reservers",
        }
    }
}

impl fmt::Display for Roster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Add or remove a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterChange {
    Add,
    Remove,
}

/// Comma-joined user names as stored in the voters and roster columns.
///
/// Membership is exact: `"al"` is not a member of `"alice"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameList(Vec<String>);

impl NameList {
    /// Parse a stored column value.
    pub fn parse(joined: &str) -> Self {
        Self(
            joined
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Exact membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    /// Names in stored order.
    pub fn names(&self) -> &[String] {
        &self.0
    }
}
