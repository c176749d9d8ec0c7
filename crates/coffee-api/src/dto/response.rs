//! Response DTOs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use coffee_entity::author::LocalAuthor;
use coffee_entity::listing::{Listing, NameList, Roster};
use coffee_worker::PoolStats;

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the worker pool cannot take work.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Seconds since startup.
    pub uptime_seconds: u64,
    /// Worker pool counters.
    pub pool: PoolStats,
}

/// One date in the archive index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Listing date.
    pub date: NaiveDate,
    /// Papers listed that day.
    pub papers: i64,
}

/// Papers listed on one date, grouped the way the voting page shows them.
#[derive(Debug, Clone, Serialize)]
pub struct DayListingResponse {
    /// The date shown; absent before the first ingest.
    pub date: Option<NaiveDate>,
    /// Number of distinct papers.
    pub count: usize,
    /// Papers with a local author, most votes first.
    pub local: Vec<Listing>,
    /// Voted papers, most votes first.
    pub voted: Vec<Listing>,
    /// The rest, in listing order.
    pub other: Vec<Listing>,
}

/// Vote count after a vote was recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub arxiv_id: String,
    pub nvotes: i64,
}

/// A paper's presenters or reservers after a change.
#[derive(Debug, Clone, Serialize)]
pub struct RosterResponse {
    pub arxiv_id: String,
    pub roster: Roster,
    pub names: NameList,
}

/// Public view of a local author; contact details are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalAuthorResponse {
    /// Author name.
    pub author: String,
    /// Department or institute.
    pub affiliation: Option<String>,
}

impl From<LocalAuthor> for LocalAuthorResponse {
    fn from(author: LocalAuthor) -> Self {
        Self {
            author: author.author,
            affiliation: author.affiliation,
        }
    }
}
