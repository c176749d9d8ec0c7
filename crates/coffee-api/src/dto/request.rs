//! Request DTOs.

use serde::Deserialize;

use coffee_entity::listing::{RosterChange, Vote};

/// Query string accepted by the per-day listing routes.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ListingQuery {
    /// Also show cross-listed papers.
    #[serde(default)]
    pub crosslists: bool,
}

/// Query string of `GET /papers/{date}/votes`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserQuery {
    pub user: String,
}

/// Body of `POST /api/vote`.
#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    pub arxiv_id: String,
    /// Name of the signed-in user, supplied by the session layer.
    pub user: String,
    pub vote: Vote,
}

/// Body of `POST /api/reserve` and `POST /api/present`.
#[derive(Debug, Clone, Deserialize)]
pub struct RosterRequest {
    pub arxiv_id: String,
    pub user: String,
    pub action: RosterChange,
}
