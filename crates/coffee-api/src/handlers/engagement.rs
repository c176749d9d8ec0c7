//! Vote and roster handlers.
//!
//! The user name comes in the request body; resolving it from a session is
//! the job of the authentication layer in front of these routes.

use axum::Json;
use axum::extract::State;

use coffee_entity::listing::Roster;
use coffee_worker::jobs::{RosterTask, VoteTask};

use super::ApiResult;
use crate::dto::request::{RosterRequest, VoteRequest};
use crate::dto::response::{ApiResponse, RosterResponse, VoteResponse};
use crate::state::AppState;

/// POST /api/vote
pub async fn vote(
    State(state): State<AppState>,
    Json(request): Json<VoteRequest>,
) -> ApiResult<VoteResponse> {
    let nvotes = state
        .pool
        .run(VoteTask {
            arxiv_id: request.arxiv_id.clone(),
            user: request.user,
            vote: request.vote,
        })
        .await?;
    Ok(Json(ApiResponse::ok(VoteResponse {
        arxiv_id: request.arxiv_id,
        nvotes,
    })))
}

/// POST /api/reserve
pub async fn reserve(
    State(state): State<AppState>,
    Json(request): Json<RosterRequest>,
) -> ApiResult<RosterResponse> {
    change_roster(state, Roster::Reservers, request).await
}

/// POST /api/present
pub async fn present(
    State(state): State<AppState>,
    Json(request): Json<RosterRequest>,
) -> ApiResult<RosterResponse> {
    change_roster(state, Roster::Presenters, request).await
}

async fn change_roster(
    state: AppState,
    roster: Roster,
    request: RosterRequest,
) -> ApiResult<RosterResponse> {
    let names = state
        .pool
        .run(RosterTask {
            arxiv_id: request.arxiv_id.clone(),
            roster,
            user: request.user,
            change: request.action,
        })
        .await?;
    Ok(Json(ApiResponse::ok(RosterResponse {
        arxiv_id: request.arxiv_id,
        roster,
        names,
    })))
}
