//! Paper listing handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::NaiveDate;

use coffee_core::error::AppError;
use coffee_worker::jobs::{ArchiveIndexTask, DayListings, ListingsForDateTask, UserVotesTask};

use super::ApiResult;
use crate::dto::request::{ListingQuery, UserQuery};
use crate::dto::response::{ApiResponse, ArchiveEntry, DayListingResponse};
use crate::state::AppState;

/// GET /papers
pub async fn archive_index(State(state): State<AppState>) -> ApiResult<Vec<ArchiveEntry>> {
    let days = state.pool.run(ArchiveIndexTask).await?;
    let entries = days
        .into_iter()
        .map(|day| ArchiveEntry {
            date: day.utcdate,
            papers: day.count,
        })
        .collect();
    Ok(Json(ApiResponse::ok(entries)))
}

/// GET /papers/today
///
/// "Today" is the most recent listing date in the database.
pub async fn today(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> ApiResult<DayListingResponse> {
    let listings = state
        .pool
        .run(ListingsForDateTask {
            date: None,
            include_crosslists: query.crosslists,
        })
        .await?;
    Ok(Json(ApiResponse::ok(day_response(listings))))
}

/// GET /papers/{date}
pub async fn by_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Query(query): Query<ListingQuery>,
) -> ApiResult<DayListingResponse> {
    let listings = state
        .pool
        .run(ListingsForDateTask {
            date: Some(parse_date(&date)?),
            include_crosslists: query.crosslists,
        })
        .await?;
    Ok(Json(ApiResponse::ok(day_response(listings))))
}

/// GET /papers/{date}/votes?user=NAME
///
/// The arXiv ids on that date the user has voted for.
pub async fn user_votes(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Vec<String>> {
    let ids = state
        .pool
        .run(UserVotesTask {
            date: parse_date(&date)?,
            user: query.user,
        })
        .await?;
    Ok(Json(ApiResponse::ok(ids)))
}

fn parse_date(date: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid date '{date}', expected YYYY-MM-DD")))
}

fn day_response(listings: DayListings) -> DayListingResponse {
    let groups = listings.groups;
    DayListingResponse {
        date: listings.utcdate,
        count: groups.len(),
        local: groups.local,
        voted: groups.voted,
        other: groups.other,
    }
}
