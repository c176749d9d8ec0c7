use axum::Json;
use axum::extract::State;

use coffee_worker::jobs::LocalAuthorsTask;

use super::ApiResult;
use crate::dto::response::{ApiResponse, LocalAuthorResponse};
use crate::state::AppState;

/// GET /local-authors
pub async fn local_authors(State(state): State<AppState>) -> ApiResult<Vec<LocalAuthorResponse>> {
    let authors = state.pool.run(LocalAuthorsTask).await?;
    Ok(Json(ApiResponse::ok(
        authors.into_iter().map(LocalAuthorResponse::from).collect(),
    )))
}
