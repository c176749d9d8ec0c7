//! Request handlers.

pub mod authors;
pub mod engagement;
pub mod health;
pub mod papers;

use axum::Json;

use crate::dto::response::ApiResponse;
use crate::error::ApiError;

/// Result type returned by JSON handlers.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;
