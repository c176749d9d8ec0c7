//! Route definitions for the Astro-Coffee HTTP API.
//!
//! Routes are mounted under the configured `server.base_path`, or at the
//! root when it is empty.

use axum::routing::{get, post};
use axum::{Router, middleware as axum_middleware};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .merge(health_routes())
        .merge(paper_routes())
        .merge(engagement_routes())
        .merge(author_routes());

    let base_path = state.config.server.base_path.clone();
    let mounted = if base_path.is_empty() {
        routes
    } else {
        Router::new().nest(&base_path, routes)
    };

    // Outermost first.
    let stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .layer(CompressionLayer::new());

    mounted.layer(stack).with_state(state)
}

/// Liveness and pool status
fn health_routes() -> Router<AppState> {
    Router::new().route("/api/health", get(handlers::health::health))
}

/// Archive index and per-day listings
fn paper_routes() -> Router<AppState> {
    Router::new()
        .route("/papers", get(handlers::papers::archive_index))
        .route("/papers/today", get(handlers::papers::today))
        .route("/papers/{date}", get(handlers::papers::by_date))
        .route("/papers/{date}/votes", get(handlers::papers::user_votes))
}

/// Votes, reservations and presenters
fn engagement_routes() -> Router<AppState> {
    Router::new()
        .route("/api/vote", post(handlers::engagement::vote))
        .route("/api/reserve", post(handlers::engagement::reserve))
        .route("/api/present", post(handlers::engagement::present))
}

fn author_routes() -> Router<AppState> {
    Router::new().route("/local-authors", get(handlers::authors::local_authors))
}
