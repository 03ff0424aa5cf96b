use axum::middleware as axum_middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::infra::AppState;
use crate::middleware::extract_requester;

/// The oBIX URL space is effectively unbounded (spec §4.1: any path the
/// Object Tree resolves), so unlike the teacher's versioned `/api/v1`
/// router this mounts one wildcard route per verb plus the root itself,
/// and lets the dispatcher decide what exists.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::get))
        .route(
            "/{*path}",
            get(handlers::get).put(handlers::put).post(handlers::post),
        )
        .layer(axum_middleware::from_fn(extract_requester))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
