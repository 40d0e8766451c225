use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all Turtle endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/get", post(handler::get_handler))
        .route("/v1/post", post(handler::post_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
