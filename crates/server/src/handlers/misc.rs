//! Health and robots endpoints.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// GET /_health - liveness for load balancers.
///
/// Intentionally unauthenticated. Reports the durable store's health as
/// observed by the background probe.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.liveness.healthy() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "No database connection")
    }
}

/// GET /robots.txt
pub async fn robots_txt(State(state): State<AppState>) -> impl IntoResponse {
    let body = if state.config.server.allow_indexing {
        "User-Agent: *\nAllow: /\n"
    } else {
        "User-Agent: *\nDisallow: /\n"
    };
    ([("content-type", "text/plain")], body)
}
