//! Router assembly.

use crate::handlers::{create_token, health_check, image_fallback, robots_txt};
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the service router.
///
/// Image routes pack dimensions into a single path segment, so they are
/// handled by the fallback instead of a route pattern.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/_health", get(health_check))
        .route("/robots.txt", get(robots_txt))
        .route("/token", post(create_token));

    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .fallback(image_fallback)
        // axum caps request bodies at 2 MB by default, far below an
        // ordinary camera original. Uploads are bounded by config instead.
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
