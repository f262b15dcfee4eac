//! Route configuration.

use crate::handlers;
use crate::metrics::{metrics_handler, register_metrics};
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Health check (unauthenticated for load balancers)
        .route("/health", get(handlers::health_check))
        .route(
            "/v1/logs",
            get(handlers::get_logs).post(handlers::post_logs_v1),
        )
        .route(
            "/v2/logs",
            get(handlers::get_logs).post(handlers::post_logs_v2),
        )
        .route("/v1/log_upload_url", get(handlers::get_log_upload_url))
        // Upload bodies are streamed to storage, so form uploads are not capped.
        .layer(DefaultBodyLimit::disable());

    // When enabled, /metrics should be reachable by the scraper only.
    if state.config.server.metrics_enabled {
        register_metrics();
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
