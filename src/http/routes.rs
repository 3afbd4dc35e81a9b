use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/recording/start", post(handlers::start_recording))
        .route("/recording/pause", post(handlers::pause_recording))
        .route("/recording/resume", post(handlers::resume_recording))
        .route("/recording/stop", post(handlers::stop_recording))
        .route("/recording/status", get(handlers::recording_status))
        .route("/recording/pending/download", post(handlers::download_pending))
        // Preferences and capabilities
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .route("/encoder/mime-types", get(handlers::mime_types))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
