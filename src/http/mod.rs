//! HTTP control surface
//!
//! REST API mirroring the desktop command set:
//! - POST /recording/start - Start a recording
//! - POST /recording/pause, /recording/resume - Pause and resume
//! - POST /recording/stop - Stop and finalize
//! - GET /recording/status - Session state snapshot
//! - POST /recording/pending/download - Save a recording kept in memory
//! - GET|PUT /settings - Recording preferences
//! - GET /encoder/mime-types - Encoder configurations the platform supports
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::ErrorResponse;
pub use routes::create_router;
pub use state::AppState;
