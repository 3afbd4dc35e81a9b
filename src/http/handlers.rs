use super::state::AppState;
use crate::error::RecorderError;
use crate::recorder::StopOutcome;
use crate::settings::RecordingSettings;
use crate::state::{CaptureMode, SessionSnapshot};
use crate::storage::{ConversionOutcome, SavedRecording};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartRecordingRequest {
    /// Capture mode (default: fullscreen)
    pub mode: CaptureMode,

    /// Settings for this recording only; the stored settings otherwise
    pub settings: Option<RecordingSettings>,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    /// "saved", "pending" or "idle"
    pub outcome: &'static str,
    pub path: Option<PathBuf>,
    pub file_name: Option<String>,
    pub state: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct SavedResponse {
    pub path: PathBuf,
    pub used_fallback: bool,
    pub converted: bool,
    pub state: SessionSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// A recorder error rendered as `{code, message}`
pub struct ApiError(RecorderError);

impl From<RecorderError> for ApiError {
    fn from(error: RecorderError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RecorderError::StateInvalid(_) => StatusCode::CONFLICT,
            RecorderError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            RecorderError::UnsupportedMime(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RecorderError::InitMedia(_) | RecorderError::InitAudio(_) => StatusCode::SERVICE_UNAVAILABLE,
            RecorderError::ProcessData(_) | RecorderError::SaveFile(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

fn saved_response(saved: SavedRecording, state: SessionSnapshot) -> SavedResponse {
    SavedResponse {
        path: saved.path,
        used_fallback: saved.used_fallback,
        converted: saved.conversion == ConversionOutcome::Converted,
        state,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recording/start
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRecordingRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let settings = req.settings.unwrap_or_else(|| state.settings.load());
    info!("Start requested: {} recording", req.mode.name());

    state.recorder.start(req.mode, settings).await?;
    Ok(Json(state.recorder.snapshot()))
}

/// POST /recording/pause
pub async fn pause_recording(State(state): State<AppState>) -> Json<SessionSnapshot> {
    state.recorder.pause().await;
    Json(state.recorder.snapshot())
}

/// POST /recording/resume
pub async fn resume_recording(State(state): State<AppState>) -> Json<SessionSnapshot> {
    state.recorder.resume().await;
    Json(state.recorder.snapshot())
}

/// POST /recording/stop
pub async fn stop_recording(State(state): State<AppState>) -> Result<Json<StopRecordingResponse>, ApiError> {
    let outcome = state.recorder.stop().await?;
    let snapshot = state.recorder.snapshot();

    let response = match outcome {
        StopOutcome::Saved(saved) => StopRecordingResponse {
            outcome: "saved",
            path: Some(saved.path),
            file_name: None,
            state: snapshot,
        },
        StopOutcome::Pending { file_name } => StopRecordingResponse {
            outcome: "pending",
            path: None,
            file_name: Some(file_name),
            state: snapshot,
        },
        StopOutcome::AlreadyIdle => StopRecordingResponse {
            outcome: "idle",
            path: None,
            file_name: None,
            state: snapshot,
        },
    };
    Ok(Json(response))
}

/// GET /recording/status
pub async fn recording_status(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.recorder.snapshot())
}

/// POST /recording/pending/download
pub async fn download_pending(State(state): State<AppState>) -> Result<Json<SavedResponse>, ApiError> {
    let saved = state.recorder.download_pending().await?;
    Ok(Json(saved_response(saved, state.recorder.snapshot())))
}

/// GET /settings
pub async fn get_settings(State(state): State<AppState>) -> Json<RecordingSettings> {
    Json(state.settings.load())
}

/// PUT /settings
pub async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<RecordingSettings>,
) -> impl IntoResponse {
    // A quality change fills frame rate and bitrate from the preset
    let quality = settings.video_quality;
    let settings = if quality != state.settings.load().video_quality {
        settings.with_quality(quality)
    } else {
        settings
    };

    match state.settings.update(settings).await {
        Ok(()) => (StatusCode::OK, Json(state.settings.load())).into_response(),
        Err(e) => {
            error!("Failed to store settings: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    code: "SETTINGS_WRITE".to_string(),
                    message: format!("Failed to store settings: {:#}", e),
                }),
            )
                .into_response()
        }
    }
}

/// GET /encoder/mime-types
pub async fn mime_types(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(
        state
            .recorder
            .supported_mime_types()
            .iter()
            .map(|m| m.to_string())
            .collect(),
    )
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
