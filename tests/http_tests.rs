// Integration tests for the HTTP control surface

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::rig;
use screen_recorder::http::ErrorResponse;
use screen_recorder::settings::{AudioSource, RecordingSettings, SharedSettings};
use screen_recorder::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app() -> Router {
    let rig = rig().build();
    let settings = SharedSettings::new(RecordingSettings {
        audio_source: AudioSource::None,
        save_directory: "/data/recordings".to_string(),
        ..Default::default()
    });
    create_router(AppState::new(rig.recorder, Arc::new(settings)))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(serde_json::to_vec(&body)?))?,
        None => request.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    Ok((status, value))
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let app = app();
    let (status, body) = call(&app, "GET", "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_recording_lifecycle_over_http() -> Result<()> {
    let app = app();

    let (status, body) = call(&app, "GET", "/recording/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
    assert_eq!(body["duration"], "00:00");

    let (status, body) = call(&app, "POST", "/recording/start", Some(json!({}))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "recording");
    assert_eq!(body["mode"]["kind"], "fullscreen");

    let (status, body) = call(&app, "POST", "/recording/start", Some(json!({}))).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "STATE_INVALID");

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let (_, body) = call(&app, "POST", "/recording/pause", None).await?;
    assert_eq!(body["status"], "paused");
    let (_, body) = call(&app, "POST", "/recording/resume", None).await?;
    assert_eq!(body["status"], "recording");

    let (status, body) = call(&app, "POST", "/recording/stop", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "saved");
    assert!(body["path"].as_str().unwrap().starts_with("/data/recordings/ScreenRecording_"));
    assert_eq!(body["state"]["status"], "idle");
    assert_eq!(body["state"]["duration_seconds"], 2);

    let (_, body) = call(&app, "POST", "/recording/stop", None).await?;
    assert_eq!(body["outcome"], "idle");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_region_start_with_inline_settings() -> Result<()> {
    let app = app();

    let (status, body) = call(
        &app,
        "POST",
        "/recording/start",
        Some(json!({
            "mode": {"kind": "region", "x": 0, "y": 0, "width": 16, "height": 16},
            "settings": {"audio_source": "none", "auto_save": false}
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"]["kind"], "region");
    assert_eq!(body["mode"]["width"], 16);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let (_, body) = call(&app, "POST", "/recording/stop", None).await?;
    assert_eq!(body["outcome"], "pending");
    assert!(body["state"]["pending_artifact"]["size_bytes"].as_u64().unwrap() > 0);

    let (status, body) = call(&app, "POST", "/recording/pending/download", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["path"].as_str().unwrap().ends_with(".webm"));
    assert_eq!(body["state"]["pending_artifact"], Value::Null);

    let (status, body) = call(&app, "POST", "/recording/pending/download", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: ErrorResponse = serde_json::from_value(body)?;
    assert_eq!(error.code, "STATE_INVALID");
    Ok(())
}

#[tokio::test]
async fn test_settings_round_trip() -> Result<()> {
    let app = app();

    let (status, body) = call(&app, "GET", "/settings", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["audio_source"], "none");
    assert_eq!(body["video_quality"], "medium");

    let (status, body) = call(
        &app,
        "PUT",
        "/settings",
        Some(json!({"audio_source": "both", "video_quality": "high", "file_format": "mp4"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["audio_source"], "both");
    // omitted fields fall back to defaults
    assert_eq!(body["audio_bitrate"], 128);
    // a quality change brings its preset along
    assert_eq!(body["frame_rate"], 60);
    assert_eq!(body["video_bitrate"], 10000);

    let (_, body) = call(&app, "GET", "/settings", None).await?;
    assert_eq!(body["file_format"], "mp4");

    // same quality, hand-tuned values are stored as given
    let (_, body) = call(
        &app,
        "PUT",
        "/settings",
        Some(json!({"video_quality": "high", "frame_rate": 24, "video_bitrate": 7000})),
    )
    .await?;
    assert_eq!(body["frame_rate"], 24);
    assert_eq!(body["video_bitrate"], 7000);
    Ok(())
}

#[tokio::test]
async fn test_mime_types_listing() -> Result<()> {
    let app = app();
    let (status, body) = call(&app, "GET", "/encoder/mime-types", None).await?;
    assert_eq!(status, StatusCode::OK);

    let types: Vec<String> = serde_json::from_value(body)?;
    assert_eq!(types.first().map(String::as_str), Some("video/webm;codecs=vp9,opus"));
    assert!(types.iter().all(|t| t.starts_with("video/webm")));
    Ok(())
}
