// Persistence against the local disk

use anyhow::Result;
use screen_recorder::encoder::{Artifact, AudioCodecId, MimeType, VideoCodecId};
use screen_recorder::platform::{inspect, SimulatedConfig, SimulatedEncoderFactory, SimulatedPlatform};
use screen_recorder::recorder::{Recorder, RecorderDeps, StopOutcome};
use screen_recorder::settings::{AudioSource, Container, RecordingSettings};
use screen_recorder::state::CaptureMode;
use screen_recorder::storage::{ConversionOutcome, LocalFilesystem, PersistenceFinalizer};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn webm() -> MimeType {
    MimeType::new(Container::Webm, Some(VideoCodecId::Vp9), Some(AudioCodecId::Opus))
}

#[tokio::test]
async fn test_save_creates_missing_directory() -> Result<()> {
    let tmp = TempDir::new()?;
    let fallback = tmp.path().join("Videos");
    let finalizer = PersistenceFinalizer::new(Arc::new(LocalFilesystem::with_default_video_dir(&fallback)), None);

    let target = tmp.path().join("nested").join("recordings");
    let artifact = Artifact::new(b"encoded".to_vec(), webm());
    let saved = finalizer
        .save(&artifact, "ScreenRecording_test.webm", Some(target.as_path()), Container::Webm)
        .await?;

    assert_eq!(saved.path, target.join("ScreenRecording_test.webm"));
    assert!(!saved.used_fallback);
    assert_eq!(saved.conversion, ConversionOutcome::NotRequested);
    assert_eq!(std::fs::read(&saved.path)?, b"encoded");
    assert!(!fallback.exists());
    Ok(())
}

#[tokio::test]
async fn test_unconfigured_directory_uses_default() -> Result<()> {
    let tmp = TempDir::new()?;
    let videos = tmp.path().join("Videos");
    let finalizer = PersistenceFinalizer::new(Arc::new(LocalFilesystem::with_default_video_dir(&videos)), None);

    let artifact = Artifact::new(vec![1, 2, 3], webm());
    let saved = finalizer.save(&artifact, "a.webm", None, Container::Webm).await?;

    assert_eq!(saved.path, videos.join("a.webm"));
    assert!(!saved.used_fallback);
    Ok(())
}

#[tokio::test]
async fn test_directory_under_a_file_is_save_error() -> Result<()> {
    let tmp = TempDir::new()?;
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, b"not a directory")?;
    let videos = tmp.path().join("Videos");
    let finalizer = PersistenceFinalizer::new(Arc::new(LocalFilesystem::with_default_video_dir(&videos)), None);

    let artifact = Artifact::new(vec![0; 16], webm());
    let err = finalizer
        .save(&artifact, "a.webm", Some(blocker.join("sub").as_path()), Container::Webm)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "SAVE_FILE");
    // not a permission failure, so no second attempt
    assert!(!videos.exists());
    Ok(())
}

#[tokio::test]
async fn test_recording_lands_on_disk() -> Result<()> {
    let tmp = TempDir::new()?;
    let recorder = Recorder::new(RecorderDeps {
        platform: Arc::new(SimulatedPlatform::new(SimulatedConfig {
            width: 32,
            height: 18,
            ..Default::default()
        })),
        encoders: Arc::new(SimulatedEncoderFactory::new()),
        filesystem: Arc::new(LocalFilesystem::with_default_video_dir(tmp.path().join("Videos"))),
        converter: None,
    });

    let out = tmp.path().join("out");
    let settings = RecordingSettings {
        audio_source: AudioSource::System,
        save_directory: out.display().to_string(),
        ..Default::default()
    };
    recorder.start(CaptureMode::Fullscreen, settings).await?;
    tokio::time::sleep(Duration::from_millis(600)).await;

    let StopOutcome::Saved(saved) = recorder.stop().await? else {
        panic!("expected the recording to be saved");
    };
    assert!(saved.path.starts_with(&out));
    assert_eq!(saved.path.extension().and_then(|e| e.to_str()), Some("webm"));

    let bytes = std::fs::read(&saved.path)?;
    let summary = inspect(&bytes).expect("simulated encoder output");
    assert_eq!(summary.mime_type, "video/webm;codecs=vp9,opus");
    assert!(summary.video_frames > 0);
    assert!(summary.audio_frames > 0);
    assert!(summary.frame_sizes.contains(&(32, 18)));
    Ok(())
}
