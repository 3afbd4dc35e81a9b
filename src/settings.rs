use anyhow::Context;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Which audio sources are mixed into the recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSource {
    None,
    Microphone,
    System,
    Both,
}

impl AudioSource {
    pub fn wants_microphone(self) -> bool {
        matches!(self, AudioSource::Microphone | AudioSource::Both)
    }

    pub fn wants_system(self) -> bool {
        matches!(self, AudioSource::System | AudioSource::Both)
    }
}

/// Video quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    Medium,
    High,
    Custom,
}

/// Bitrate/frame-rate pair a quality preset resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPreset {
    /// Video bitrate in kbps
    pub bitrate_kbps: u32,
    pub frame_rate: u32,
}

impl VideoQuality {
    /// Preset values; `Custom` has no preset and reports the medium values
    pub fn preset(self) -> QualityPreset {
        match self {
            VideoQuality::Low => QualityPreset {
                bitrate_kbps: 2000,
                frame_rate: 15,
            },
            VideoQuality::Medium | VideoQuality::Custom => QualityPreset {
                bitrate_kbps: 5000,
                frame_rate: 30,
            },
            VideoQuality::High => QualityPreset {
                bitrate_kbps: 10000,
                frame_rate: 60,
            },
        }
    }
}

/// Preferred video codec for the WebM container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Vp8,
    Vp9,
}

/// Output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Webm,
    Mp4,
}

impl Container {
    /// The container every platform encoder is expected to speak natively
    pub const DEFAULT: Container = Container::Webm;

    pub fn extension(self) -> &'static str {
        match self {
            Container::Webm => "webm",
            Container::Mp4 => "mp4",
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Container::DEFAULT
    }
}

/// User recording preferences
///
/// Owned by the settings collaborator; the recorder only ever reads a snapshot
/// taken when a recording starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub audio_source: AudioSource,
    pub video_quality: VideoQuality,
    pub frame_rate: u32,
    /// Video bitrate in kbps
    pub video_bitrate: u32,
    /// Audio bitrate in kbps
    pub audio_bitrate: u32,
    pub video_codec: VideoCodec,
    pub file_format: Container,
    /// Empty means the platform default video directory
    pub save_directory: String,
    pub auto_save: bool,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            audio_source: AudioSource::Microphone,
            video_quality: VideoQuality::Medium,
            frame_rate: 30,
            video_bitrate: 5000,
            audio_bitrate: 128,
            video_codec: VideoCodec::Vp9,
            file_format: Container::Webm,
            save_directory: String::new(),
            auto_save: true,
        }
    }
}

impl RecordingSettings {
    /// Switch to `quality`, filling frame rate and bitrate from its preset.
    /// `Custom` keeps the current values.
    pub fn with_quality(mut self, quality: VideoQuality) -> Self {
        self.video_quality = quality;
        if quality != VideoQuality::Custom {
            let preset = quality.preset();
            self.frame_rate = preset.frame_rate;
            self.video_bitrate = preset.bitrate_kbps;
        }
        self
    }

    pub fn configured_directory(&self) -> Option<PathBuf> {
        let trimmed = self.save_directory.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }
}

/// Settings collaborator
#[async_trait::async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Current settings snapshot
    fn load(&self) -> RecordingSettings;

    /// Replace the stored settings
    async fn update(&self, settings: RecordingSettings) -> anyhow::Result<()>;
}

/// In-memory settings store, optionally mirrored to a JSON file
#[derive(Clone)]
pub struct SharedSettings {
    current: Arc<RwLock<RecordingSettings>>,
    persist_path: Option<PathBuf>,
}

impl SharedSettings {
    pub fn new(initial: RecordingSettings) -> Self {
        Self {
            current: Arc::new(RwLock::new(initial)),
            persist_path: None,
        }
    }

    /// Load from `path` when it exists, otherwise start from `fallback`.
    /// Every later update is written back to `path`.
    pub fn with_file(path: impl Into<PathBuf>, fallback: RecordingSettings) -> Self {
        let path = path.into();
        let initial = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<RecordingSettings>(&bytes) {
                Ok(saved) => {
                    info!("Loaded recording settings from {}", path.display());
                    saved
                }
                Err(e) => {
                    warn!("Ignoring unreadable settings file {}: {}", path.display(), e);
                    fallback
                }
            },
            Err(_) => fallback,
        };

        Self {
            current: Arc::new(RwLock::new(initial)),
            persist_path: Some(path),
        }
    }
}

#[async_trait::async_trait]
impl SettingsProvider for SharedSettings {
    fn load(&self) -> RecordingSettings {
        self.current.read().clone()
    }

    async fn update(&self, settings: RecordingSettings) -> anyhow::Result<()> {
        if let Some(path) = &self.persist_path {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::write(path, serde_json::to_vec_pretty(&settings)?)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        *self.current.write() = settings;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_desktop_app() {
        let settings = RecordingSettings::default();
        assert_eq!(settings.audio_source, AudioSource::Microphone);
        assert_eq!(settings.frame_rate, 30);
        assert_eq!(settings.video_bitrate, 5000);
        assert_eq!(settings.audio_bitrate, 128);
        assert_eq!(settings.file_format, Container::Webm);
        assert!(settings.auto_save);
        assert!(settings.configured_directory().is_none());
    }

    #[test]
    fn test_quality_presets() {
        assert_eq!(VideoQuality::Low.preset().frame_rate, 15);
        assert_eq!(VideoQuality::High.preset().bitrate_kbps, 10000);

        let high = RecordingSettings::default().with_quality(VideoQuality::High);
        assert_eq!(high.frame_rate, 60);
        assert_eq!(high.video_bitrate, 10000);

        let custom = RecordingSettings {
            frame_rate: 24,
            video_bitrate: 8000,
            ..Default::default()
        }
        .with_quality(VideoQuality::Custom);
        assert_eq!(custom.video_quality, VideoQuality::Custom);
        assert_eq!(custom.frame_rate, 24);
        assert_eq!(custom.video_bitrate, 8000);
    }

    #[tokio::test]
    async fn test_shared_settings_persist_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = SharedSettings::with_file(&path, RecordingSettings::default());
        let updated = RecordingSettings {
            audio_source: AudioSource::Both,
            ..Default::default()
        };
        store.update(updated.clone()).await.unwrap();

        let reloaded = SharedSettings::with_file(&path, RecordingSettings::default());
        assert_eq!(reloaded.load(), updated);
    }
}
