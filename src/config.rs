use anyhow::{Context, Result};
use serde::Deserialize;

use crate::platform::SimulatedConfig;
use crate::settings::RecordingSettings;

/// Prefix for environment overrides, e.g. `SCREEN_RECORDER__SERVICE__HTTP__PORT`
const ENV_PREFIX: &str = "SCREEN_RECORDER";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    /// Initial recording settings
    #[serde(default)]
    pub recording: RecordingSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// JSON file the settings are persisted to
    pub settings_file: Option<String>,
    /// Overrides the platform default video directory
    pub default_video_dir: Option<String>,
    /// ffmpeg executable used for container conversion; unset disables it
    pub ffmpeg: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub simulated: SimulatedConfig,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Parse a TOML document, without environment overrides
    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::DeviceBehavior;
    use crate::settings::{AudioSource, VideoQuality};

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = Config::from_toml(
            r#"
            [service]
            name = "screen-recorder"
            [service.http]
            bind = "127.0.0.1"
            port = 3030
            "#,
        )
        .unwrap();

        assert_eq!(cfg.http_addr(), "127.0.0.1:3030");
        assert_eq!(cfg.recording, RecordingSettings::default());
        assert!(cfg.storage.ffmpeg.is_none());
        assert_eq!(cfg.platform.simulated, SimulatedConfig::default());
    }

    #[test]
    fn test_sections_override_defaults() {
        let cfg = Config::from_toml(
            r#"
            [service]
            name = "screen-recorder"
            [service.http]
            bind = "0.0.0.0"
            port = 8080

            [recording]
            audio_source = "both"
            video_quality = "high"
            auto_save = false

            [storage]
            ffmpeg = "/usr/bin/ffmpeg"

            [platform.simulated]
            microphone = "denied"
            system_audio = false
            "#,
        )
        .unwrap();

        assert_eq!(cfg.recording.audio_source, AudioSource::Both);
        assert_eq!(cfg.recording.video_quality, VideoQuality::High);
        assert!(!cfg.recording.auto_save);
        // unspecified fields keep their defaults
        assert_eq!(cfg.recording.audio_bitrate, 128);
        assert_eq!(cfg.storage.ffmpeg.as_deref(), Some("/usr/bin/ffmpeg"));
        assert_eq!(cfg.platform.simulated.microphone, DeviceBehavior::Denied);
        assert!(!cfg.platform.simulated.system_audio);
        assert_eq!(cfg.platform.simulated.width, 160);
    }
}
