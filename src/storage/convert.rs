use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::settings::Container;

/// Out-of-process container converter
#[async_trait::async_trait]
pub trait Converter: Send + Sync {
    /// Convert `input` into `output` using the `target` container
    async fn convert(&self, input: &Path, output: &Path, target: Container) -> Result<()>;
}

/// Converter backed by the `ffmpeg` executable
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    program: PathBuf,
    /// Remove the source file after a successful conversion
    remove_source: bool,
}

impl Default for FfmpegConverter {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            remove_source: true,
        }
    }
}

impl FfmpegConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn keep_source(mut self) -> Self {
        self.remove_source = false;
        self
    }

    fn codec_args(target: Container) -> &'static [&'static str] {
        match target {
            Container::Mp4 => &[
                "-c:v", "libx264", // H.264 video
                "-c:a", "aac", // AAC audio
                "-preset", "fast",
                "-crf", "23",
                "-movflags", "+faststart", // Web playback
            ],
            Container::Webm => &["-c:v", "libvpx-vp9", "-c:a", "libopus"],
        }
    }
}

#[async_trait::async_trait]
impl Converter for FfmpegConverter {
    async fn convert(&self, input: &Path, output: &Path, target: Container) -> Result<()> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            bail!("input file does not exist: {}", input.display());
        }

        info!("Converting {} to {}", input.display(), output.display());

        let result = Command::new(&self.program)
            .arg("-i")
            .arg(input)
            .args(Self::codec_args(target))
            .arg("-y")
            .arg(output)
            .output()
            .await;

        let result = match result {
            Ok(result) => result,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail!(
                    "{} is not installed or not on PATH; install FFmpeg to enable {} conversion",
                    self.program.display(),
                    target.extension()
                )
            }
            Err(e) => return Err(e).context("failed to run ffmpeg"),
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            error!("FFmpeg conversion failed: {}", stderr);
            bail!("ffmpeg exited with {}: {}", result.status, stderr.trim());
        }

        info!("FFmpeg conversion finished");

        if self.remove_source {
            if let Err(e) = tokio::fs::remove_file(input).await {
                warn!("Failed to remove intermediate file {}: {}", input.display(), e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_input_fails() {
        let dir = TempDir::new().unwrap();
        let converter = FfmpegConverter::default();
        let err = converter
            .convert(&dir.path().join("missing.webm"), &dir.path().join("out.mp4"), Container::Mp4)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_missing_program_fails_without_touching_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.webm");
        std::fs::write(&input, b"webm").unwrap();

        let converter = FfmpegConverter::new(dir.path().join("no-such-ffmpeg"));
        assert!(converter
            .convert(&input, &dir.path().join("out.mp4"), Container::Mp4)
            .await
            .is_err());
        assert!(input.exists());
    }
}
