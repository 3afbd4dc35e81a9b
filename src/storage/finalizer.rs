use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::convert::Converter;
use super::fs::{is_permission_error, Filesystem};
use crate::encoder::{Artifact, MimeType};
use crate::error::RecorderError;
use crate::settings::Container;

const FILE_PREFIX: &str = "ScreenRecording_";

/// `ScreenRecording_<YYYY-MM-DD_HH-MM-SS>.<ext>` with the extension taken from
/// the negotiated encoder output
pub fn recording_file_name(at: DateTime<Utc>, mime_type: &MimeType) -> String {
    format!(
        "{}{}.{}",
        FILE_PREFIX,
        at.format("%Y-%m-%d_%H-%M-%S"),
        mime_type.extension()
    )
}

/// Result of the best-effort directory creation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryOutcome {
    Existing,
    Created,
    /// Creation failed; the write is still attempted
    Failed(String),
}

/// What happened to the optional container conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    NotRequested,
    Converted,
    /// Conversion failed and the original artifact path was kept
    Failed(String),
}

/// Where the artifact ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedRecording {
    pub path: PathBuf,
    /// Written to the default video directory after a permission failure
    pub used_fallback: bool,
    pub conversion: ConversionOutcome,
}

/// Writes finished recordings to storage
#[derive(Clone)]
pub struct PersistenceFinalizer {
    fs: Arc<dyn Filesystem>,
    converter: Option<Arc<dyn Converter>>,
}

impl PersistenceFinalizer {
    pub fn new(fs: Arc<dyn Filesystem>, converter: Option<Arc<dyn Converter>>) -> Self {
        Self { fs, converter }
    }

    /// Configured directory, or the platform default video directory
    pub fn resolve_directory(&self, configured: Option<&Path>) -> PathBuf {
        match configured {
            Some(dir) => dir.to_path_buf(),
            None => self.fs.default_video_dir(),
        }
    }

    /// Create `dir` recursively if it is missing. Never fails.
    pub async fn ensure_directory(&self, dir: &Path) -> DirectoryOutcome {
        if self.fs.exists(dir).await {
            return DirectoryOutcome::Existing;
        }
        match self.fs.mkdir(dir, true).await {
            Ok(()) => {
                debug!("Created directory {}", dir.display());
                DirectoryOutcome::Created
            }
            Err(e) => DirectoryOutcome::Failed(e.to_string()),
        }
    }

    /// Persist `artifact` as `file_name`
    ///
    /// A permission/scope failure in the configured directory is retried once
    /// in the default video directory; only that second failure is returned.
    /// When `requested` differs from the artifact's container the file is
    /// handed to the converter, whose failure keeps the original path.
    pub async fn save(
        &self,
        artifact: &Artifact,
        file_name: &str,
        configured: Option<&Path>,
        requested: Container,
    ) -> Result<SavedRecording, RecorderError> {
        let directory = self.resolve_directory(configured);
        let default_dir = self.fs.default_video_dir();

        let (path, used_fallback) = match self.write_into(&directory, file_name, artifact).await {
            Ok(path) => (path, false),
            Err(e) if is_permission_error(&e) && directory != default_dir => {
                warn!(
                    "No permission to write to {} ({}), falling back to {}",
                    directory.display(),
                    e,
                    default_dir.display()
                );
                let path = self
                    .write_into(&default_dir, file_name, artifact)
                    .await
                    .map_err(|e| {
                        RecorderError::SaveFile(format!(
                            "fallback write to {} failed: {}",
                            default_dir.display(),
                            e
                        ))
                    })?;
                (path, true)
            }
            Err(e) => {
                return Err(RecorderError::SaveFile(format!(
                    "write to {} failed: {}",
                    directory.display(),
                    e
                )))
            }
        };

        info!("Recording saved to {} ({} bytes)", path.display(), artifact.len());

        let (path, conversion) = self.maybe_convert(path, artifact.mime_type(), requested).await;

        Ok(SavedRecording {
            path,
            used_fallback,
            conversion,
        })
    }

    async fn write_into(&self, dir: &Path, file_name: &str, artifact: &Artifact) -> io::Result<PathBuf> {
        if let DirectoryOutcome::Failed(reason) = self.ensure_directory(dir).await {
            warn!("Could not create {}: {}", dir.display(), reason);
        }
        let path = self.fs.join(dir, file_name);
        self.fs.write(&path, artifact.bytes()).await?;
        Ok(path)
    }

    async fn maybe_convert(
        &self,
        path: PathBuf,
        produced: MimeType,
        requested: Container,
    ) -> (PathBuf, ConversionOutcome) {
        if produced.container == requested {
            return (path, ConversionOutcome::NotRequested);
        }
        let Some(converter) = &self.converter else {
            debug!(
                "{} requested but encoder produced {}, no converter configured",
                requested.extension(),
                produced
            );
            return (path, ConversionOutcome::NotRequested);
        };

        let output = path.with_extension(requested.extension());
        match converter.convert(&path, &output, requested).await {
            Ok(()) => (output, ConversionOutcome::Converted),
            Err(e) => {
                warn!("Conversion to {} failed, keeping {}: {:#}", requested.extension(), path.display(), e);
                (path, ConversionOutcome::Failed(format!("{:#}", e)))
            }
        }
    }
}
