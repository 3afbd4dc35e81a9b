use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Message fragments that identify a permission or scope denial
const PERMISSION_PATTERNS: [&str; 6] = [
    "permission",
    "denied",
    "not allowed",
    "forbidden",
    "scope",
    "not permitted",
];

/// Filesystem collaborator
#[async_trait::async_trait]
pub trait Filesystem: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    async fn mkdir(&self, path: &Path, recursive: bool) -> io::Result<()>;

    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// The platform's default video directory
    fn default_video_dir(&self) -> PathBuf;

    fn join(&self, dir: &Path, name: &str) -> PathBuf {
        dir.join(name)
    }
}

/// Whether a write failure looks like a permission/scope denial
pub fn is_permission_error(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    let message = error.to_string().to_lowercase();
    PERMISSION_PATTERNS.iter().any(|p| message.contains(p))
}

/// Local disk via `tokio::fs`
#[derive(Debug, Clone, Default)]
pub struct LocalFilesystem {
    default_video_dir: Option<PathBuf>,
}

impl LocalFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `dir` instead of the platform's video directory
    pub fn with_default_video_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            default_video_dir: Some(dir.into()),
        }
    }
}

#[async_trait::async_trait]
impl Filesystem for LocalFilesystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> io::Result<()> {
        if recursive {
            tokio::fs::create_dir_all(path).await
        } else {
            tokio::fs::create_dir(path).await
        }
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        debug!("Writing {} bytes to {}", bytes.len(), path.display());
        tokio::fs::write(path, bytes).await
    }

    fn default_video_dir(&self) -> PathBuf {
        if let Some(dir) = &self.default_video_dir {
            return dir.clone();
        }
        dirs::video_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join("Videos")))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_permission_patterns() {
        assert!(is_permission_error(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(is_permission_error(&io::Error::other(
            "forbidden path: /mnt/x, maybe it is not allowed on the scope"
        )));
        assert!(!is_permission_error(&io::Error::other("disk full")));
        assert!(!is_permission_error(&io::Error::from(io::ErrorKind::NotFound)));
    }

    #[tokio::test]
    async fn test_local_filesystem_roundtrip() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::with_default_video_dir(dir.path());
        let nested = fs.join(dir.path(), "a/b");

        assert!(!fs.exists(&nested).await);
        fs.mkdir(&nested, true).await.unwrap();
        assert!(fs.exists(&nested).await);

        let file = fs.join(&nested, "clip.webm");
        fs.write(&file, b"data").await.unwrap();
        assert_eq!(std::fs::read(&file).unwrap(), b"data");
        assert_eq!(fs.default_video_dir(), dir.path());
    }
}
