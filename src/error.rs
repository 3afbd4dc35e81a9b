//! Recorder error taxonomy
//!
//! Every fatal condition the session core can report, with a stable code
//! that presentation layers can match on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the recording session core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    /// Operation not valid in the current session state
    #[error("Invalid state: {0}")]
    StateInvalid(String),

    /// Capture device access refused by the user or platform
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Display capture could not be initialized
    #[error("Failed to initialize media capture: {0}")]
    InitMedia(String),

    /// Audio capture could not be initialized
    #[error("Failed to initialize audio capture: {0}")]
    InitAudio(String),

    /// No encoder configuration is usable for the composed stream
    #[error("Unsupported mime type: {0}")]
    UnsupportedMime(String),

    /// Assembling the encoded output failed
    #[error("Failed to process recording data: {0}")]
    ProcessData(String),

    /// Writing the artifact failed, including the fallback location
    #[error("Failed to save file: {0}")]
    SaveFile(String),
}

impl RecorderError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RecorderError::StateInvalid(_) => "STATE_INVALID",
            RecorderError::PermissionDenied(_) => "PERMISSION_DENIED",
            RecorderError::InitMedia(_) => "INIT_MEDIA",
            RecorderError::InitAudio(_) => "INIT_AUDIO",
            RecorderError::UnsupportedMime(_) => "UNSUPPORTED_MIME",
            RecorderError::ProcessData(_) => "PROCESS_DATA",
            RecorderError::SaveFile(_) => "SAVE_FILE",
        }
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::from(self)
    }
}

/// Serializable error (or warning) record kept in session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&RecorderError> for ErrorInfo {
    fn from(error: &RecorderError) -> Self {
        ErrorInfo {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<RecorderError> for ErrorInfo {
    fn from(error: RecorderError) -> Self {
        ErrorInfo::from(&error)
    }
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(RecorderError::StateInvalid("x".into()).code(), "STATE_INVALID");
        assert_eq!(RecorderError::UnsupportedMime("x".into()).code(), "UNSUPPORTED_MIME");
        assert_eq!(RecorderError::SaveFile("x".into()).code(), "SAVE_FILE");
    }

    #[test]
    fn test_error_info_carries_message() {
        let info = RecorderError::PermissionDenied("screen".into()).info();
        assert_eq!(info.code, "PERMISSION_DENIED");
        assert_eq!(info.message, "Permission denied: screen");
    }
}
