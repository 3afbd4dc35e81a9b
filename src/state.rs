//! Recording session state
//!
//! The authoritative record of status, timing and the last outcome. Only the
//! transition methods below mutate it; the recorder calls them while holding
//! its control lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::time::Instant;

use crate::encoder::{Artifact, MimeType};
use crate::error::ErrorInfo;
use crate::settings::Container;

/// Current state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Recording,
    Paused,
}

/// Bounded screen area for region recordings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Which screen surface is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum CaptureMode {
    #[default]
    Fullscreen,
    Window,
    Region(Region),
}

impl CaptureMode {
    pub fn region(&self) -> Option<Region> {
        match self {
            CaptureMode::Region(region) => Some(*region),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CaptureMode::Fullscreen => "fullscreen",
            CaptureMode::Window => "window",
            CaptureMode::Region(_) => "region",
        }
    }
}

/// An assembled recording kept in memory until the user saves it
#[derive(Debug, Clone)]
pub struct PendingArtifact {
    pub artifact: Artifact,
    /// Suggested file name, extension from the negotiated container
    pub file_name: String,
    /// Directory configured when the recording started
    pub directory: Option<PathBuf>,
    /// Container the user asked for
    pub requested_container: Container,
}

/// Session state owned by the recorder
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Active recording time carried over from segments closed by a pause
    pub accumulated_paused_ms: u64,
    pub mode: CaptureMode,
    pub duration_seconds: u64,
    pub mime_type: Option<MimeType>,
    pub last_output_path: Option<PathBuf>,
    pub last_error: Option<ErrorInfo>,
    pub warnings: Vec<ErrorInfo>,
    pub pending_artifact: Option<PendingArtifact>,
    /// Start of the current active segment
    segment_started: Option<Instant>,
}

impl SessionState {
    /// Idle -> Recording
    pub fn begin(&mut self, mode: CaptureMode, mime_type: MimeType, warnings: Vec<ErrorInfo>) {
        self.status = SessionStatus::Recording;
        self.started_at = Some(Utc::now());
        self.segment_started = Some(Instant::now());
        self.accumulated_paused_ms = 0;
        self.duration_seconds = 0;
        self.mode = mode;
        self.mime_type = Some(mime_type);
        self.last_error = None;
        self.warnings = warnings;
    }

    /// Recording -> Paused, folding the active segment into the carry-over
    pub fn pause(&mut self) -> bool {
        if self.status != SessionStatus::Recording {
            return false;
        }
        if let Some(segment) = self.segment_started.take() {
            self.accumulated_paused_ms += segment.elapsed().as_millis() as u64;
        }
        self.refresh_duration_from(self.accumulated_paused_ms);
        self.status = SessionStatus::Paused;
        true
    }

    /// Paused -> Recording with a fresh segment start
    pub fn resume(&mut self) -> bool {
        if self.status != SessionStatus::Paused {
            return false;
        }
        self.segment_started = Some(Instant::now());
        self.status = SessionStatus::Recording;
        true
    }

    /// Recording/Paused -> Idle, keeping the final duration and outcome fields
    pub fn finish(&mut self) {
        self.status = SessionStatus::Idle;
        self.started_at = None;
        self.segment_started = None;
        self.accumulated_paused_ms = 0;
    }

    /// Elapsed active time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        let current = match (self.status, self.segment_started) {
            (SessionStatus::Recording, Some(segment)) => segment.elapsed().as_millis() as u64,
            _ => 0,
        };
        current + self.accumulated_paused_ms
    }

    /// Recompute `duration_seconds`; a no-op unless recording
    pub fn tick(&mut self) {
        if self.status == SessionStatus::Recording {
            self.refresh_duration_from(self.elapsed_ms());
        }
    }

    fn refresh_duration_from(&mut self, elapsed_ms: u64) {
        self.duration_seconds = self.duration_seconds.max(elapsed_ms / 1000);
    }

    pub fn warn(&mut self, warning: ErrorInfo) {
        self.warnings.push(warning);
    }

    /// Serializable view for presentation layers
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            started_at: self.started_at,
            accumulated_paused_ms: self.accumulated_paused_ms,
            mode: self.mode,
            duration_seconds: self.duration_seconds,
            duration: format_duration(self.duration_seconds),
            mime_type: self.mime_type.as_ref().map(|m| m.to_string()),
            last_output_path: self.last_output_path.clone(),
            last_error: self.last_error.clone(),
            warnings: self.warnings.clone(),
            pending_artifact: self.pending_artifact.as_ref().map(|p| PendingSummary {
                file_name: p.file_name.clone(),
                size_bytes: p.artifact.len(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingSummary {
    pub file_name: String,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub accumulated_paused_ms: u64,
    pub mode: CaptureMode,
    pub duration_seconds: u64,
    /// `duration_seconds` as `HH:MM:SS` / `MM:SS`
    pub duration: String,
    pub mime_type: Option<String>,
    pub last_output_path: Option<PathBuf>,
    pub last_error: Option<ErrorInfo>,
    pub warnings: Vec<ErrorInfo>,
    pub pending_artifact: Option<PendingSummary>,
}

/// Format seconds as `MM:SS`, or `HH:MM:SS` once past the hour
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::MimeType;
    use std::time::Duration;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(75), "01:15");
        assert_eq!(format_duration(3661), "01:01:01");
    }

    #[test]
    fn test_pause_outside_recording_is_rejected() {
        let mut state = SessionState::default();
        assert!(!state.pause());
        assert!(!state.resume());
        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!(state.duration_seconds, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_excludes_paused_interval() {
        let mut state = SessionState::default();
        state.begin(CaptureMode::Fullscreen, MimeType::webm_baseline(), Vec::new());
        assert!(state.started_at.is_some());

        tokio::time::advance(Duration::from_millis(2500)).await;
        assert!(state.pause());
        assert_eq!(state.accumulated_paused_ms, 2500);

        tokio::time::advance(Duration::from_secs(10)).await;
        state.tick();
        assert_eq!(state.duration_seconds, 2);

        assert!(state.resume());
        tokio::time::advance(Duration::from_millis(1600)).await;
        state.tick();
        assert_eq!(state.duration_seconds, 4);

        state.finish();
        assert_eq!(state.status, SessionStatus::Idle);
        assert_eq!(state.duration_seconds, 4);
        assert!(state.started_at.is_none());
    }
}
