use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::error::ErrorInfo;

/// Raw device/encoder events, consumed only by the recorder's event pump
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A capture track was ended by the platform (capture revoked)
    TrackEnded { track_id: String },
    /// The encoder failed while running
    EncoderError(String),
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// One channel per recording attempt
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Notifications published to presentation layers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecorderEvent {
    Started { mode: String, mime_type: String },
    Paused { duration_seconds: u64 },
    Resumed,
    /// Capture was ended outside the recorder
    Interrupted,
    Stopped { duration_seconds: u64 },
    Saved { path: PathBuf },
    Pending { file_name: String },
    Warning(ErrorInfo),
    Error(ErrorInfo),
}
