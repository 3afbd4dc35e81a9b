use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::stream::{MediaStream, TrackKind};
use crate::error::{ErrorInfo, RecorderError};
use crate::recorder::events::{EventSender, SessionEvent};
use crate::settings::AudioSource;
use crate::state::CaptureMode;

/// Microphone sample rate requested from the platform
pub const MICROPHONE_SAMPLE_RATE: u32 = 48000;
/// Microphone channel count requested from the platform
pub const MICROPHONE_CHANNELS: u16 = 2;

/// Warning code used when system audio was requested but not delivered
pub const SYSTEM_AUDIO_UNAVAILABLE: &str = "SYSTEM_AUDIO_UNAVAILABLE";

/// Audio processing constraints passed to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u16>,
}

impl AudioConstraints {
    /// Unprocessed capture: recording fidelity over call-quality heuristics
    pub fn unprocessed() -> Self {
        Self {
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
            sample_rate: None,
            channel_count: None,
        }
    }

    pub fn microphone() -> Self {
        Self {
            sample_rate: Some(MICROPHONE_SAMPLE_RATE),
            channel_count: Some(MICROPHONE_CHANNELS),
            ..Self::unprocessed()
        }
    }
}

/// Which surface the platform picker should offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplaySurface {
    Monitor,
    Window,
}

/// Display capture request
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConstraints {
    pub surface: DisplaySurface,
    pub ideal_frame_rate: u32,
    pub max_frame_rate: u32,
    pub cursor_always: bool,
    /// Ask for system audio in the same request
    pub audio: Option<AudioConstraints>,
}

/// Failure reported by the capture platform
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Other(String),
}

/// Capture platform collaborator
///
/// Implementations wrap the OS capture APIs (portal, ScreenCaptureKit,
/// Graphics Capture). The simulated platform in `platform::simulated` is used
/// for tests and the demo binary.
#[async_trait::async_trait]
pub trait CapturePlatform: Send + Sync {
    /// Whether display capture can carry system audio in the same request
    fn supports_combined_audio(&self) -> bool;

    /// Ask the user/platform for a display (and optionally system audio) stream
    async fn request_display_capture(
        &self,
        constraints: DisplayConstraints,
    ) -> Result<MediaStream, CaptureError>;

    /// Ask for a microphone stream
    async fn request_microphone(&self, constraints: AudioConstraints) -> Result<MediaStream, CaptureError>;

    /// Get platform name for logging
    fn name(&self) -> &str;
}

/// Audio streams gathered for a recording
#[derive(Debug, Default)]
pub struct AudioAcquisition {
    /// Microphone stream, owned by the session and released with it
    pub microphone: Option<MediaStream>,
    /// Audio tracks borrowed from the display capture
    pub system: Option<MediaStream>,
    /// Soft failures encountered while acquiring audio
    pub warnings: Vec<ErrorInfo>,
}

/// Opens capture devices through the platform collaborator
#[derive(Clone)]
pub struct CaptureAcquirer {
    platform: Arc<dyn CapturePlatform>,
}

impl CaptureAcquirer {
    pub fn new(platform: Arc<dyn CapturePlatform>) -> Self {
        Self { platform }
    }

    /// Open the display capture for `mode`
    ///
    /// The end of the display video track (the user dismissing the platform's
    /// capture indicator) is reported on `events` as `SessionEvent::TrackEnded`.
    pub async fn acquire_display(
        &self,
        mode: CaptureMode,
        frame_rate: u32,
        events: &EventSender,
    ) -> Result<MediaStream, RecorderError> {
        // Region recordings crop the full screen and never carry system audio
        let audio = match mode {
            CaptureMode::Region(_) => None,
            _ if self.platform.supports_combined_audio() => Some(AudioConstraints::unprocessed()),
            _ => None,
        };

        let constraints = DisplayConstraints {
            surface: match mode {
                CaptureMode::Window => DisplaySurface::Window,
                _ => DisplaySurface::Monitor,
            },
            ideal_frame_rate: frame_rate,
            max_frame_rate: frame_rate,
            cursor_always: true,
            audio,
        };

        info!(
            "Requesting {} display capture from {} ({} fps, system audio: {})",
            mode.name(),
            self.platform.name(),
            frame_rate,
            constraints.audio.is_some()
        );

        let stream = self
            .platform
            .request_display_capture(constraints)
            .await
            .map_err(|e| match e {
                CaptureError::PermissionDenied(msg) => RecorderError::PermissionDenied(msg),
                CaptureError::Other(msg) => RecorderError::InitMedia(msg),
            })?;

        let video_tracks = stream.video_tracks();
        let Some(video) = video_tracks.first() else {
            stream.stop_all();
            return Err(RecorderError::InitMedia(
                "display capture returned no video track".to_string(),
            ));
        };

        if let Some(actual) = video.settings().frame_rate {
            if (actual - frame_rate as f64).abs() > f64::EPSILON {
                debug!(
                    "Display delivers {:.1} fps (requested {}), continuing",
                    actual, frame_rate
                );
            }
        }

        let tx = events.clone();
        let track_id = video.id().to_string();
        video.on_ended(move || {
            let _ = tx.send(SessionEvent::TrackEnded { track_id });
        });

        Ok(stream)
    }

    /// Gather the audio sources selected in settings
    ///
    /// Audio problems never abort a recording: they degrade it to video-only
    /// and are reported as warnings.
    pub async fn acquire_audio(&self, source: AudioSource, display: &MediaStream) -> AudioAcquisition {
        let mut acquisition = AudioAcquisition::default();

        if source.wants_microphone() {
            match self.platform.request_microphone(AudioConstraints::microphone()).await {
                Ok(stream) if stream.has_audio() => {
                    info!("Microphone acquired ({} audio tracks)", stream.audio_tracks().len());
                    acquisition.microphone = Some(stream);
                }
                Ok(stream) => {
                    stream.stop_all();
                    let error = RecorderError::InitAudio("microphone stream has no audio track".to_string());
                    warn!("{}", error);
                    acquisition.warnings.push(error.info());
                }
                Err(e) => {
                    let error = match e {
                        CaptureError::PermissionDenied(msg) => RecorderError::PermissionDenied(msg),
                        CaptureError::Other(msg) => RecorderError::InitAudio(msg),
                    };
                    warn!("Microphone unavailable, continuing without it: {}", error);
                    acquisition.warnings.push(error.info());
                }
            }
        }

        if source.wants_system() {
            let tracks = display.audio_tracks();
            if tracks.is_empty() {
                warn!("System audio not available on the display capture");
                acquisition.warnings.push(ErrorInfo::new(
                    SYSTEM_AUDIO_UNAVAILABLE,
                    "System audio capture failed: share system audio in the capture dialog",
                ));
            } else {
                debug!("Using {} system audio track(s) from display capture", tracks.len());
                acquisition.system = Some(MediaStream::new(tracks));
            }
        }

        acquisition
    }
}

impl AudioAcquisition {
    /// Number of audio tracks across all acquired sources
    pub fn track_count(&self) -> usize {
        [&self.microphone, &self.system]
            .iter()
            .filter_map(|s| s.as_ref())
            .map(|s| s.tracks().iter().filter(|t| t.kind() == TrackKind::Audio).count())
            .sum()
    }
}
