use chrono::Utc;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use super::events::{self, EventReceiver, RecorderEvent, SessionEvent};
use super::resources::CaptureResources;
use crate::encoder::{ChunkBuffer, EncoderBinder, EncoderFactory, MimeType};
use crate::error::{ErrorInfo, RecorderError, RecorderResult};
use crate::media::{compose, mix, CaptureAcquirer, CapturePlatform, MediaTrack, MixerConfig, RegionCropper};
use crate::settings::{AudioSource, RecordingSettings};
use crate::state::{CaptureMode, PendingArtifact, SessionSnapshot, SessionState, SessionStatus};
use crate::storage::{
    recording_file_name, ConversionOutcome, Converter, Filesystem, PersistenceFinalizer, SavedRecording,
};

/// Warning code recorded when the container conversion fails
pub const CONVERSION_FAILED: &str = "CONVERSION_FAILED";

const EVENT_CAPACITY: usize = 64;

/// External collaborators the recorder drives
#[derive(Clone)]
pub struct RecorderDeps {
    pub platform: Arc<dyn CapturePlatform>,
    pub encoders: Arc<dyn EncoderFactory>,
    pub filesystem: Arc<dyn Filesystem>,
    pub converter: Option<Arc<dyn Converter>>,
}

/// Result of a `stop` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was recording
    AlreadyIdle,
    Saved(SavedRecording),
    /// Auto-save is off; the artifact waits for `download_pending`
    Pending { file_name: String },
}

/// Resources and settings of the recording in progress
struct ActiveSession {
    attempt: u64,
    resources: CaptureResources,
    settings: RecordingSettings,
    mime_type: MimeType,
}

/// Why a recording is being stopped
enum StopCause {
    Requested,
    TrackEnded(String),
    Encoder(RecorderError),
}

enum Finalized {
    Saved(SavedRecording),
    Pending(PendingArtifact),
}

struct Inner {
    acquirer: CaptureAcquirer,
    binder: EncoderBinder,
    finalizer: PersistenceFinalizer,
    state: Arc<RwLock<SessionState>>,
    /// Serializes start/pause/resume/stop/download_pending
    control: Mutex<Option<ActiveSession>>,
    attempts: AtomicU64,
    events: broadcast::Sender<RecorderEvent>,
}

/// The recording session orchestrator
///
/// Owns the session state and drives capture, mixing, encoding and
/// persistence for one recording at a time. Cloning is cheap and every clone
/// drives the same session.
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<Inner>,
}

impl Recorder {
    pub fn new(deps: RecorderDeps) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!(
            "Recorder created (capture: {}, encoder: {}, converter: {})",
            deps.platform.name(),
            deps.encoders.name(),
            deps.converter.is_some()
        );

        Self {
            inner: Arc::new(Inner {
                acquirer: CaptureAcquirer::new(deps.platform),
                binder: EncoderBinder::new(deps.encoders),
                finalizer: PersistenceFinalizer::new(deps.filesystem, deps.converter),
                state: Arc::new(RwLock::new(SessionState::default())),
                control: Mutex::new(None),
                attempts: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Start a recording of `mode` using a snapshot of `settings`
    ///
    /// Fails with `StateInvalid` if a recording is active or another
    /// transition is in progress. Any other failure releases everything
    /// acquired so far, records `last_error` and leaves the session Idle.
    pub async fn start(&self, mode: CaptureMode, settings: RecordingSettings) -> RecorderResult<()> {
        let mut control = self.inner.control.try_lock().map_err(|_| {
            RecorderError::StateInvalid("another recording transition is in progress".to_string())
        })?;

        let status = self.inner.state.read().status;
        if status != SessionStatus::Idle || control.is_some() {
            warn!("Start rejected, session is {:?}", status);
            return Err(RecorderError::StateInvalid(format!(
                "cannot start a recording while {:?}",
                status
            )));
        }

        let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Starting {} recording (attempt {})", mode.name(), attempt);

        match self.open_session(attempt, mode, &settings).await {
            Ok((mut resources, mime_type, warnings)) => {
                self.inner
                    .state
                    .write()
                    .begin(mode, mime_type, warnings.clone());
                resources.clock.start(Arc::clone(&self.inner.state));

                *control = Some(ActiveSession {
                    attempt,
                    resources,
                    settings,
                    mime_type,
                });

                info!("Recording started: {} as {}", mode.name(), mime_type);
                self.notify(RecorderEvent::Started {
                    mode: mode.name().to_string(),
                    mime_type: mime_type.to_string(),
                });
                for warning in warnings {
                    self.notify(RecorderEvent::Warning(warning));
                }
                Ok(())
            }
            Err(e) => {
                error!("Failed to start recording: {}", e);
                self.inner.state.write().last_error = Some(e.info());
                self.notify(RecorderEvent::Error(e.info()));
                Err(e)
            }
        }
    }

    /// Acquire, compose and bind; resources are released on any error by drop
    async fn open_session(
        &self,
        attempt: u64,
        mode: CaptureMode,
        settings: &RecordingSettings,
    ) -> RecorderResult<(CaptureResources, MimeType, Vec<ErrorInfo>)> {
        let (events_tx, events_rx) = events::channel();
        let mut resources = CaptureResources::new();

                let display = self
            .inner
            .acquirer
            .acquire_display(mode, settings.frame_rate, &events_tx)
            .await?;
        resources.display = Some(display.clone());

        let display_video = display
            .video_tracks()
            .into_iter()
            .next()
            .ok_or_else(|| RecorderError::InitMedia("display capture has no video track".to_string()))?;

        let video: MediaTrack = match mode.region() {
            Some(region) => {
                let cropper = RegionCropper::spawn(&display_video, region)?;
                let track = cropper.track.clone();
                resources.cropper = Some(cropper);
                track
            }
            None => display_video,
        };

        let mut warnings = Vec::new();
        let mut audio: Option<MediaTrack> = None;

        if settings.audio_source != AudioSource::None {
            let acquisition = self
                .inner
                .acquirer
                .acquire_audio(settings.audio_source, &display)
                .await;
            warnings.extend(acquisition.warnings.iter().cloned());
            resources.microphone = acquisition.microphone.clone();

            audio = match (&acquisition.microphone, &acquisition.system) {
                (Some(mic), Some(system)) => {
                    debug!("Mixing {} audio tracks", acquisition.track_count());
                    mix(Some(mic), Some(system), MixerConfig::default()).map(|node| {
                        let track = node.track.clone();
                        resources.mixer = Some(node);
                        track
                    })
                }
                (Some(only), None) | (None, Some(only)) => only.audio_tracks().into_iter().next(),
                (None, None) => {
                    info!("No audio source available, recording video only");
                    None
                }
            };
        }

        let composed = compose(&video, audio.as_ref());
        resources.composed = Some(composed.clone());

        let bound = self
            .inner
            .binder
            .bind(&composed, settings, events_tx.clone())?;
        let mime_type = bound.mime_type;
        resources.attach_encoder(bound.encoder, bound.collector);

        self.spawn_event_pump(attempt, events_rx);

        Ok((resources, mime_type, warnings))
    }

    /// Turn device and encoder events of one attempt into transitions
    fn spawn_event_pump(&self, attempt: u64, mut events_rx: EventReceiver) {
        let recorder = self.clone();
        tokio::spawn(async move {
            if let Some(event) = events_rx.recv().await {
                let cause = match event {
                    SessionEvent::TrackEnded { track_id } => StopCause::TrackEnded(track_id),
                    SessionEvent::EncoderError(message) => {
                        StopCause::Encoder(RecorderError::ProcessData(format!("encoder error: {}", message)))
                    }
                };
                if let Err(e) = recorder.stop_attempt(Some(attempt), cause).await {
                    warn!("Stop after interruption failed: {}", e);
                }
            }
            debug!("Event pump for attempt {} finished", attempt);
        });
    }

    /// Recording -> Paused. A no-op in any other state.
    pub async fn pause(&self) {
        let mut control = self.inner.control.lock().await;
        let Some(active) = control.as_mut() else {
            debug!("Pause ignored, not recording");
            return;
        };
        if self.inner.state.read().status != SessionStatus::Recording {
            debug!("Pause ignored, already paused");
            return;
        }

        active.resources.pause_encoding();
        let duration_seconds = {
            let mut state = self.inner.state.write();
            state.pause();
            state.duration_seconds
        };

        info!("Recording paused at {}s", duration_seconds);
        self.notify(RecorderEvent::Paused { duration_seconds });
    }

    /// Paused -> Recording. A no-op in any other state.
    pub async fn resume(&self) {
        let mut control = self.inner.control.lock().await;
        let Some(active) = control.as_mut() else {
            debug!("Resume ignored, not recording");
            return;
        };
        if self.inner.state.read().status != SessionStatus::Paused {
            debug!("Resume ignored, not paused");
            return;
        }

        active.resources.resume_encoding();
        self.inner.state.write().resume();
        active.resources.clock.start(Arc::clone(&self.inner.state));

        info!("Recording resumed");
        self.notify(RecorderEvent::Resumed);
    }

    /// Finalize the active recording
    ///
    /// Always ends Idle with every capture resource released, whether
    /// persistence succeeds or not. Returns `AlreadyIdle` when nothing is
    /// recording.
    pub async fn stop(&self) -> RecorderResult<StopOutcome> {
        self.stop_attempt(None, StopCause::Requested).await
    }

    /// Stop, optionally only if `attempt` is still the active recording.
    /// The cause is only acted on once the attempt is known to be current.
    async fn stop_attempt(&self, attempt: Option<u64>, cause: StopCause) -> RecorderResult<StopOutcome> {
        let mut control = self.inner.control.lock().await;

        let is_target = match (control.as_ref(), attempt) {
            (None, _) => false,
            (Some(active), Some(attempt)) => active.attempt == attempt,
            (Some(_), None) => true,
        };
        if !is_target {
            debug!("Stop ignored, nothing recording");
            return Ok(StopOutcome::AlreadyIdle);
        }
        let Some(mut active) = control.take() else {
            return Ok(StopOutcome::AlreadyIdle);
        };

        match cause {
            StopCause::Requested => {}
            StopCause::TrackEnded(track_id) => {
                warn!("Capture track {} ended externally, stopping recording", track_id);
                self.notify(RecorderEvent::Interrupted);
            }
            StopCause::Encoder(e) => {
                error!("{}", e);
                self.inner.state.write().last_error = Some(e.info());
                self.notify(RecorderEvent::Error(e.info()));
            }
        }

        // Freeze the duration before waiting on the encoder
        active.resources.clock.stop();
        self.inner.state.write().tick();
        info!("Stopping recording (attempt {})", active.attempt);

        let buffer = active.resources.finish_encoding().await;
        active.resources.release();

        let finalized = match buffer {
            Ok(buffer) => self.finalize(buffer, &active.settings, active.mime_type).await,
            Err(e) => Err(e),
        };

        let duration_seconds = {
            let mut state = self.inner.state.write();
            state.finish();
            state.duration_seconds
        };
        self.notify(RecorderEvent::Stopped { duration_seconds });

        match finalized {
            Ok(Finalized::Saved(saved)) => {
                self.record_saved(&saved);
                Ok(StopOutcome::Saved(saved))
            }
            Ok(Finalized::Pending(pending)) => {
                let file_name = pending.file_name.clone();
                let replaced = self
                    .inner
                    .state
                    .write()
                    .pending_artifact
                    .replace(pending);
                if let Some(old) = replaced {
                    warn!("Discarding unsaved recording {}", old.file_name);
                }
                info!("Recording {} kept in memory until downloaded", file_name);
                self.notify(RecorderEvent::Pending {
                    file_name: file_name.clone(),
                });
                Ok(StopOutcome::Pending { file_name })
            }
            Err(e) => {
                error!("Failed to finalize recording: {}", e);
                self.inner.state.write().last_error = Some(e.info());
                self.notify(RecorderEvent::Error(e.info()));
                Err(e)
            }
        }
    }

    async fn finalize(
        &self,
        buffer: ChunkBuffer,
        settings: &RecordingSettings,
        mime_type: MimeType,
    ) -> RecorderResult<Finalized> {
        let artifact = buffer.assemble(mime_type)?;
        let file_name = recording_file_name(Utc::now(), &mime_type);
        let directory = settings.configured_directory();

        if !settings.auto_save {
            return Ok(Finalized::Pending(PendingArtifact {
                artifact,
                file_name,
                directory,
                requested_container: settings.file_format,
            }));
        }

        let saved = self
            .inner
            .finalizer
            .save(&artifact, &file_name, directory.as_deref(), settings.file_format)
            .await?;
        Ok(Finalized::Saved(saved))
    }

    /// Persist the artifact kept by a stop with auto-save disabled
    pub async fn download_pending(&self) -> RecorderResult<SavedRecording> {
        let _control = self.inner.control.lock().await;

        let pending = self
            .inner
            .state
            .read()
            .pending_artifact
            .clone()
            .ok_or_else(|| RecorderError::StateInvalid("no recording waiting to be saved".to_string()))?;

        let result = self
            .inner
            .finalizer
            .save(
                &pending.artifact,
                &pending.file_name,
                pending.directory.as_deref(),
                pending.requested_container,
            )
            .await;

        match result {
            Ok(saved) => {
                self.inner.state.write().pending_artifact = None;
                self.record_saved(&saved);
                Ok(saved)
            }
            Err(e) => {
                error!("Failed to save pending recording: {}", e);
                self.inner.state.write().last_error = Some(e.info());
                self.notify(RecorderEvent::Error(e.info()));
                Err(e)
            }
        }
    }

    fn record_saved(&self, saved: &SavedRecording) {
        let warning = match &saved.conversion {
            ConversionOutcome::Failed(reason) => Some(ErrorInfo::new(
                CONVERSION_FAILED,
                format!("Conversion failed, kept original recording: {}", reason),
            )),
            _ => None,
        };

        {
            let mut state = self.inner.state.write();
            state.last_output_path = Some(saved.path.clone());
            if let Some(warning) = &warning {
                state.warn(warning.clone());
            }
        }

        if saved.used_fallback {
            info!("Recording saved to fallback location {}", saved.path.display());
        }
        self.notify(RecorderEvent::Saved {
            path: saved.path.clone(),
        });
        if let Some(warning) = warning {
            self.notify(RecorderEvent::Warning(warning));
        }
    }

    /// Copy of the current session state
    pub fn state(&self) -> SessionState {
        self.inner.state.read().clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.read().snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.read().status
    }

    pub fn duration_seconds(&self) -> u64 {
        self.inner.state.read().duration_seconds
    }

    pub fn last_output_path(&self) -> Option<PathBuf> {
        self.inner.state.read().last_output_path.clone()
    }

    /// Mime types the encoder platform can produce, best first
    pub fn supported_mime_types(&self) -> Vec<MimeType> {
        self.inner.binder.supported_mime_types()
    }

    /// Receive lifecycle notifications
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.inner.events.subscribe()
    }

    fn notify(&self, event: RecorderEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }
}
