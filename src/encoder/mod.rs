//! Encoder binding
//!
//! The platform encoder itself is an external collaborator behind
//! [`EncoderFactory`]/[`MediaEncoder`]. This module negotiates the output
//! configuration, attaches an encoder to the composed stream and starts the
//! chunk collector that buffers its output.

pub mod chunk;
pub mod mime;

pub use chunk::{Artifact, ChunkBuffer, ChunkMetadata, EncodedChunk};
pub use mime::{negotiate, preference_ladder, supported_mime_types, AudioCodecId, MimeType, VideoCodecId};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::RecorderError;
use crate::media::MediaStream;
use crate::recorder::events::EventSender;
use crate::settings::RecordingSettings;

/// How often the encoder hands over a chunk
pub const TIMESLICE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Inactive,
    Recording,
    Paused,
}

/// Encoder configuration derived from settings
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOptions {
    pub mime_type: MimeType,
    pub video_bits_per_second: u64,
    pub audio_bits_per_second: u64,
}

/// A platform encoder attached to one composed stream
#[async_trait::async_trait]
pub trait MediaEncoder: Send {
    fn mime_type(&self) -> MimeType;

    fn state(&self) -> EncoderState;

    /// Begin encoding
    ///
    /// Chunks arrive on the returned receiver roughly every `timeslice`. The
    /// receiver closes once the encoder has finalized after `stop`.
    fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<EncodedChunk>, RecorderError>;

    /// Freeze encoding; frames arriving while paused are dropped
    fn pause(&mut self);

    fn resume(&mut self);

    /// Halt, flush the final chunk and close the output channel
    async fn stop(&mut self) -> Result<(), RecorderError>;
}

/// Encoder platform collaborator
pub trait EncoderFactory: Send + Sync {
    /// Whether `mime` (e.g. `video/webm;codecs=vp9,opus`) can be produced
    fn is_type_supported(&self, mime: &str) -> bool;

    /// Create an encoder for `stream`. Runtime failures are reported on
    /// `events` as `SessionEvent::EncoderError`.
    fn create(
        &self,
        stream: &MediaStream,
        options: &EncoderOptions,
        events: EventSender,
    ) -> Result<Box<dyn MediaEncoder>, RecorderError>;

    fn name(&self) -> &str;
}

/// A started encoder and the task buffering its output
pub struct BoundEncoder {
    pub encoder: Box<dyn MediaEncoder>,
    pub mime_type: MimeType,
    pub collector: JoinHandle<ChunkBuffer>,
}

/// Selects the output configuration and attaches the encoder
#[derive(Clone)]
pub struct EncoderBinder {
    factory: Arc<dyn EncoderFactory>,
}

impl EncoderBinder {
    pub fn new(factory: Arc<dyn EncoderFactory>) -> Self {
        Self { factory }
    }

    pub fn negotiate(&self, settings: &RecordingSettings) -> Result<MimeType, RecorderError> {
        negotiate(settings.file_format, settings.video_codec, |mime| {
            self.factory.is_type_supported(mime)
        })
    }

    pub fn supported_mime_types(&self) -> Vec<MimeType> {
        supported_mime_types(|mime| self.factory.is_type_supported(mime))
    }

    /// Attach an encoder to `stream` and start buffering its output
    pub fn bind(
        &self,
        stream: &MediaStream,
        settings: &RecordingSettings,
        events: EventSender,
    ) -> Result<BoundEncoder, RecorderError> {
        if stream.video_tracks().is_empty() {
            return Err(RecorderError::UnsupportedMime(
                "composed stream has no video track".to_string(),
            ));
        }
        if stream.tracks().iter().any(|t| !t.is_live()) {
            return Err(RecorderError::UnsupportedMime(
                "composed stream contains ended tracks".to_string(),
            ));
        }

        let mime_type = self.negotiate(settings)?;
        let options = EncoderOptions {
            mime_type,
            video_bits_per_second: settings.video_bitrate as u64 * 1000,
            audio_bits_per_second: settings.audio_bitrate as u64 * 1000,
        };

        let mut encoder = self.factory.create(stream, &options, events)?;
        let chunk_rx = encoder.start(TIMESLICE)?;
        let collector = ChunkBuffer::spawn_collector(chunk_rx);

        info!(
            "Encoder {} bound: {} ({} kbps video, {} kbps audio, {} tracks)",
            self.factory.name(),
            mime_type,
            options.video_bits_per_second / 1000,
            options.audio_bits_per_second / 1000,
            stream.tracks().len()
        );

        Ok(BoundEncoder {
            encoder,
            mime_type,
            collector,
        })
    }
}
