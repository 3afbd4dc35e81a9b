use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::DurationClock;
use crate::encoder::{ChunkBuffer, MediaEncoder};
use crate::error::RecorderError;
use crate::media::{MediaStream, MixerNode, RegionCropper};

/// Upper bound on waiting for the encoder to hand over its final chunk
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a recording attempt has opened
///
/// Filled in progressively while a recording starts. `release` tears down
/// whatever has been acquired so far and is idempotent; dropping the value
/// releases as well, so an aborted start leaves nothing running.
#[derive(Default)]
pub struct CaptureResources {
    pub display: Option<MediaStream>,
    pub microphone: Option<MediaStream>,
    pub mixer: Option<MixerNode>,
    pub cropper: Option<RegionCropper>,
    pub composed: Option<MediaStream>,
    encoder: Option<Box<dyn MediaEncoder>>,
    collector: Option<JoinHandle<ChunkBuffer>>,
    pub clock: DurationClock,
    released: bool,
}

impl CaptureResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_encoder(&mut self, encoder: Box<dyn MediaEncoder>, collector: JoinHandle<ChunkBuffer>) {
        self.encoder = Some(encoder);
        self.collector = Some(collector);
    }

    pub fn pause_encoding(&mut self) {
        self.clock.stop();
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.pause();
        }
    }

    pub fn resume_encoding(&mut self) {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.resume();
        }
    }

    /// Stop the encoder and wait for the collector to drain its final chunk
    pub async fn finish_encoding(&mut self) -> Result<ChunkBuffer, RecorderError> {
        self.clock.stop();

        let Some(mut encoder) = self.encoder.take() else {
            return Err(RecorderError::ProcessData("no encoder attached".to_string()));
        };
        if let Err(e) = encoder.stop().await {
            warn!("Encoder stop reported an error, using buffered chunks: {}", e);
        }
        drop(encoder);

        let Some(mut collector) = self.collector.take() else {
            return Err(RecorderError::ProcessData("no chunk collector running".to_string()));
        };

        match tokio::time::timeout(FINALIZE_TIMEOUT, &mut collector).await {
            Ok(Ok(buffer)) => {
                debug!(
                    "Encoder finalized: {} chunks, {} bytes",
                    buffer.len(),
                    buffer.total_bytes()
                );
                Ok(buffer)
            }
            Ok(Err(e)) => Err(RecorderError::ProcessData(format!("chunk collector failed: {}", e))),
            Err(_) => {
                collector.abort();
                Err(RecorderError::ProcessData(format!(
                    "encoder did not finalize within {}s",
                    FINALIZE_TIMEOUT.as_secs()
                )))
            }
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop every acquired track and cancel the processing graph
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.clock.stop();
        // Dropping the encoder closes its output; the collector is not needed anymore
        self.encoder = None;
        if let Some(collector) = self.collector.take() {
            collector.abort();
        }
        if let Some(cropper) = self.cropper.take() {
            cropper.stop();
        }
        if let Some(mixer) = self.mixer.take() {
            mixer.stop();
        }

        let mut stopped = 0;
        for stream in [self.composed.take(), self.microphone.take(), self.display.take()]
            .into_iter()
            .flatten()
        {
            stopped += stream.tracks().iter().filter(|t| t.is_live()).count();
            stream.stop_all();
        }

        info!("Capture resources released ({} live tracks stopped)", stopped);
    }
}

impl Drop for CaptureResources {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaTrack, TrackKind, TrackSettings, TrackSource};

    fn track(kind: TrackKind, source: TrackSource) -> MediaTrack {
        MediaTrack::new(kind, source, "test", TrackSettings::default())
    }

    #[tokio::test]
    async fn test_release_stops_every_track_once() {
        let video = track(TrackKind::Video, TrackSource::Display);
        let mic = track(TrackKind::Audio, TrackSource::Microphone);

        let mut resources = CaptureResources::new();
        resources.display = Some(MediaStream::new(vec![video.clone()]));
        resources.microphone = Some(MediaStream::new(vec![mic.clone()]));
        resources.composed = Some(MediaStream::new(vec![video.clone(), mic.clone()]));

        resources.release();
        assert!(resources.is_released());
        assert!(!video.is_live());
        assert!(!mic.is_live());

        // second release is a no-op
        resources.release();
        assert!(resources.is_released());
    }

    #[tokio::test]
    async fn test_drop_releases_partial_acquisition() {
        let video = track(TrackKind::Video, TrackSource::Display);
        {
            let mut resources = CaptureResources::new();
            resources.display = Some(MediaStream::new(vec![video.clone()]));
        }
        assert!(!video.is_live());
    }

    #[tokio::test]
    async fn test_finish_without_encoder_fails() {
        let mut resources = CaptureResources::new();
        let err = resources.finish_encoding().await.unwrap_err();
        assert_eq!(err.code(), "PROCESS_DATA");
    }
}
