use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::stream::{MediaPayload, MediaStream, MediaTrack, TrackKind, TrackSettings, TrackSource, VideoFrame};
use crate::error::RecorderError;
use crate::state::Region;

const BYTES_PER_PIXEL: usize = 4;

/// Build the stream handed to the encoder: the chosen video track plus at
/// most one audio track
pub fn compose(video: &MediaTrack, audio: Option<&MediaTrack>) -> MediaStream {
    let mut composed = MediaStream::new(vec![video.clone()]);
    if let Some(audio) = audio {
        composed.add_track(audio.clone());
    }
    debug!(
        "Composed stream: video={} audio={}",
        video.label(),
        audio.map(|a| a.label()).unwrap_or("none")
    );
    composed
}

/// Frame-composition loop that crops every display frame to a region
pub struct RegionCropper {
    pub track: MediaTrack,
    task: JoinHandle<()>,
}

impl RegionCropper {
    /// Start cropping `display` to `region`
    pub fn spawn(display: &MediaTrack, region: Region) -> Result<Self, RecorderError> {
        if region.width == 0 || region.height == 0 {
            return Err(RecorderError::InitMedia(format!(
                "region {}x{} has no area",
                region.width, region.height
            )));
        }

        let input = display
            .subscribe()
            .ok_or_else(|| RecorderError::InitMedia("display track already ended".to_string()))?;

        let track = MediaTrack::new(
            TrackKind::Video,
            TrackSource::Region,
            format!("region {}x{}+{}+{}", region.width, region.height, region.x, region.y),
            TrackSettings {
                width: Some(region.width),
                height: Some(region.height),
                ..display.settings()
            },
        );

        info!(
            "Region capture: {}x{} at ({}, {})",
            region.width, region.height, region.x, region.y
        );

        let task = tokio::spawn(crop_loop(input, track.clone(), region));
        Ok(Self { track, task })
    }

    pub fn stop(self) {
        self.track.stop();
        self.task.abort();
    }
}

async fn crop_loop(mut input: broadcast::Receiver<MediaPayload>, output: MediaTrack, region: Region) {
    loop {
        match input.recv().await {
            Ok(MediaPayload::Video(frame)) => {
                let Some(cropped) = crop_frame(&frame, region) else {
                    debug!(
                        "Region outside {}x{} frame at {}ms, skipping",
                        frame.width, frame.height, frame.timestamp_ms
                    );
                    continue;
                };
                if !output.push(MediaPayload::Video(cropped)) {
                    return;
                }
            }
            Ok(MediaPayload::Audio(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Region cropper lagged, {} frames skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    output.end();
}

/// Copy the part of `frame` covered by `region`, clamped to the frame bounds
pub fn crop_frame(frame: &VideoFrame, region: Region) -> Option<VideoFrame> {
    if region.x >= frame.width || region.y >= frame.height {
        return None;
    }
    let width = region.width.min(frame.width - region.x) as usize;
    let height = region.height.min(frame.height - region.y) as usize;
    let stride = frame.width as usize * BYTES_PER_PIXEL;
    if frame.data.len() < stride * frame.height as usize {
        return None;
    }

    let mut data = Vec::with_capacity(width * height * BYTES_PER_PIXEL);
    for row in 0..height {
        let start = (region.y as usize + row) * stride + region.x as usize * BYTES_PER_PIXEL;
        data.extend_from_slice(&frame.data[start..start + width * BYTES_PER_PIXEL]);
    }

    Some(VideoFrame {
        width: width as u32,
        height: height as u32,
        timestamp_ms: frame.timestamp_ms,
        data,
    })
}
