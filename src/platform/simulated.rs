//! In-process capture and encoder platform
//!
//! Produces a synthetic display (a moving bar test pattern), a system audio
//! tone and a microphone tone, and an encoder that serializes a compact
//! record per frame. Used by the demo binary and the test suite; device
//! behavior (denied, unavailable, no system audio) is configurable so every
//! failure path can be exercised without real hardware.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::encoder::mime::KNOWN_MIME_TYPES;
use crate::encoder::{EncodedChunk, EncoderFactory, EncoderOptions, EncoderState, MediaEncoder, MimeType};
use crate::error::RecorderError;
use crate::media::capture::{MICROPHONE_CHANNELS, MICROPHONE_SAMPLE_RATE};
use crate::media::{
    AudioConstraints, AudioFrame, AudioStreamSource, CaptureError, CapturePlatform, DisplayConstraints,
    MediaPayload, MediaStream, MediaTrack, TrackKind, TrackSettings, TrackSource, VideoFrame,
};
use crate::recorder::events::{EventSender, SessionEvent};
use crate::settings::Container;

/// Audio is produced in 20ms frames
const AUDIO_FRAME_MS: u64 = 20;
const HEADER_MAGIC: &[u8] = b"SIMENC1\n";

/// How a simulated device answers a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceBehavior {
    #[default]
    Available,
    /// The user refuses access
    Denied,
    /// No such device
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    pub width: u32,
    pub height: u32,
    /// Frame rate the display actually delivers; 0 honors the request
    pub delivered_frame_rate: u32,
    pub display: DeviceBehavior,
    pub microphone: DeviceBehavior,
    /// Whether the display capture can deliver system audio
    pub system_audio: bool,
    /// Whether system audio can be requested together with the display
    pub combined_audio: bool,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            width: 160,
            height: 90,
            delivered_frame_rate: 0,
            display: DeviceBehavior::Available,
            microphone: DeviceBehavior::Available,
            system_audio: true,
            combined_audio: true,
        }
    }
}

/// Synthetic capture devices
#[derive(Debug, Default)]
pub struct SimulatedPlatform {
    config: SimulatedConfig,
    /// Every track handed out, for revocation and leak checks
    tracks: Mutex<Vec<MediaTrack>>,
    display_requests: Mutex<Vec<DisplayConstraints>>,
    microphone_requests: Mutex<Vec<AudioConstraints>>,
}

impl SimulatedPlatform {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &SimulatedConfig {
        &self.config
    }

    /// End every live display track from the producer side, as when the user
    /// dismisses the platform's sharing indicator
    pub fn revoke(&self) {
        let tracks: Vec<MediaTrack> = self
            .tracks
            .lock()
            .iter()
            .filter(|t| t.source() == TrackSource::Display && t.is_live())
            .cloned()
            .collect();
        info!("Revoking {} display track(s)", tracks.len());
        for track in tracks {
            track.end();
        }
    }

    /// Tracks handed out that nobody has stopped yet
    pub fn live_tracks(&self) -> usize {
        self.tracks.lock().iter().filter(|t| t.is_live()).count()
    }

    pub fn display_requests(&self) -> Vec<DisplayConstraints> {
        self.display_requests.lock().clone()
    }

    pub fn microphone_requests(&self) -> Vec<AudioConstraints> {
        self.microphone_requests.lock().clone()
    }

    fn remember(&self, track: &MediaTrack) {
        self.tracks.lock().push(track.clone());
    }
}

#[async_trait::async_trait]
impl CapturePlatform for SimulatedPlatform {
    fn supports_combined_audio(&self) -> bool {
        self.config.combined_audio
    }

    async fn request_display_capture(
        &self,
        constraints: DisplayConstraints,
    ) -> Result<MediaStream, CaptureError> {
        self.display_requests.lock().push(constraints.clone());

        match self.config.display {
            DeviceBehavior::Denied => {
                return Err(CaptureError::PermissionDenied(
                    "user dismissed the screen picker".to_string(),
                ))
            }
            DeviceBehavior::Unavailable => {
                return Err(CaptureError::Other("no display available".to_string()))
            }
            DeviceBehavior::Available => {}
        }

        let fps = match self.config.delivered_frame_rate {
            0 => constraints.ideal_frame_rate.max(1),
            delivered => delivered,
        };
        let video = MediaTrack::new(
            TrackKind::Video,
            TrackSource::Display,
            format!("{:?} {}x{}", constraints.surface, self.config.width, self.config.height),
            TrackSettings {
                frame_rate: Some(fps as f64),
                width: Some(self.config.width),
                height: Some(self.config.height),
                ..Default::default()
            },
        );
        self.remember(&video);
        spawn_video_producer(video.clone(), self.config.width, self.config.height, fps);
        let mut stream = MediaStream::new(vec![video]);

        if constraints.audio.is_some() && self.config.system_audio {
            let audio = audio_track(TrackSource::SystemAudio, "system audio");
            self.remember(&audio);
            spawn_tone_producer(audio.clone(), AudioStreamSource::System, 440.0);
            stream.add_track(audio);
        }

        debug!("Simulated display capture: {} tracks at {} fps", stream.tracks().len(), fps);
        Ok(stream)
    }

    async fn request_microphone(&self, constraints: AudioConstraints) -> Result<MediaStream, CaptureError> {
        self.microphone_requests.lock().push(constraints);

        match self.config.microphone {
            DeviceBehavior::Denied => Err(CaptureError::PermissionDenied(
                "microphone access denied".to_string(),
            )),
            DeviceBehavior::Unavailable => Err(CaptureError::Other("no microphone found".to_string())),
            DeviceBehavior::Available => {
                let track = audio_track(TrackSource::Microphone, "microphone");
                self.remember(&track);
                spawn_tone_producer(track.clone(), AudioStreamSource::Microphone, 220.0);
                Ok(MediaStream::new(vec![track]))
            }
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

fn audio_track(source: TrackSource, label: &str) -> MediaTrack {
    MediaTrack::new(
        TrackKind::Audio,
        source,
        label,
        TrackSettings {
            sample_rate: Some(MICROPHONE_SAMPLE_RATE),
            channels: Some(MICROPHONE_CHANNELS),
            ..Default::default()
        },
    )
}

/// Time between frames; never zero, which `interval` rejects
fn frame_period(fps: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(fps.max(1))).max(Duration::from_millis(1))
}

fn spawn_video_producer(track: MediaTrack, width: u32, height: u32, fps: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(frame_period(fps));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();
        loop {
            interval.tick().await;
            let timestamp_ms = started.elapsed().as_millis() as u64;
            if !track.push(MediaPayload::Video(test_pattern(width, height, timestamp_ms))) {
                break;
            }
        }
    })
}

fn spawn_tone_producer(track: MediaTrack, source: AudioStreamSource, frequency: f32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(AUDIO_FRAME_MS));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let frames_per_chunk = (MICROPHONE_SAMPLE_RATE as u64 * AUDIO_FRAME_MS / 1000) as usize;
        let mut phase = 0usize;
        let mut timestamp_ms = 0u64;
        loop {
            interval.tick().await;
            let samples = tone(frequency, phase, frames_per_chunk);
            phase += frames_per_chunk;
            let frame = AudioFrame {
                samples,
                sample_rate: MICROPHONE_SAMPLE_RATE,
                channels: MICROPHONE_CHANNELS,
                timestamp_ms,
                source,
            };
            timestamp_ms += AUDIO_FRAME_MS;
            if !track.push(MediaPayload::Audio(frame)) {
                break;
            }
        }
    })
}

/// Interleaved stereo sine at a quarter of full scale
fn tone(frequency: f32, start: usize, frames: usize) -> Vec<i16> {
    let amplitude = i16::MAX as f32 / 4.0;
    let mut samples = Vec::with_capacity(frames * MICROPHONE_CHANNELS as usize);
    for n in start..start + frames {
        let t = n as f32 / MICROPHONE_SAMPLE_RATE as f32;
        let value = (amplitude * (2.0 * PI * frequency * t).sin()) as i16;
        for _ in 0..MICROPHONE_CHANNELS {
            samples.push(value);
        }
    }
    samples
}

/// Vertical white bar sweeping across a dark frame
fn test_pattern(width: u32, height: u32, timestamp_ms: u64) -> VideoFrame {
    let bar = (timestamp_ms / 10 % width.max(1) as u64) as u32;
    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for _y in 0..height {
        for x in 0..width {
            let v = if x == bar { 255 } else { 32 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
    }
    VideoFrame {
        width,
        height,
        timestamp_ms,
        data,
    }
}

/// Encoder platform producing the simulated record format
#[derive(Debug, Clone)]
pub struct SimulatedEncoderFactory {
    supported: Vec<String>,
    fail_after_chunks: Option<usize>,
    created: Arc<AtomicUsize>,
    requested: Arc<Mutex<Vec<EncoderOptions>>>,
}

impl Default for SimulatedEncoderFactory {
    fn default() -> Self {
        Self::supporting(
            KNOWN_MIME_TYPES
                .iter()
                .filter(|m| m.container == Container::Webm)
                .map(|m| m.to_string()),
        )
    }
}

impl SimulatedEncoderFactory {
    /// Supports every WebM configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supporting<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: types.into_iter().map(Into::into).collect(),
            fail_after_chunks: None,
            created: Arc::new(AtomicUsize::new(0)),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Encoders report a runtime error after emitting `chunks` chunks
    pub fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after_chunks = Some(chunks);
        self
    }

    /// Number of encoders created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Options of every encoder created so far, oldest first
    pub fn requested_options(&self) -> Vec<EncoderOptions> {
        self.requested.lock().clone()
    }
}

impl EncoderFactory for SimulatedEncoderFactory {
    fn is_type_supported(&self, mime: &str) -> bool {
        self.supported.iter().any(|s| s == mime)
    }

    fn create(
        &self,
        stream: &MediaStream,
        options: &EncoderOptions,
        events: EventSender,
    ) -> Result<Box<dyn MediaEncoder>, RecorderError> {
        let mime = options.mime_type.to_string();
        if !self.is_type_supported(&mime) {
            return Err(RecorderError::UnsupportedMime(format!("{} not supported", mime)));
        }

        let inputs = stream
            .tracks()
            .iter()
            .filter_map(|t| t.subscribe())
            .collect::<Vec<_>>();
        if inputs.is_empty() {
            return Err(RecorderError::UnsupportedMime(
                "stream has no live tracks to encode".to_string(),
            ));
        }

        self.created.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push(options.clone());
        let (state, _) = watch::channel(EncoderState::Inactive);
        Ok(Box::new(SimulatedEncoder {
            mime_type: options.mime_type,
            inputs,
            state,
            stop_tx: None,
            task: None,
            forwarders: Vec::new(),
            events,
            fail_after_chunks: self.fail_after_chunks,
        }))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

pub struct SimulatedEncoder {
    mime_type: MimeType,
    inputs: Vec<broadcast::Receiver<MediaPayload>>,
    state: watch::Sender<EncoderState>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    forwarders: Vec<JoinHandle<()>>,
    events: EventSender,
    fail_after_chunks: Option<usize>,
}

#[async_trait::async_trait]
impl MediaEncoder for SimulatedEncoder {
    fn mime_type(&self) -> MimeType {
        self.mime_type
    }

    fn state(&self) -> EncoderState {
        *self.state.borrow()
    }

    fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<EncodedChunk>, RecorderError> {
        if self.task.is_some() {
            return Err(RecorderError::ProcessData("encoder already started".to_string()));
        }

        let (frame_tx, frame_rx) = mpsc::channel(512);
        for input in self.inputs.drain(..) {
            self.forwarders.push(tokio::spawn(forward_frames(input, frame_tx.clone())));
        }
        drop(frame_tx);

        let (chunk_tx, chunk_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = oneshot::channel();
        let mut header = HEADER_MAGIC.to_vec();
        header.extend_from_slice(self.mime_type.to_string().as_bytes());
        header.push(b'\n');

        self.state.send_replace(EncoderState::Recording);
        self.task = Some(tokio::spawn(encode_loop(EncodeLoop {
            frames: frame_rx,
            chunks: chunk_tx,
            state: self.state.subscribe(),
            stop: stop_rx,
            timeslice,
            header,
            events: self.events.clone(),
            fail_after_chunks: self.fail_after_chunks,
        })));
        self.stop_tx = Some(stop_tx);
        Ok(chunk_rx)
    }

    fn pause(&mut self) {
        if self.state() == EncoderState::Recording {
            self.state.send_replace(EncoderState::Paused);
        }
    }

    fn resume(&mut self) {
        if self.state() == EncoderState::Paused {
            self.state.send_replace(EncoderState::Recording);
        }
    }

    async fn stop(&mut self) -> Result<(), RecorderError> {
        self.state.send_replace(EncoderState::Inactive);
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| RecorderError::ProcessData(format!("encoder task failed: {}", e))),
            None => Ok(()),
        }
    }
}

impl Drop for SimulatedEncoder {
    fn drop(&mut self) {
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn forward_frames(mut input: broadcast::Receiver<MediaPayload>, output: mpsc::Sender<MediaPayload>) {
    loop {
        match input.recv().await {
            Ok(payload) => {
                if output.send(payload).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Encoder input lagged, {} frames dropped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

struct EncodeLoop {
    frames: mpsc::Receiver<MediaPayload>,
    chunks: mpsc::Sender<EncodedChunk>,
    state: watch::Receiver<EncoderState>,
    stop: oneshot::Receiver<()>,
    timeslice: Duration,
    header: Vec<u8>,
    events: EventSender,
    fail_after_chunks: Option<usize>,
}

async fn encode_loop(mut ctx: EncodeLoop) {
    let started = Instant::now();
    let mut pending = std::mem::take(&mut ctx.header);
    let mut emitted = 0usize;
    let mut inputs_open = true;
    let mut ticker = tokio::time::interval_at(Instant::now() + ctx.timeslice, ctx.timeslice);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut ctx.stop => break,
            _ = ticker.tick() => {
                if pending.is_empty() {
                    continue;
                }
                let chunk = EncodedChunk {
                    data: std::mem::take(&mut pending),
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                if ctx.chunks.send(chunk).await.is_err() {
                    return;
                }
                emitted += 1;
                if ctx.fail_after_chunks == Some(emitted) {
                    let _ = ctx.events.send(SessionEvent::EncoderError(format!(
                        "simulated encoder failure after {} chunks",
                        emitted
                    )));
                }
            }
            frame = ctx.frames.recv(), if inputs_open => match frame {
                Some(payload) if *ctx.state.borrow() == EncoderState::Recording => {
                    write_record(&mut pending, &payload);
                }
                Some(_) => {}
                None => inputs_open = false,
            },
        }
    }

    if !pending.is_empty() {
        let flushed = ctx
            .chunks
            .send(EncodedChunk {
                data: pending,
                timestamp_ms: started.elapsed().as_millis() as u64,
            })
            .await;
        if flushed.is_ok() {
            emitted += 1;
        }
    }
    debug!("Simulated encoder finished after {} chunks", emitted);
}

const VIDEO_RECORD: u8 = b'V';
const AUDIO_RECORD: u8 = b'A';
const VIDEO_RECORD_LEN: usize = 1 + 8 + 4 + 4 + 4;
const AUDIO_RECORD_LEN: usize = 1 + 8 + 4 + 2;

fn write_record(out: &mut Vec<u8>, payload: &MediaPayload) {
    match payload {
        MediaPayload::Video(frame) => {
            let checksum = frame.data.iter().fold(0u32, |acc, b| acc.wrapping_add(*b as u32));
            out.push(VIDEO_RECORD);
            out.extend_from_slice(&frame.timestamp_ms.to_le_bytes());
            out.extend_from_slice(&frame.width.to_le_bytes());
            out.extend_from_slice(&frame.height.to_le_bytes());
            out.extend_from_slice(&checksum.to_le_bytes());
        }
        MediaPayload::Audio(frame) => {
            let peak = frame.samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
            out.push(AUDIO_RECORD);
            out.extend_from_slice(&frame.timestamp_ms.to_le_bytes());
            out.extend_from_slice(&(frame.samples.len() as u32).to_le_bytes());
            out.extend_from_slice(&peak.to_le_bytes());
        }
    }
}

/// What a simulated recording contains
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingSummary {
    pub mime_type: String,
    pub video_frames: usize,
    pub audio_frames: usize,
    pub frame_sizes: HashSet<(u32, u32)>,
    /// Loudest audio sample seen
    pub audio_peak: u16,
}

/// Parse an artifact produced by [`SimulatedEncoder`]
pub fn inspect(bytes: &[u8]) -> Option<RecordingSummary> {
    let rest = bytes.strip_prefix(HEADER_MAGIC)?;
    let newline = rest.iter().position(|b| *b == b'\n')?;
    let mut summary = RecordingSummary {
        mime_type: String::from_utf8_lossy(&rest[..newline]).into_owned(),
        ..Default::default()
    };

    let mut records = &rest[newline + 1..];
    while let Some(kind) = records.first() {
        match *kind {
            VIDEO_RECORD if records.len() >= VIDEO_RECORD_LEN => {
                let width = u32::from_le_bytes(records[9..13].try_into().ok()?);
                let height = u32::from_le_bytes(records[13..17].try_into().ok()?);
                summary.video_frames += 1;
                summary.frame_sizes.insert((width, height));
                records = &records[VIDEO_RECORD_LEN..];
            }
            AUDIO_RECORD if records.len() >= AUDIO_RECORD_LEN => {
                let peak = u16::from_le_bytes(records[13..15].try_into().ok()?);
                summary.audio_frames += 1;
                summary.audio_peak = summary.audio_peak.max(peak);
                records = &records[AUDIO_RECORD_LEN..];
            }
            _ => return None,
        }
    }
    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_period_is_never_zero() {
        assert_eq!(frame_period(30), Duration::from_micros(33_333));
        assert_eq!(frame_period(0), Duration::from_secs(1));
        assert_eq!(frame_period(5000), Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_denied_display_is_permission_error() {
        let platform = SimulatedPlatform::new(SimulatedConfig {
            display: DeviceBehavior::Denied,
            ..Default::default()
        });
        let constraints = DisplayConstraints {
            surface: crate::media::DisplaySurface::Monitor,
            ideal_frame_rate: 30,
            max_frame_rate: 30,
            cursor_always: true,
            audio: None,
        };
        let err = platform.request_display_capture(constraints).await.unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied(_)));
        assert_eq!(platform.display_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_ends_display_tracks_from_producer_side() {
        let platform = SimulatedPlatform::default();
        let constraints = DisplayConstraints {
            surface: crate::media::DisplaySurface::Monitor,
            ideal_frame_rate: 10,
            max_frame_rate: 10,
            cursor_always: true,
            audio: Some(AudioConstraints::unprocessed()),
        };
        let stream = platform.request_display_capture(constraints).await.unwrap();
        assert_eq!(stream.tracks().len(), 2);

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        stream.video_tracks()[0].on_ended(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        platform.revoke();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // the system audio track stays live until the consumer stops it
        assert_eq!(platform.live_tracks(), 1);
    }

    #[test]
    fn test_tone_is_interleaved_stereo() {
        let samples = tone(440.0, 0, 960);
        assert_eq!(samples.len(), 1920);
        assert_eq!(samples[0], samples[1]);
        assert!(samples.iter().any(|s| *s != 0));
    }

    #[test]
    fn test_inspect_reads_records() {
        let mut bytes = HEADER_MAGIC.to_vec();
        bytes.extend_from_slice(b"video/webm;codecs=vp9,opus\n");
        write_record(&mut bytes, &MediaPayload::Video(test_pattern(8, 4, 0)));
        write_record(
            &mut bytes,
            &MediaPayload::Audio(AudioFrame {
                samples: vec![100, -3000, 20],
                sample_rate: 48000,
                channels: 1,
                timestamp_ms: 20,
                source: AudioStreamSource::Microphone,
            }),
        );

        let summary = inspect(&bytes).unwrap();
        assert_eq!(summary.mime_type, "video/webm;codecs=vp9,opus");
        assert_eq!(summary.video_frames, 1);
        assert_eq!(summary.audio_frames, 1);
        assert!(summary.frame_sizes.contains(&(8, 4)));
        assert_eq!(summary.audio_peak, 3000);
    }

    #[test]
    fn test_inspect_rejects_foreign_bytes() {
        assert!(inspect(b"RIFF....WAVE").is_none());
    }

    #[test]
    fn test_default_factory_supports_webm_only() {
        let factory = SimulatedEncoderFactory::new();
        assert!(factory.is_type_supported("video/webm;codecs=vp9,opus"));
        assert!(factory.is_type_supported("video/webm"));
        assert!(!factory.is_type_supported("video/mp4"));
    }
}
