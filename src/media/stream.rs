use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Frames buffered per subscriber before a slow consumer starts lagging
const TRACK_BUFFER_FRAMES: usize = 256;

/// Audio stream source type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioStreamSource {
    /// System audio (applications, browser, etc.)
    System,
    /// Microphone input
    Microphone,
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
    /// Audio stream source (system or microphone)
    pub source: AudioStreamSource,
}

/// A single raw video frame (RGBA8, row-major, no padding)
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum MediaPayload {
    Video(VideoFrame),
    Audio(AudioFrame),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Where a track's media comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Display,
    SystemAudio,
    Microphone,
    /// Output of the audio mixing node
    Mixed,
    /// Output of the region cropping loop
    Region,
}

/// Properties the platform actually delivered (may differ from the request)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackSettings {
    pub frame_rate: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

type EndObserver = Box<dyn FnOnce() + Send>;

struct TrackInner {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    label: String,
    settings: TrackSettings,
    tx: Mutex<Option<broadcast::Sender<MediaPayload>>>,
    ended: AtomicBool,
    end_observers: Mutex<Vec<EndObserver>>,
}

/// A live media track
///
/// Cloning shares the same underlying track. The producer side pushes frames
/// with [`MediaTrack::push`]; consumers call [`MediaTrack::subscribe`].
/// Once a track is stopped or ended, subscribers drain what was buffered and
/// then see the channel close.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, source: TrackSource, label: impl Into<String>, settings: TrackSettings) -> Self {
        let (tx, _) = broadcast::channel(TRACK_BUFFER_FRAMES);
        Self {
            inner: Arc::new(TrackInner {
                id: uuid::Uuid::new_v4().to_string(),
                kind,
                source,
                label: label.into(),
                settings,
                tx: Mutex::new(Some(tx)),
                ended: AtomicBool::new(false),
                end_observers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn settings(&self) -> TrackSettings {
        self.inner.settings
    }

    pub fn is_live(&self) -> bool {
        !self.inner.ended.load(Ordering::SeqCst)
    }

    /// Receive frames pushed from now on; `None` once the track is over
    pub fn subscribe(&self) -> Option<broadcast::Receiver<MediaPayload>> {
        self.inner.tx.lock().as_ref().map(|tx| tx.subscribe())
    }

    /// Publish a frame. Returns `false` when the track is no longer live and
    /// the producer should stop.
    pub fn push(&self, payload: MediaPayload) -> bool {
        match self.inner.tx.lock().as_ref() {
            Some(tx) => {
                // No subscribers is fine, frames are simply not observed
                let _ = tx.send(payload);
                true
            }
            None => false,
        }
    }

    /// Register a callback fired when the producer ends the track
    /// (e.g. the user revoked capture outside the application)
    pub fn on_ended(&self, observer: impl FnOnce() + Send + 'static) {
        if self.is_live() {
            self.inner.end_observers.lock().push(Box::new(observer));
        }
    }

    /// Consumer-side release. Does not fire the end observers.
    pub fn stop(&self) {
        if self.close() {
            debug!("Stopped track {} ({})", self.inner.label, self.inner.id);
        }
        self.inner.end_observers.lock().clear();
    }

    /// Producer-side end of stream. Fires the end observers once.
    pub fn end(&self) {
        if !self.close() {
            return;
        }
        debug!("Track {} ended by producer", self.inner.label);
        let observers: Vec<EndObserver> = std::mem::take(&mut *self.inner.end_observers.lock());
        for observer in observers {
            observer();
        }
    }

    fn close(&self) -> bool {
        if self.inner.ended.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.tx.lock().take();
        true
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("source", &self.inner.source)
            .field("label", &self.inner.label)
            .field("live", &self.is_live())
            .finish()
    }
}

/// An ordered set of tracks
#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Audio)
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn add_track(&mut self, track: MediaTrack) {
        self.tracks.push(track);
    }

    /// Stop every track in the stream
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == kind).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn audio_frame(ts: u64) -> MediaPayload {
        MediaPayload::Audio(AudioFrame {
            samples: vec![1, 2],
            sample_rate: 48000,
            channels: 2,
            timestamp_ms: ts,
            source: AudioStreamSource::Microphone,
        })
    }

    #[tokio::test]
    async fn test_subscriber_sees_close_after_stop() {
        let track = MediaTrack::new(TrackKind::Audio, TrackSource::Microphone, "mic", TrackSettings::default());
        let mut rx = track.subscribe().unwrap();

        assert!(track.push(audio_frame(0)));
        track.stop();
        assert!(!track.push(audio_frame(10)));

        assert!(rx.recv().await.is_ok());
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Closed)));
        assert!(track.subscribe().is_none());
    }

    #[test]
    fn test_end_fires_observers_once_but_stop_does_not() {
        let fired = Arc::new(AtomicUsize::new(0));

        let ended = MediaTrack::new(TrackKind::Video, TrackSource::Display, "screen", TrackSettings::default());
        let counter = Arc::clone(&fired);
        ended.on_ended(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        ended.end();
        ended.end();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let stopped = MediaTrack::new(TrackKind::Video, TrackSource::Display, "screen", TrackSettings::default());
        let counter = Arc::clone(&fired);
        stopped.on_ended(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        stopped.stop();
        stopped.end();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stream_filters_by_kind() {
        let video = MediaTrack::new(TrackKind::Video, TrackSource::Display, "screen", TrackSettings::default());
        let audio = MediaTrack::new(TrackKind::Audio, TrackSource::SystemAudio, "system", TrackSettings::default());
        let stream = MediaStream::new(vec![video, audio]);

        assert_eq!(stream.video_tracks().len(), 1);
        assert_eq!(stream.audio_tracks().len(), 1);
        assert!(stream.has_audio());

        stream.stop_all();
        assert!(stream.tracks().iter().all(|t| !t.is_live()));
    }
}
