pub mod capture;
pub mod compose;
pub mod mixer;
pub mod stream;

pub use capture::{
    AudioAcquisition, AudioConstraints, CaptureAcquirer, CaptureError, CapturePlatform, DisplayConstraints,
    DisplaySurface,
};
pub use compose::{compose, crop_frame, RegionCropper};
pub use mixer::{mix, AudioMixer, MixerConfig, MixerNode};
pub use stream::{
    AudioFrame, AudioStreamSource, MediaPayload, MediaStream, MediaTrack, TrackKind, TrackSettings, TrackSource,
    VideoFrame,
};
