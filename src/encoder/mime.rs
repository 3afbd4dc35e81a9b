//! Mime/codec negotiation
//!
//! Walks a fixed preference ladder per container and picks the first entry the
//! platform encoder supports.

use std::fmt;

use crate::error::RecorderError;
use crate::settings::{Container, VideoCodec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodecId {
    Vp9,
    Vp8,
    Avc1,
}

impl VideoCodecId {
    fn as_str(self) -> &'static str {
        match self {
            VideoCodecId::Vp9 => "vp9",
            VideoCodecId::Vp8 => "vp8",
            VideoCodecId::Avc1 => "avc1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodecId {
    Opus,
    Mp4a,
}

impl AudioCodecId {
    fn as_str(self) -> &'static str {
        match self {
            AudioCodecId::Opus => "opus",
            AudioCodecId::Mp4a => "mp4a",
        }
    }
}

/// An encoder output configuration, e.g. `video/webm;codecs=vp9,opus`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MimeType {
    pub container: Container,
    pub video: Option<VideoCodecId>,
    pub audio: Option<AudioCodecId>,
}

impl MimeType {
    pub const fn new(container: Container, video: Option<VideoCodecId>, audio: Option<AudioCodecId>) -> Self {
        Self { container, video, audio }
    }

    /// `video/webm` without codec parameters
    pub const fn webm_baseline() -> Self {
        Self::new(Container::Webm, None, None)
    }

    pub fn essence(&self) -> &'static str {
        match self.container {
            Container::Webm => "video/webm",
            Container::Mp4 => "video/mp4",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.container.extension()
    }

    pub fn has_audio_codec(&self) -> bool {
        self.audio.is_some()
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.essence())?;
        let codecs: Vec<&str> = self
            .video
            .map(VideoCodecId::as_str)
            .into_iter()
            .chain(self.audio.map(AudioCodecId::as_str))
            .collect();
        if !codecs.is_empty() {
            write!(f, ";codecs={}", codecs.join(","))?;
        }
        Ok(())
    }
}

/// Every configuration the recorder knows how to ask for
pub const KNOWN_MIME_TYPES: [MimeType; 8] = [
    MimeType::new(Container::Webm, Some(VideoCodecId::Vp9), Some(AudioCodecId::Opus)),
    MimeType::new(Container::Webm, Some(VideoCodecId::Vp8), Some(AudioCodecId::Opus)),
    MimeType::new(Container::Webm, Some(VideoCodecId::Vp9), None),
    MimeType::new(Container::Webm, Some(VideoCodecId::Vp8), None),
    MimeType::webm_baseline(),
    MimeType::new(Container::Mp4, Some(VideoCodecId::Avc1), Some(AudioCodecId::Mp4a)),
    MimeType::new(Container::Mp4, Some(VideoCodecId::Avc1), None),
    MimeType::new(Container::Mp4, None, None),
];

/// Preference ladder for one container, most capable first
pub fn preference_ladder(container: Container, codec: VideoCodec) -> Vec<MimeType> {
    match container {
        Container::Webm => {
            let preferred = match codec {
                VideoCodec::Vp9 => VideoCodecId::Vp9,
                VideoCodec::Vp8 => VideoCodecId::Vp8,
            };
            vec![
                MimeType::new(Container::Webm, Some(preferred), Some(AudioCodecId::Opus)),
                MimeType::new(Container::Webm, Some(VideoCodecId::Vp9), None),
                MimeType::new(Container::Webm, Some(VideoCodecId::Vp8), None),
                MimeType::webm_baseline(),
            ]
        }
        Container::Mp4 => vec![
            MimeType::new(Container::Mp4, Some(VideoCodecId::Avc1), Some(AudioCodecId::Mp4a)),
            MimeType::new(Container::Mp4, Some(VideoCodecId::Avc1), None),
            MimeType::new(Container::Mp4, None, None),
        ],
    }
}

/// Pick the encoder configuration
///
/// The requested container's ladder is tried first; if nothing on it is
/// supported the default container's ladder is used. Deterministic for a
/// given capability set.
pub fn negotiate<F>(container: Container, codec: VideoCodec, is_supported: F) -> Result<MimeType, RecorderError>
where
    F: Fn(&str) -> bool,
{
    let mut candidates = preference_ladder(container, codec);
    if container != Container::DEFAULT {
        candidates.extend(preference_ladder(Container::DEFAULT, codec));
    }

    candidates
        .into_iter()
        .find(|mime| is_supported(&mime.to_string()))
        .ok_or_else(|| {
            RecorderError::UnsupportedMime(format!(
                "no supported encoder configuration for {} ({:?})",
                container.extension(),
                codec
            ))
        })
}

/// Known configurations the platform supports, in preference order
pub fn supported_mime_types<F>(is_supported: F) -> Vec<MimeType>
where
    F: Fn(&str) -> bool,
{
    KNOWN_MIME_TYPES
        .iter()
        .copied()
        .filter(|mime| is_supported(&mime.to_string()))
        .collect()
}
