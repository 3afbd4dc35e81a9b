// Real-time audio mixer for combining system audio and microphone streams
//
// Each input track is forwarded into a single channel, tagged with its
// source. The mixer buffers frames per source, pairs them up by arrival
// order, and mixes the samples together using simple addition with clipping.
// The result is published as one audio track that the encoder consumes.

use anyhow::Result;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::capture::{MICROPHONE_CHANNELS, MICROPHONE_SAMPLE_RATE};
use super::stream::{
    AudioFrame, AudioStreamSource, MediaPayload, MediaStream, MediaTrack, TrackKind, TrackSettings, TrackSource,
};

/// Configuration for audio mixer
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Sample rate of inputs and output
    pub sample_rate: u32,
    /// Number of channels of inputs and output
    pub channels: u16,
    /// Maximum buffering delay in milliseconds (default: 200ms)
    /// A source lagging further than this behind the other is mixed alone
    pub max_buffer_delay_ms: u64,
    /// Sources to include in the mix
    pub enabled_sources: HashSet<AudioStreamSource>,
}

impl Default for MixerConfig {
    fn default() -> Self {
        let mut enabled_sources = HashSet::new();
        enabled_sources.insert(AudioStreamSource::System);
        enabled_sources.insert(AudioStreamSource::Microphone);

        Self {
            sample_rate: MICROPHONE_SAMPLE_RATE,
            channels: MICROPHONE_CHANNELS,
            max_buffer_delay_ms: 200,
            enabled_sources,
        }
    }
}

/// A running mixing node
pub struct MixerNode {
    /// The mixed output track
    pub track: MediaTrack,
    tasks: Vec<JoinHandle<()>>,
}

impl MixerNode {
    /// Tear down the node: ends the output track and cancels the graph tasks
    pub fn stop(self) {
        self.track.stop();
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Route the audio of both streams into one mixing node
///
/// Inputs without an audio track are skipped. Returns `None` when neither
/// input carries audio.
pub fn mix(
    microphone: Option<&MediaStream>,
    system: Option<&MediaStream>,
    config: MixerConfig,
) -> Option<MixerNode> {
    let mut inputs = Vec::new();
    for (source, stream) in [
        (AudioStreamSource::Microphone, microphone),
        (AudioStreamSource::System, system),
    ] {
        match stream {
            Some(stream) if stream.has_audio() => {
                for track in stream.audio_tracks() {
                    inputs.push((source, track));
                }
            }
            _ => debug!("Mixer input {:?} has no audio track, skipping", source),
        }
    }

    if inputs.is_empty() {
        return None;
    }

    Some(AudioMixer::new(config).spawn(inputs))
}

/// Audio mixer that combines multiple audio streams
pub struct AudioMixer {
    config: MixerConfig,
    /// Buffers for each connected audio source
    buffers: HashMap<AudioStreamSource, VecDeque<AudioFrame>>,
    current_position_ms: u64,
    latest_timestamp_ms: u64,
}

impl AudioMixer {
    pub fn new(config: MixerConfig) -> Self {
        info!(
            "Audio mixer initialized: {}Hz, {} channels, {} enabled sources",
            config.sample_rate,
            config.channels,
            config.enabled_sources.len()
        );

        Self {
            config,
            buffers: HashMap::new(),
            current_position_ms: 0,
            latest_timestamp_ms: 0,
        }
    }

    /// Start the node for the given input tracks
    pub fn spawn(mut self, inputs: Vec<(AudioStreamSource, MediaTrack)>) -> MixerNode {
        let output = MediaTrack::new(
            TrackKind::Audio,
            TrackSource::Mixed,
            "mixed audio",
            TrackSettings {
                sample_rate: Some(self.config.sample_rate),
                channels: Some(self.config.channels),
                ..Default::default()
            },
        );

        let (tx, rx) = mpsc::channel(100);
        let mut tasks = Vec::new();

        for (source, track) in inputs {
            if !self.config.enabled_sources.contains(&source) {
                debug!("Skipping disabled mixer source {:?}", source);
                continue;
            }
            let Some(input_rx) = track.subscribe() else {
                debug!("Mixer input {} already ended", track.label());
                continue;
            };
            self.buffers.entry(source).or_default();
            tasks.push(tokio::spawn(forward_input(source, input_rx, tx.clone())));
        }
        drop(tx);

        let node_output = output.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = self.run(rx, node_output).await {
                warn!("Audio mixer stopped: {}", e);
            }
        }));

        MixerNode { track: output, tasks }
    }

    /// Mix frames as they arrive until every input has closed
    async fn run(&mut self, mut audio_rx: mpsc::Receiver<AudioFrame>, output: MediaTrack) -> Result<()> {
        let mut mixed_frames = 0usize;

        info!("Starting audio mixing");

        while let Some(frame) = audio_rx.recv().await {
            self.buffer_frame(frame);

            while let Some(mixed) = self.next_ready_chunk()? {
                if !output.push(MediaPayload::Audio(mixed)) {
                    debug!("Mixer output released, stopping");
                    return Ok(());
                }
                mixed_frames += 1;
            }
        }

        // Flush remaining buffered frames
        while let Some(mixed) = self.mix_next_chunk()? {
            if !output.push(MediaPayload::Audio(mixed)) {
                break;
            }
            mixed_frames += 1;
        }
        output.end();

        info!("Audio mixing complete: {} mixed frames produced", mixed_frames);

        Ok(())
    }

    /// Buffer a frame based on its source type
    fn buffer_frame(&mut self, frame: AudioFrame) {
        if !self.config.enabled_sources.contains(&frame.source) {
            debug!(
                "Skipping frame from disabled source: {:?} at {}ms",
                frame.source, frame.timestamp_ms
            );
            return;
        }

        if frame.sample_rate != self.config.sample_rate {
            warn!(
                "Frame sample rate mismatch: expected {}, got {}. Dropping frame.",
                self.config.sample_rate, frame.sample_rate
            );
            return;
        }

        if frame.channels != self.config.channels {
            warn!(
                "Frame channel count mismatch: expected {}, got {}. Dropping frame.",
                self.config.channels, frame.channels
            );
            return;
        }

        self.latest_timestamp_ms = self.latest_timestamp_ms.max(frame.timestamp_ms);
        if let Some(buffer) = self.buffers.get_mut(&frame.source) {
            buffer.push_back(frame);
        }

        self.cleanup_old_frames();
    }

    /// Remove frames that are too old (beyond max buffer delay)
    fn cleanup_old_frames(&mut self) {
        let cutoff_time = self
            .current_position_ms
            .saturating_sub(self.config.max_buffer_delay_ms);

        for (source, buffer) in &mut self.buffers {
            while let Some(frame) = buffer.front() {
                if frame.timestamp_ms < cutoff_time {
                    warn!(
                        "Dropping old {:?} frame at {}ms (current position: {}ms)",
                        source, frame.timestamp_ms, self.current_position_ms
                    );
                    buffer.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    /// A chunk is ready once every connected source has a frame, or when one
    /// source has fallen more than the buffer delay behind the newest frame
    fn next_ready_chunk(&mut self) -> Result<Option<AudioFrame>> {
        if self.buffers.values().all(|b| !b.is_empty()) {
            return self.mix_next_chunk();
        }

        let stale_cutoff = self
            .latest_timestamp_ms
            .saturating_sub(self.config.max_buffer_delay_ms);
        let stalled = self
            .buffers
            .values()
            .filter_map(|b| b.front())
            .any(|f| f.timestamp_ms < stale_cutoff);

        if stalled {
            self.mix_next_chunk()
        } else {
            Ok(None)
        }
    }

    /// Mix the next chunk of audio from all source buffers
    ///
    /// Returns None if there's no data available in any buffer
    fn mix_next_chunk(&mut self) -> Result<Option<AudioFrame>> {
        let mut frames_to_mix: Vec<AudioFrame> = Vec::new();

        for buffer in self.buffers.values_mut() {
            if let Some(frame) = buffer.pop_front() {
                frames_to_mix.push(frame);
            }
        }

        if frames_to_mix.len() <= 1 {
            let Some(frame) = frames_to_mix.pop() else {
                return Ok(None);
            };
            self.current_position_ms = frame.timestamp_ms;
            return Ok(Some(frame));
        }

        let mixed = self.mix_multiple_frames(&frames_to_mix)?;
        self.current_position_ms = mixed.timestamp_ms;
        Ok(Some(mixed))
    }

    /// Mix multiple audio frames together by adding their samples
    fn mix_multiple_frames(&self, frames: &[AudioFrame]) -> Result<AudioFrame> {
        if frames.is_empty() {
            anyhow::bail!("Cannot mix zero frames");
        }

        // Use the earliest timestamp
        let timestamp_ms = frames.iter().map(|f| f.timestamp_ms).min().unwrap_or(0);

        // Output length follows the longest frame
        let max_len = frames.iter().map(|f| f.samples.len()).max().unwrap_or(0);
        let mut mixed_samples = Vec::with_capacity(max_len);

        for i in 0..max_len {
            let sum: i32 = frames
                .iter()
                .map(|frame| frame.samples.get(i).copied().unwrap_or(0) as i32)
                .sum();

            mixed_samples.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
        }

        debug!(
            "Mixed {} frames at {}ms: {} samples total",
            frames.len(),
            timestamp_ms,
            mixed_samples.len()
        );

        Ok(AudioFrame {
            samples: mixed_samples,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            timestamp_ms,
            source: AudioStreamSource::System, // Mixed frames are marked as System
        })
    }
}

/// Forward one input track into the mixer channel, tagging its source
async fn forward_input(
    source: AudioStreamSource,
    mut input_rx: broadcast::Receiver<MediaPayload>,
    tx: mpsc::Sender<AudioFrame>,
) {
    loop {
        match input_rx.recv().await {
            Ok(MediaPayload::Audio(mut frame)) => {
                frame.source = source;
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            Ok(MediaPayload::Video(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Mixer input {:?} lagged, {} frames skipped", source, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("Mixer input {:?} closed", source);
}
