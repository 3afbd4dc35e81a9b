// Shared fakes for the recorder integration tests

#![allow(dead_code)]

use anyhow::Result;
use parking_lot::Mutex;
use screen_recorder::platform::{SimulatedConfig, SimulatedEncoderFactory, SimulatedPlatform};
use screen_recorder::recorder::{Recorder, RecorderDeps};
use screen_recorder::settings::{AudioSource, Container, RecordingSettings};
use screen_recorder::state::SessionStatus;
use screen_recorder::storage::{Converter, Filesystem};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_VIDEO_DIR: &str = "/home/user/Videos";

/// In-memory filesystem that can refuse writes under chosen directories
#[derive(Default)]
pub struct MemoryFilesystem {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<HashSet<PathBuf>>,
    denied: Mutex<Vec<(PathBuf, String)>>,
    mkdir_calls: Mutex<Vec<PathBuf>>,
    writes: Mutex<usize>,
}

impl MemoryFilesystem {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Writes under `dir` fail with `message`
    pub fn deny(&self, dir: impl Into<PathBuf>, message: &str) {
        self.denied.lock().push((dir.into(), message.to_string()));
    }

    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.files.lock().keys().cloned().collect();
        files.sort();
        files
    }

    pub fn read(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    /// Successful writes, including overwrites of the same path
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }

    pub fn mkdir_calls(&self) -> Vec<PathBuf> {
        self.mkdir_calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl Filesystem for MemoryFilesystem {
    async fn exists(&self, path: &Path) -> bool {
        self.dirs.lock().contains(path) || self.files.lock().contains_key(path)
    }

    async fn mkdir(&self, path: &Path, _recursive: bool) -> io::Result<()> {
        self.mkdir_calls.lock().push(path.to_path_buf());
        if let Some((_, message)) = self.denied.lock().iter().find(|(d, _)| path.starts_with(d)) {
            return Err(io::Error::other(message.clone()));
        }
        self.dirs.lock().insert(path.to_path_buf());
        Ok(())
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some((_, message)) = self.denied.lock().iter().find(|(d, _)| path.starts_with(d)) {
            return Err(io::Error::other(message.clone()));
        }
        self.files.lock().insert(path.to_path_buf(), bytes.to_vec());
        *self.writes.lock() += 1;
        Ok(())
    }

    fn default_video_dir(&self) -> PathBuf {
        PathBuf::from(DEFAULT_VIDEO_DIR)
    }
}

/// Converter fake; records calls and fails when asked to
pub struct FakeConverter {
    pub fail: bool,
    pub calls: Mutex<Vec<(PathBuf, PathBuf, Container)>>,
}

impl FakeConverter {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl Converter for FakeConverter {
    async fn convert(&self, input: &Path, output: &Path, target: Container) -> Result<()> {
        self.calls
            .lock()
            .push((input.to_path_buf(), output.to_path_buf(), target));
        if self.fail {
            anyhow::bail!("ffmpeg exited with status 1");
        }
        Ok(())
    }
}

/// A recorder wired to simulated devices and the in-memory filesystem
pub struct Rig {
    pub recorder: Recorder,
    pub platform: Arc<SimulatedPlatform>,
    pub encoders: SimulatedEncoderFactory,
    pub fs: Arc<MemoryFilesystem>,
}

pub struct RigBuilder {
    platform: SimulatedConfig,
    encoders: SimulatedEncoderFactory,
    converter: Option<Arc<dyn Converter>>,
}

impl RigBuilder {
    pub fn platform(mut self, config: SimulatedConfig) -> Self {
        self.platform = config;
        self
    }

    pub fn encoders(mut self, encoders: SimulatedEncoderFactory) -> Self {
        self.encoders = encoders;
        self
    }

    pub fn converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn build(self) -> Rig {
        let platform = Arc::new(SimulatedPlatform::new(self.platform));
        let fs = MemoryFilesystem::new();
        let recorder = Recorder::new(RecorderDeps {
            platform: platform.clone(),
            encoders: Arc::new(self.encoders.clone()),
            filesystem: fs.clone(),
            converter: self.converter,
        });
        Rig {
            recorder,
            platform,
            encoders: self.encoders,
            fs,
        }
    }
}

pub fn rig() -> RigBuilder {
    RigBuilder {
        platform: SimulatedConfig {
            width: 64,
            height: 36,
            ..Default::default()
        },
        encoders: SimulatedEncoderFactory::new(),
        converter: None,
    }
}

/// Small, fast settings with the given audio source
pub fn settings(audio_source: AudioSource) -> RecordingSettings {
    RecordingSettings {
        audio_source,
        save_directory: "/data/recordings".to_string(),
        ..Default::default()
    }
}

/// Poll until the recorder is Idle; panics after `timeout` of (virtual) time
pub async fn wait_for_idle(recorder: &Recorder, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while recorder.status() != SessionStatus::Idle {
        assert!(
            tokio::time::Instant::now() < deadline,
            "recorder did not return to Idle"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
