pub mod clock;
pub mod config;
pub mod encoder;
pub mod error;
pub mod http;
pub mod media;
pub mod platform;
pub mod recorder;
pub mod settings;
pub mod state;
pub mod storage;

pub use config::Config;
pub use error::{ErrorInfo, RecorderError, RecorderResult};
pub use http::{create_router, AppState};
pub use recorder::{Recorder, RecorderDeps, RecorderEvent, StopOutcome};
pub use settings::{RecordingSettings, SettingsProvider, SharedSettings};
pub use state::{CaptureMode, SessionSnapshot, SessionState, SessionStatus};
