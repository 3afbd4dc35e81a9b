//! Recording session orchestration

pub mod events;
pub mod resources;
pub mod session;

pub use events::{RecorderEvent, SessionEvent};
pub use resources::CaptureResources;
pub use session::{Recorder, RecorderDeps, StopOutcome, CONVERSION_FAILED};
