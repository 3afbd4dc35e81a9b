//! Capture and encoder platform implementations

pub mod simulated;

pub use simulated::{
    inspect, DeviceBehavior, RecordingSummary, SimulatedConfig, SimulatedEncoderFactory, SimulatedPlatform,
};
