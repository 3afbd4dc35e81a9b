use crate::recorder::Recorder;
use crate::settings::SettingsProvider;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub recorder: Recorder,
    /// Preferences read at every start
    pub settings: Arc<dyn SettingsProvider>,
}

impl AppState {
    pub fn new(recorder: Recorder, settings: Arc<dyn SettingsProvider>) -> Self {
        Self { recorder, settings }
    }
}
