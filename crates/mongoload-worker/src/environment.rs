use std::sync::Arc;

use mongoload_core::{ReportingSink, Settings};

/// Execution environment shared by every worker of a run.
#[derive(Clone)]
pub struct Environment {
    settings: Arc<Settings>,
    events: Arc<dyn ReportingSink>,
}

impl Environment {
    pub fn new(settings: Arc<Settings>, events: Arc<dyn ReportingSink>) -> Self {
        Self { settings, events }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Sink receiving one event per reported operation.
    pub fn events(&self) -> &dyn ReportingSink {
        self.events.as_ref()
    }
}
