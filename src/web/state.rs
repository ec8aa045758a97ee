//! Application state shared across handlers

use crate::config::Settings;
use crate::metrics::Metrics;
use crate::search::Assessor;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Global settings
    pub settings: Arc<Settings>,
    /// Assessment executor
    pub assessor: Arc<Assessor>,
    /// Metrics of the access layer behind the assessor
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Create new application state
    pub fn new(settings: Settings, assessor: Assessor) -> Self {
        let metrics = assessor.access().metrics().clone();
        Self {
            settings: Arc::new(settings),
            assessor: Arc::new(assessor),
            metrics,
        }
    }

    /// Get instance name
    pub fn instance_name(&self) -> &str {
        &self.settings.general.instance_name
    }

    /// Check if statistics are exposed
    pub fn metrics_enabled(&self) -> bool {
        self.settings.general.enable_metrics
    }
}
