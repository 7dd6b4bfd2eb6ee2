//! Anomaly scoring, window coalescing and incident building.

pub mod anomaly;
pub mod engine;
pub mod incident;
pub mod window;

pub use engine::{detect_incidents, detect_incidents_parallel, DetectionEngine};
pub use incident::{Incident, IncidentId, TopSignal, TopSignals};

use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("detection task for host {host} failed: {reason}")]
    HostTask { host: String, reason: String },
}

/// Validated detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionParams {
    /// Minimum samples a window must hold to become an incident.
    pub min_points: usize,
    /// Largest gap tolerated between consecutive anomalous timestamps of one window.
    pub max_gap: chrono::Duration,
}
