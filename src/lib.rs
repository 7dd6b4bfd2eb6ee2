//! silicon-rca -- fleet hardware incident detection and root-cause analysis.
//!
//! Per-host counter telemetry is scored with robust (median/MAD) z-scores,
//! anomalous timestamps are coalesced into incident windows, and each
//! incident is diagnosed by a transparent weighted-rule engine.

pub mod config;
pub mod correlate;
pub mod detect;
pub mod ingest;
pub mod rca;
pub mod report;
pub mod simulate;
pub mod telemetry;

use anyhow::Result;
use config::DetectionConfig;
use detect::{DetectionParams, Incident};
use rca::RcaResult;
use telemetry::{CounterSample, LogEvent};

/// Incidents (most severe first) and one diagnosis per incident, in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub incidents: Vec<Incident>,
    pub results: Vec<RcaResult>,
}

impl PipelineOutput {
    fn new(incidents: Vec<Incident>) -> Self {
        let results = rca::run_rca(&incidents);
        Self { incidents, results }
    }
}

fn validate(detection: &DetectionConfig) -> Result<(chrono::Duration, DetectionParams)> {
    let bucket = detection.bucket()?;
    let params = detection.validate()?;
    Ok((bucket, params))
}

/// Correlate, detect and diagnose on the current thread.
/// Configuration is checked before any work is done.
pub fn run_pipeline(
    counters: Vec<CounterSample>,
    logs: &[LogEvent],
    detection: &DetectionConfig,
) -> Result<PipelineOutput> {
    let (bucket, params) = validate(detection)?;
    let samples = correlate::correlate_logs_to_counters(counters, logs, bucket);
    let incidents = detect::detect_incidents(samples, params);
    Ok(PipelineOutput::new(incidents))
}

/// [`run_pipeline`] with hosts processed concurrently on the blocking pool.
pub async fn run_pipeline_parallel(
    counters: Vec<CounterSample>,
    logs: &[LogEvent],
    detection: &DetectionConfig,
) -> Result<PipelineOutput> {
    let (bucket, params) = validate(detection)?;
    let samples = correlate::correlate_logs_to_counters(counters, logs, bucket);
    let incidents = detect::detect_incidents_parallel(samples, params).await?;
    Ok(PipelineOutput::new(incidents))
}
