//! Telemetry record model shared by the detection and RCA engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Event label used when no log line falls in a sample's bucket.
pub const NO_EVENT: &str = "NONE";

/// Workload label used when a sample carries none.
pub const UNKNOWN_WORKLOAD: &str = "unknown";

/// Hardware counters tracked per host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    MemLatencyP99,
    EccCe,
    PcieAer,
    NetDrops,
    TempC,
    FreqGhz,
    MemBw,
    CpuUtil,
}

impl Metric {
    /// The fixed metric set, in canonical order. Ties in signal ranking fall back to this order.
    pub const ALL: [Metric; 8] = [
        Metric::MemLatencyP99,
        Metric::EccCe,
        Metric::PcieAer,
        Metric::NetDrops,
        Metric::TempC,
        Metric::FreqGhz,
        Metric::MemBw,
        Metric::CpuUtil,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::MemLatencyP99 => "mem_latency_p99",
            Metric::EccCe => "ecc_ce",
            Metric::PcieAer => "pcie_aer",
            Metric::NetDrops => "net_drops",
            Metric::TempC => "temp_c",
            Metric::FreqGhz => "freq_ghz",
            Metric::MemBw => "mem_bw",
            Metric::CpuUtil => "cpu_util",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown metric: {0}")]
pub struct UnknownMetric(pub String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

/// One counter sample for one host at one instant, with the log event
/// attached by the correlation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSample {
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub workload: Option<String>,
    /// Metric readings. A metric that was not reported (or was unparsable) is absent.
    pub metrics: HashMap<Metric, f64>,
    pub event: String,
    pub severity: String,
}

impl CounterSample {
    pub fn new(timestamp: DateTime<Utc>, host: impl Into<String>) -> Self {
        Self {
            timestamp,
            host: host.into(),
            workload: None,
            metrics: HashMap::new(),
            event: NO_EVENT.to_string(),
            severity: NO_EVENT.to_string(),
        }
    }

    pub fn with_workload(mut self, workload: impl Into<String>) -> Self {
        self.workload = Some(workload.into());
        self
    }

    pub fn with_metric(mut self, metric: Metric, value: f64) -> Self {
        self.metrics.insert(metric, value);
        self
    }

    pub fn with_event(mut self, event: impl Into<String>, severity: impl Into<String>) -> Self {
        self.event = event.into();
        self.severity = severity.into();
        self
    }

    /// Finite reading for `metric`, if any. NaN and infinities count as missing.
    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied().filter(|v| v.is_finite())
    }
}

/// A discrete log line from a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub event: String,
    #[serde(default = "default_severity")]
    pub severity: String,
}

fn default_severity() -> String {
    NO_EVENT.to_string()
}

/// A counter sample after scoring: signed robust z-score per scored metric
/// plus the overall anomaly flag.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedSample {
    pub sample: CounterSample,
    /// Deviation per scored metric. `None` where the reading was missing.
    pub deviations: HashMap<Metric, Option<f64>>,
    pub is_anomaly: bool,
}

impl AnnotatedSample {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.sample.timestamp
    }

    pub fn deviation(&self, metric: Metric) -> Option<f64> {
        self.deviations.get(&metric).copied().flatten()
    }
}
