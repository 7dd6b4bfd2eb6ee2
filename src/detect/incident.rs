use crate::detect::window::IncidentWindow;
use crate::telemetry::{Metric, NO_EVENT, UNKNOWN_WORKLOAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Maximum number of signals kept as incident evidence.
pub const MAX_TOP_SIGNALS: usize = 3;

/// Severity ceiling.
pub const MAX_SEVERITY: f64 = 50.0;

/// Identifier of an incident. Ids minted by detection are sequence numbers
/// rendered as `INC_0000`; ids read back from an exported file are kept
/// verbatim, whatever their shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IncidentId(String);

impl IncidentId {
    pub fn sequence(n: u32) -> Self {
        Self(format!("INC_{n:04}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("incident id must not be blank")]
pub struct InvalidIncidentId;

impl FromStr for IncidentId {
    type Err = InvalidIncidentId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(InvalidIncidentId);
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for IncidentId {
    type Error = InvalidIncidentId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IncidentId> for String {
    fn from(id: IncidentId) -> Self {
        id.0
    }
}

/// A metric's signed peak deviation inside a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopSignal {
    pub metric: Metric,
    pub value: f64,
}

/// Ordered evidence signals, strongest first, together with their text form.
///
/// Built from peaks, the text is `ecc_ce:+9.1,mem_latency_p99:+7.2` (one
/// decimal, sign always shown). Read from text, the text is kept exactly as
/// given and the peaks are whatever tokens parse; malformed ones are dropped.
/// Serializes as the text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TopSignals {
    peaks: Vec<TopSignal>,
    text: String,
}

impl TopSignals {
    pub fn from_peaks(peaks: Vec<TopSignal>) -> Self {
        let text = peaks
            .iter()
            .map(|s| {
                let sign = if s.value >= 0.0 { '+' } else { '-' };
                format!("{}:{}{:.1}", s.metric, sign, s.value.abs())
            })
            .collect::<Vec<_>>()
            .join(",");
        Self { peaks, text }
    }

    /// Parse `metric:value` tokens separated by commas. Tokens with no
    /// separator, an unknown metric, or a non-numeric value are skipped.
    pub fn parse_lossy(text: &str) -> Self {
        let peaks = text
            .split(',')
            .filter_map(|token| {
                let (name, value) = token.split_once(':')?;
                let metric = name.trim().parse::<Metric>().ok()?;
                let value = value.trim().replace('+', "").parse::<f64>().ok()?;
                Some(TopSignal { metric, value })
            })
            .collect();
        Self {
            peaks,
            text: text.to_string(),
        }
    }

    pub fn peaks(&self) -> &[TopSignal] {
        &self.peaks
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopSignal> {
        self.peaks.iter()
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}

impl fmt::Display for TopSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<String> for TopSignals {
    fn from(s: String) -> Self {
        Self::parse_lossy(&s)
    }
}

impl From<TopSignals> for String {
    fn from(s: TopSignals) -> Self {
        s.text
    }
}

/// A detected incident on one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: IncidentId,
    pub host: String,
    pub workload: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub duration_sec: i64,
    pub top_signals: TopSignals,
    pub event_hint: String,
    pub severity_score: f64,
}

/// Everything about an incident except its id, which is only known once all
/// hosts have been processed in order.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentDraft {
    pub host: String,
    pub workload: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub top_signals: TopSignals,
    pub event_hint: String,
    pub severity_score: f64,
}

impl IncidentDraft {
    pub fn into_incident(self, incident_id: IncidentId) -> Incident {
        Incident {
            incident_id,
            duration_sec: (self.end_ts - self.start_ts).num_seconds() + 1,
            host: self.host,
            workload: self.workload,
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            top_signals: self.top_signals,
            event_hint: self.event_hint,
            severity_score: self.severity_score,
        }
    }
}

/// Summarizes coalesced windows into incidents.
#[derive(Debug, Clone, Copy)]
pub struct IncidentBuilder {
    min_points: usize,
}

impl IncidentBuilder {
    pub fn new(min_points: usize) -> Self {
        Self { min_points }
    }

    /// Returns `None` when the window holds fewer than `min_points` samples.
    pub fn build(&self, window: &IncidentWindow) -> Option<IncidentDraft> {
        if window.samples.len() < self.min_points {
            debug!(
                host = %window.host,
                start = %window.start,
                points = window.samples.len(),
                min_points = self.min_points,
                "window below min_points, dropped"
            );
            return None;
        }

        let top_signals = top_signals(window);
        let severity_score = top_signals
            .iter()
            .map(|s| s.value.abs())
            .sum::<f64>()
            .min(MAX_SEVERITY);

        let event_hint = most_frequent(
            window
                .samples
                .iter()
                .map(|s| s.sample.event.as_str())
                .filter(|e| *e != NO_EVENT),
        )
        .unwrap_or(NO_EVENT)
        .to_string();

        Some(IncidentDraft {
            host: window.host.clone(),
            workload: dominant_workload(window),
            start_ts: window.start,
            end_ts: window.end,
            top_signals,
            event_hint,
            severity_score,
        })
    }
}

/// Signed peak per metric, ranked by magnitude. The sort is stable so equal
/// magnitudes keep canonical metric order.
fn top_signals(window: &IncidentWindow) -> TopSignals {
    let mut peaks: Vec<TopSignal> = Vec::new();
    for metric in Metric::ALL {
        let mut peak: Option<f64> = None;
        for z in window.samples.iter().filter_map(|s| s.deviation(metric)) {
            if peak.map_or(true, |p| z.abs() > p.abs()) {
                peak = Some(z);
            }
        }
        if let Some(value) = peak {
            peaks.push(TopSignal { metric, value });
        }
    }
    peaks.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
    peaks.truncate(MAX_TOP_SIGNALS);
    TopSignals::from_peaks(peaks)
}

/// Most frequent label; ties go to the label seen first.
fn most_frequent<'a>(labels: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for label in labels {
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, n)) => *n += 1,
            None => counts.push((label, 1)),
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (label, n) in counts {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((label, n));
        }
    }
    best.map(|(label, _)| label)
}

/// Mode of the workload labels; ties go to the lexicographically smallest label.
fn dominant_workload(window: &IncidentWindow) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for w in window.samples.iter().filter_map(|s| s.sample.workload.as_deref()) {
        *counts.entry(w).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(la, ca), (lb, cb)| ca.cmp(cb).then_with(|| lb.cmp(la)))
        .map(|(label, _)| label.to_string())
        .unwrap_or_else(|| UNKNOWN_WORKLOAD.to_string())
}
