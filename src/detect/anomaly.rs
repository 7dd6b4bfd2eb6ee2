use crate::telemetry::{AnnotatedSample, CounterSample, Metric};
use std::collections::HashMap;
use tracing::debug;

/// Scale factor that makes MAD a consistent estimator of the standard deviation
/// for normally distributed data.
const MAD_SCALE: f64 = 0.6745;

/// A single metric's series for one host. Missing readings are `None`.
pub struct TimeSeries {
    values: Vec<Option<f64>>,
}

impl TimeSeries {
    pub fn new(values: Vec<Option<f64>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn present(&self) -> Vec<f64> {
        self.values.iter().flatten().copied().filter(|v| v.is_finite()).collect()
    }

    /// Median of the present readings, `None` if there are none.
    pub fn median(&self) -> Option<f64> {
        median_of(self.present())
    }

    /// Median absolute deviation around the median.
    pub fn mad(&self) -> Option<f64> {
        let med = self.median()?;
        median_of(self.present().into_iter().map(|v| (v - med).abs()).collect())
    }

    /// Robust z-score of every reading against the whole series:
    /// z = 0.6745 * (x - median) / MAD
    ///
    /// A flat series (MAD == 0) scores 0 everywhere. Missing readings stay `None`.
    pub fn robust_z_scores(&self) -> Vec<Option<f64>> {
        let (Some(med), Some(mad)) = (self.median(), self.mad()) else {
            return vec![None; self.values.len()];
        };
        if mad == 0.0 {
            return vec![Some(0.0); self.values.len()];
        }
        self.values
            .iter()
            .map(|v| {
                v.filter(|x| x.is_finite())
                    .map(|x| MAD_SCALE * (x - med) / mad)
            })
            .collect()
    }
}

fn median_of(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// When a metric's deviation counts as anomalous.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    /// High is bad: anomalous when z > threshold.
    Above(f64),
    /// Low is bad: anomalous when z < threshold.
    Below(f64),
    /// Scored for attribution only, never raises the flag.
    Never,
}

impl Trigger {
    pub fn fires(&self, z: f64) -> bool {
        match *self {
            Trigger::Above(t) => z > t,
            Trigger::Below(t) => z < t,
            Trigger::Never => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricDefinition {
    pub metric: Metric,
    pub trigger: Trigger,
}

/// Scores a host's samples against an ordered metric table.
#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    definitions: Vec<MetricDefinition>,
}

impl Default for AnomalyScorer {
    fn default() -> Self {
        use Metric::*;
        let def = |metric, trigger| MetricDefinition { metric, trigger };
        Self::new(vec![
            def(MemLatencyP99, Trigger::Above(4.0)),
            def(EccCe, Trigger::Above(5.0)),
            def(PcieAer, Trigger::Above(5.0)),
            def(NetDrops, Trigger::Above(5.0)),
            def(TempC, Trigger::Above(4.0)),
            def(FreqGhz, Trigger::Below(-4.0)),
            def(MemBw, Trigger::Above(4.0)),
            def(CpuUtil, Trigger::Never),
        ])
    }
}

impl AnomalyScorer {
    pub fn new(definitions: Vec<MetricDefinition>) -> Self {
        Self { definitions }
    }

    pub fn definitions(&self) -> &[MetricDefinition] {
        &self.definitions
    }

    /// Score one host's time-ordered samples. Statistics are computed over the
    /// whole batch, not a rolling window.
    ///
    /// Metrics that no sample reports are skipped: they get no deviation and
    /// cannot flag a sample.
    pub fn score_host(&self, samples: Vec<CounterSample>) -> Vec<AnnotatedSample> {
        let mut columns: Vec<(MetricDefinition, Vec<Option<f64>>)> = Vec::new();
        for def in &self.definitions {
            if !samples.iter().any(|s| s.metrics.contains_key(&def.metric)) {
                debug!(metric = %def.metric, "metric not reported, skipping");
                continue;
            }
            let series = TimeSeries::new(samples.iter().map(|s| s.value(def.metric)).collect());
            columns.push((*def, series.robust_z_scores()));
        }

        samples
            .into_iter()
            .enumerate()
            .map(|(i, sample)| {
                let mut deviations = HashMap::with_capacity(columns.len());
                let mut is_anomaly = false;
                for (def, scores) in &columns {
                    let z = scores[i];
                    if let Some(z) = z {
                        is_anomaly |= def.trigger.fires(z);
                    }
                    deviations.insert(def.metric, z);
                }
                AnnotatedSample {
                    sample,
                    deviations,
                    is_anomaly,
                }
            })
            .collect()
    }
}
