use crate::detect::anomaly::AnomalyScorer;
use crate::detect::incident::{Incident, IncidentBuilder, IncidentDraft, IncidentId};
use crate::detect::window::{coalesce_windows, IncidentWindow};
use crate::detect::{DetectError, DetectionParams};
use crate::telemetry::CounterSample;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-host detection pipeline: score, coalesce, build.
#[derive(Debug, Clone)]
pub struct DetectionEngine {
    scorer: AnomalyScorer,
    params: DetectionParams,
}

impl DetectionEngine {
    pub fn new(params: DetectionParams) -> Self {
        Self::with_scorer(AnomalyScorer::default(), params)
    }

    pub fn with_scorer(scorer: AnomalyScorer, params: DetectionParams) -> Self {
        Self { scorer, params }
    }

    /// Run one host's samples (already in time order) through the pipeline.
    /// Needs nothing from any other host.
    pub fn process_host(&self, host: &str, samples: Vec<CounterSample>) -> Vec<IncidentDraft> {
        let total = samples.len();
        let annotated = self.scorer.score_host(samples);

        let flagged: Vec<_> = annotated
            .iter()
            .filter(|s| s.is_anomaly)
            .map(|s| s.timestamp())
            .collect();
        let windows = coalesce_windows(&flagged, self.params.max_gap);

        let builder = IncidentBuilder::new(self.params.min_points);
        let drafts: Vec<IncidentDraft> = windows
            .into_iter()
            .map(|w| IncidentWindow::gather(host, w, &annotated))
            .filter_map(|w| builder.build(&w))
            .collect();

        debug!(
            %host,
            samples = total,
            anomalous = flagged.len(),
            incidents = drafts.len(),
            "host processed"
        );
        drafts
    }

    /// Detect incidents across all hosts, one host after another.
    pub fn detect(&self, samples: Vec<CounterSample>) -> Vec<Incident> {
        let per_host = group_by_host(samples)
            .into_iter()
            .map(|(host, samples)| {
                let drafts = self.process_host(&host, samples);
                (host, drafts)
            })
            .collect();
        finalize(per_host)
    }

    /// Same result as [`detect`](Self::detect), with each host processed on the
    /// blocking thread pool.
    pub async fn detect_parallel(
        self: Arc<Self>,
        samples: Vec<CounterSample>,
    ) -> Result<Vec<Incident>, DetectError> {
        let mut handles = Vec::new();
        for (host, samples) in group_by_host(samples) {
            let engine = Arc::clone(&self);
            let task_host = host.clone();
            let handle =
                tokio::task::spawn_blocking(move || engine.process_host(&task_host, samples));
            handles.push((host, handle));
        }

        let mut per_host = Vec::with_capacity(handles.len());
        for (host, handle) in handles {
            match handle.await {
                Ok(drafts) => per_host.push((host, drafts)),
                Err(e) => {
                    return Err(DetectError::HostTask {
                        host,
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(finalize(per_host))
    }
}

/// Group samples by host in ascending host order, each group stably sorted by time.
fn group_by_host(samples: Vec<CounterSample>) -> BTreeMap<String, Vec<CounterSample>> {
    let mut hosts: BTreeMap<String, Vec<CounterSample>> = BTreeMap::new();
    for s in samples {
        hosts.entry(s.host.clone()).or_default().push(s);
    }
    for series in hosts.values_mut() {
        series.sort_by_key(|s| s.timestamp);
    }
    hosts
}

/// Assign ids in discovery order (host order, then time), then order by
/// descending severity. Equal severities keep discovery order.
fn finalize(per_host: Vec<(String, Vec<IncidentDraft>)>) -> Vec<Incident> {
    let mut next_id = 0u32;
    let mut incidents = Vec::new();
    for (host, drafts) in per_host {
        for draft in drafts {
            assert_eq!(draft.host, host, "incident built for a host it was not scored on");
            incidents.push(draft.into_incident(IncidentId::sequence(next_id)));
            next_id += 1;
        }
    }
    incidents.sort_by(|a, b| b.severity_score.total_cmp(&a.severity_score));

    info!(incidents = incidents.len(), "incident detection complete");
    incidents
}

/// Detect incidents with the default metric table.
pub fn detect_incidents(samples: Vec<CounterSample>, params: DetectionParams) -> Vec<Incident> {
    DetectionEngine::new(params).detect(samples)
}

/// Host-parallel [`detect_incidents`].
pub async fn detect_incidents_parallel(
    samples: Vec<CounterSample>,
    params: DetectionParams,
) -> Result<Vec<Incident>, DetectError> {
    Arc::new(DetectionEngine::new(params))
        .detect_parallel(samples)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Metric;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn params() -> DetectionParams {
        DetectionParams {
            min_points: 3,
            max_gap: Duration::seconds(10),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    /// 60 one-second samples with mild noise and a spike of `height` over `span`.
    fn host_series(host: &str, span: std::ops::Range<i64>, height: f64) -> Vec<CounterSample> {
        (0..60)
            .map(|i| {
                let noise = if i % 2 == 0 { 9.0 } else { 11.0 };
                let v = if span.contains(&i) { noise + height } else { noise };
                CounterSample::new(at(i), host)
                    .with_workload("ai_train")
                    .with_metric(Metric::MemLatencyP99, v)
            })
            .collect()
    }

    #[test]
    fn test_quiet_host_yields_nothing() {
        let incidents = detect_incidents(host_series("host_00", 0..0, 0.0), params());
        assert!(incidents.is_empty());
    }

    #[test]
    fn test_spike_becomes_one_incident() {
        let incidents = detect_incidents(host_series("host_00", 20..30, 50.0), params());
        assert_eq!(incidents.len(), 1);
        let inc = &incidents[0];
        assert_eq!(inc.start_ts, at(20));
        assert_eq!(inc.end_ts, at(29));
        assert_eq!(inc.duration_sec, 10);
        assert_eq!(inc.workload, "ai_train");
        assert_eq!(inc.top_signals.peaks()[0].metric, Metric::MemLatencyP99);
    }

    #[test]
    fn test_short_spike_below_min_points_dropped() {
        let incidents = detect_incidents(host_series("host_00", 20..22, 50.0), params());
        assert!(incidents.is_empty());
    }

    #[test]
    fn test_ids_follow_host_order_and_output_follows_severity() {
        let mut samples = host_series("host_b", 10..20, 80.0);
        samples.extend(host_series("host_a", 30..40, 20.0));
        let incidents = detect_incidents(samples, params());
        assert_eq!(incidents.len(), 2);
        // host_b is more severe and listed first, but host_a was discovered first.
        assert_eq!(incidents[0].host, "host_b");
        assert_eq!(incidents[0].incident_id, IncidentId::sequence(1));
        assert_eq!(incidents[1].host, "host_a");
        assert_eq!(incidents[1].incident_id, IncidentId::sequence(0));
    }

    #[test]
    fn test_unsorted_input_is_ordered_per_host() {
        let mut samples = host_series("host_00", 20..30, 50.0);
        samples.reverse();
        let incidents = detect_incidents(samples, params());
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].start_ts, at(20));
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let mut samples = Vec::new();
        for (i, host) in ["host_03", "host_01", "host_02", "host_00"].iter().enumerate() {
            let start = 5 + i as i64 * 10;
            samples.extend(host_series(host, start..start + 8, 20.0 + i as f64 * 10.0));
        }
        let sequential = detect_incidents(samples.clone(), params());
        let parallel = detect_incidents_parallel(samples, params()).await.unwrap();
        assert_eq!(sequential.len(), 4);
        assert_eq!(sequential, parallel);
    }
}
