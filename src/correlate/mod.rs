//! Attach log events to counter samples that share a host and time bucket.

use crate::telemetry::{CounterSample, LogEvent, NO_EVENT};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::info;

/// Floor `ts` to a bucket of width `bucket`, aligned to the Unix epoch.
pub fn bucket_of(ts: DateTime<Utc>, bucket: Duration) -> i64 {
    let width = bucket.num_milliseconds().max(1);
    ts.timestamp_millis().div_euclid(width)
}

/// Left-join logs onto counters by `(host, bucket)`.
///
/// A sample with no log in its bucket gets `NONE` for event and severity. A
/// sample whose bucket holds several logs is emitted once per log, in log
/// order. Counter order is preserved.
pub fn correlate_logs_to_counters(
    counters: Vec<CounterSample>,
    logs: &[LogEvent],
    bucket: Duration,
) -> Vec<CounterSample> {
    let mut by_bucket: HashMap<(&str, i64), Vec<&LogEvent>> = HashMap::new();
    for log in logs {
        by_bucket
            .entry((log.host.as_str(), bucket_of(log.timestamp, bucket)))
            .or_default()
            .push(log);
    }

    let mut joined = Vec::with_capacity(counters.len());
    let mut matched = 0usize;
    for sample in counters {
        let key = (sample.host.as_str(), bucket_of(sample.timestamp, bucket));
        match by_bucket.get(&key) {
            Some(events) => {
                matched += 1;
                for log in events {
                    joined.push(sample.clone().with_event(&log.event, &log.severity));
                }
            }
            None => joined.push(sample.with_event(NO_EVENT, NO_EVENT)),
        }
    }

    info!(
        samples = joined.len(),
        with_events = matched,
        logs = logs.len(),
        "correlated logs to counters"
    );
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn log(secs: i64, host: &str, event: &str) -> LogEvent {
        LogEvent {
            timestamp: at(secs),
            host: host.to_string(),
            event: event.to_string(),
            severity: "WARN".to_string(),
        }
    }

    #[test]
    fn test_bucket_floor() {
        let five = Duration::seconds(5);
        assert_eq!(bucket_of(at(0), five), bucket_of(at(4), five));
        assert_ne!(bucket_of(at(4), five), bucket_of(at(5), five));
    }

    #[test]
    fn test_unmatched_samples_get_none() {
        let counters = vec![CounterSample::new(at(0), "host_a"), CounterSample::new(at(7), "host_a")];
        let out = correlate_logs_to_counters(counters, &[log(6, "host_b", "THERMAL")], Duration::seconds(5));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|s| s.event == NO_EVENT && s.severity == NO_EVENT));
    }

    #[test]
    fn test_log_attaches_to_same_host_and_bucket() {
        let counters = vec![CounterSample::new(at(0), "host_a"), CounterSample::new(at(6), "host_a")];
        let out = correlate_logs_to_counters(counters, &[log(8, "host_a", "THERMAL")], Duration::seconds(5));
        assert_eq!(out[0].event, NO_EVENT);
        assert_eq!(out[1].event, "THERMAL");
        assert_eq!(out[1].severity, "WARN");
    }

    #[test]
    fn test_multiple_logs_in_bucket_duplicate_the_sample() {
        let counters = vec![CounterSample::new(at(1), "host_a"), CounterSample::new(at(9), "host_a")];
        let logs = [log(2, "host_a", "PCIE_AER"), log(3, "host_a", "DRAM_ECC")];
        let out = correlate_logs_to_counters(counters, &logs, Duration::seconds(5));
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].event, "PCIE_AER");
        assert_eq!(out[1].event, "DRAM_ECC");
        assert_eq!(out[0].timestamp, out[1].timestamp);
        assert_eq!(out[2].event, NO_EVENT);
    }
}
