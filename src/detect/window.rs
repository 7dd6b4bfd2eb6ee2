//! Temporal coalescing of anomalous timestamps into incident windows.

use crate::telemetry::AnnotatedSample;
use chrono::{DateTime, Duration, Utc};

/// Closed interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Merge anomalous timestamps into maximal windows. A timestamp joins the
/// current window when it is at most `max_gap` after the window's end.
pub fn coalesce_windows(timestamps: &[DateTime<Utc>], max_gap: Duration) -> Vec<TimeWindow> {
    let mut sorted = timestamps.to_vec();
    sorted.sort();

    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };

    let mut windows = Vec::new();
    let mut current = TimeWindow { start: first, end: first };
    for ts in iter {
        if ts - current.end <= max_gap {
            current.end = ts;
        } else {
            windows.push(current);
            current = TimeWindow { start: ts, end: ts };
        }
    }
    windows.push(current);
    windows
}

/// A coalesced window for one host together with every scored sample inside it.
#[derive(Debug, Clone)]
pub struct IncidentWindow {
    pub host: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub samples: Vec<AnnotatedSample>,
}

impl IncidentWindow {
    /// Collect the samples (anomalous or not) whose timestamp falls in `window`.
    pub fn gather(host: &str, window: TimeWindow, annotated: &[AnnotatedSample]) -> Self {
        Self {
            host: host.to_string(),
            start: window.start,
            end: window.end,
            samples: annotated
                .iter()
                .filter(|s| window.contains(s.timestamp()))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_empty_input_has_no_windows() {
        assert!(coalesce_windows(&[], Duration::seconds(10)).is_empty());
    }

    #[test]
    fn test_single_timestamp_is_degenerate_window() {
        let w = coalesce_windows(&[at(5)], Duration::seconds(10));
        assert_eq!(w, vec![TimeWindow { start: at(5), end: at(5) }]);
    }

    #[test]
    fn test_gap_boundary_is_inclusive() {
        let w = coalesce_windows(&[at(0), at(10), at(21)], Duration::seconds(10));
        assert_eq!(
            w,
            vec![
                TimeWindow { start: at(0), end: at(10) },
                TimeWindow { start: at(21), end: at(21) },
            ]
        );
    }

    #[test]
    fn test_gap_measured_from_window_end() {
        // Each step is within the gap of the previous point, so the chain stays together.
        let ts: Vec<_> = (0..10).map(|i| at(i * 8)).collect();
        let w = coalesce_windows(&ts, Duration::seconds(10));
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].start, at(0));
        assert_eq!(w[0].end, at(72));
    }

    #[test]
    fn test_windows_are_ordered_and_disjoint() {
        let ts = [at(100), at(3), at(1), at(50), at(2), at(55), at(101)];
        let w = coalesce_windows(&ts, Duration::seconds(5));
        assert_eq!(w.len(), 3);
        for pair in w.windows(2) {
            assert!(pair[0].end < pair[1].start);
        }
        assert_eq!(w[0], TimeWindow { start: at(1), end: at(3) });
        assert_eq!(w[2], TimeWindow { start: at(100), end: at(101) });
    }

    #[test]
    fn test_duplicate_timestamps_share_a_window() {
        let w = coalesce_windows(&[at(4), at(4), at(4)], Duration::seconds(1));
        assert_eq!(w, vec![TimeWindow { start: at(4), end: at(4) }]);
    }
}
