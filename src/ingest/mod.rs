//! Loading fleet telemetry from disk: counters as CSV, logs as JSON Lines.

use crate::telemetry::{CounterSample, LogEvent, Metric};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const COUNTERS_FILE: &str = "counters.csv";
pub const LOGS_FILE: &str = "logs.jsonl";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} has no `{column}` column")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("{path} row {row}: bad timestamp {value:?}")]
    Timestamp {
        path: PathBuf,
        row: usize,
        value: String,
    },
}

/// Parse RFC 3339, or a naive `YYYY-MM-DD HH:MM:SS[.fff]` (either `T` or space) taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Read a counters CSV. Needs `timestamp` and `host` columns; `workload` and
/// the metric columns are optional. Blank or non-numeric metric cells are
/// recorded as missing. Output is sorted by host, then timestamp.
pub fn load_counters(path: &Path) -> Result<Vec<CounterSample>, IngestError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| IngestError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let headers = reader
        .headers()
        .map_err(|source| IngestError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();

    let column = |name: &'static str| headers.iter().position(|h| h.trim() == name);
    let ts_col = column("timestamp").ok_or_else(|| IngestError::MissingColumn {
        path: path.to_path_buf(),
        column: "timestamp",
    })?;
    let host_col = column("host").ok_or_else(|| IngestError::MissingColumn {
        path: path.to_path_buf(),
        column: "host",
    })?;
    let workload_col = column("workload");
    let metric_cols: Vec<(Metric, usize)> = Metric::ALL
        .iter()
        .filter_map(|m| column(m.as_str()).map(|i| (*m, i)))
        .collect();

    let mut samples = Vec::new();
    let mut missing_cells = 0usize;
    for (idx, record) in reader.records().enumerate() {
        let row = idx + 2; // header is line 1
        let record = record.map_err(|source| IngestError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let raw_ts = record.get(ts_col).unwrap_or_default();
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| IngestError::Timestamp {
            path: path.to_path_buf(),
            row,
            value: raw_ts.to_string(),
        })?;

        let mut sample = CounterSample::new(timestamp, record.get(host_col).unwrap_or_default());
        sample.workload = workload_col
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_string);

        let mut metrics = HashMap::with_capacity(metric_cols.len());
        for (metric, i) in &metric_cols {
            let value = record
                .get(*i)
                .and_then(|cell| cell.trim().parse::<f64>().ok())
                .unwrap_or(f64::NAN);
            if value.is_nan() {
                missing_cells += 1;
            }
            metrics.insert(*metric, value);
        }
        sample.metrics = metrics;
        samples.push(sample);
    }

    if missing_cells > 0 {
        debug!(path = %path.display(), missing_cells, "counter cells missing or unparsable");
    }

    samples.sort_by(|a, b| a.host.cmp(&b.host).then(a.timestamp.cmp(&b.timestamp)));
    info!(path = %path.display(), samples = samples.len(), "loaded counters");
    Ok(samples)
}

#[derive(Deserialize)]
struct RawLogLine {
    timestamp: String,
    host: String,
    event: String,
    #[serde(default)]
    severity: Option<String>,
}

/// Read a JSON Lines log file. Blank lines are ignored; malformed lines are
/// skipped with a warning. Output is sorted by host, then timestamp.
pub fn load_logs(path: &Path) -> Result<Vec<LogEvent>, IngestError> {
    let file = std::fs::File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut events = Vec::new();
    let mut skipped = 0usize;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<RawLogLine>(&line)
            .ok()
            .and_then(|raw| {
                let timestamp = parse_timestamp(&raw.timestamp)?;
                Some(LogEvent {
                    timestamp,
                    host: raw.host,
                    event: raw.event,
                    severity: raw.severity.unwrap_or_else(|| crate::telemetry::NO_EVENT.to_string()),
                })
            });
        match parsed {
            Some(event) => events.push(event),
            None => {
                skipped += 1;
                warn!(path = %path.display(), line = idx + 1, "skipping malformed log line");
            }
        }
    }

    events.sort_by(|a, b| a.host.cmp(&b.host).then(a.timestamp.cmp(&b.timestamp)));
    info!(path = %path.display(), events = events.len(), skipped, "loaded logs");
    Ok(events)
}

/// Load `counters.csv` and `logs.jsonl` from `dir`. A missing log file means no logs.
pub fn load_fleet_data(dir: &Path) -> Result<(Vec<CounterSample>, Vec<LogEvent>), IngestError> {
    let counters = load_counters(&dir.join(COUNTERS_FILE))?;
    let logs_path = dir.join(LOGS_FILE);
    let logs = if logs_path.exists() {
        load_logs(&logs_path)?
    } else {
        warn!(path = %logs_path.display(), "no log file, continuing without events");
        Vec::new()
    };
    Ok((counters, logs))
}
