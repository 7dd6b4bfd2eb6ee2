//! Exporting incidents and diagnoses: CSV, JSON and a Markdown summary report.

use crate::detect::incident::MAX_SEVERITY;
use crate::detect::{Incident, IncidentId};
use crate::rca::RcaResult;
use anyhow::{anyhow, Context, Result};
use plotters::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub const INCIDENTS_CSV: &str = "incidents.csv";
pub const RCA_CSV: &str = "rca_results.csv";
pub const RESULTS_JSON: &str = "results.json";
pub const REPORT_MD: &str = "report.md";
pub const SEVERITY_HIST_PNG: &str = "severity_hist.png";
pub const ROOT_CAUSE_PNG: &str = "root_cause_counts.png";

const TOP_INCIDENTS: usize = 10;
const TOP_CAUSES: usize = 5;
const SEVERITY_BINS: usize = 10;
const PLOT_SIZE: (u32, u32) = (800, 500);

/// Flat CSV shape of an [`RcaResult`].
#[derive(Serialize)]
struct RcaRow<'a> {
    incident_id: &'a IncidentId,
    root_cause: &'a str,
    confidence: f64,
    explanation: &'a str,
    evidence_top_signals: &'a str,
    rule_hits: String,
    confidence_rationale: &'a str,
    recommended_validation: &'a str,
    recommended_mitigation: &'a str,
}

impl<'a> From<&'a RcaResult> for RcaRow<'a> {
    fn from(r: &'a RcaResult) -> Self {
        Self {
            incident_id: &r.incident_id,
            root_cause: &r.root_cause,
            confidence: r.confidence,
            explanation: &r.explanation,
            evidence_top_signals: &r.evidence_top_signals,
            rule_hits: r.rule_hits.iter().cloned().collect::<Vec<_>>().join(";"),
            confidence_rationale: &r.confidence_rationale,
            recommended_validation: &r.recommended_validation,
            recommended_mitigation: &r.recommended_mitigation,
        }
    }
}

pub fn write_incidents_csv(path: &Path, incidents: &[Incident]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for incident in incidents {
        writer.serialize(incident)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read back an incidents CSV written by [`write_incidents_csv`].
pub fn read_incidents_csv(path: &Path) -> Result<Vec<Incident>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut incidents = Vec::new();
    for (idx, row) in reader.deserialize().enumerate() {
        let incident: Incident =
            row.with_context(|| format!("{} row {}: malformed incident", path.display(), idx + 2))?;
        incidents.push(incident);
    }
    Ok(incidents)
}

pub fn write_rca_csv(path: &Path, results: &[RcaResult]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for result in results {
        writer.serialize(RcaRow::from(result))?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct Results<'a> {
    incidents: &'a [Incident],
    rca: &'a [RcaResult],
}

pub fn write_json(path: &Path, incidents: &[Incident], results: &[RcaResult]) -> Result<()> {
    let json = serde_json::to_string_pretty(&Results {
        incidents,
        rca: results,
    })?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Root causes with their counts, most frequent first. Ties keep first appearance.
pub fn root_cause_distribution(results: &[RcaResult]) -> Vec<(&str, usize)> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for r in results {
        match counts.iter_mut().find(|(c, _)| *c == r.root_cause) {
            Some((_, n)) => *n += 1,
            None => counts.push((&r.root_cause, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Render the Markdown report. Every result must belong to one of `incidents`.
pub fn render_markdown(incidents: &[Incident], results: &[RcaResult]) -> String {
    let by_id: HashMap<&IncidentId, &RcaResult> =
        results.iter().map(|r| (&r.incident_id, r)).collect();
    for r in results {
        assert!(
            incidents.iter().any(|i| i.incident_id == r.incident_id),
            "RCA result {} has no incident",
            r.incident_id
        );
    }

    let mut top: Vec<&Incident> = incidents.iter().collect();
    top.sort_by(|a, b| b.severity_score.total_cmp(&a.severity_score));
    top.truncate(TOP_INCIDENTS);

    let mut lines = vec![
        "# Post-Silicon Failure RCA Report".to_string(),
        String::new(),
        "## Executive Summary".to_string(),
        String::new(),
        format!("- Total incidents detected: **{}**", incidents.len()),
    ];

    if incidents.is_empty() {
        lines.push(String::new());
        lines.push("No incidents detected.".to_string());
        lines.push(String::new());
        return lines.join("\n");
    }

    lines.push("- Top root-cause categories:".to_string());
    for (cause, n) in root_cause_distribution(results).into_iter().take(TOP_CAUSES) {
        lines.push(format!("  - **{cause}**: {n}"));
    }

    lines.push(String::new());
    lines.push("## Top Incidents (by severity)".to_string());
    lines.push(String::new());
    lines.push("| incident_id | host | workload | event_hint | severity_score | top_signals |".to_string());
    lines.push("|---|---|---|---|---:|---|".to_string());
    for i in &top {
        lines.push(format!(
            "| {} | {} | {} | {} | {:.2} | {} |",
            i.incident_id, i.host, i.workload, i.event_hint, i.severity_score, i.top_signals
        ));
    }

    lines.push(String::new());
    lines.push(format!("## RCA Results (Top {TOP_INCIDENTS})"));
    lines.push(String::new());
    lines.push("| incident_id | root_cause | confidence | explanation |".to_string());
    lines.push("|---|---|---:|---|".to_string());
    for r in top.iter().filter_map(|i| by_id.get(&i.incident_id)) {
        lines.push(format!(
            "| {} | {} | {:.2} | {} |",
            r.incident_id, r.root_cause, r.confidence, r.explanation
        ));
    }

    lines.push(String::new());
    lines.push("## Recommended Next Actions".to_string());
    for r in top.iter().filter_map(|i| by_id.get(&i.incident_id)) {
        lines.push(String::new());
        lines.push(format!("### {} - {} (conf {:.2})", r.incident_id, r.root_cause, r.confidence));
        lines.push(String::new());
        lines.push(format!("- **Why:** {}", r.explanation));
        lines.push(format!("- **Evidence:** {}", r.evidence_top_signals));
        lines.push(format!("- **Validation:** {}", r.recommended_validation));
        lines.push(format!("- **Mitigation:** {}", r.recommended_mitigation));
    }
    lines.push(String::new());
    lines.join("\n")
}

pub fn write_markdown_report(out_dir: &Path, incidents: &[Incident], results: &[RcaResult]) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(REPORT_MD);
    std::fs::write(&path, render_markdown(incidents, results))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Plots
// ---------------------------------------------------------------------------

/// One histogram bin: `[lo, hi)` and its count. The last bin is closed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bin {
    pub lo: f64,
    pub hi: f64,
    pub count: usize,
}

/// Equal-width histogram of severity scores over `[min, max]`. When every
/// score is the same the range is widened by 0.5 on each side.
pub fn severity_histogram(incidents: &[Incident], bins: usize) -> Vec<Bin> {
    if incidents.is_empty() || bins == 0 {
        return Vec::new();
    }
    let (mut lo, mut hi) = incidents
        .iter()
        .map(|i| i.severity_score)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(s), hi.max(s)));
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for i in incidents {
        let idx = ((i.severity_score - lo) / width) as usize;
        counts[idx.min(bins - 1)] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(k, count)| Bin {
            lo: lo + k as f64 * width,
            hi: lo + (k + 1) as f64 * width,
            count,
        })
        .collect()
}

fn draw_err(e: impl std::fmt::Display) -> anyhow::Error {
    anyhow!("failed to draw plot: {e}")
}

fn draw_severity_hist(path: &Path, incidents: &[Incident]) -> Result<()> {
    let bins = severity_histogram(incidents, SEVERITY_BINS);
    let (x_lo, x_hi) = match (bins.first(), bins.last()) {
        (Some(first), Some(last)) => (first.lo, last.hi),
        _ => (0.0, MAX_SEVERITY),
    };
    let y_top = bins.iter().map(|b| b.count).max().unwrap_or(0) as u32 + 1;

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Incident Severity Distribution", ("sans-serif", 24))
        .margin(16)
        .x_label_area_size(40)
        .y_label_area_size(48)
        .build_cartesian_2d(x_lo..x_hi, 0u32..y_top)
        .map_err(draw_err)?;
    chart
        .configure_mesh()
        .x_desc("severity_score")
        .y_desc("count")
        .draw()
        .map_err(draw_err)?;
    chart
        .draw_series(bins.iter().map(|b| {
            Rectangle::new([(b.lo, 0u32), (b.hi, b.count as u32)], BLUE.mix(0.6).filled())
        }))
        .map_err(draw_err)?;
    root.present().map_err(draw_err)?;
    Ok(())
}

fn draw_root_cause_bar(path: &Path, results: &[RcaResult]) -> Result<()> {
    let counts = root_cause_distribution(results);
    let n = counts.len() as u32;
    let y_top = counts.iter().map(|(_, c)| *c).max().unwrap_or(0) as u32 + 1;

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Root Cause Counts", ("sans-serif", 24))
        .margin(16)
        .x_label_area_size(40)
        .y_label_area_size(48)
        .build_cartesian_2d((0u32..n.max(1)).into_segmented(), 0u32..y_top)
        .map_err(draw_err)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(counts.len().max(1))
        .x_label_formatter(&|v: &SegmentValue<u32>| match v {
            SegmentValue::CenterOf(i) => counts
                .get(*i as usize)
                .map(|(cause, _)| cause.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .x_desc("root_cause")
        .y_desc("count")
        .draw()
        .map_err(draw_err)?;
    chart
        .draw_series(
            Histogram::vertical(&chart)
                .style(BLUE.mix(0.6).filled())
                .margin(10)
                .data(counts.iter().enumerate().map(|(i, (_, c))| (i as u32, *c as u32))),
        )
        .map_err(draw_err)?;
    root.present().map_err(draw_err)?;
    Ok(())
}

/// Render `severity_hist.png` and `root_cause_counts.png` into `out_dir`.
/// Empty inputs give empty axes.
pub fn write_plots(out_dir: &Path, incidents: &[Incident], results: &[RcaResult]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let hist = out_dir.join(SEVERITY_HIST_PNG);
    draw_severity_hist(&hist, incidents)?;
    let bar = out_dir.join(ROOT_CAUSE_PNG);
    draw_root_cause_bar(&bar, results)?;
    Ok(vec![hist, bar])
}

/// Write every artifact into `out_dir` and return the paths written.
pub fn write_all(
    out_dir: &Path,
    incidents: &[Incident],
    results: &[RcaResult],
    json: bool,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let incidents_path = out_dir.join(INCIDENTS_CSV);
    write_incidents_csv(&incidents_path, incidents)?;
    let rca_path = out_dir.join(RCA_CSV);
    write_rca_csv(&rca_path, results)?;
    let mut written = vec![incidents_path, rca_path];

    if json {
        let json_path = out_dir.join(RESULTS_JSON);
        write_json(&json_path, incidents, results)?;
        written.push(json_path);
    }

    written.push(write_markdown_report(out_dir, incidents, results)?);
    written.extend(write_plots(out_dir, incidents, results)?);
    info!(out_dir = %out_dir.display(), files = written.len(), "artifacts written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{TopSignal, TopSignals};
    use crate::rca::run_rca;
    use crate::telemetry::Metric;
    use chrono::{Duration, TimeZone, Utc};

    fn incident(id: u32, severity: f64, metric: Metric) -> Incident {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Incident {
            incident_id: IncidentId::sequence(id),
            host: format!("host_{id:02}"),
            workload: "ai_train".to_string(),
            start_ts: start,
            end_ts: start + Duration::seconds(30),
            duration_sec: 31,
            top_signals: TopSignals::from_peaks(vec![TopSignal { metric, value: severity }]),
            event_hint: "NONE".to_string(),
            severity_score: severity,
        }
    }

    #[test]
    fn test_incidents_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INCIDENTS_CSV);
        let incidents = vec![incident(0, 12.5, Metric::EccCe), incident(1, 6.0, Metric::NetDrops)];
        write_incidents_csv(&path, &incidents).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("incident_id,host,workload,start_ts,end_ts,duration_sec,top_signals,event_hint,severity_score"));
        assert!(text.contains("INC_0000"));
        assert!(text.contains("ecc_ce:+12.5"));

        let back = read_incidents_csv(&path).unwrap();
        assert_eq!(back, incidents);
    }

    #[test]
    fn test_rca_csv_joins_rule_hits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RCA_CSV);
        let results = run_rca(&[incident(0, 9.0, Metric::EccCe)]);
        write_rca_csv(&path, &results).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("ecc_ce_high;workload=ai_train"));
    }

    #[test]
    fn test_markdown_for_empty_run() {
        let md = render_markdown(&[], &[]);
        assert!(md.contains("Total incidents detected: **0**"));
        assert!(md.contains("No incidents detected."));
    }

    #[test]
    fn test_markdown_lists_incidents_by_severity() {
        let incidents = vec![incident(0, 6.0, Metric::NetDrops), incident(1, 20.0, Metric::EccCe)];
        let results = run_rca(&incidents);
        let md = render_markdown(&incidents, &results);
        let first = md.find("| INC_0001 | host_01").unwrap();
        let second = md.find("| INC_0000 | host_00").unwrap();
        assert!(first < second);
        assert!(md.contains("**DRAM/ECC or memory-controller stress**: 1"));
        assert!(md.contains("### INC_0001 - DRAM/ECC or memory-controller stress (conf 0.46)"));
    }

    #[test]
    #[should_panic(expected = "has no incident")]
    fn test_markdown_rejects_orphan_result() {
        let results = run_rca(&[incident(7, 9.0, Metric::EccCe)]);
        render_markdown(&[incident(0, 9.0, Metric::EccCe)], &results);
    }

    #[test]
    fn test_write_all_creates_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let written = write_all(&out, &[], &[], true).unwrap();
        assert_eq!(written.len(), 6);
        assert!(written.iter().all(|p| p.exists()));
        assert!(out.join(SEVERITY_HIST_PNG).exists());
        assert!(out.join(ROOT_CAUSE_PNG).exists());
    }

    #[test]
    fn test_plots_for_populated_run() {
        let dir = tempfile::tempdir().unwrap();
        let incidents = vec![
            incident(0, 6.0, Metric::NetDrops),
            incident(1, 20.0, Metric::EccCe),
            incident(2, 50.0, Metric::PcieAer),
        ];
        let results = run_rca(&incidents);
        let written = write_plots(dir.path(), &incidents, &results).unwrap();
        assert_eq!(written, vec![dir.path().join(SEVERITY_HIST_PNG), dir.path().join(ROOT_CAUSE_PNG)]);
        for path in &written {
            let bytes = std::fs::read(path).unwrap();
            assert!(bytes.starts_with(b"\x89PNG"));
        }
    }

    #[test]
    fn test_severity_histogram_bins() {
        let incidents = vec![
            incident(0, 0.0, Metric::EccCe),
            incident(1, 5.0, Metric::EccCe),
            incident(2, 10.0, Metric::EccCe),
        ];
        let bins = severity_histogram(&incidents, 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins[0].count, 1);
        assert_eq!(bins[5].count, 1);
        // The top edge falls in the last bin.
        assert_eq!(bins[9].count, 1);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 3);

        let single = severity_histogram(&incidents[1..2], 10);
        assert_eq!(single[0].lo, 4.5);
        assert_eq!(single[9].hi, 5.5);
        assert!(severity_histogram(&[], 10).is_empty());
    }
}
