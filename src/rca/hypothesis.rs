//! Causal hypotheses and the weighted predicates that score them.

use crate::telemetry::Metric;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies a causal hypothesis independently of its display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisId {
    MemoryStress,
    PcieInstability,
    ThermalThrottling,
    NetworkCongestion,
}

/// What an incident looks like to the rules: parsed evidence plus context labels.
#[derive(Debug, Clone)]
pub struct Evidence<'a> {
    pub signals: HashMap<Metric, f64>,
    pub workload: &'a str,
    pub event_hint: &'a str,
}

impl Evidence<'_> {
    /// Signed peak for `metric`, 0.0 when the incident did not report it.
    pub fn signal(&self, metric: Metric) -> f64 {
        self.signals.get(&metric).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Condition {
    SignalAbove {
        metric: Metric,
        threshold: f64,
        rule: &'static str,
    },
    SignalBelow {
        metric: Metric,
        threshold: f64,
        rule: &'static str,
    },
    WorkloadIn(&'static [&'static str]),
    EventHint(&'static str),
}

/// A weighted boolean test. A weight of 0.0 records evidence without moving the score.
#[derive(Debug, Clone, Copy)]
pub struct Predicate {
    pub weight: f64,
    pub condition: Condition,
}

impl Predicate {
    pub fn fires(&self, evidence: &Evidence<'_>) -> bool {
        match self.condition {
            Condition::SignalAbove { metric, threshold, .. } => evidence.signal(metric) > threshold,
            Condition::SignalBelow { metric, threshold, .. } => evidence.signal(metric) < threshold,
            Condition::WorkloadIn(workloads) => workloads.contains(&evidence.workload),
            Condition::EventHint(hint) => evidence.event_hint == hint,
        }
    }

    /// Rule identifier recorded when the predicate fires.
    pub fn rule_name(&self, evidence: &Evidence<'_>) -> String {
        match self.condition {
            Condition::SignalAbove { rule, .. } | Condition::SignalBelow { rule, .. } => {
                rule.to_string()
            }
            Condition::WorkloadIn(_) => format!("workload={}", evidence.workload),
            Condition::EventHint(hint) => format!("event_hint={hint}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Hypothesis {
    pub id: HypothesisId,
    pub root_cause: &'static str,
    pub explanation: &'static str,
    pub predicates: Vec<Predicate>,
    pub validation: &'static str,
    pub mitigation: &'static str,
}

const HEAVY_WORKLOADS: &[&str] = &["ai_train", "video_transcode"];

fn above(metric: Metric, rule: &'static str, weight: f64) -> Predicate {
    Predicate {
        weight,
        condition: Condition::SignalAbove {
            metric,
            threshold: 4.0,
            rule,
        },
    }
}

fn when(condition: Condition, weight: f64) -> Predicate {
    Predicate { weight, condition }
}

/// The fixed hypothesis table. Order matters: ties go to the earlier entry.
pub fn default_hypotheses() -> Vec<Hypothesis> {
    vec![
        Hypothesis {
            id: HypothesisId::MemoryStress,
            root_cause: "DRAM/ECC or memory-controller stress",
            explanation: "ECC bursts + tail latency + high bandwidth suggest memory subsystem stress",
            predicates: vec![
                above(Metric::EccCe, "ecc_ce_high", 0.6),
                above(Metric::MemLatencyP99, "mem_latency_p99_high", 0.5),
                above(Metric::MemBw, "mem_bw_high", 0.3),
                when(Condition::WorkloadIn(HEAVY_WORKLOADS), 0.2),
                when(Condition::EventHint("DRAM_ECC"), 0.4),
            ],
            validation: "Reproduce under ai_train/video_transcode with sustained memory bandwidth; \
                collect ECC counters, mem latency histograms, bandwidth, and error addresses if available.",
            mitigation: "Check ECC thresholding, memory timing margins, and firmware; \
                add regression test for ECC burst + latency spike signature.",
        },
        Hypothesis {
            id: HypothesisId::PcieInstability,
            root_cause: "PCIe link instability / AER storm",
            explanation: "Elevated PCIe AER indicates link errors, retries, or device reset behavior",
            predicates: vec![
                above(Metric::PcieAer, "pcie_aer_high", 0.7),
                when(Condition::WorkloadIn(HEAVY_WORKLOADS), 0.3),
                when(Condition::EventHint("PCIE_AER"), 0.5),
            ],
            validation: "Run PCIe stress (high I/O, retries) and capture AER logs, link retrain counts, \
                and device reset events; compare across firmware versions.",
            mitigation: "Tune retry/timeout policies, verify link training stability, \
                add regression for AER storm signature and alerting thresholds.",
        },
        Hypothesis {
            id: HypothesisId::ThermalThrottling,
            root_cause: "Thermal throttling / power management",
            explanation: "Thermal excursion and frequency drop patterns suggest throttling",
            predicates: vec![
                above(Metric::TempC, "temp_high", 0.6),
                // Magnitude check on the signed peak; a throttling drop is negative and does not fire here.
                above(Metric::FreqGhz, "freq_excursion", 0.6),
                above(Metric::CpuUtil, "cpu_util_high", 0.2),
                when(Condition::EventHint("THERMAL"), 0.4),
                when(
                    Condition::SignalBelow {
                        metric: Metric::FreqGhz,
                        threshold: -4.0,
                        rule: "freq_drop",
                    },
                    0.0,
                ),
            ],
            validation: "Run sustained compute load; record temp, freq, perf counters; \
                verify throttling triggers and thermal headroom across racks.",
            mitigation: "Improve thermal policy/limits, ensure cooling and fan curves; \
                add regression for perf drop under thermal excursion signature.",
        },
        Hypothesis {
            id: HypothesisId::NetworkCongestion,
            root_cause: "Network congestion / queue saturation",
            explanation: "Drops + bursty networking workload indicates congestion or queue saturation",
            predicates: vec![
                above(Metric::NetDrops, "net_drops_high", 0.7),
                when(Condition::WorkloadIn(&["network_burst"]), 0.4),
                when(Condition::EventHint("NETWORK_CONGESTION"), 0.5),
            ],
            validation: "Generate bursty traffic; collect drops, queue depth (if modeled), retransmits; \
                verify congestion control behavior under peak load.",
            mitigation: "Tune queue thresholds and traffic shaping; \
                add regression test for drop spikes under network burst signature.",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence<'a>(signals: &[(Metric, f64)], workload: &'a str, event_hint: &'a str) -> Evidence<'a> {
        Evidence {
            signals: signals.iter().copied().collect(),
            workload,
            event_hint,
        }
    }

    #[test]
    fn test_table_order_and_ids() {
        let ids: Vec<_> = default_hypotheses().iter().map(|h| h.id).collect();
        assert_eq!(
            ids,
            vec![
                HypothesisId::MemoryStress,
                HypothesisId::PcieInstability,
                HypothesisId::ThermalThrottling,
                HypothesisId::NetworkCongestion,
            ]
        );
    }

    #[test]
    fn test_threshold_is_strict() {
        let p = above(Metric::EccCe, "ecc_ce_high", 0.6);
        assert!(!p.fires(&evidence(&[(Metric::EccCe, 4.0)], "idle", "NONE")));
        assert!(p.fires(&evidence(&[(Metric::EccCe, 4.1)], "idle", "NONE")));
        assert!(!p.fires(&evidence(&[], "idle", "NONE")));
    }

    #[test]
    fn test_rule_names() {
        let ev = evidence(&[], "ai_train", "DRAM_ECC");
        assert_eq!(when(Condition::WorkloadIn(HEAVY_WORKLOADS), 0.2).rule_name(&ev), "workload=ai_train");
        assert_eq!(when(Condition::EventHint("DRAM_ECC"), 0.4).rule_name(&ev), "event_hint=DRAM_ECC");
        assert_eq!(above(Metric::TempC, "temp_high", 0.6).rule_name(&ev), "temp_high");
    }
}
