//! Explainable root-cause inference over detected incidents.
//!
//! Every hypothesis is a weighted sum of predicates over the incident's
//! evidence signals, event hint and workload. The best-scoring hypothesis
//! wins (earlier table entries win ties), its score is calibrated into a
//! bounded confidence, and its validation/mitigation playbook is attached.

pub mod hypothesis;

pub use hypothesis::{default_hypotheses, Evidence, Hypothesis, HypothesisId};

use crate::detect::{Incident, IncidentId, TopSignals};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

pub const MIN_CONFIDENCE: f64 = 0.30;
pub const MAX_CONFIDENCE: f64 = 0.95;
const CONFIDENCE_SLOPE: f64 = 0.20;

/// A hypothesis and the score it reached for one incident.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredHypothesis {
    pub hypothesis: HypothesisId,
    pub score: f64,
}

/// Diagnosis for one incident.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RcaResult {
    pub incident_id: IncidentId,
    pub hypothesis: HypothesisId,
    pub root_cause: String,
    pub confidence: f64,
    pub explanation: String,
    pub evidence_top_signals: String,
    /// Every rule that fired across all hypotheses, sorted and deduplicated.
    pub rule_hits: BTreeSet<String>,
    pub confidence_rationale: String,
    pub recommended_validation: String,
    pub recommended_mitigation: String,
    /// All hypotheses, best first.
    pub ranked_candidates: Vec<ScoredHypothesis>,
}

/// Map a winning hypothesis score into `[0.30, 0.95]`.
pub fn calibrate_confidence(best_score: f64) -> f64 {
    (MIN_CONFIDENCE + CONFIDENCE_SLOPE * best_score).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

pub struct RcaEngine {
    hypotheses: Vec<Hypothesis>,
}

impl Default for RcaEngine {
    fn default() -> Self {
        Self::new(default_hypotheses())
    }
}

impl RcaEngine {
    /// # Panics
    /// If `hypotheses` is empty.
    pub fn new(hypotheses: Vec<Hypothesis>) -> Self {
        assert!(!hypotheses.is_empty(), "RCA engine needs at least one hypothesis");
        Self { hypotheses }
    }

    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    pub fn rank(&self, incident: &Incident) -> RcaResult {
        // Rules see the evidence text as published on the incident, not the
        // raw peaks behind it.
        let evidence_text = incident.top_signals.as_str();
        let evidence = Evidence {
            signals: TopSignals::parse_lossy(evidence_text)
                .iter()
                .map(|s| (s.metric, s.value))
                .collect(),
            workload: &incident.workload,
            event_hint: &incident.event_hint,
        };

        let mut rule_hits = BTreeSet::new();
        let mut candidates = Vec::with_capacity(self.hypotheses.len());
        for h in &self.hypotheses {
            let mut score = 0.0;
            for p in &h.predicates {
                if p.fires(&evidence) {
                    score += p.weight;
                    rule_hits.insert(p.rule_name(&evidence));
                }
            }
            candidates.push(ScoredHypothesis {
                hypothesis: h.id,
                score,
            });
        }

        let mut best = 0;
        for (i, c) in candidates.iter().enumerate() {
            if c.score > candidates[best].score {
                best = i;
            }
        }
        let winner = &self.hypotheses[best];
        let best_score = candidates[best].score;

        // Stable: equal scores keep table order.
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let confidence = calibrate_confidence(best_score);
        debug!(
            incident = %incident.incident_id,
            hypothesis = ?winner.id,
            score = best_score,
            confidence,
            "incident ranked"
        );

        RcaResult {
            incident_id: incident.incident_id.clone(),
            hypothesis: winner.id,
            root_cause: winner.root_cause.to_string(),
            confidence,
            explanation: winner.explanation.to_string(),
            evidence_top_signals: evidence_text.to_string(),
            rule_hits,
            confidence_rationale: format!(
                "confidence=0.30+0.20*score(best={best_score:.2}) capped to [0.30,0.95]"
            ),
            recommended_validation: winner.validation.to_string(),
            recommended_mitigation: winner.mitigation.to_string(),
            ranked_candidates: candidates,
        }
    }

    /// One result per incident, in incident order.
    pub fn run(&self, incidents: &[Incident]) -> Vec<RcaResult> {
        let results: Vec<RcaResult> = incidents.iter().map(|i| self.rank(i)).collect();
        for (incident, result) in incidents.iter().zip(&results) {
            assert_eq!(
                incident.incident_id, result.incident_id,
                "RCA result out of step with its incident"
            );
        }
        info!(results = results.len(), "root-cause inference complete");
        results
    }
}

/// Rank every incident with the default hypothesis table.
pub fn run_rca(incidents: &[Incident]) -> Vec<RcaResult> {
    RcaEngine::default().run(incidents)
}
