//! Scoring results and the end-of-episode report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::EpisodeEndReason;
use crate::ids::{AgentId, EpisodeId};

/// Result of scoring one agent's progress against the objective.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ScoreResult {
    /// Metric name to score in `[0, 100]`.
    pub per_metric_scores: BTreeMap<String, f64>,
    /// Weighted average of the per-metric scores, in `[0, 100]`.
    pub total_score: f64,
    /// Whether the objective was passed.
    pub passed: bool,
    /// Required metrics that did not meet their target, in name order.
    #[serde(default)]
    pub unmet_required: Vec<String>,
    /// Whether the time limit was exceeded. A timed-out result never passes.
    #[serde(default)]
    pub timed_out: bool,
}

/// Per-agent exchange counters kept for the whole episode.
///
/// Keyed by agent id, not session, so the numbers survive reconnection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentTally {
    /// Decisions validated and applied to the world.
    pub applied: u64,
    /// Ticks on which an idle fallback was used instead.
    pub misses: u64,
    /// Exchanges that hit the decision timeout.
    pub timeouts: u64,
    /// Decisions that could not be decoded.
    pub schema_errors: u64,
    /// Decisions rejected by the validator.
    pub validation_rejections: u64,
    /// Late decisions for an earlier tick that were discarded.
    pub stale_dropped: u64,
    /// Re-registrations after a disconnect.
    pub reconnections: u64,
}

impl AgentTally {
    /// Fraction of counted ticks on which a decision was applied, in `[0, 1]`.
    pub fn applied_ratio(&self) -> f64 {
        let total = self.applied.saturating_add(self.misses);
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.applied as f64 / total as f64;
        ratio
    }
}

/// Final score and exchange statistics for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ScoreReport {
    /// The scored agent.
    pub agent_id: AgentId,
    /// The agent's score.
    #[serde(flatten)]
    pub score: ScoreResult,
    /// Exchange statistics.
    pub tally: AgentTally,
}

/// Everything emitted when an episode ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EpisodeReport {
    /// The episode.
    pub episode_id: EpisodeId,
    /// Name of the scenario that ran.
    pub scenario_name: String,
    /// Why the episode ended.
    pub end_reason: EpisodeEndReason,
    /// Number of ticks that completed.
    pub ticks: u64,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub ended_at: DateTime<Utc>,
    /// One entry per agent that ever registered, in agent id order.
    pub agents: Vec<ScoreReport>,
}

impl EpisodeReport {
    /// Report for a single agent, if it took part.
    pub fn agent(&self, agent_id: &AgentId) -> Option<&ScoreReport> {
        self.agents.iter().find(|report| &report.agent_id == agent_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn score_report_flattens_score_fields() {
        let report = ScoreReport {
            agent_id: AgentId::from("forager_1"),
            score: ScoreResult {
                per_metric_scores: BTreeMap::from([("resources_collected".to_owned(), 50.0)]),
                total_score: 50.0,
                passed: false,
                unmet_required: vec!["resources_collected".to_owned()],
                timed_out: false,
            },
            tally: AgentTally::default(),
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["total_score"], json!(50.0));
        assert_eq!(value["passed"], json!(false));
        assert_eq!(value["unmet_required"], json!(["resources_collected"]));
        assert_eq!(value["tally"]["applied"], json!(0));
    }

    #[test]
    fn applied_ratio_handles_empty_tally() {
        assert!(AgentTally::default().applied_ratio().abs() < f64::EPSILON);

        let tally = AgentTally {
            applied: 3,
            misses: 1,
            ..AgentTally::default()
        };
        assert!((tally.applied_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
