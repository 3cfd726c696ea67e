//! Episode progress logging and report output.
//!
//! [`ReportObserver`] logs every tick at debug level and a running summary
//! at info level every few ticks. [`write_report`] stores the final
//! [`EpisodeReport`] as pretty JSON.

use std::path::Path;

use arena_core::runner::EpisodeObserver;
use arena_core::tick::TickSummary;
use arena_types::EpisodeReport;
use tracing::{debug, info};

use crate::error::EngineError;

/// Observer that logs episode progress.
#[derive(Debug, Clone, Default)]
pub struct ReportObserver {
    /// Log a summary every this many ticks (0 = never).
    summary_every: u64,
    ticks: u64,
    applied: u64,
    misses: u64,
    stale_dropped: u64,
}

impl ReportObserver {
    /// An observer that logs a summary every `summary_every` ticks.
    pub const fn new(summary_every: u64) -> Self {
        Self {
            summary_every,
            ticks: 0,
            applied: 0,
            misses: 0,
            stale_dropped: 0,
        }
    }
}

impl EpisodeObserver for ReportObserver {
    fn on_tick(&mut self, summary: &TickSummary) {
        let applied = u64::try_from(summary.applied_count()).unwrap_or(u64::MAX);
        let misses = u64::try_from(summary.miss_count()).unwrap_or(u64::MAX);
        self.ticks = self.ticks.saturating_add(1);
        self.applied = self.applied.saturating_add(applied);
        self.misses = self.misses.saturating_add(misses);
        self.stale_dropped = self.stale_dropped.saturating_add(summary.stale_dropped);

        debug!(
            tick = summary.tick,
            agents = summary.results.len(),
            applied,
            misses,
            stale_dropped = summary.stale_dropped,
            "Tick complete"
        );

        if self.summary_every > 0 && summary.tick.checked_rem(self.summary_every) == Some(0) {
            info!(
                tick = summary.tick,
                applied = self.applied,
                misses = self.misses,
                stale_dropped = self.stale_dropped,
                "Episode progress"
            );
        }
    }

    fn on_episode_end(&mut self, report: &EpisodeReport) {
        let passed = report
            .agents
            .iter()
            .filter(|agent| agent.score.passed)
            .count();
        info!(
            ticks = self.ticks,
            applied = self.applied,
            misses = self.misses,
            passed,
            agents = report.agents.len(),
            "Episode totals"
        );
    }
}

/// Write `report` to `path` as pretty JSON.
///
/// # Errors
///
/// Returns [`EngineError::Report`] if serialization or the write fails.
pub fn write_report(path: &Path, report: &EpisodeReport) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(report).map_err(|e| EngineError::Report {
        message: format!("failed to serialize episode report: {e}"),
    })?;
    std::fs::write(path, json).map_err(|e| EngineError::Report {
        message: format!("failed to write episode report to {}: {e}", path.display()),
    })?;
    info!(path = %path.display(), "Episode report written");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use arena_types::{
        AgentId, AgentTally, Decision, EpisodeEndReason, EpisodeId, ScoreReport, ScoreResult,
        ValidatedDecision,
    };
    use chrono::Utc;

    use arena_core::tick::AgentTickResult;

    use super::*;

    fn summary(tick: u64) -> TickSummary {
        TickSummary {
            tick,
            results: BTreeMap::from([(
                AgentId::from("a"),
                AgentTickResult {
                    decision: ValidatedDecision::accepted(Decision::new("collect")),
                    miss: None,
                    outcome: None,
                },
            )]),
            stale_dropped: 1,
        }
    }

    fn report() -> EpisodeReport {
        EpisodeReport {
            episode_id: EpisodeId::new(),
            scenario_name: "foraging".to_owned(),
            end_reason: EpisodeEndReason::ScenarioComplete,
            ticks: 2,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            agents: vec![ScoreReport {
                agent_id: AgentId::from("a"),
                score: ScoreResult::default(),
                tally: AgentTally::default(),
            }],
        }
    }

    #[test]
    fn observer_accumulates_ticks() {
        let mut observer = ReportObserver::new(1);
        observer.on_tick(&summary(1));
        observer.on_tick(&summary(2));
        assert_eq!(observer.ticks, 2);
        assert_eq!(observer.applied, 2);
        assert_eq!(observer.misses, 0);
        assert_eq!(observer.stale_dropped, 2);
    }

    #[test]
    fn report_is_written_as_json() {
        let path = std::env::temp_dir().join(format!("arena-report-{}.json", EpisodeId::new()));
        let report = report();
        write_report(&path, &report).unwrap();

        let written: EpisodeReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, report);
        std::fs::remove_file(&path).unwrap();
    }
}
