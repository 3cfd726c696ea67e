//! Tick cycle: one round of observe, decide, validate, apply.
//!
//! Each tick runs through these phases:
//!
//! 1. **World Wake** -- advance the clock by exactly one and let the
//!    scenario update world state.
//! 2. **Observation** -- build an [`Observation`] per connected agent from
//!    the scenario's world fields, the objective, and fresh progress.
//! 3. **Exchange** -- send every observation and wait for the decisions.
//!    Agents are awaited concurrently, each bounded by the decision
//!    timeout, so one silent agent never delays the rest beyond it.
//! 4. **Resolution** -- validate each decision, apply it through the
//!    scenario, and record misses. Anything that is not a valid decision
//!    becomes an annotated idle.
//!
//! World state is only mutated in phase 1 (by the scenario itself) and
//! through `apply_decision` in phase 4.

use std::collections::BTreeMap;
use std::time::Duration;

use arena_types::{AgentId, MissKind, Observation, ValidatedDecision};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::clock::{ClockError, TickClock};
use crate::objective::ObjectiveEngine;
use crate::operator::OperatorState;
use crate::scenario::ScenarioController;
use crate::session::SessionRegistry;
use crate::tools::ToolOutcome;
use crate::transport::{Exchange, ExchangeError};
use crate::validation::{self, ObservationContext, ValidationPolicy};

/// Errors that can occur during tick execution.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },
}

/// Per-tick exchange settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSettings {
    /// How long each agent has to answer.
    pub decision_timeout: Duration,
    /// Out-of-range parameter handling.
    pub policy: ValidationPolicy,
}

/// What happened to one agent on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTickResult {
    /// The decision that was (or would have been) applied.
    pub decision: ValidatedDecision,
    /// Why the agent's own decision was not applied, if it was not.
    pub miss: Option<MissKind>,
    /// Result of applying `decision`; `None` when nothing was applied.
    pub outcome: Option<ToolOutcome>,
}

impl AgentTickResult {
    /// Whether the agent's own decision was applied.
    pub const fn applied(&self) -> bool {
        self.miss.is_none()
    }
}

/// Summary of a completed tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    /// The tick number that was executed.
    pub tick: u64,
    /// Per-agent results, in agent id order.
    pub results: BTreeMap<AgentId, AgentTickResult>,
    /// Late responses discarded during this tick.
    pub stale_dropped: u64,
}

impl TickSummary {
    /// Agents whose own decision was applied.
    pub fn applied_count(&self) -> usize {
        self.results.values().filter(|r| r.applied()).count()
    }

    /// Agents that fell back to idle.
    pub fn miss_count(&self) -> usize {
        self.results.values().filter(|r| !r.applied()).count()
    }
}

/// Execute one complete tick.
pub async fn run_tick<S>(
    clock: &mut TickClock,
    scenario: &mut S,
    sessions: &mut SessionRegistry,
    engine: &ObjectiveEngine,
    settings: &TickSettings,
    operator: &OperatorState,
) -> Result<TickSummary, TickError>
where
    S: ScenarioController + ?Sized,
{
    // --- Phase 1: World Wake ---
    let tick = clock.advance()?;
    scenario.tick_world(tick);
    debug!(tick, agents = sessions.active_count(), "Tick started");

    // --- Phase 2: Observation ---
    let mut observations = phase_observation(tick, scenario, sessions, engine);

    // --- Phase 3: Exchange ---
    let exchanges: Vec<(AgentId, Exchange)> = join_all(sessions.sessions_mut().filter_map(
        |session| {
            let observation = observations.remove(session.agent_id())?;
            Some(async move {
                let exchange = session
                    .exchange(observation, settings.decision_timeout, operator)
                    .await;
                (session.agent_id().clone(), exchange)
            })
        },
    ))
    .await;

    // --- Phase 4: Resolution ---
    let mut results = BTreeMap::new();
    let mut stale_dropped: u64 = 0;
    let context_bounds = scenario.world_bounds();

    for (agent_id, exchange) in exchanges {
        stale_dropped = stale_dropped.saturating_add(exchange.stale_dropped);
        let tally = sessions.tally_mut(&agent_id);
        tally.stale_dropped = tally.stale_dropped.saturating_add(exchange.stale_dropped);

        let context = ObservationContext {
            tick,
            agent_id: agent_id.clone(),
            world_bounds: context_bounds,
            policy: settings.policy,
        };
        let result = resolve(scenario, sessions, &context, exchange.result);
        results.insert(agent_id, result);
    }

    // Sessions that were already disconnected get a miss without an
    // exchange.
    let absent: Vec<AgentId> = sessions
        .sessions()
        .filter(|s| !s.is_active() && !results.contains_key(s.agent_id()))
        .map(|s| s.agent_id().clone())
        .collect();
    for agent_id in absent {
        record_miss(sessions, &agent_id, MissKind::Disconnected);
        results.insert(
            agent_id,
            AgentTickResult {
                decision: ValidatedDecision::fallback_idle("Agent disconnected"),
                miss: Some(MissKind::Disconnected),
                outcome: None,
            },
        );
    }

    let summary = TickSummary {
        tick,
        results,
        stale_dropped,
    };
    info!(
        tick,
        applied = summary.applied_count(),
        misses = summary.miss_count(),
        stale_dropped,
        "Tick completed"
    );
    Ok(summary)
}

/// Phase 2: one observation per connected agent.
fn phase_observation<S>(
    tick: u64,
    scenario: &S,
    sessions: &SessionRegistry,
    engine: &ObjectiveEngine,
) -> BTreeMap<AgentId, Observation>
where
    S: ScenarioController + ?Sized,
{
    sessions
        .sessions()
        .filter(|session| session.is_active())
        .map(|session| {
            let agent_id = session.agent_id();
            let observation = Observation {
                tick,
                agent_id: agent_id.clone(),
                scenario_name: scenario.name().to_owned(),
                objective: engine.objective().clone(),
                current_progress: engine.progress(&scenario.metric_values(agent_id)),
                world: scenario.observation_base(agent_id),
            };
            (agent_id.clone(), observation)
        })
        .collect()
}

/// Phase 4 for one agent.
fn resolve<S>(
    scenario: &mut S,
    sessions: &mut SessionRegistry,
    context: &ObservationContext,
    exchanged: Result<arena_types::Decision, ExchangeError>,
) -> AgentTickResult
where
    S: ScenarioController + ?Sized,
{
    let agent_id = &context.agent_id;

    let decision = match exchanged {
        Ok(decision) => decision,
        Err(error) => {
            let miss = miss_kind(&error);
            if miss == MissKind::Disconnected {
                record_miss(sessions, agent_id, miss);
                return AgentTickResult {
                    decision: ValidatedDecision::fallback_idle(error.to_string()),
                    miss: Some(miss),
                    outcome: None,
                };
            }
            warn!(tick = context.tick, agent_id = %agent_id, %error, "Decision missing, idling");
            return idle_fallback(scenario, sessions, agent_id, miss, error.to_string());
        }
    };

    let Some(session) = sessions.get(agent_id) else {
        return idle_fallback(
            scenario,
            sessions,
            agent_id,
            MissKind::Disconnected,
            "Unknown session".to_owned(),
        );
    };
    let (validated, rejection) =
        match validation::validate_or_idle(decision, session.capabilities(), context) {
            (validated, None) => match scenario.check_decision(agent_id, &validated) {
                Ok(()) => (validated, None),
                Err(reason) => (
                    ValidatedDecision::fallback_idle(format!("Rejected: {reason}")),
                    Some(reason),
                ),
            },
            rejected => rejected,
        };

    if let Some(reason) = rejection {
        warn!(tick = context.tick, agent_id = %agent_id, %reason, "Decision rejected, idling");
        let tally = sessions.tally_mut(agent_id);
        tally.validation_rejections = tally.validation_rejections.saturating_add(1);
        if let Some(session) = sessions.get_mut(agent_id) {
            session.mark_unapplied();
        }
        record_miss(sessions, agent_id, MissKind::Rejected);
        let outcome = scenario.apply_decision(agent_id, &validated);
        return AgentTickResult {
            decision: validated,
            miss: Some(MissKind::Rejected),
            outcome: Some(outcome),
        };
    }

    let marked = sessions
        .get_mut(agent_id)
        .map_or(Ok(()), |session| session.mark_applied());
    if let Err(error) = marked {
        warn!(agent_id = %agent_id, %error, "Dropped decision for disconnected session");
        record_miss(sessions, agent_id, MissKind::Disconnected);
        return AgentTickResult {
            decision: validated,
            miss: Some(MissKind::Disconnected),
            outcome: None,
        };
    }

    if !validated.clamped.is_empty() {
        debug!(agent_id = %agent_id, clamped = ?validated.clamped, "Clamped parameters");
    }
    let outcome = scenario.apply_decision(agent_id, &validated);
    let tally = sessions.tally_mut(agent_id);
    tally.applied = tally.applied.saturating_add(1);
    debug!(
        tick = context.tick,
        agent_id = %agent_id,
        tool = validated.tool(),
        success = outcome.success,
        "Decision applied"
    );

    AgentTickResult {
        decision: validated,
        miss: None,
        outcome: Some(outcome),
    }
}

/// Apply an annotated idle in place of a missing decision.
fn idle_fallback<S>(
    scenario: &mut S,
    sessions: &mut SessionRegistry,
    agent_id: &AgentId,
    miss: MissKind,
    reason: String,
) -> AgentTickResult
where
    S: ScenarioController + ?Sized,
{
    record_miss(sessions, agent_id, miss);
    let decision = ValidatedDecision::fallback_idle(reason);
    let outcome = scenario.apply_decision(agent_id, &decision);
    AgentTickResult {
        decision,
        miss: Some(miss),
        outcome: Some(outcome),
    }
}

fn record_miss(sessions: &mut SessionRegistry, agent_id: &AgentId, miss: MissKind) {
    let tally = sessions.tally_mut(agent_id);
    tally.misses = tally.misses.saturating_add(1);
    match miss {
        MissKind::Timeout => tally.timeouts = tally.timeouts.saturating_add(1),
        MissKind::Schema => tally.schema_errors = tally.schema_errors.saturating_add(1),
        MissKind::Rejected | MissKind::Disconnected | MissKind::Cancelled => {}
    }
}

const fn miss_kind(error: &ExchangeError) -> MissKind {
    match error {
        ExchangeError::Timeout { .. } => MissKind::Timeout,
        ExchangeError::Schema { .. } => MissKind::Schema,
        ExchangeError::Disconnected { .. } => MissKind::Disconnected,
        ExchangeError::Cancelled { .. } => MissKind::Cancelled,
    }
}
