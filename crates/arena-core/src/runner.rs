//! Episode loop runner with operator controls.
//!
//! This module provides [`run_episode`], the top-level async function that
//! drives the tick loop with support for:
//!
//! - **Registration**: agents join (or rejoin) through a control queue that
//!   is drained between ticks, never in the middle of one
//! - **Bounded episodes**: stop at the objective's time limit, a hard tick
//!   cap, or when the scenario reports completion
//! - **Pacing**: a fixed sleep between ticks from [`OperatorState`]
//! - **Operator stop**: in-flight exchanges are cancelled and the episode
//!   still ends with a full report
//!
//! The runner wraps the single-tick [`run_tick`] function and adds the
//! control plane around it.
//!
//! [`run_tick`]: crate::tick::run_tick

use std::time::Duration;

use arena_types::{
    AgentId, EpisodeEndReason, EpisodeId, EpisodeReport, Objective, Registration,
    RegistrationAck, ScoreReport,
};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::clock::TickClock;
use crate::config::{EpisodeConfig, ValidationConfig};
use crate::objective::{ObjectiveEngine, ObjectiveError};
use crate::operator::OperatorState;
use crate::scenario::ScenarioController;
use crate::session::SessionRegistry;
use crate::tick::{self, TickError, TickSettings, TickSummary};
use crate::transport::{self, AgentEndpoint, SessionChannel};
use crate::validation::{CapabilityRegistry, ValidationPolicy};

/// Errors that can occur during the episode run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The objective could not be loaded; the episode never started.
    #[error("objective error: {source}")]
    Objective {
        /// The underlying objective error.
        #[from]
        source: ObjectiveError,
    },

    /// A tick execution failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Errors seen by whoever submits control requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// The runner is gone or dropped the request unanswered.
    #[error("episode runner is not accepting control requests")]
    Closed,
}

// ---------------------------------------------------------------------------
// Control plane
// ---------------------------------------------------------------------------

/// A request handled by the runner between ticks.
#[derive(Debug)]
pub enum ControlRequest {
    /// Open a session for an agent.
    Register {
        /// The agent's id and declared tools.
        registration: Registration,
        /// Engine side of the agent's channels.
        channel: SessionChannel,
        /// Receives the acknowledgement.
        reply: oneshot::Sender<RegistrationAck>,
    },

    /// Mark an agent's session disconnected.
    Disconnect {
        /// The departing agent.
        agent_id: AgentId,
    },
}

/// Cloneable sender side of the control queue.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    sender: mpsc::Sender<ControlRequest>,
    channel_capacity: usize,
}

/// Create a control queue holding `control_capacity` pending requests.
/// Sessions opened through the handle get `channel_capacity` slots per
/// direction.
pub fn control_channel(
    control_capacity: usize,
    channel_capacity: usize,
) -> (ControlHandle, mpsc::Receiver<ControlRequest>) {
    let (sender, receiver) = mpsc::channel(control_capacity.max(1));
    (
        ControlHandle {
            sender,
            channel_capacity,
        },
        receiver,
    )
}

impl ControlHandle {
    /// Register an agent and wait for the runner's answer.
    ///
    /// The returned endpoint is only useful when the ack is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Closed`] if the runner is not running.
    pub async fn register(
        &self,
        registration: Registration,
    ) -> Result<(RegistrationAck, AgentEndpoint), ControlError> {
        let (channel, endpoint) = transport::channel(self.channel_capacity);
        let (reply, answer) = oneshot::channel();
        self.sender
            .send(ControlRequest::Register {
                registration,
                channel,
                reply,
            })
            .await
            .map_err(|_closed| ControlError::Closed)?;
        let ack = answer.await.map_err(|_dropped| ControlError::Closed)?;
        Ok((ack, endpoint))
    }

    /// Ask the runner to mark an agent disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Closed`] if the runner is not running.
    pub async fn disconnect(&self, agent_id: AgentId) -> Result<(), ControlError> {
        self.sender
            .send(ControlRequest::Disconnect { agent_id })
            .await
            .map_err(|_closed| ControlError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Settings and observer
// ---------------------------------------------------------------------------

/// Episode-wide exchange settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeSettings {
    /// How long each agent has to answer an observation.
    pub decision_timeout: Duration,
    /// Out-of-range parameter handling.
    pub policy: ValidationPolicy,
    /// Agents that must register before the first tick.
    pub min_agents: usize,
    /// Consecutive timeouts before a silent agent is disconnected
    /// (0 = never).
    pub disconnect_after_timeouts: u64,
}

impl EpisodeSettings {
    /// Settings from the loaded configuration sections.
    pub const fn from_config(episode: &EpisodeConfig, validation: &ValidationConfig) -> Self {
        Self {
            decision_timeout: Duration::from_millis(episode.decision_timeout_ms),
            policy: validation.policy,
            min_agents: episode.min_agents,
            disconnect_after_timeouts: episode.disconnect_after_timeouts,
        }
    }

    const fn tick_settings(&self) -> TickSettings {
        TickSettings {
            decision_timeout: self.decision_timeout,
            policy: self.policy,
        }
    }
}

/// Callback invoked as the episode progresses.
pub trait EpisodeObserver: Send {
    /// Called after a tick completes.
    fn on_tick(&mut self, summary: &TickSummary);

    /// Called once with the final report.
    fn on_episode_end(&mut self, _report: &EpisodeReport) {}
}

/// An observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl EpisodeObserver for NoOpObserver {
    fn on_tick(&mut self, _summary: &TickSummary) {}
}

// ---------------------------------------------------------------------------
// Episode loop
// ---------------------------------------------------------------------------

/// Run one episode until a termination condition is met.
///
/// The objective is validated before anything else; an invalid objective
/// means the episode never starts. Once started, every exit path other
/// than a tick error produces an [`EpisodeReport`] with a score for each
/// agent that ever registered, and each still-connected agent is sent its
/// own [`ScoreReport`].
///
/// # Errors
///
/// Returns [`RunnerError::Objective`] for an invalid objective, or
/// [`RunnerError::Tick`] if a tick fails unrecoverably.
pub async fn run_episode<S>(
    scenario: &mut S,
    objective: Objective,
    settings: &EpisodeSettings,
    control: &mut mpsc::Receiver<ControlRequest>,
    operator: &OperatorState,
    observer: &mut dyn EpisodeObserver,
) -> Result<EpisodeReport, RunnerError>
where
    S: ScenarioController + ?Sized,
{
    let engine = ObjectiveEngine::load(objective)?;
    let episode_id = EpisodeId::new();
    let started_at = Utc::now();
    let scenario_tools = scenario.capabilities();
    let tick_settings = settings.tick_settings();
    let mut clock = TickClock::new();
    let mut sessions = SessionRegistry::with_silence_limit(settings.disconnect_after_timeouts);

    info!(
        episode_id = %episode_id,
        scenario = scenario.name(),
        time_limit = engine.time_limit(),
        max_ticks = operator.max_ticks(),
        min_agents = settings.min_agents,
        tools = scenario_tools.len(),
        "Episode starting"
    );

    // --- Wait for agents ---
    while sessions.active_count() < settings.min_agents && !operator.is_stop_requested() {
        tokio::select! {
            biased;
            () = operator.stopped() => {}
            request = control.recv() => {
                let Some(request) = request else {
                    warn!("Control queue closed before enough agents registered");
                    break;
                };
                handle_control(request, &mut sessions, scenario, &scenario_tools, clock.tick());
            }
        }
    }

    let end_reason = loop {
        // --- Registrations and disconnects ---
        while let Ok(request) = control.try_recv() {
            handle_control(request, &mut sessions, scenario, &scenario_tools, clock.tick());
        }

        // --- Check termination (before tick) ---
        if operator.is_stop_requested() {
            info!(tick = clock.tick(), "Operator stop requested");
            break EpisodeEndReason::OperatorStop;
        }
        if clock.time_limit_reached(engine.time_limit()) {
            info!(tick = clock.tick(), time_limit = engine.time_limit(), "Time limit reached");
            break EpisodeEndReason::TimeLimitReached;
        }
        if operator.tick_limit_reached(clock.tick()) {
            info!(tick = clock.tick(), max_ticks = operator.max_ticks(), "Tick limit reached");
            break EpisodeEndReason::MaxTicksReached;
        }
        if scenario.is_complete() {
            info!(tick = clock.tick(), "Scenario complete");
            break EpisodeEndReason::ScenarioComplete;
        }

        // --- Execute tick ---
        let summary = tick::run_tick(
            &mut clock,
            scenario,
            &mut sessions,
            &engine,
            &tick_settings,
            operator,
        )
        .await?;

        // --- Notify observer ---
        observer.on_tick(&summary);

        // --- Sleep for tick interval ---
        let interval_ms = operator.tick_interval_ms();
        if interval_ms > 0 {
            tokio::select! {
                biased;
                () = operator.stopped() => {}
                () = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
            }
        }
    };

    // --- Final scoring ---
    let elapsed = clock.elapsed();
    let agents: Vec<ScoreReport> = sessions
        .tallies()
        .map(|(agent_id, tally)| {
            let progress = engine.progress(&scenario.metric_values(agent_id));
            ScoreReport {
                agent_id: agent_id.clone(),
                score: engine.evaluate(&progress, elapsed),
                tally: *tally,
            }
        })
        .collect();

    for score in &agents {
        if let Some(session) = sessions.get(&score.agent_id) {
            session.notify_episode_end(score.clone());
        }
    }

    let report = EpisodeReport {
        episode_id,
        scenario_name: scenario.name().to_owned(),
        end_reason,
        ticks: elapsed,
        started_at,
        ended_at: Utc::now(),
        agents,
    };
    log_episode_end(&report);
    observer.on_episode_end(&report);
    Ok(report)
}

fn handle_control<S>(
    request: ControlRequest,
    sessions: &mut SessionRegistry,
    scenario: &mut S,
    scenario_tools: &CapabilityRegistry,
    tick: u64,
) where
    S: ScenarioController + ?Sized,
{
    match request {
        ControlRequest::Register {
            registration,
            channel,
            reply,
        } => {
            let ack = match sessions.register(&registration, channel, scenario_tools, tick) {
                Ok(session_id) => {
                    scenario.on_agent_joined(&registration.agent_id);
                    RegistrationAck::accepted(session_id, tick)
                }
                Err(error) => RegistrationAck::rejected(error.to_string()),
            };
            if reply.send(ack).is_err() {
                debug!(agent_id = %registration.agent_id, "Registrant left before the ack");
            }
        }
        ControlRequest::Disconnect { agent_id } => {
            if let Err(error) = sessions.disconnect(&agent_id) {
                warn!(%error, "Ignored disconnect request");
            }
        }
    }
}

/// Log the episode end sequence.
pub fn log_episode_end(report: &EpisodeReport) {
    info!(
        episode_id = %report.episode_id,
        reason = ?report.end_reason,
        ticks = report.ticks,
        agents = report.agents.len(),
        "Episode ended"
    );

    if report.agents.is_empty() {
        warn!("Episode ended with no registered agents");
    }
    for agent in &report.agents {
        info!(
            agent_id = %agent.agent_id,
            total_score = agent.score.total_score,
            passed = agent.score.passed,
            timed_out = agent.score.timed_out,
            unmet_required = ?agent.score.unmet_required,
            applied = agent.tally.applied,
            misses = agent.tally.misses,
            "Final agent score"
        );
    }
}
