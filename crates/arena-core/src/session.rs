//! Agent sessions and the session registry.
//!
//! A session binds an agent id to its transport channel and tracks where it
//! is in the exchange cycle:
//!
//! ```text
//! (none) --register--> Registered --exchange--> AwaitingDecision
//!                          ^                        |      |
//!                          +---timeout / schema-----+      | decision
//!                                                          v
//!                      AwaitingDecision <--exchange--- Applied
//!
//! any state --hang-up / disconnect--> Disconnected
//! ```
//!
//! A session that times out on too many exchanges in a row (the registry's
//! silence limit) is also marked `Disconnected`. An agent process that died
//! without saying goodbye can then register again under the same id.
//!
//! A disconnected session stays in the registry until the same agent id
//! registers again, which replaces it. Per-agent tallies are kept apart
//! from sessions so they survive reconnection.

use std::collections::BTreeMap;
use std::time::Duration;

use arena_types::{
    AgentId, AgentTally, Observation, Registration, ScoreReport, SessionId, SessionState,
};
use tracing::{info, warn};

use crate::operator::OperatorState;
use crate::transport::{Exchange, ExchangeError, SessionChannel};
use crate::validation::CapabilityRegistry;

/// Errors from session bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The agent already has a live session.
    #[error("agent {agent_id} is already registered")]
    DuplicateRegistration {
        /// The agent.
        agent_id: AgentId,
    },

    /// No session exists for the agent.
    #[error("agent {agent_id} is not registered")]
    UnknownAgent {
        /// The agent.
        agent_id: AgentId,
    },

    /// The session is disconnected.
    #[error("agent {agent_id} is disconnected")]
    Disconnected {
        /// The agent.
        agent_id: AgentId,
    },
}

/// One registered agent.
#[derive(Debug)]
pub struct AgentSession {
    id: SessionId,
    agent_id: AgentId,
    state: SessionState,
    channel: SessionChannel,
    capabilities: CapabilityRegistry,
    registered_at_tick: u64,
    consecutive_timeouts: u64,
    silence_limit: u64,
}

impl AgentSession {
    /// Create a session in the `Registered` state.
    pub fn new(
        agent_id: AgentId,
        channel: SessionChannel,
        capabilities: CapabilityRegistry,
        registered_at_tick: u64,
    ) -> Self {
        Self {
            id: SessionId::new(),
            agent_id,
            state: SessionState::Registered,
            channel,
            capabilities,
            registered_at_tick,
            consecutive_timeouts: 0,
            silence_limit: 0,
        }
    }

    /// Disconnect after `limit` consecutive timeouts (0 = never).
    #[must_use]
    pub const fn with_silence_limit(mut self, limit: u64) -> Self {
        self.silence_limit = limit;
        self
    }

    /// Timeouts since the last answer from the agent.
    pub const fn consecutive_timeouts(&self) -> u64 {
        self.consecutive_timeouts
    }

    /// Session identifier.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// The agent bound to this session.
    pub const fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Current state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session can take part in exchanges.
    pub const fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Tools this agent may use.
    pub const fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Tick at which the session was created.
    pub const fn registered_at_tick(&self) -> u64 {
        self.registered_at_tick
    }

    /// Run one exchange and move the state machine accordingly.
    ///
    /// A disconnected session returns [`ExchangeError::Disconnected`]
    /// without touching the channel.
    pub async fn exchange(
        &mut self,
        observation: Observation,
        timeout: Duration,
        operator: &OperatorState,
    ) -> Exchange {
        if !self.is_active() {
            return Exchange {
                result: Err(ExchangeError::Disconnected {
                    agent_id: self.agent_id.clone(),
                }),
                stale_dropped: 0,
            };
        }

        self.state = SessionState::AwaitingDecision;
        let exchange = self.channel.exchange(observation, timeout, operator).await;

        self.state = match &exchange.result {
            // Stays awaiting until the decision is applied.
            Ok(_) => {
                self.consecutive_timeouts = 0;
                SessionState::AwaitingDecision
            }
            Err(ExchangeError::Disconnected { .. }) => {
                info!(agent_id = %self.agent_id, session_id = %self.id, "Agent disconnected");
                SessionState::Disconnected
            }
            Err(ExchangeError::Timeout { .. }) => {
                self.consecutive_timeouts = self.consecutive_timeouts.saturating_add(1);
                if self.silence_limit > 0 && self.consecutive_timeouts >= self.silence_limit {
                    warn!(
                        agent_id = %self.agent_id,
                        session_id = %self.id,
                        timeouts = self.consecutive_timeouts,
                        "Agent silent, marking disconnected"
                    );
                    SessionState::Disconnected
                } else {
                    SessionState::Registered
                }
            }
            Err(ExchangeError::Schema { .. }) => {
                self.consecutive_timeouts = 0;
                SessionState::Registered
            }
            Err(ExchangeError::Cancelled { .. }) => SessionState::Registered,
        };
        exchange
    }

    /// Record that this tick's decision was applied.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Disconnected`] if the session went away; the
    /// caller must drop the decision's effect.
    pub fn mark_applied(&mut self) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::Disconnected {
                agent_id: self.agent_id.clone(),
            });
        }
        self.state = SessionState::Applied;
        Ok(())
    }

    /// Return to `Registered` after a decision that was not applied.
    pub fn mark_unapplied(&mut self) {
        if self.is_active() {
            self.state = SessionState::Registered;
        }
    }

    /// Mark the session disconnected.
    pub fn disconnect(&mut self) {
        self.state = SessionState::Disconnected;
    }

    /// Send the end-of-episode notice, if still connected.
    pub fn notify_episode_end(&self, report: ScoreReport) {
        if self.is_active() {
            self.channel.notify_episode_end(report);
        }
    }
}

/// All sessions of an episode plus per-agent tallies.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<AgentId, AgentSession>,
    tallies: BTreeMap<AgentId, AgentTally>,
    silence_limit: u64,
}

impl SessionRegistry {
    /// An empty registry whose sessions are never dropped for silence.
    pub const fn new() -> Self {
        Self::with_silence_limit(0)
    }

    /// An empty registry whose sessions disconnect after `limit`
    /// consecutive timeouts (0 = never).
    pub const fn with_silence_limit(limit: u64) -> Self {
        Self {
            sessions: BTreeMap::new(),
            tallies: BTreeMap::new(),
            silence_limit: limit,
        }
    }

    /// Register an agent.
    ///
    /// The effective capability registry is `scenario_tools` narrowed to
    /// the declared names. A disconnected session for the same agent id is
    /// replaced and counted as a reconnection.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DuplicateRegistration`] if the agent already
    /// has a live session; the existing session stays authoritative.
    pub fn register(
        &mut self,
        registration: &Registration,
        channel: SessionChannel,
        scenario_tools: &CapabilityRegistry,
        current_tick: u64,
    ) -> Result<SessionId, SessionError> {
        let agent_id = registration.agent_id.clone();
        let reconnecting = match self.sessions.get(&agent_id) {
            Some(existing) if existing.is_active() && !existing.channel.is_closed() => {
                warn!(agent_id = %agent_id, "Rejected duplicate registration");
                return Err(SessionError::DuplicateRegistration { agent_id });
            }
            Some(_) => true,
            None => false,
        };

        let capabilities = scenario_tools.restrict_to(registration.declared_tools());
        let session = AgentSession::new(agent_id.clone(), channel, capabilities, current_tick)
            .with_silence_limit(self.silence_limit);
        let session_id = session.id();

        let tally = self.tallies.entry(agent_id.clone()).or_default();
        if reconnecting {
            tally.reconnections = tally.reconnections.saturating_add(1);
        }

        info!(
            agent_id = %agent_id,
            session_id = %session_id,
            tick = current_tick,
            tools = session.capabilities().len(),
            reconnecting,
            "Agent registered"
        );
        self.sessions.insert(agent_id, session);
        Ok(session_id)
    }

    /// Mark an agent's session disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownAgent`] if the agent never registered.
    pub fn disconnect(&mut self, agent_id: &AgentId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(agent_id)
            .ok_or_else(|| SessionError::UnknownAgent {
                agent_id: agent_id.clone(),
            })?;
        session.disconnect();
        info!(agent_id = %agent_id, "Agent session disconnected");
        Ok(())
    }

    /// Session for an agent.
    pub fn get(&self, agent_id: &AgentId) -> Option<&AgentSession> {
        self.sessions.get(agent_id)
    }

    /// Mutable session for an agent.
    pub fn get_mut(&mut self, agent_id: &AgentId) -> Option<&mut AgentSession> {
        self.sessions.get_mut(agent_id)
    }

    /// Current state of an agent's session; `None` if unregistered.
    pub fn state(&self, agent_id: &AgentId) -> Option<SessionState> {
        self.sessions.get(agent_id).map(AgentSession::state)
    }

    /// All sessions in agent id order.
    pub fn sessions(&self) -> impl Iterator<Item = &AgentSession> {
        self.sessions.values()
    }

    /// All sessions in agent id order, mutably.
    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut AgentSession> {
        self.sessions.values_mut()
    }

    /// Number of sessions that are not disconnected.
    pub fn active_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_active()).count()
    }

    /// Number of agents that ever registered.
    pub fn len(&self) -> usize {
        self.tallies.len()
    }

    /// Whether no agent ever registered.
    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    /// Tally for an agent.
    pub fn tally(&self, agent_id: &AgentId) -> Option<&AgentTally> {
        self.tallies.get(agent_id)
    }

    /// Mutable tally for an agent, created on first use.
    pub fn tally_mut(&mut self, agent_id: &AgentId) -> &mut AgentTally {
        self.tallies.entry(agent_id.clone()).or_default()
    }

    /// Every agent that ever registered, with its tally, in id order.
    pub fn tallies(&self) -> impl Iterator<Item = (&AgentId, &AgentTally)> {
        self.tallies.iter()
    }
}
