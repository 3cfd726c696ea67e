//! Per-session message channels and the bounded decision exchange.
//!
//! Each session owns one pair of bounded `mpsc` channels: observations go
//! out, decisions come back. A concrete carrier (the NATS bridge in the
//! engine binary, or [`spawn_local_agent`] in-process) sits on the
//! [`AgentEndpoint`] side and pumps messages across.
//!
//! # Exchange
//!
//! [`SessionChannel::exchange`] sends one observation and waits for the
//! decision tagged with the same tick. While waiting it:
//!
//! - drops decisions tagged with any other tick (stale responses from a
//!   tick that already timed out),
//! - resolves with [`ExchangeError::Schema`] on a malformed message for the
//!   current or an unknown tick,
//! - resolves with [`ExchangeError::Timeout`] at the deadline,
//! - resolves with [`ExchangeError::Cancelled`] as soon as the operator
//!   requests a stop,
//! - resolves with [`ExchangeError::Disconnected`] if the carrier hangs up.
//!
//! Taking `&mut self` means one session can only have one exchange in
//! flight; exchanges on different sessions run concurrently.

use std::time::Duration;

use arena_types::{AgentId, Decision, DecisionMessage, Observation, ScoreReport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::operator::OperatorState;

/// Message from the engine to an agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// The observation for one tick.
    Observation(Box<Observation>),
    /// The episode is over; carries the agent's final score.
    EpisodeEnded(Box<ScoreReport>),
}

/// Message from an agent to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A decoded decision.
    Decision(DecisionMessage),
    /// A message that could not be decoded.
    Malformed {
        /// Tick the message claimed to answer, when it could be read.
        tick: Option<u64>,
        /// Decode error.
        error: String,
    },
}

/// Why an exchange produced no decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// No decision arrived before the deadline.
    #[error("agent {agent_id} timed out on tick {tick} after {timeout_ms}ms")]
    Timeout {
        /// The silent agent.
        agent_id: AgentId,
        /// The tick that went unanswered.
        tick: u64,
        /// The budget that elapsed.
        timeout_ms: u64,
    },

    /// The agent answered with something that could not be decoded.
    #[error("agent {agent_id} sent a malformed decision on tick {tick}: {error}")]
    Schema {
        /// The agent.
        agent_id: AgentId,
        /// The tick being answered.
        tick: u64,
        /// Decode error.
        error: String,
    },

    /// The carrier hung up.
    #[error("agent {agent_id} disconnected")]
    Disconnected {
        /// The agent.
        agent_id: AgentId,
    },

    /// The episode ended while waiting.
    #[error("exchange with agent {agent_id} cancelled by episode end")]
    Cancelled {
        /// The agent.
        agent_id: AgentId,
    },
}

/// Result of one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    /// The decision, or why there is none.
    pub result: Result<Decision, ExchangeError>,
    /// Responses for other ticks discarded while waiting.
    pub stale_dropped: u64,
}

/// Engine side of a session's channels.
#[derive(Debug)]
pub struct SessionChannel {
    outbound: mpsc::Sender<Outbound>,
    inbound: mpsc::Receiver<Inbound>,
}

/// Agent side of a session's channels.
#[derive(Debug)]
pub struct AgentEndpoint {
    observations: mpsc::Receiver<Outbound>,
    decisions: mpsc::Sender<Inbound>,
}

/// Create a connected pair of session channels with `capacity` slots in
/// each direction.
pub fn channel(capacity: usize) -> (SessionChannel, AgentEndpoint) {
    let capacity = capacity.max(1);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let (in_tx, in_rx) = mpsc::channel(capacity);
    (
        SessionChannel {
            outbound: out_tx,
            inbound: in_rx,
        },
        AgentEndpoint {
            observations: out_rx,
            decisions: in_tx,
        },
    )
}

impl SessionChannel {
    /// Whether the agent side has gone away.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Send `observation` and wait up to `timeout` for the matching
    /// decision.
    pub async fn exchange(
        &mut self,
        observation: Observation,
        timeout: Duration,
        operator: &OperatorState,
    ) -> Exchange {
        let tick = observation.tick;
        let agent_id = observation.agent_id.clone();
        let deadline = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(Instant::now);
        let mut stale_dropped: u64 = 0;

        if operator.is_stop_requested() {
            return Exchange {
                result: Err(ExchangeError::Cancelled { agent_id }),
                stale_dropped,
            };
        }

        let result = tokio::select! {
            biased;
            () = operator.stopped() => Err(ExchangeError::Cancelled {
                agent_id: agent_id.clone(),
            }),
            waited = tokio::time::timeout_at(
                deadline,
                self.send_and_wait(observation, &agent_id, &mut stale_dropped),
            ) => waited.unwrap_or_else(|_elapsed| {
                Err(ExchangeError::Timeout {
                    agent_id: agent_id.clone(),
                    tick,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }),
        };

        Exchange {
            result,
            stale_dropped,
        }
    }

    async fn send_and_wait(
        &mut self,
        observation: Observation,
        agent_id: &AgentId,
        stale_dropped: &mut u64,
    ) -> Result<Decision, ExchangeError> {
        let tick = observation.tick;
        let disconnected = || ExchangeError::Disconnected {
            agent_id: agent_id.clone(),
        };

        self.outbound
            .send(Outbound::Observation(Box::new(observation)))
            .await
            .map_err(|_closed| disconnected())?;

        loop {
            match self.inbound.recv().await {
                None => return Err(disconnected()),
                Some(Inbound::Decision(message)) if message.tick == tick => {
                    if &message.agent_id != agent_id {
                        return Err(ExchangeError::Schema {
                            agent_id: agent_id.clone(),
                            tick,
                            error: format!(
                                "decision addressed from agent {}",
                                message.agent_id
                            ),
                        });
                    }
                    return Ok(message.decision);
                }
                Some(Inbound::Decision(message)) => {
                    *stale_dropped = stale_dropped.saturating_add(1);
                    debug!(
                        agent_id = %agent_id,
                        tick,
                        stale_tick = message.tick,
                        "Dropped stale decision"
                    );
                }
                Some(Inbound::Malformed { tick: Some(other), error }) if other != tick => {
                    *stale_dropped = stale_dropped.saturating_add(1);
                    debug!(
                        agent_id = %agent_id,
                        tick,
                        stale_tick = other,
                        error = %error,
                        "Dropped stale malformed message"
                    );
                }
                Some(Inbound::Malformed { error, .. }) => {
                    return Err(ExchangeError::Schema {
                        agent_id: agent_id.clone(),
                        tick,
                        error,
                    });
                }
            }
        }
    }

    /// Tell the agent the episode is over. Never waits; a full or closed
    /// channel just means the agent misses the notice.
    pub fn notify_episode_end(&self, report: ScoreReport) {
        if self
            .outbound
            .try_send(Outbound::EpisodeEnded(Box::new(report)))
            .is_err()
        {
            debug!("Episode end notice not delivered");
        }
    }
}

impl AgentEndpoint {
    /// Next message from the engine; `None` once the session is gone.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.observations.recv().await
    }

    /// Send a decision.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Disconnected`] if the session is gone.
    pub async fn send(&self, message: Inbound) -> Result<(), ExchangeError> {
        let agent_id = match &message {
            Inbound::Decision(decision) => decision.agent_id.clone(),
            Inbound::Malformed { .. } => AgentId::from("unknown"),
        };
        self.decisions
            .send(message)
            .await
            .map_err(|_closed| ExchangeError::Disconnected { agent_id })
    }

    /// Split into the raw receiver and sender, for carriers that pump the
    /// two directions from separate tasks.
    pub fn into_parts(self) -> (mpsc::Receiver<Outbound>, mpsc::Sender<Inbound>) {
        (self.observations, self.decisions)
    }
}

/// Run `agent` in-process on its own task, answering every observation on
/// `endpoint` until the episode ends or the session goes away.
///
/// Lifecycle hooks, when the agent has them, fire on the first observation
/// and on the end-of-episode notice. The agent is handed back when the
/// task finishes.
pub fn spawn_local_agent<A>(mut endpoint: AgentEndpoint, mut agent: A) -> JoinHandle<A>
where
    A: Agent + 'static,
{
    tokio::spawn(async move {
        let mut started = false;
        while let Some(message) = endpoint.recv().await {
            match message {
                Outbound::Observation(observation) => {
                    if !started {
                        started = true;
                        if let Some(hooks) = agent.lifecycle() {
                            hooks.on_episode_start(&observation.objective);
                        }
                    }
                    let decision = agent.decide(&observation);
                    let reply = Inbound::Decision(DecisionMessage {
                        tick: observation.tick,
                        agent_id: observation.agent_id.clone(),
                        decision,
                    });
                    if endpoint.send(reply).await.is_err() {
                        warn!(agent_id = %observation.agent_id, "Session closed mid-episode");
                        break;
                    }
                }
                Outbound::EpisodeEnded(report) => {
                    if let Some(hooks) = agent.lifecycle() {
                        hooks.on_episode_end(&report);
                    }
                    break;
                }
            }
        }
        agent
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use arena_types::Objective;

    use super::*;

    fn observation(tick: u64) -> Observation {
        Observation {
            tick,
            agent_id: AgentId::from("a"),
            scenario_name: "test".to_owned(),
            objective: Objective::new("test"),
            current_progress: arena_types::ProgressSnapshot::new(),
            world: arena_types::WorldFields::new(),
        }
    }

    fn reply(tick: u64, tool: &str) -> Inbound {
        Inbound::Decision(DecisionMessage {
            tick,
            agent_id: AgentId::from("a"),
            decision: Decision::new(tool),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn matching_decision_resolves_exchange() {
        let operator = OperatorState::new(0, 0);
        let (mut session, mut endpoint) = channel(4);

        let agent = tokio::spawn(async move {
            let Some(Outbound::Observation(obs)) = endpoint.recv().await else {
                return;
            };
            endpoint.send(reply(obs.tick, "collect")).await.unwrap();
            // Keep the endpoint alive until the exchange is done.
            let _ = endpoint.recv().await;
        });

        let exchange = session
            .exchange(observation(1), Duration::from_millis(500), &operator)
            .await;
        assert_eq!(exchange.result.unwrap().tool, "collect");
        assert_eq!(exchange.stale_dropped, 0);
        drop(session);
        agent.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out() {
        let operator = OperatorState::new(0, 0);
        let (mut session, _endpoint) = channel(4);

        let exchange = session
            .exchange(observation(7), Duration::from_millis(250), &operator)
            .await;
        assert!(matches!(
            exchange.result,
            Err(ExchangeError::Timeout { tick: 7, timeout_ms: 250, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_decisions_are_dropped() {
        let operator = OperatorState::new(0, 0);
        let (mut session, endpoint) = channel(8);

        // A late answer for tick 4 is queued before tick 5 is asked.
        endpoint.send(reply(4, "move_to")).await.unwrap();
        endpoint.send(reply(5, "collect")).await.unwrap();

        let exchange = session
            .exchange(observation(5), Duration::from_millis(500), &operator)
            .await;
        assert_eq!(exchange.result.unwrap().tool, "collect");
        assert_eq!(exchange.stale_dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_current_tick_is_schema_error() {
        let operator = OperatorState::new(0, 0);
        let (mut session, endpoint) = channel(4);
        endpoint
            .send(Inbound::Malformed {
                tick: None,
                error: "expected value".to_owned(),
            })
            .await
            .unwrap();

        let exchange = session
            .exchange(observation(2), Duration::from_millis(500), &operator)
            .await;
        assert!(matches!(exchange.result, Err(ExchangeError::Schema { tick: 2, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_endpoint_is_disconnect() {
        let operator = OperatorState::new(0, 0);
        let (mut session, endpoint) = channel(4);
        drop(endpoint);

        let exchange = session
            .exchange(observation(1), Duration::from_millis(500), &operator)
            .await;
        assert!(matches!(exchange.result, Err(ExchangeError::Disconnected { .. })));
        assert!(session.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_in_flight_exchange() {
        let operator = std::sync::Arc::new(OperatorState::new(0, 0));
        let (mut session, _endpoint) = channel(4);

        let stopper = {
            let operator = std::sync::Arc::clone(&operator);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                operator.request_stop();
            })
        };

        let exchange = session
            .exchange(observation(1), Duration::from_secs(60), &operator)
            .await;
        assert!(matches!(exchange.result, Err(ExchangeError::Cancelled { .. })));
        stopper.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn local_agent_answers_with_its_decision() {
        let operator = OperatorState::new(0, 0);
        let (mut session, endpoint) = channel(4);
        let handle = spawn_local_agent(endpoint, |obs: &Observation| {
            Decision::idle(Some(format!("tick {}", obs.tick)))
        });

        let exchange = session
            .exchange(observation(3), Duration::from_millis(500), &operator)
            .await;
        let decision = exchange.result.unwrap();
        assert!(decision.is_idle());
        assert_eq!(decision.reasoning.as_deref(), Some("tick 3"));

        drop(session);
        handle.await.unwrap();
    }
}
