//! Agent decision loop: from observation to decision over NATS.
//!
//! 1. Subscribe to this agent's observation and score subjects
//! 2. Register and wait for the acknowledgement
//! 3. Answer every observation with a decision tagged with its tick
//! 4. Stop on the final score, on Ctrl-C (sending a disconnect notice), or
//!    when the connection drops
//!
//! The policy runs synchronously per observation; the environment's
//! decision timeout is the only deadline.

use arena_core::agent::Agent;
use arena_types::{DecisionMessage, Observation, Registration, ToolSchema};
use futures::StreamExt as _;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::nats::NatsClient;

/// Build the reply to one observation.
///
/// The start hook fires on the first observation only; `started` tracks
/// that across calls.
pub fn respond<A>(agent: &mut A, observation: &Observation, started: &mut bool) -> DecisionMessage
where
    A: Agent + ?Sized,
{
    if !*started {
        *started = true;
        if let Some(hooks) = agent.lifecycle() {
            hooks.on_episode_start(&observation.objective);
        }
    }
    DecisionMessage {
        tick: observation.tick,
        agent_id: observation.agent_id.clone(),
        decision: agent.decide(observation),
    }
}

/// Drives one agent through one episode.
#[derive(Debug)]
pub struct AgentRunner<A> {
    nats: NatsClient,
    agent: A,
    declared_tools: Vec<String>,
}

impl<A: Agent> AgentRunner<A> {
    /// Create a runner. `declared_tools` narrows the scenario's tools;
    /// empty accepts them all.
    pub const fn new(nats: NatsClient, agent: A, declared_tools: Vec<String>) -> Self {
        Self {
            nats,
            agent,
            declared_tools,
        }
    }

    fn registration(&self) -> Registration {
        self.declared_tools.iter().fold(
            Registration::new(self.nats.agent_id().clone()),
            |registration, tool| registration.with_capability(ToolSchema::new(tool.as_str(), "")),
        )
    }

    /// Register and answer observations until the episode ends.
    ///
    /// Returns the agent once the loop stops.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Rejected`] if the environment refuses the
    /// registration, or [`AgentError::Nats`] if subscribing or registering
    /// fails.
    pub async fn run(mut self) -> Result<A, AgentError> {
        let mut observations = self.nats.subscribe_observations().await?;
        let mut scores = self.nats.subscribe_score().await?;

        let ack = self.nats.register(&self.registration()).await?;
        if !ack.accepted {
            return Err(AgentError::Rejected(
                ack.reason.unwrap_or_else(|| "no reason given".to_owned()),
            ));
        }
        info!(
            agent_id = %self.nats.agent_id(),
            session_id = ?ack.session_id,
            current_tick = ?ack.current_tick,
            "registered, awaiting observations"
        );

        let mut started = false;
        loop {
            tokio::select! {
                message = observations.next() => {
                    let Some(message) = message else {
                        info!("observation subscription ended");
                        break;
                    };
                    match NatsClient::deserialize_observation(&message.payload) {
                        Ok(observation) => {
                            let reply = respond(&mut self.agent, &observation, &mut started);
                            debug!(
                                tick = reply.tick,
                                tool = reply.decision.tool,
                                reasoning = ?reply.decision.reasoning,
                                "decided"
                            );
                            if let Err(e) = self.nats.publish_decision(&reply).await {
                                warn!(tick = reply.tick, error = %e, "failed to publish decision");
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to deserialize observation, skipping"),
                    }
                }
                message = scores.next() => {
                    if let Some(message) = message {
                        match NatsClient::deserialize_score(&message.payload) {
                            Ok(report) => {
                                if let Some(hooks) = self.agent.lifecycle() {
                                    hooks.on_episode_end(&report);
                                }
                                info!(
                                    total_score = report.score.total_score,
                                    passed = report.score.passed,
                                    applied = report.tally.applied,
                                    misses = report.tally.misses,
                                    "final score received"
                                );
                            }
                            Err(e) => warn!(error = %e, "failed to deserialize final score"),
                        }
                    }
                    break;
                }
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!(error = %e, "failed to listen for Ctrl-C");
                    }
                    info!("leaving the episode");
                    if let Err(e) = self.nats.send_disconnect().await {
                        warn!(error = %e, "disconnect notice not sent");
                    }
                    break;
                }
            }
        }

        Ok(self.agent)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use arena_core::agent::{EpisodeLifecycle, IdleAgent};
    use arena_types::{AgentId, Decision, Objective, ProgressSnapshot, WorldFields};

    use super::*;

    fn observation(tick: u64) -> Observation {
        Observation {
            tick,
            agent_id: AgentId::from("forager_1"),
            scenario_name: "foraging".to_owned(),
            objective: Objective::new("Collect"),
            current_progress: ProgressSnapshot::new(),
            world: WorldFields::new(),
        }
    }

    #[derive(Default)]
    struct Counting {
        starts: u32,
    }

    impl EpisodeLifecycle for Counting {
        fn on_episode_start(&mut self, _objective: &Objective) {
            self.starts = self.starts.saturating_add(1);
        }
    }

    impl Agent for Counting {
        fn decide(&mut self, observation: &Observation) -> Decision {
            Decision::new("collect").with_reasoning(format!("tick {}", observation.tick))
        }

        fn lifecycle(&mut self) -> Option<&mut dyn EpisodeLifecycle> {
            Some(self)
        }
    }

    #[test]
    fn reply_echoes_tick_and_agent() {
        let mut started = false;
        let reply = respond(&mut IdleAgent, &observation(12), &mut started);
        assert_eq!(reply.tick, 12);
        assert_eq!(reply.agent_id, AgentId::from("forager_1"));
        assert!(reply.decision.is_idle());
        assert!(started);
    }

    #[test]
    fn start_hook_fires_once() {
        let mut agent = Counting::default();
        let mut started = false;
        respond(&mut agent, &observation(1), &mut started);
        let second = respond(&mut agent, &observation(2), &mut started);
        assert_eq!(agent.starts, 1);
        assert_eq!(second.decision.reasoning.as_deref(), Some("tick 2"));
    }

    #[test]
    fn reply_serializes_flat() {
        let mut started = false;
        let reply = respond(&mut Counting::default(), &observation(3), &mut started);
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["tick"], 3);
        assert_eq!(value["tool"], "collect");
        assert_eq!(value["agent_id"], "forager_1");
    }
}
