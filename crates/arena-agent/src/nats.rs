//! NATS pub/sub integration for one agent's session.
//!
//! The environment publishes observations on `arena.{agent_id}.observation`
//! and the final score on `arena.{agent_id}.score`. The agent answers on
//! `arena.{agent_id}.decision`. Registration is a request/reply on
//! `arena.register`.

use arena_types::{
    AgentId, DecisionMessage, DisconnectNotice, Observation, Registration, RegistrationAck,
    ScoreReport, subjects,
};
use tracing::{debug, info};

use crate::error::AgentError;

/// NATS client wrapper for a single agent.
pub struct NatsClient {
    client: async_nats::Client,
    agent_id: AgentId,
}

impl NatsClient {
    /// Connect to a NATS server as `agent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Nats`] if the connection cannot be established.
    pub async fn connect(url: &str, agent_id: AgentId) -> Result<Self, AgentError> {
        info!(url = url, agent_id = %agent_id, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| AgentError::Nats(format!("failed to connect to {url}: {e}")))?;
        info!("NATS connection established");
        Ok(Self { client, agent_id })
    }

    /// The agent this client speaks for.
    pub const fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Subscribe to this agent's observations.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Nats`] if the subscription fails.
    pub async fn subscribe_observations(&self) -> Result<async_nats::Subscriber, AgentError> {
        self.subscribe(subjects::observation(&self.agent_id)).await
    }

    /// Subscribe to this agent's final score.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Nats`] if the subscription fails.
    pub async fn subscribe_score(&self) -> Result<async_nats::Subscriber, AgentError> {
        self.subscribe(subjects::score(&self.agent_id)).await
    }

    async fn subscribe(&self, subject: String) -> Result<async_nats::Subscriber, AgentError> {
        debug!(subject = subject, "subscribing");
        self.client
            .subscribe(subject.clone())
            .await
            .map_err(|e| AgentError::Nats(format!("failed to subscribe to {subject}: {e}")))
    }

    /// Send a registration and wait for the acknowledgement.
    ///
    /// Subscribe to observations first: the first observation can follow
    /// the acknowledgement immediately.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Nats`] if the request fails, or
    /// [`AgentError::Serde`] if either payload does not (de)serialize.
    pub async fn register(
        &self,
        registration: &Registration,
    ) -> Result<RegistrationAck, AgentError> {
        let payload = serde_json::to_vec(registration)?;
        let reply = self
            .client
            .request(subjects::REGISTER.to_owned(), payload.into())
            .await
            .map_err(|e| AgentError::Nats(format!("registration request failed: {e}")))?;
        Ok(serde_json::from_slice(&reply.payload)?)
    }

    /// Publish a decision.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Nats`] if serialization or publishing fails.
    pub async fn publish_decision(&self, message: &DecisionMessage) -> Result<(), AgentError> {
        let subject = subjects::decision(&self.agent_id);
        let payload = serde_json::to_vec(message)?;
        debug!(
            subject = subject,
            tick = message.tick,
            tool = message.decision.tool,
            "publishing decision"
        );
        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| AgentError::Nats(format!("failed to publish to {subject}: {e}")))
    }

    /// Tell the environment this agent is leaving.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Nats`] if publishing or flushing fails.
    pub async fn send_disconnect(&self) -> Result<(), AgentError> {
        let notice = DisconnectNotice {
            agent_id: self.agent_id.clone(),
        };
        let payload = serde_json::to_vec(&notice)?;
        self.client
            .publish(subjects::DISCONNECT.to_owned(), payload.into())
            .await
            .map_err(|e| AgentError::Nats(format!("failed to send disconnect: {e}")))?;
        self.client
            .flush()
            .await
            .map_err(|e| AgentError::Nats(format!("flush failed: {e}")))
    }

    /// Deserialize an observation payload.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Serde`] if deserialization fails.
    pub fn deserialize_observation(data: &[u8]) -> Result<Observation, AgentError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Deserialize a final score payload.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Serde`] if deserialization fails.
    pub fn deserialize_score(data: &[u8]) -> Result<ScoreReport, AgentError> {
        Ok(serde_json::from_slice(data)?)
    }
}

impl std::fmt::Debug for NatsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsClient")
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}
