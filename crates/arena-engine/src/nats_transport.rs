//! NATS bridge between remote agents and the episode runner.
//!
//! [`NatsBridge`] answers registration requests, then pumps each accepted
//! agent's session channels across NATS subjects. The runner never sees
//! NATS: it only sees the per-session channels handed out by the control
//! queue.
//!
//! # Subject Convention
//!
//! - **Registration (request/reply):** `arena.register`
//! - **Disconnect notice:** `arena.disconnect`
//! - **Observation publish:** `arena.{agent_id}.observation`
//! - **Decision subscribe:** `arena.{agent_id}.decision`
//! - **Final score publish:** `arena.{agent_id}.score`
//! - **Episode report publish:** `arena.episode.end`
//!
//! These match the subjects `arena-agent` uses, both taken from
//! [`arena_types::subjects`].

use arena_core::runner::ControlHandle;
use arena_core::transport::{AgentEndpoint, Inbound, Outbound};
use arena_types::{
    AgentId, DecisionMessage, DisconnectNotice, EpisodeReport, Registration, RegistrationAck,
    subjects,
};
use futures::StreamExt as _;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Decode a decision payload.
///
/// A payload that does not decode still yields the tick it claims to
/// answer when that much can be read, so the exchange can tell a stale
/// malformed reply from a malformed reply to the current tick.
pub fn decode_decision(payload: &[u8]) -> Inbound {
    match serde_json::from_slice::<DecisionMessage>(payload) {
        Ok(message) => Inbound::Decision(message),
        Err(e) => {
            let tick = serde_json::from_slice::<serde_json::Value>(payload)
                .ok()
                .and_then(|value| value.get("tick").and_then(serde_json::Value::as_u64));
            Inbound::Malformed {
                tick,
                error: e.to_string(),
            }
        }
    }
}

/// Connection to the NATS server plus the listeners it runs.
#[derive(Debug, Clone)]
pub struct NatsBridge {
    client: async_nats::Client,
}

impl NatsBridge {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, EngineError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to connect to NATS at {url}: {e}"),
            })?;
        Ok(Self { client })
    }

    /// Subscribe to registration and disconnect subjects and serve them on
    /// background tasks until aborted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if a subscription fails.
    pub async fn spawn_listeners(
        &self,
        control: ControlHandle,
    ) -> Result<Vec<JoinHandle<()>>, EngineError> {
        let registrations = self.subscribe(subjects::REGISTER).await?;
        let disconnects = self.subscribe(subjects::DISCONNECT).await?;

        let register_task = {
            let bridge = self.clone();
            let control = control.clone();
            tokio::spawn(async move { bridge.serve_registrations(registrations, control).await })
        };
        let disconnect_task =
            tokio::spawn(async move { serve_disconnects(disconnects, control).await });

        info!(
            register = subjects::REGISTER,
            disconnect = subjects::DISCONNECT,
            "Listening for agents"
        );
        Ok(vec![register_task, disconnect_task])
    }

    /// Publish the final episode report.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if publishing fails.
    pub async fn publish_report(&self, report: &EpisodeReport) -> Result<(), EngineError> {
        self.publish(subjects::EPISODE_END.to_owned(), report).await?;
        self.client.flush().await.map_err(|e| EngineError::Nats {
            message: format!("failed to flush NATS: {e}"),
        })
    }

    async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber, EngineError> {
        self.client
            .subscribe(subject.to_owned())
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to subscribe to {subject}: {e}"),
            })
    }

    async fn publish<T: Serialize + ?Sized>(
        &self,
        subject: String,
        payload: &T,
    ) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(payload).map_err(|e| EngineError::Nats {
            message: format!("failed to serialize payload for {subject}: {e}"),
        })?;
        self.client
            .publish(subject.clone(), bytes.into())
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to publish on {subject}: {e}"),
            })
    }

    async fn serve_registrations(
        self,
        mut registrations: async_nats::Subscriber,
        control: ControlHandle,
    ) {
        while let Some(msg) = registrations.next().await {
            let ack = match serde_json::from_slice::<Registration>(&msg.payload) {
                Ok(registration) => self.register(registration, &control).await,
                Err(e) => {
                    warn!(error = %e, "Malformed registration");
                    RegistrationAck::rejected(format!("malformed registration: {e}"))
                }
            };

            let Some(reply) = msg.reply else {
                debug!(accepted = ack.accepted, "Registration had no reply subject");
                continue;
            };
            if let Err(e) = self.publish(reply.to_string(), &ack).await {
                warn!(error = %e, "Failed to answer registration");
            }
        }
        debug!("Registration subscription closed");
    }

    /// Forward a registration to the runner and, once accepted, start
    /// pumping the session across NATS.
    async fn register(
        &self,
        registration: Registration,
        control: &ControlHandle,
    ) -> RegistrationAck {
        let agent_id = registration.agent_id.clone();
        let (ack, endpoint) = match control.register(registration).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Runner unavailable for registration");
                return RegistrationAck::rejected(e.to_string());
            }
        };
        if !ack.accepted {
            return ack;
        }

        // Subscribe before the ack goes out so the first decision cannot
        // race the subscription.
        let decision_subject = subjects::decision(&agent_id);
        let decisions = match self.subscribe(&decision_subject).await {
            Ok(subscriber) => subscriber,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Could not open decision subject");
                if control.disconnect(agent_id).await.is_err() {
                    debug!("Runner gone while undoing registration");
                }
                return RegistrationAck::rejected(e.to_string());
            }
        };
        self.spawn_session_pump(agent_id, endpoint, decisions);
        ack
    }

    fn spawn_session_pump(
        &self,
        agent_id: AgentId,
        endpoint: AgentEndpoint,
        mut decisions: async_nats::Subscriber,
    ) {
        let (mut outbound, inbound) = endpoint.into_parts();

        let relay = tokio::spawn(async move {
            while let Some(msg) = decisions.next().await {
                if inbound.send(decode_decision(&msg.payload)).await.is_err() {
                    break;
                }
            }
        });

        let bridge = self.clone();
        tokio::spawn(async move {
            let observation_subject = subjects::observation(&agent_id);
            while let Some(message) = outbound.recv().await {
                let sent = match message {
                    Outbound::Observation(observation) => {
                        debug!(
                            agent_id = %agent_id,
                            tick = observation.tick,
                            "Publishing observation"
                        );
                        bridge
                            .publish(observation_subject.clone(), observation.as_ref())
                            .await
                    }
                    Outbound::EpisodeEnded(report) => {
                        let result = bridge
                            .publish(subjects::score(&agent_id), report.as_ref())
                            .await;
                        if let Err(e) = &result {
                            warn!(
                                agent_id = %agent_id,
                                error = %e,
                                "Failed to publish final score"
                            );
                        }
                        break;
                    }
                };
                if let Err(e) = sent {
                    warn!(agent_id = %agent_id, error = %e, "Failed to publish observation");
                }
            }
            relay.abort();
            debug!(agent_id = %agent_id, "Session pump stopped");
        });
    }
}

async fn serve_disconnects(mut disconnects: async_nats::Subscriber, control: ControlHandle) {
    while let Some(msg) = disconnects.next().await {
        match serde_json::from_slice::<DisconnectNotice>(&msg.payload) {
            Ok(notice) => {
                info!(agent_id = %notice.agent_id, "Agent sent disconnect notice");
                if control.disconnect(notice.agent_id).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Malformed disconnect notice"),
        }
    }
    debug!("Disconnect subscription closed");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn valid_payload_decodes_to_decision() {
        let payload = br#"{"tick": 4, "agent_id": "a", "tool": "move_to",
            "params": {"target_position": [1.0, 0.0, 2.0]}, "reasoning": "closest bush"}"#;
        let Inbound::Decision(message) = decode_decision(payload) else {
            panic!("expected a decision");
        };
        assert_eq!(message.tick, 4);
        assert_eq!(message.agent_id, AgentId::from("a"));
        assert_eq!(message.decision.tool, "move_to");
        assert_eq!(message.decision.reasoning.as_deref(), Some("closest bush"));
    }

    #[test]
    fn params_may_be_omitted() {
        let payload = br#"{"tick": 1, "agent_id": "a", "tool": "idle"}"#;
        let Inbound::Decision(message) = decode_decision(payload) else {
            panic!("expected a decision");
        };
        assert!(message.decision.is_idle());
        assert!(message.decision.params.is_empty());
    }

    #[test]
    fn malformed_payload_keeps_its_tick() {
        let payload = br#"{"tick": 9, "agent_id": "a"}"#;
        assert!(matches!(
            decode_decision(payload),
            Inbound::Malformed { tick: Some(9), .. }
        ));
    }

    #[test]
    fn garbage_has_no_tick() {
        assert!(matches!(
            decode_decision(b"not json"),
            Inbound::Malformed { tick: None, .. }
        ));
    }
}
