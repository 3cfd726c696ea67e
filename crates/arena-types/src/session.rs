//! Registration handshake payloads.
//!
//! An agent sends a [`Registration`] before its first exchange and receives a
//! [`RegistrationAck`]. The declared capability list narrows the scenario's
//! tools for that agent; an empty list accepts every scenario tool. A
//! [`DisconnectNotice`] ends the session early.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::capability::ToolSchema;
use crate::ids::{AgentId, SessionId};

/// Request to join the running scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Registration {
    /// Identity the agent wants to act as.
    pub agent_id: AgentId,
    /// Tools the agent intends to call.
    #[serde(default)]
    pub capabilities: Vec<ToolSchema>,
}

impl Registration {
    /// A registration that accepts every scenario tool.
    pub const fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            capabilities: Vec::new(),
        }
    }

    /// Declare a tool.
    #[must_use]
    pub fn with_capability(mut self, schema: ToolSchema) -> Self {
        self.capabilities.push(schema);
        self
    }

    /// Names of the declared tools.
    pub fn declared_tools(&self) -> impl Iterator<Item = &str> {
        self.capabilities.iter().map(|schema| schema.name.as_str())
    }
}

/// Engine reply to a [`Registration`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RegistrationAck {
    /// Whether the session was created.
    pub accepted: bool,
    /// The new session, when accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub session_id: Option<SessionId>,
    /// Tick the agent's first observation will carry, when accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub current_tick: Option<u64>,
    /// Why the registration was refused, when rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub reason: Option<String>,
}

impl RegistrationAck {
    /// An accepted registration.
    pub const fn accepted(session_id: SessionId, current_tick: u64) -> Self {
        Self {
            accepted: true,
            session_id: Some(session_id),
            current_tick: Some(current_tick),
            reason: None,
        }
    }

    /// A refused registration.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            session_id: None,
            current_tick: None,
            reason: Some(reason.into()),
        }
    }
}

/// Sent by an agent that is leaving before the episode ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DisconnectNotice {
    /// The departing agent.
    pub agent_id: AgentId,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn capabilities_default_to_empty() {
        let registration: Registration =
            serde_json::from_value(json!({ "agent_id": "forager_1" })).unwrap();
        assert_eq!(registration.agent_id, AgentId::from("forager_1"));
        assert_eq!(registration.declared_tools().count(), 0);
    }

    #[test]
    fn rejected_ack_omits_session() {
        let value = serde_json::to_value(RegistrationAck::rejected("duplicate")).unwrap();
        assert_eq!(value, json!({ "accepted": false, "reason": "duplicate" }));
    }
}
