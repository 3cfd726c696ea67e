//! Decisions returned by agents.
//!
//! A [`Decision`] names a tool and its parameters. On the wire it travels
//! inside a [`DecisionMessage`], which tags it with the tick and agent it
//! answers so late responses can be matched and dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::AgentId;

/// Name of the tool that does nothing for one tick.
pub const IDLE_TOOL: &str = "idle";

/// Tool parameters, keyed by parameter name.
pub type Params = BTreeMap<String, serde_json::Value>;

/// The action an agent wants to take this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Decision {
    /// Tool identifier (e.g. `"move_to"`).
    pub tool: String,
    /// Tool parameters.
    #[serde(default)]
    pub params: Params,
    /// Optional free-text explanation, kept for debugging and reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub reasoning: Option<String>,
}

impl Decision {
    /// Create a decision for `tool` with no parameters.
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            params: Params::new(),
            reasoning: None,
        }
    }

    /// An idle decision, optionally annotated with a reason.
    pub fn idle(reasoning: Option<String>) -> Self {
        Self {
            tool: IDLE_TOOL.to_owned(),
            params: Params::new(),
            reasoning,
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Attach reasoning text.
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Whether this is the idle tool.
    pub fn is_idle(&self) -> bool {
        self.tool == IDLE_TOOL
    }
}

/// Wire envelope for a decision: the decision plus the tick and agent it
/// answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DecisionMessage {
    /// Tick of the observation this decision answers.
    pub tick: u64,
    /// The deciding agent.
    pub agent_id: AgentId,
    /// The decision itself, flattened into the envelope.
    #[serde(flatten)]
    pub decision: Decision,
}

/// A decision that passed validation and may be applied to the world.
///
/// Only the validator constructs these; parameters may have been clamped
/// into bounds, in which case `clamped` lists the repaired names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ValidatedDecision {
    /// The (possibly repaired) decision.
    pub decision: Decision,
    /// Parameters that were clamped into bounds.
    #[serde(default)]
    pub clamped: Vec<String>,
    /// Whether this decision is a fallback substituted for a missing or
    /// rejected one.
    #[serde(default)]
    pub fallback: bool,
}

impl ValidatedDecision {
    /// Wrap a decision that passed validation unchanged.
    pub const fn accepted(decision: Decision) -> Self {
        Self {
            decision,
            clamped: Vec::new(),
            fallback: false,
        }
    }

    /// An idle fallback annotated with why the real decision was not used.
    pub fn fallback_idle(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::idle(Some(reason.into())),
            clamped: Vec::new(),
            fallback: true,
        }
    }

    /// The tool to execute.
    pub fn tool(&self) -> &str {
        &self.decision.tool
    }

    /// The parameters to execute with.
    pub const fn params(&self) -> &Params {
        &self.decision.params
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reasoning_is_omitted_when_absent() {
        let value = serde_json::to_value(Decision::new("collect")).unwrap();
        assert_eq!(value, json!({ "tool": "collect", "params": {} }));
    }

    #[test]
    fn message_flattens_decision() {
        let message = DecisionMessage {
            tick: 4,
            agent_id: AgentId::from("a"),
            decision: Decision::new("move_to")
                .with_param("target_position", json!([10.0, 0.0, 5.0]))
                .with_reasoning("nearest berry"),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["tool"], json!("move_to"));
        assert_eq!(value["tick"], json!(4));

        let restored: DecisionMessage = serde_json::from_value(value).unwrap();
        assert_eq!(restored, message);
    }

    #[test]
    fn params_default_to_empty() {
        let decision: Decision = serde_json::from_value(json!({ "tool": "idle" })).unwrap();
        assert!(decision.is_idle());
        assert!(decision.params.is_empty());
        assert!(decision.reasoning.is_none());
    }
}
