//! Enumeration types shared by the engine and agents.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

/// State of an agent session.
///
/// `Registered -> AwaitingDecision -> Applied -> AwaitingDecision -> ...`;
/// any state may move to `Disconnected`, which is terminal until the same
/// agent id registers again. An agent with no session is unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered and idle; no exchange in flight, nothing applied yet.
    Registered,
    /// An observation was sent; waiting for the matching decision.
    AwaitingDecision,
    /// The last decision was validated and applied.
    Applied,
    /// The agent went away. A new registration replaces this session.
    Disconnected,
}

impl SessionState {
    /// Whether the session can take part in exchanges.
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Why a decision was rejected by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    /// The tool is not in the capability registry.
    UnknownTool {
        /// The requested tool.
        tool: String,
    },
    /// The scenario offers the tool but the agent did not declare it at
    /// registration.
    NotDeclared {
        /// The requested tool.
        tool: String,
    },
    /// A required parameter is absent.
    MissingParameter {
        /// The tool being invoked.
        tool: String,
        /// The missing parameter.
        param: String,
    },
    /// A parameter has the wrong JSON shape.
    WrongParameterType {
        /// The tool being invoked.
        tool: String,
        /// The offending parameter.
        param: String,
        /// The declared kind, e.g. `"position"`.
        expected: String,
    },
    /// A numeric or positional parameter lies outside its declared bounds.
    OutOfBounds {
        /// The tool being invoked.
        tool: String,
        /// The offending parameter.
        param: String,
    },
    /// A tool-specific check refused the parameters.
    Refused {
        /// The tool being invoked.
        tool: String,
        /// Explanation from the tool.
        detail: String,
    },
}

impl core::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownTool { tool } => write!(f, "unknown tool '{tool}'"),
            Self::NotDeclared { tool } => {
                write!(f, "tool '{tool}' was not declared at registration")
            }
            Self::MissingParameter { tool, param } => {
                write!(f, "tool '{tool}' is missing required parameter '{param}'")
            }
            Self::WrongParameterType {
                tool,
                param,
                expected,
            } => write!(f, "tool '{tool}' parameter '{param}' must be a {expected}"),
            Self::OutOfBounds { tool, param } => {
                write!(f, "tool '{tool}' parameter '{param}' is out of bounds")
            }
            Self::Refused { tool, detail } => write!(f, "tool '{tool}' refused: {detail}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tick outcomes
// ---------------------------------------------------------------------------

/// Why an agent's decision was not applied on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum MissKind {
    /// No decision arrived within the budget.
    Timeout,
    /// The decision message could not be decoded.
    Schema,
    /// The decision failed capability or parameter checks.
    Rejected,
    /// The session was disconnected.
    Disconnected,
    /// The episode ended while the exchange was in flight.
    Cancelled,
}

// ---------------------------------------------------------------------------
// Episode end
// ---------------------------------------------------------------------------

/// Reason an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum EpisodeEndReason {
    /// The objective's time limit was reached.
    TimeLimitReached,
    /// The configured tick cap was reached.
    MaxTicksReached,
    /// The scenario reported completion.
    ScenarioComplete,
    /// An operator requested a stop.
    OperatorStop,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rejection_reason_is_tagged() {
        let reason = RejectionReason::UnknownTool {
            tool: "fly".to_owned(),
        };
        let value = serde_json::to_value(&reason).unwrap();
        assert_eq!(value["kind"], "unknown_tool");
        assert_eq!(reason.to_string(), "unknown tool 'fly'");
    }

    #[test]
    fn disconnected_is_not_active() {
        assert!(SessionState::Registered.is_active());
        assert!(SessionState::Applied.is_active());
        assert!(!SessionState::Disconnected.is_active());
    }
}
