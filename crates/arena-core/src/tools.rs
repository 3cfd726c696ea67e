//! Tool dispatch table.
//!
//! Each tool pairs a parameter schema and an optional semantic check with
//! an executor that mutates the scenario's world. The [`ToolRegistry`]
//! dispatches validated decisions by tool name and derives the
//! [`CapabilityRegistry`] the validator checks against.

use std::collections::BTreeMap;

use arena_types::{AgentId, IDLE_TOOL, Params, RejectionReason, ToolSchema, ValidatedDecision};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::validation::CapabilityRegistry;

/// Result of executing a tool against the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Whether the tool had its intended effect.
    pub success: bool,
    /// Short description of what happened.
    pub detail: String,
}

impl ToolOutcome {
    /// A successful outcome.
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    /// An outcome with no effect on the world.
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// A tool an agent can invoke, generic over the scenario's world type.
pub trait Tool<W>: Send + Sync {
    /// Name and parameter shapes.
    fn schema(&self) -> ToolSchema;

    /// Semantic check against the current world, run after schema
    /// validation and before execution. Returns a refusal message.
    fn check(&self, _agent: &AgentId, _params: &Params, _world: &W) -> Result<(), String> {
        Ok(())
    }

    /// Apply the tool to the world.
    fn execute(&self, agent: &AgentId, params: &Params, world: &mut W) -> ToolOutcome;
}

/// Tools keyed by name.
pub struct ToolRegistry<W> {
    tools: BTreeMap<String, Box<dyn Tool<W>>>,
}

impl<W> std::fmt::Debug for ToolRegistry<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<W> Default for ToolRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> ToolRegistry<W> {
    /// An empty registry.
    pub const fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool under its schema name, replacing any previous one.
    pub fn register(&mut self, tool: Box<dyn Tool<W>>) {
        let name = tool.schema().name;
        self.tools.insert(name, tool);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, tool: Box<dyn Tool<W>>) -> Self {
        self.register(tool);
        self
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool is registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas of every registered tool.
    pub fn capabilities(&self) -> CapabilityRegistry {
        self.tools.values().map(|tool| tool.schema()).collect()
    }

    /// Run the tool's semantic check.
    ///
    /// # Errors
    ///
    /// Returns [`RejectionReason::Refused`] when the tool declines, or
    /// [`RejectionReason::UnknownTool`] when no such tool is registered.
    pub fn check(
        &self,
        agent: &AgentId,
        decision: &ValidatedDecision,
        world: &W,
    ) -> Result<(), RejectionReason> {
        if decision.tool() == IDLE_TOOL {
            return Ok(());
        }
        let tool = self
            .tools
            .get(decision.tool())
            .ok_or_else(|| RejectionReason::UnknownTool {
                tool: decision.tool().to_owned(),
            })?;
        tool.check(agent, decision.params(), world)
            .map_err(|detail| RejectionReason::Refused {
                tool: decision.tool().to_owned(),
                detail,
            })
    }

    /// Check then execute a validated decision.
    ///
    /// Idle always succeeds without touching the world. A refused check
    /// leaves the world unchanged and returns a failed outcome.
    pub fn dispatch(
        &self,
        agent: &AgentId,
        decision: &ValidatedDecision,
        world: &mut W,
    ) -> ToolOutcome {
        if decision.tool() == IDLE_TOOL {
            return ToolOutcome::ok("idle");
        }
        if let Err(reason) = self.check(agent, decision, world) {
            debug!(agent_id = %agent, %reason, "Tool refused");
            return ToolOutcome::failed(reason.to_string());
        }
        match self.tools.get(decision.tool()) {
            Some(tool) => tool.execute(agent, decision.params(), world),
            None => ToolOutcome::failed(format!("unknown tool '{}'", decision.tool())),
        }
    }
}

#[cfg(test)]
mod tests {
    use arena_types::{Decision, ParamKind, ParamSpec};
    use serde_json::json;

    use super::*;

    struct Counter;

    impl Tool<i64> for Counter {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("add", "Add to the counter")
                .with_param("amount", ParamSpec::required(ParamKind::Integer))
        }

        fn check(&self, _agent: &AgentId, params: &Params, world: &i64) -> Result<(), String> {
            if *world >= 10 {
                return Err("counter is full".to_owned());
            }
            if params.get("amount").and_then(serde_json::Value::as_i64).is_none() {
                return Err("amount must be an integer".to_owned());
            }
            Ok(())
        }

        fn execute(&self, _agent: &AgentId, params: &Params, world: &mut i64) -> ToolOutcome {
            let amount = params
                .get("amount")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0);
            *world = world.saturating_add(amount);
            ToolOutcome::ok(format!("counter is {world}"))
        }
    }

    fn add(amount: i64) -> ValidatedDecision {
        ValidatedDecision::accepted(Decision::new("add").with_param("amount", json!(amount)))
    }

    #[test]
    fn capabilities_come_from_schemas() {
        let registry = ToolRegistry::new().with(Box::new(Counter));
        let capabilities = registry.capabilities();
        assert_eq!(capabilities.tool_names().collect::<Vec<_>>(), vec!["add"]);
    }

    #[test]
    fn dispatch_executes_and_refuses() {
        let registry = ToolRegistry::new().with(Box::new(Counter));
        let agent = AgentId::from("a");
        let mut world = 8_i64;

        let outcome = registry.dispatch(&agent, &add(3), &mut world);
        assert!(outcome.success);
        assert_eq!(world, 11);

        let refused = registry.dispatch(&agent, &add(1), &mut world);
        assert!(!refused.success);
        assert_eq!(world, 11);
    }

    #[test]
    fn idle_never_touches_the_world() {
        let registry: ToolRegistry<i64> = ToolRegistry::new();
        let mut world = 1_i64;
        let outcome = registry.dispatch(
            &AgentId::from("a"),
            &ValidatedDecision::accepted(Decision::idle(None)),
            &mut world,
        );
        assert!(outcome.success);
        assert_eq!(world, 1);
    }
}
