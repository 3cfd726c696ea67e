//! Scenario controller interface.
//!
//! The scenario owns world state. The core only reads it through this
//! trait, and only ever changes it through
//! [`apply_decision`](ScenarioController::apply_decision), which receives
//! decisions that already passed validation.

use std::collections::BTreeMap;

use arena_types::{AgentId, RejectionReason, ValidatedDecision, WorldBounds, WorldFields};

use crate::tools::ToolOutcome;
use crate::validation::CapabilityRegistry;

/// Hooks the tick loop drives.
pub trait ScenarioController {
    /// Scenario name reported in observations and the episode report.
    fn name(&self) -> &str;

    /// Advance world state by one tick (hazards, regrowth, ...).
    fn tick_world(&mut self, tick: u64);

    /// Scenario-owned observation fields for `agent` (position, nearby
    /// entities, health, ...).
    fn observation_base(&self, agent: &AgentId) -> WorldFields;

    /// Current world quantity behind each metric the scenario tracks for
    /// `agent`.
    fn metric_values(&self, agent: &AgentId) -> BTreeMap<String, f64>;

    /// Check a validated decision against the current world before it is
    /// applied. A refusal is handled like a validation rejection.
    fn check_decision(
        &self,
        _agent: &AgentId,
        _decision: &ValidatedDecision,
    ) -> Result<(), RejectionReason> {
        Ok(())
    }

    /// Apply a validated decision for `agent`.
    fn apply_decision(&mut self, agent: &AgentId, decision: &ValidatedDecision) -> ToolOutcome;

    /// Box that position parameters must fall inside.
    fn world_bounds(&self) -> WorldBounds;

    /// Every tool the scenario can execute.
    fn capabilities(&self) -> CapabilityRegistry;

    /// Called when an agent registers (or re-registers).
    fn on_agent_joined(&mut self, _agent: &AgentId) {}

    /// Whether the episode should end early.
    fn is_complete(&self) -> bool {
        false
    }
}
