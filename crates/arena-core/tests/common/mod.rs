//! Shared fixtures: a small field scenario with movable agents and a
//! pile of collectable items, plus episode helpers.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arena_core::objective::ObjectiveEngine;
use arena_core::operator::OperatorState;
use arena_core::runner::{
    self, ControlRequest, EpisodeObserver, EpisodeSettings, RunnerError,
};
use arena_core::scenario::ScenarioController;
use arena_core::session::SessionRegistry;
use arena_core::tick::{TickSettings, TickSummary};
use arena_core::tools::{Tool, ToolOutcome, ToolRegistry};
use arena_core::transport::{self, AgentEndpoint};
use arena_core::validation::{self, CapabilityRegistry, ValidationPolicy};
use arena_types::{
    AgentId, DecisionMessage, EpisodeReport, MetricDefinition, Objective, ParamKind, ParamSpec,
    Params, Registration, RejectionReason, ToolSchema, ValidatedDecision, Vec3, WorldBounds,
    WorldFields,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const HALF_EXTENT: f64 = 10.0;

// ---------------------------------------------------------------------------
// World and tools
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FieldWorld {
    pub positions: BTreeMap<AgentId, Vec3>,
    pub collected: BTreeMap<AgentId, f64>,
    pub distance: BTreeMap<AgentId, f64>,
    pub items_left: u64,
    /// Every applied tool, in order, including idle fallbacks.
    pub applied: Vec<(AgentId, String)>,
    pub ticks_seen: Vec<u64>,
}

struct MoveTo;

impl Tool<FieldWorld> for MoveTo {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("move_to", "Walk to a point")
            .with_param("target_position", ParamSpec::required(ParamKind::Position))
            .with_param(
                "speed",
                ParamSpec::optional(ParamKind::Number).with_bounds(0.0, 5.0),
            )
    }

    fn execute(&self, agent: &AgentId, params: &Params, world: &mut FieldWorld) -> ToolOutcome {
        let Some(target) = params.get("target_position").and_then(validation::parse_position)
        else {
            return ToolOutcome::failed("no target");
        };
        let from = world.positions.get(agent).copied().unwrap_or([0.0; 3]);
        let step = from
            .iter()
            .zip(target.iter())
            .map(|(a, b)| (b - a) * (b - a))
            .sum::<f64>()
            .sqrt();
        *world.distance.entry(agent.clone()).or_default() += step;
        world.positions.insert(agent.clone(), target);
        ToolOutcome::ok("moved")
    }
}

struct Collect;

impl Tool<FieldWorld> for Collect {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("collect", "Pick up one item")
    }

    fn check(&self, _agent: &AgentId, _params: &Params, world: &FieldWorld) -> Result<(), String> {
        if world.items_left == 0 {
            return Err("nothing left".to_owned());
        }
        Ok(())
    }

    fn execute(&self, agent: &AgentId, _params: &Params, world: &mut FieldWorld) -> ToolOutcome {
        world.items_left = world.items_left.saturating_sub(1);
        *world.collected.entry(agent.clone()).or_default() += 1.0;
        ToolOutcome::ok("collected")
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Field {
    tools: ToolRegistry<FieldWorld>,
    pub world: FieldWorld,
    pub complete_when_empty: bool,
}

impl Field {
    pub fn new(items: u64) -> Self {
        Self {
            tools: ToolRegistry::new()
                .with(Box::new(MoveTo))
                .with(Box::new(Collect)),
            world: FieldWorld {
                items_left: items,
                ..FieldWorld::default()
            },
            complete_when_empty: false,
        }
    }

    pub fn applied_tools(&self, agent: &str) -> Vec<&str> {
        self.world
            .applied
            .iter()
            .filter(|(id, _)| id.as_str() == agent)
            .map(|(_, tool)| tool.as_str())
            .collect()
    }

    pub fn collected(&self, agent: &str) -> f64 {
        self.world
            .collected
            .get(&AgentId::from(agent))
            .copied()
            .unwrap_or(0.0)
    }
}

impl ScenarioController for Field {
    fn name(&self) -> &str {
        "field"
    }

    fn tick_world(&mut self, tick: u64) {
        self.world.ticks_seen.push(tick);
    }

    fn observation_base(&self, agent: &AgentId) -> WorldFields {
        let position = self.world.positions.get(agent).copied().unwrap_or([0.0; 3]);
        WorldFields::from([
            ("position".to_owned(), json!(position)),
            ("items_left".to_owned(), json!(self.world.items_left)),
        ])
    }

    fn metric_values(&self, agent: &AgentId) -> BTreeMap<String, f64> {
        BTreeMap::from([
            (
                "resources_collected".to_owned(),
                self.world.collected.get(agent).copied().unwrap_or(0.0),
            ),
            (
                "distance_traveled".to_owned(),
                self.world.distance.get(agent).copied().unwrap_or(0.0),
            ),
        ])
    }

    fn check_decision(
        &self,
        agent: &AgentId,
        decision: &ValidatedDecision,
    ) -> Result<(), RejectionReason> {
        self.tools.check(agent, decision, &self.world)
    }

    fn apply_decision(&mut self, agent: &AgentId, decision: &ValidatedDecision) -> ToolOutcome {
        self.world
            .applied
            .push((agent.clone(), decision.tool().to_owned()));
        self.tools.dispatch(agent, decision, &mut self.world)
    }

    fn world_bounds(&self) -> WorldBounds {
        WorldBounds::centered(HALF_EXTENT, HALF_EXTENT)
    }

    fn capabilities(&self) -> CapabilityRegistry {
        self.tools.capabilities()
    }

    fn on_agent_joined(&mut self, agent: &AgentId) {
        self.world.positions.entry(agent.clone()).or_insert([0.0; 3]);
    }

    fn is_complete(&self) -> bool {
        self.complete_when_empty && self.world.items_left == 0
    }
}

// ---------------------------------------------------------------------------
// Objective and settings
// ---------------------------------------------------------------------------

pub fn gather_objective(items: u64, time_limit: u64) -> Objective {
    #[allow(clippy::cast_precision_loss)]
    let target = items as f64;
    Objective::new("Collect every item")
        .with_metric(
            "resources_collected",
            MetricDefinition::target(target).required(),
        )
        .with_metric(
            "distance_traveled",
            MetricDefinition::target(100.0)
                .with_weight(0.25)
                .lower_is_better(),
        )
        .with_time_limit(time_limit)
}

pub fn engine(items: u64) -> ObjectiveEngine {
    ObjectiveEngine::load(gather_objective(items, 0)).unwrap()
}

pub const fn tick_settings(timeout_ms: u64, policy: ValidationPolicy) -> TickSettings {
    TickSettings {
        decision_timeout: Duration::from_millis(timeout_ms),
        policy,
    }
}

pub const fn episode_settings(timeout_ms: u64, min_agents: usize) -> EpisodeSettings {
    EpisodeSettings {
        decision_timeout: Duration::from_millis(timeout_ms),
        policy: ValidationPolicy::Reject,
        min_agents,
        disconnect_after_timeouts: 0,
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Register `agent` directly on a registry and hand back its endpoint.
pub fn register(
    sessions: &mut SessionRegistry,
    field: &mut Field,
    registration: &Registration,
    tick: u64,
) -> AgentEndpoint {
    let (channel, endpoint) = transport::channel(8);
    sessions
        .register(registration, channel, &field.capabilities(), tick)
        .unwrap();
    field.on_agent_joined(&registration.agent_id);
    endpoint
}

pub fn reply(tick: u64, agent: &str, decision: arena_types::Decision) -> transport::Inbound {
    transport::Inbound::Decision(DecisionMessage {
        tick,
        agent_id: AgentId::from(agent),
        decision,
    })
}

// ---------------------------------------------------------------------------
// Episodes
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Recorder {
    pub ticks: Vec<TickSummary>,
    pub ended: Option<EpisodeReport>,
}

impl EpisodeObserver for Recorder {
    fn on_tick(&mut self, summary: &TickSummary) {
        self.ticks.push(summary.clone());
    }

    fn on_episode_end(&mut self, report: &EpisodeReport) {
        self.ended = Some(report.clone());
    }
}

pub type EpisodeOutcome = (Field, Recorder, Result<EpisodeReport, RunnerError>);

/// Run an episode on its own task.
pub fn spawn_episode(
    mut field: Field,
    objective: Objective,
    settings: EpisodeSettings,
    mut control: mpsc::Receiver<ControlRequest>,
    operator: Arc<OperatorState>,
) -> JoinHandle<EpisodeOutcome> {
    tokio::spawn(async move {
        let mut recorder = Recorder::default();
        let result = runner::run_episode(
            &mut field,
            objective,
            &settings,
            &mut control,
            &operator,
            &mut recorder,
        )
        .await;
        (field, recorder, result)
    })
}
