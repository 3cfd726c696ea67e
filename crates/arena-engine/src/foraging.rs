//! The built-in foraging scenario.
//!
//! Agents start at the origin of a square field scattered with resources
//! (berry bushes, wood piles, stone deposits) and hazards (fire pits, spike
//! pits). Walking within [`COLLECT_RADIUS`] of a resource picks it up;
//! ending a move within [`HAZARD_RADIUS`] of a hazard deals its damage.
//! The episode completes once every resource has been collected.
//!
//! # Tools
//!
//! - `move_to` -- walk toward `target_position` at most
//!   `BASE_STEP * speed` units per tick (`speed` defaults to 1).
//! - `collect` -- pick up every resource in reach without moving.
//! - `idle` -- always available.
//!
//! # Metrics
//!
//! `resources_collected`, `damage_taken`, `distance_traveled`,
//! `health_remaining`, and `time_taken` (ticks elapsed).

use std::collections::BTreeMap;

use arena_core::config::ScenarioConfig;
use arena_core::scenario::ScenarioController;
use arena_core::tools::{Tool, ToolOutcome, ToolRegistry};
use arena_core::validation::{self, CapabilityRegistry};
use arena_types::{
    AgentId, ParamKind, ParamSpec, Params, RejectionReason, ToolSchema, ValidatedDecision, Vec3,
    WorldBounds, WorldFields,
};
use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

/// How far an agent can see resources and hazards.
pub const PERCEPTION_RADIUS: f64 = 50.0;

/// Resources this close to an agent are picked up.
pub const COLLECT_RADIUS: f64 = 2.0;

/// Ending a move this close to a hazard deals its damage.
pub const HAZARD_RADIUS: f64 = 1.5;

/// Distance covered per tick at speed 1.
pub const BASE_STEP: f64 = 5.0;

/// Upper bound on the `speed` parameter.
pub const MAX_SPEED: f64 = 3.0;

/// Starting health of every agent.
pub const MAX_HEALTH: f64 = 100.0;

/// Ceiling of the world box.
const WORLD_HEIGHT: f64 = 10.0;

/// Hazards are never placed this close to the spawn point.
const SPAWN_CLEARANCE: f64 = 5.0;

/// Random draws per hazard before falling back to a field corner.
const PLACEMENT_ATTEMPTS: u32 = 32;

/// Scenario name this module answers to.
pub const SCENARIO_NAME: &str = "foraging";

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Kind of collectible resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Berry bush.
    Berry,
    /// Wood pile.
    Wood,
    /// Stone deposit.
    Stone,
}

impl ResourceKind {
    const ALL: [Self; 3] = [Self::Berry, Self::Wood, Self::Stone];

    /// Display name shown to agents.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Berry => "Berry Bush",
            Self::Wood => "Wood Pile",
            Self::Stone => "Stone Deposit",
        }
    }
}

/// Kind of hazard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    /// Fire pit.
    Fire,
    /// Spike pit.
    Pit,
}

impl HazardKind {
    const ALL: [Self; 2] = [Self::Fire, Self::Pit];

    /// Display name shown to agents.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Fire => "Fire Pit",
            Self::Pit => "Spike Pit",
        }
    }

    /// Health lost on contact.
    pub const fn damage(self) -> f64 {
        match self {
            Self::Fire => 10.0,
            Self::Pit => 25.0,
        }
    }
}

/// A collectible resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Stable index within the world.
    pub id: usize,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Where it sits.
    pub position: Vec3,
    /// Who picked it up, if anyone.
    pub collected_by: Option<AgentId>,
}

/// A damaging hazard.
#[derive(Debug, Clone, PartialEq)]
pub struct Hazard {
    /// Stable index within the world.
    pub id: usize,
    /// Hazard kind.
    pub kind: HazardKind,
    /// Where it sits.
    pub position: Vec3,
}

/// Per-agent state.
#[derive(Debug, Clone, PartialEq)]
pub struct Forager {
    /// Current position.
    pub position: Vec3,
    /// Remaining health.
    pub health: f64,
    /// Resources picked up.
    pub collected: u64,
    /// Total health lost.
    pub damage_taken: f64,
    /// Total distance walked.
    pub distance_traveled: f64,
}

impl Forager {
    const fn spawn() -> Self {
        Self {
            position: [0.0; 3],
            health: MAX_HEALTH,
            collected: 0,
            damage_taken: 0.0,
            distance_traveled: 0.0,
        }
    }

    fn is_down(&self) -> bool {
        self.health <= 0.0
    }
}

/// Straight-line distance between two points.
pub fn distance(a: Vec3, b: Vec3) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(from, to)| (to - from) * (to - from))
        .sum::<f64>()
        .sqrt()
}

/// Point at most `max_step` along the line from `from` toward `to`.
fn step_toward(from: Vec3, to: Vec3, max_step: f64) -> Vec3 {
    let gap = distance(from, to);
    if gap <= max_step || gap <= f64::EPSILON {
        return to;
    }
    let ratio = max_step / gap;
    let [fx, fy, fz] = from;
    let [tx, ty, tz] = to;
    [
        (tx - fx).mul_add(ratio, fx),
        (ty - fy).mul_add(ratio, fy),
        (tz - fz).mul_add(ratio, fz),
    ]
}

fn random_point(rng: &mut StdRng, reach: f64) -> Vec3 {
    [
        rng.random_range(-reach..=reach),
        0.0,
        rng.random_range(-reach..=reach),
    ]
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Mutable foraging world state.
#[derive(Debug, Clone, PartialEq)]
pub struct ForagingWorld {
    /// Every resource, collected or not.
    pub resources: Vec<Resource>,
    /// Every hazard.
    pub hazards: Vec<Hazard>,
    /// Agents that have joined.
    pub foragers: BTreeMap<AgentId, Forager>,
    /// Field limits.
    pub bounds: WorldBounds,
    /// Most recent tick the world advanced to.
    pub tick: u64,
}

impl ForagingWorld {
    /// An empty field with the given half extent.
    pub fn empty(half_extent: f64) -> Self {
        Self {
            resources: Vec::new(),
            hazards: Vec::new(),
            foragers: BTreeMap::new(),
            bounds: WorldBounds::centered(half_extent, WORLD_HEIGHT),
            tick: 0,
        }
    }

    /// Lay out resources and hazards from a seed.
    ///
    /// The same config always produces the same layout. Entities stay a
    /// little inside the field edges; hazards keep clear of the spawn.
    pub fn generate(config: &ScenarioConfig) -> Self {
        let mut world = Self::empty(config.world_half_extent);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let reach = config.world_half_extent * 0.9;

        for (id, kind) in ResourceKind::ALL
            .iter()
            .cycle()
            .take(usize::try_from(config.resource_count).unwrap_or(0))
            .enumerate()
        {
            let position = random_point(&mut rng, reach);
            world.add_resource(*kind, position);
            debug!(id, ?kind, ?position, "Placed resource");
        }

        for kind in HazardKind::ALL
            .iter()
            .cycle()
            .take(usize::try_from(config.hazard_count).unwrap_or(0))
        {
            let position = (0..PLACEMENT_ATTEMPTS)
                .map(|_| random_point(&mut rng, reach))
                .find(|point| distance(*point, [0.0; 3]) >= SPAWN_CLEARANCE)
                .unwrap_or([reach, 0.0, reach]);
            world.add_hazard(*kind, position);
        }

        info!(
            seed = config.seed,
            resources = world.resources.len(),
            hazards = world.hazards.len(),
            half_extent = config.world_half_extent,
            "Foraging world generated"
        );
        world
    }

    /// Place a resource.
    pub fn add_resource(&mut self, kind: ResourceKind, position: Vec3) {
        let id = self.resources.len();
        self.resources.push(Resource {
            id,
            kind,
            position,
            collected_by: None,
        });
    }

    /// Place a hazard.
    pub fn add_hazard(&mut self, kind: HazardKind, position: Vec3) {
        let id = self.hazards.len();
        self.hazards.push(Hazard { id, kind, position });
    }

    /// Resources still on the field.
    pub fn remaining(&self) -> usize {
        self.resources
            .iter()
            .filter(|resource| resource.collected_by.is_none())
            .count()
    }

    /// Pick up every resource within reach of `agent`. Returns how many.
    fn collect_in_reach(&mut self, agent: &AgentId) -> u64 {
        let Some(forager) = self.foragers.get_mut(agent) else {
            return 0;
        };
        let mut picked: u64 = 0;
        for resource in &mut self.resources {
            if resource.collected_by.is_none()
                && distance(resource.position, forager.position) <= COLLECT_RADIUS
            {
                resource.collected_by = Some(agent.clone());
                picked = picked.saturating_add(1);
            }
        }
        forager.collected = forager.collected.saturating_add(picked);
        picked
    }

    /// Apply damage from every hazard in contact with `agent`. Returns the
    /// damage dealt.
    fn touch_hazards(&mut self, agent: &AgentId) -> f64 {
        let Some(forager) = self.foragers.get_mut(agent) else {
            return 0.0;
        };
        let damage: f64 = self
            .hazards
            .iter()
            .filter(|hazard| distance(hazard.position, forager.position) <= HAZARD_RADIUS)
            .map(|hazard| hazard.kind.damage())
            .sum();
        if damage > 0.0 {
            let dealt = damage.min(forager.health.max(0.0));
            forager.health = (forager.health - damage).max(0.0);
            forager.damage_taken += dealt;
            return dealt;
        }
        0.0
    }

    fn nearby_resources(&self, from: Vec3) -> Vec<serde_json::Value> {
        let mut nearby: Vec<(f64, &Resource)> = self
            .resources
            .iter()
            .filter(|resource| resource.collected_by.is_none())
            .map(|resource| (distance(from, resource.position), resource))
            .filter(|(gap, _)| *gap <= PERCEPTION_RADIUS)
            .collect();
        nearby.sort_by(|a, b| a.0.total_cmp(&b.0));
        nearby
            .into_iter()
            .map(|(gap, resource)| {
                json!({
                    "id": resource.id,
                    "name": resource.kind.display_name(),
                    "type": resource.kind,
                    "position": validation::position_value(resource.position),
                    "distance": gap,
                })
            })
            .collect()
    }

    fn nearby_hazards(&self, from: Vec3) -> Vec<serde_json::Value> {
        let mut nearby: Vec<(f64, &Hazard)> = self
            .hazards
            .iter()
            .map(|hazard| (distance(from, hazard.position), hazard))
            .filter(|(gap, _)| *gap <= PERCEPTION_RADIUS)
            .collect();
        nearby.sort_by(|a, b| a.0.total_cmp(&b.0));
        nearby
            .into_iter()
            .map(|(gap, hazard)| {
                json!({
                    "id": hazard.id,
                    "name": hazard.kind.display_name(),
                    "type": hazard.kind,
                    "position": validation::position_value(hazard.position),
                    "distance": gap,
                    "damage": hazard.kind.damage(),
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

fn require_standing(agent: &AgentId, world: &ForagingWorld) -> Result<(), String> {
    match world.foragers.get(agent) {
        None => Err("agent has not joined the field".to_owned()),
        Some(forager) if forager.is_down() => Err("agent has no health left".to_owned()),
        Some(_) => Ok(()),
    }
}

struct MoveTo;

impl Tool<ForagingWorld> for MoveTo {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "move_to",
            "Walk toward a point, collecting resources passed within reach",
        )
        .with_param("target_position", ParamSpec::required(ParamKind::Position))
        .with_param(
            "speed",
            ParamSpec::optional(ParamKind::Number).with_bounds(0.0, MAX_SPEED),
        )
    }

    fn check(&self, agent: &AgentId, _params: &Params, world: &ForagingWorld) -> Result<(), String> {
        require_standing(agent, world)
    }

    fn execute(&self, agent: &AgentId, params: &Params, world: &mut ForagingWorld) -> ToolOutcome {
        let Some(target) = params
            .get("target_position")
            .and_then(validation::parse_position)
        else {
            return ToolOutcome::failed("missing target_position");
        };
        let speed = params
            .get("speed")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(1.0);
        let bounds = world.bounds;
        let Some(forager) = world.foragers.get_mut(agent) else {
            return ToolOutcome::failed("agent has not joined the field");
        };

        let from = forager.position;
        let to = bounds.clamp(step_toward(from, target, BASE_STEP * speed));
        let walked = distance(from, to);
        forager.position = to;
        forager.distance_traveled += walked;

        let picked = world.collect_in_reach(agent);
        let damage = world.touch_hazards(agent);
        debug!(agent_id = %agent, walked, picked, damage, "Forager moved");
        ToolOutcome::ok(format!(
            "moved {walked:.1} units, collected {picked}, took {damage:.0} damage"
        ))
    }
}

struct Collect;

impl Tool<ForagingWorld> for Collect {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new("collect", "Pick up every resource within reach")
    }

    fn check(&self, agent: &AgentId, _params: &Params, world: &ForagingWorld) -> Result<(), String> {
        require_standing(agent, world)?;
        let in_reach = world.foragers.get(agent).is_some_and(|forager| {
            world.resources.iter().any(|resource| {
                resource.collected_by.is_none()
                    && distance(resource.position, forager.position) <= COLLECT_RADIUS
            })
        });
        if in_reach {
            Ok(())
        } else {
            Err("no resource within reach".to_owned())
        }
    }

    fn execute(&self, agent: &AgentId, _params: &Params, world: &mut ForagingWorld) -> ToolOutcome {
        let picked = world.collect_in_reach(agent);
        ToolOutcome::ok(format!("collected {picked}"))
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// The foraging scenario: world state plus its tool table.
#[derive(Debug)]
pub struct ForagingScenario {
    world: ForagingWorld,
    tools: ToolRegistry<ForagingWorld>,
}

impl ForagingScenario {
    /// Wrap an existing world.
    pub fn new(world: ForagingWorld) -> Self {
        Self {
            world,
            tools: ToolRegistry::new()
                .with(Box::new(MoveTo))
                .with(Box::new(Collect)),
        }
    }

    /// Generate a world from config.
    pub fn from_config(config: &ScenarioConfig) -> Self {
        Self::new(ForagingWorld::generate(config))
    }
}

impl ScenarioController for ForagingScenario {
    fn name(&self) -> &str {
        SCENARIO_NAME
    }

    fn tick_world(&mut self, tick: u64) {
        self.world.tick = tick;
    }

    fn observation_base(&self, agent: &AgentId) -> WorldFields {
        let forager = self
            .world
            .foragers
            .get(agent)
            .cloned()
            .unwrap_or_else(Forager::spawn);
        WorldFields::from([
            (
                "position".to_owned(),
                validation::position_value(forager.position),
            ),
            ("health".to_owned(), json!(forager.health)),
            (
                "nearby_resources".to_owned(),
                json!(self.world.nearby_resources(forager.position)),
            ),
            (
                "nearby_hazards".to_owned(),
                json!(self.world.nearby_hazards(forager.position)),
            ),
            ("resources_collected".to_owned(), json!(forager.collected)),
            (
                "resources_remaining".to_owned(),
                json!(self.world.remaining()),
            ),
            ("damage_taken".to_owned(), json!(forager.damage_taken)),
        ])
    }

    #[allow(clippy::cast_precision_loss)]
    fn metric_values(&self, agent: &AgentId) -> BTreeMap<String, f64> {
        let forager = self
            .world
            .foragers
            .get(agent)
            .cloned()
            .unwrap_or_else(Forager::spawn);
        BTreeMap::from([
            ("resources_collected".to_owned(), forager.collected as f64),
            ("damage_taken".to_owned(), forager.damage_taken),
            ("distance_traveled".to_owned(), forager.distance_traveled),
            ("health_remaining".to_owned(), forager.health),
            ("time_taken".to_owned(), self.world.tick as f64),
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
        self.tools.dispatch(agent, decision, &mut self.world)
    }

    fn world_bounds(&self) -> WorldBounds {
        self.world.bounds
    }

    fn capabilities(&self) -> CapabilityRegistry {
        self.tools.capabilities()
    }

    fn on_agent_joined(&mut self, agent: &AgentId) {
        self.world
            .foragers
            .entry(agent.clone())
            .or_insert_with(Forager::spawn);
    }

    fn is_complete(&self) -> bool {
        !self.world.resources.is_empty() && self.world.remaining() == 0
    }
}
