//! Built-in decision policies.
//!
//! [`ForagerPolicy`] is a rule-based forager for the foraging scenario. It
//! reads only the observation's world fields, in priority order:
//!
//! 1. Step away from any hazard closer than [`HAZARD_ESCAPE_DISTANCE`].
//! 2. Collect when a resource is already within reach.
//! 3. Walk to the nearest visible resource.
//! 4. Walk the exploration circuit when nothing is in sight.
//!
//! Every decision carries its reasoning.

use std::collections::VecDeque;

use arena_core::agent::{Agent, EpisodeLifecycle};
use arena_types::{Decision, Objective, Observation, ScoreReport, Vec3};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Hazards closer than this trigger an escape move.
pub const HAZARD_ESCAPE_DISTANCE: f64 = 3.0;

/// How far past a hazard an escape move aims.
const ESCAPE_RANGE: f64 = 5.0;

/// Resources this close are collected in place.
const REACH: f64 = 2.0;

/// Recent positions kept in memory.
const MEMORY_CAPACITY: usize = 5;

/// Exploration circuit, visited in order when nothing is visible.
const WAYPOINTS: [Vec3; 4] = [
    [30.0, 0.0, 30.0],
    [-30.0, 0.0, 30.0],
    [-30.0, 0.0, -30.0],
    [30.0, 0.0, -30.0],
];

/// A resource or hazard as the foraging scenario reports it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sighting {
    /// Display name.
    pub name: String,
    /// Where it is.
    pub position: Vec3,
    /// Distance from the agent.
    pub distance: f64,
}

/// The world fields the forager reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ForagingView {
    /// Agent position.
    #[serde(default)]
    pub position: Vec3,
    /// Visible resources.
    #[serde(default)]
    pub nearby_resources: Vec<Sighting>,
    /// Visible hazards.
    #[serde(default)]
    pub nearby_hazards: Vec<Sighting>,
}

impl ForagingView {
    /// Extract the forager's view from an observation. Missing or
    /// unreadable fields read as empty.
    pub fn from_observation(observation: &Observation) -> Self {
        let fields = serde_json::Value::Object(
            observation
                .world
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        );
        serde_json::from_value(fields).unwrap_or_default()
    }
}

/// Point `ESCAPE_RANGE` units from `hazard` on the far side from `agent`.
fn escape_position(agent: Vec3, hazard: Vec3) -> Vec3 {
    let [ax, ay, az] = agent;
    let [hx, _, hz] = hazard;
    let (dx, dz) = (ax - hx, az - hz);
    let length = dx.hypot(dz);
    if length > f64::EPSILON {
        [
            (dx / length).mul_add(ESCAPE_RANGE, hx),
            ay,
            (dz / length).mul_add(ESCAPE_RANGE, hz),
        ]
    } else {
        [hx + ESCAPE_RANGE, ay, hz]
    }
}

fn nearest(sightings: &[Sighting]) -> Option<&Sighting> {
    sightings
        .iter()
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

/// Rule-based forager.
#[derive(Debug, Clone, Default)]
pub struct ForagerPolicy {
    recent: VecDeque<Vec3>,
    waypoint: usize,
    objective: Option<Objective>,
    final_report: Option<ScoreReport>,
}

impl ForagerPolicy {
    /// A forager with empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    fn remember(&mut self, position: Vec3) {
        if self.recent.len() >= MEMORY_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(position);
    }

    /// Whether the last few positions are all the same spot.
    fn is_stuck(&self) -> bool {
        self.recent.len() >= MEMORY_CAPACITY
            && self
                .recent
                .iter()
                .zip(self.recent.iter().skip(1))
                .all(|(a, b)| a == b)
    }

    fn explore(&mut self, position: Vec3) -> Decision {
        let arrived = WAYPOINTS.get(self.waypoint).is_some_and(|target| {
            target
                .iter()
                .zip(position.iter())
                .all(|(t, p)| (t - p).abs() < REACH)
        });
        if arrived || self.is_stuck() {
            self.waypoint = self.waypoint.saturating_add(1);
            self.recent.clear();
        }
        if self.waypoint >= WAYPOINTS.len() {
            self.waypoint = 0;
        }
        match WAYPOINTS.get(self.waypoint) {
            Some(target) => Decision::new("move_to")
                .with_param("target_position", json!(target))
                .with_reasoning(format!(
                    "Nothing in sight, exploring waypoint {}",
                    self.waypoint
                )),
            None => Decision::idle(Some("Nothing in sight, waiting".to_owned())),
        }
    }
}

impl EpisodeLifecycle for ForagerPolicy {
    fn on_episode_start(&mut self, objective: &Objective) {
        self.recent.clear();
        self.waypoint = 0;
        info!(objective = objective.description, "Episode started");
        self.objective = Some(objective.clone());
    }

    fn on_episode_end(&mut self, report: &ScoreReport) {
        info!(
            objective = self.objective.as_ref().map_or("", |o| o.description.as_str()),
            total_score = report.score.total_score,
            passed = report.score.passed,
            "Episode ended"
        );
        self.final_report = Some(report.clone());
    }
}

impl Agent for ForagerPolicy {
    fn decide(&mut self, observation: &Observation) -> Decision {
        let view = ForagingView::from_observation(observation);
        self.remember(view.position);

        if let Some(hazard) = view
            .nearby_hazards
            .iter()
            .find(|hazard| hazard.distance < HAZARD_ESCAPE_DISTANCE)
        {
            let target = escape_position(view.position, hazard.position);
            return Decision::new("move_to")
                .with_param("target_position", json!(target))
                .with_param("speed", json!(2.0))
                .with_reasoning(format!(
                    "Avoiding {} at distance {:.1}",
                    hazard.name, hazard.distance
                ));
        }

        if let Some(resource) = nearest(&view.nearby_resources) {
            if resource.distance <= REACH {
                return Decision::new("collect").with_reasoning(format!(
                    "Collecting {} at distance {:.1}",
                    resource.name, resource.distance
                ));
            }
            self.recent.clear();
            return Decision::new("move_to")
                .with_param("target_position", json!(resource.position))
                .with_param("speed", json!(1.5))
                .with_reasoning(format!(
                    "Moving to {} at distance {:.1}",
                    resource.name, resource.distance
                ));
        }

        self.explore(view.position)
    }

    fn lifecycle(&mut self) -> Option<&mut dyn EpisodeLifecycle> {
        Some(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use arena_types::{AgentId, ProgressSnapshot, WorldFields};

    use super::*;

    fn observation(world: serde_json::Value) -> Observation {
        let fields: WorldFields = serde_json::from_value(world).unwrap();
        Observation {
            tick: 1,
            agent_id: AgentId::from("forager_1"),
            scenario_name: "foraging".to_owned(),
            objective: Objective::new("Collect"),
            current_progress: ProgressSnapshot::new(),
            world: fields,
        }
    }

    fn target(decision: &Decision) -> Vec3 {
        serde_json::from_value(decision.params.get("target_position").cloned().unwrap()).unwrap()
    }

    #[test]
    fn escapes_close_hazard_first() {
        let mut policy = ForagerPolicy::new();
        let decision = policy.decide(&observation(json!({
            "position": [1.0, 0.0, 0.0],
            "nearby_hazards": [{"name": "Fire Pit", "position": [0.0, 0.0, 0.0], "distance": 1.0}],
            "nearby_resources": [{"name": "Berry Bush", "position": [1.5, 0.0, 0.0], "distance": 0.5}]
        })));
        assert_eq!(decision.tool, "move_to");
        let [x, _, z] = target(&decision);
        assert!((x - 5.0).abs() < 1e-9);
        assert!(z.abs() < 1e-9);
        assert!(decision.reasoning.unwrap().contains("Fire Pit"));
    }

    #[test]
    fn collects_within_reach_and_walks_to_nearest() {
        let mut policy = ForagerPolicy::new();
        let near = policy.decide(&observation(json!({
            "position": [0.0, 0.0, 0.0],
            "nearby_resources": [{"name": "Wood Pile", "position": [1.0, 0.0, 1.0], "distance": 1.4}]
        })));
        assert_eq!(near.tool, "collect");

        let far = policy.decide(&observation(json!({
            "position": [0.0, 0.0, 0.0],
            "nearby_resources": [
                {"name": "Stone Deposit", "position": [20.0, 0.0, 0.0], "distance": 20.0},
                {"name": "Berry Bush", "position": [0.0, 0.0, 8.0], "distance": 8.0}
            ]
        })));
        assert_eq!(far.tool, "move_to");
        assert_eq!(target(&far), [0.0, 0.0, 8.0]);
    }

    #[test]
    fn explores_when_nothing_is_visible() {
        let mut policy = ForagerPolicy::new();
        let first = policy.decide(&observation(json!({"position": [0.0, 0.0, 0.0]})));
        assert_eq!(first.tool, "move_to");
        assert_eq!(target(&first), WAYPOINTS[0]);

        let arrived = policy.decide(&observation(json!({"position": WAYPOINTS[0]})));
        assert_eq!(target(&arrived), WAYPOINTS[1]);
    }

    #[test]
    fn unreadable_world_still_decides() {
        let mut policy = ForagerPolicy::new();
        let decision = policy.decide(&observation(json!({"position": "somewhere"})));
        assert_eq!(decision.tool, "move_to");
    }

    #[test]
    fn lifecycle_keeps_the_final_report() {
        let mut policy = ForagerPolicy::new();
        let report = ScoreReport {
            agent_id: AgentId::from("forager_1"),
            score: arena_types::ScoreResult::default(),
            tally: arena_types::AgentTally::default(),
        };
        if let Some(hooks) = policy.lifecycle() {
            hooks.on_episode_start(&Objective::new("Collect"));
            hooks.on_episode_end(&report);
        }
        assert_eq!(policy.final_report.as_ref(), Some(&report));
        assert!(policy.objective.is_some());
    }
}
