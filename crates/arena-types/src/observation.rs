//! Observation payload delivered to an agent each tick.
//!
//! The world-state fields are owned by the scenario and flattened into the
//! top level of the message, next to the objective and the current progress.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::AgentId;
use crate::objective::Objective;

/// Scenario-defined world fields embedded in an observation
/// (position, nearby resources, health, ...).
pub type WorldFields = BTreeMap<String, serde_json::Value>;

/// Current value of every objective metric at a given tick.
///
/// Recomputed from world state every tick by the objective engine. Serializes
/// as a plain `{name: value}` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ProgressSnapshot(pub BTreeMap<String, f64>);

impl ProgressSnapshot {
    /// Create an empty snapshot.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Current value of a metric; `0.0` when it has not been recorded.
    pub fn value(&self, metric: &str) -> f64 {
        self.0.get(metric).copied().unwrap_or(0.0)
    }

    /// Record the current value of a metric.
    pub fn set(&mut self, metric: impl Into<String>, value: f64) {
        self.0.insert(metric.into(), value);
    }

    /// Iterate over `(metric, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Number of metrics recorded.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no metric has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for ProgressSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything an agent receives for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Observation {
    /// The tick this observation belongs to; echoed back in the decision.
    pub tick: u64,
    /// The agent this observation is addressed to.
    pub agent_id: AgentId,
    /// Name of the running scenario (e.g. `"foraging"`).
    #[serde(default)]
    pub scenario_name: String,
    /// The episode objective.
    pub objective: Objective,
    /// Current progress toward each objective metric.
    #[serde(default)]
    pub current_progress: ProgressSnapshot,
    /// Scenario-owned world fields, flattened into the message.
    #[serde(flatten)]
    #[ts(skip)]
    pub world: WorldFields,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::objective::MetricDefinition;

    fn sample() -> Observation {
        let mut world = WorldFields::new();
        world.insert("position".to_owned(), json!([1.0, 0.0, -2.5]));
        world.insert("health".to_owned(), json!(87.5));
        world.insert(
            "nearby_resources".to_owned(),
            json!([{ "name": "berry_001", "type": "berry", "position": [3.0, 0.0, 1.0] }]),
        );

        let mut progress = ProgressSnapshot::new();
        progress.set("resources_collected", 3.0);

        Observation {
            tick: 17,
            agent_id: AgentId::from("forager_1"),
            scenario_name: "foraging".to_owned(),
            objective: Objective::new("Collect berries")
                .with_metric("resources_collected", MetricDefinition::target(10.0))
                .with_time_limit(600),
            current_progress: progress,
            world,
        }
    }

    #[test]
    fn world_fields_are_flattened() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["tick"], json!(17));
        assert_eq!(value["health"], json!(87.5));
        assert_eq!(value["current_progress"]["resources_collected"], json!(3.0));
        assert!(value.get("world").is_none());
    }

    #[test]
    fn serialize_then_deserialize_is_field_for_field_equal() {
        let original = sample();
        let bytes = serde_json::to_vec(&original).unwrap();
        let restored: Observation = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn missing_progress_reads_as_zero() {
        let progress = ProgressSnapshot::new();
        assert!(progress.value("anything").abs() < f64::EPSILON);
    }
}
