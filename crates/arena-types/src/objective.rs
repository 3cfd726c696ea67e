//! Objective and metric definitions.
//!
//! An [`Objective`] is created once at episode start and handed to every
//! agent inside each observation. Both [`Objective`] and
//! [`MetricDefinition`] carry an open extension map: keys this version does
//! not understand (compound dependencies, dynamic triggers, team splits) are
//! kept verbatim and serialized back out unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Unrecognized keys carried alongside a known schema.
pub type Extensions = BTreeMap<String, serde_json::Value>;

/// Scoring parameters for one named metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MetricDefinition {
    /// The value the agent is trying to reach.
    pub target: f64,
    /// Relative importance in the weighted total (must be `>= 0`).
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// When true, smaller values are better (e.g. `time_taken`).
    #[serde(default)]
    pub lower_is_better: bool,
    /// When true, the metric gates pass/fail.
    #[serde(default)]
    pub required: bool,
    /// Unknown keys, preserved for forward compatibility.
    #[serde(flatten)]
    #[ts(skip)]
    pub extensions: Extensions,
}

impl MetricDefinition {
    /// A higher-is-better metric with weight 1.0.
    pub fn target(target: f64) -> Self {
        Self {
            target,
            weight: default_weight(),
            lower_is_better: false,
            required: false,
            extensions: Extensions::new(),
        }
    }

    /// Set the weight.
    #[must_use]
    pub const fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Mark the metric as lower-is-better.
    #[must_use]
    pub const fn lower_is_better(mut self) -> Self {
        self.lower_is_better = true;
        self
    }

    /// Mark the metric as required for passing.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Whether `current` satisfies the target in this metric's direction.
    pub fn is_met(&self, current: f64) -> bool {
        if self.lower_is_better {
            current <= self.target
        } else {
            current >= self.target
        }
    }
}

/// The goal of an episode: a description, scored metrics, and a time limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Objective {
    /// Human-readable description shown to the agent.
    pub description: String,
    /// Metric name to scoring parameters. Keys are unique by construction.
    #[serde(default)]
    pub success_metrics: BTreeMap<String, MetricDefinition>,
    /// Time limit in ticks; `0` means unlimited.
    #[serde(default)]
    pub time_limit: u64,
    /// Unknown keys, preserved for forward compatibility.
    #[serde(flatten)]
    #[ts(skip)]
    pub extensions: Extensions,
}

impl Objective {
    /// Create an objective with no metrics and no time limit.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            success_metrics: BTreeMap::new(),
            time_limit: 0,
            extensions: Extensions::new(),
        }
    }

    /// Add (or replace) a metric.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, metric: MetricDefinition) -> Self {
        self.success_metrics.insert(name.into(), metric);
        self
    }

    /// Set the time limit in ticks.
    #[must_use]
    pub const fn with_time_limit(mut self, ticks: u64) -> Self {
        self.time_limit = ticks;
        self
    }

    /// Names of all scored metrics, in sorted order.
    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.success_metrics.keys().map(String::as_str)
    }
}

const fn default_weight() -> f64 {
    1.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn metric_defaults_apply() {
        let metric: MetricDefinition = serde_json::from_value(json!({ "target": 10 })).unwrap();
        assert!((metric.weight - 1.0).abs() < f64::EPSILON);
        assert!(!metric.lower_is_better);
        assert!(!metric.required);
        assert!(metric.extensions.is_empty());
    }

    #[test]
    fn unknown_keys_are_echoed_back() {
        let input = json!({
            "description": "Collect resources",
            "success_metrics": {
                "resources_collected": {
                    "target": 10.0,
                    "weight": 1.0,
                    "lower_is_better": false,
                    "required": true,
                    "depends_on": ["scouting"]
                }
            },
            "time_limit": 600,
            "dynamic_triggers": [{ "at_tick": 100, "add_metric": "speed" }],
            "team": { "shared": true }
        });

        let objective: Objective = serde_json::from_value(input.clone()).unwrap();
        assert!(objective.extensions.contains_key("dynamic_triggers"));
        assert!(objective.extensions.contains_key("team"));
        let metric = objective.success_metrics.get("resources_collected").unwrap();
        assert!(metric.extensions.contains_key("depends_on"));

        let output = serde_json::to_value(&objective).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn is_met_respects_direction() {
        let higher = MetricDefinition::target(10.0);
        assert!(higher.is_met(10.0));
        assert!(!higher.is_met(9.0));

        let lower = MetricDefinition::target(300.0).lower_is_better();
        assert!(lower.is_met(300.0));
        assert!(lower.is_met(10.0));
        assert!(!lower.is_met(301.0));
    }
}
