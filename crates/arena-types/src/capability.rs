//! Tool schemas: the declared names and parameter shapes an agent may use.
//!
//! Agents declare the tools they intend to call during registration. The
//! scenario declares the tools it can execute. Validation checks incoming
//! decisions against these schemas before anything touches the world.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A world position `[x, y, z]`.
pub type Vec3 = [f64; 3];

/// The value shape a parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Any JSON number.
    Number,
    /// A JSON number with no fractional part.
    Integer,
    /// A JSON string.
    String,
    /// A JSON boolean.
    Boolean,
    /// A world position: an array of three numbers `[x, y, z]`.
    Position,
    /// Any JSON value; only presence is checked.
    Any,
}

impl ParamKind {
    /// Lowercase name used in rejection messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Integer => "integer",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Position => "position",
            Self::Any => "any",
        }
    }
}

/// Inclusive numeric range for a scalar parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NumericBounds {
    /// Smallest allowed value.
    pub min: f64,
    /// Largest allowed value.
    pub max: f64,
}

impl NumericBounds {
    /// Whether `value` lies within the range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Clamp `value` into the range.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

/// Shape of a single tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ParamSpec {
    /// Expected value shape.
    pub kind: ParamKind,
    /// Whether the parameter must be present.
    #[serde(default)]
    pub required: bool,
    /// Allowed range for `number`/`integer` parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub bounds: Option<NumericBounds>,
}

impl ParamSpec {
    /// A required parameter of the given kind.
    pub const fn required(kind: ParamKind) -> Self {
        Self {
            kind,
            required: true,
            bounds: None,
        }
    }

    /// An optional parameter of the given kind.
    pub const fn optional(kind: ParamKind) -> Self {
        Self {
            kind,
            required: false,
            bounds: None,
        }
    }

    /// Restrict a numeric parameter to `[min, max]`.
    #[must_use]
    pub const fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = Some(NumericBounds { min, max });
        self
    }
}

/// A tool name, description, and parameter shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ToolSchema {
    /// Tool identifier.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Parameter name to shape.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamSpec>,
}

impl ToolSchema {
    /// A tool with no parameters.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Declare a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }
}

/// Axis-aligned box that position parameters must fall inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WorldBounds {
    /// Minimum corner `[x, y, z]`.
    pub min: Vec3,
    /// Maximum corner `[x, y, z]`.
    pub max: Vec3,
}

impl WorldBounds {
    /// A box centred on the origin extending `half_extent` along x and z and
    /// `height` along y.
    pub fn centered(half_extent: f64, height: f64) -> Self {
        Self {
            min: [-half_extent, 0.0, -half_extent],
            max: [half_extent, height, half_extent],
        }
    }

    /// Whether every coordinate of `point` lies inside the box.
    pub fn contains(&self, point: Vec3) -> bool {
        point
            .iter()
            .zip(self.min.iter().zip(self.max.iter()))
            .all(|(v, (lo, hi))| v >= lo && v <= hi)
    }

    /// Clamp every coordinate of `point` into the box.
    pub fn clamp(&self, point: Vec3) -> Vec3 {
        let [x, y, z] = point;
        let [x0, y0, z0] = self.min;
        let [x1, y1, z1] = self.max;
        [x.max(x0).min(x1), y.max(y0).min(y1), z.max(z0).min(z1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_bounds_contains_and_clamps() {
        let bounds = WorldBounds::centered(50.0, 10.0);
        assert!(bounds.contains([0.0, 0.0, 0.0]));
        assert!(bounds.contains([50.0, 10.0, -50.0]));
        assert!(!bounds.contains([50.5, 0.0, 0.0]));
        assert_eq!(bounds.clamp([80.0, -1.0, 3.0]), [50.0, 0.0, 3.0]);
    }

    #[test]
    fn numeric_bounds_are_inclusive() {
        let bounds = NumericBounds { min: 1.0, max: 5.0 };
        assert!(bounds.contains(1.0));
        assert!(bounds.contains(5.0));
        assert!(!bounds.contains(5.1));
        assert!((bounds.clamp(9.0) - 5.0).abs() < f64::EPSILON);
    }
}
