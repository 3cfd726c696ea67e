//! Decision validation against a capability registry.
//!
//! The pipeline runs in order and stops at the first failure:
//!
//! 1. Idle -- the idle tool is always valid.
//! 2. Capability -- is the tool in the agent's registry?
//! 3. Parameters -- are required parameters present and of the declared
//!    kind?
//! 4. Bounds -- are numeric and positional parameters within range?
//!    Out-of-range values are rejected or clamped depending on the
//!    [`ValidationPolicy`].
//!
//! A failed decision is never applied. [`validate_or_idle`] turns the
//! failure into an idle fallback carrying the rejection as its reasoning.

use std::collections::{BTreeMap, BTreeSet};

use arena_types::{
    AgentId, Decision, ParamKind, ParamSpec, RejectionReason, ToolSchema, ValidatedDecision, Vec3,
    WorldBounds,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to do with a numeric or positional value outside its bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Refuse the decision.
    #[default]
    Reject,
    /// Pull the value into range and accept the decision.
    Clamp,
}

// ---------------------------------------------------------------------------
// Capability registry
// ---------------------------------------------------------------------------

/// The tools an agent may invoke, with their parameter schemas.
///
/// Built from the scenario's tools and narrowed to what the agent declared
/// at registration. Tools the scenario offers but the agent did not declare
/// are remembered so their use is reported as
/// [`RejectionReason::NotDeclared`] rather than as an unknown tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityRegistry {
    tools: BTreeMap<String, ToolSchema>,
    withheld: BTreeSet<String>,
}

impl CapabilityRegistry {
    /// An empty registry. Only idle is valid against it.
    pub const fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            withheld: BTreeSet::new(),
        }
    }

    /// Add (or replace) a tool.
    pub fn insert(&mut self, schema: ToolSchema) {
        self.withheld.remove(&schema.name);
        self.tools.insert(schema.name.clone(), schema);
    }

    /// Schema for `tool`, if registered.
    pub fn get(&self, tool: &str) -> Option<&ToolSchema> {
        self.tools.get(tool)
    }

    /// Whether `tool` is registered.
    pub fn contains(&self, tool: &str) -> bool {
        self.tools.contains_key(tool)
    }

    /// Whether `tool` exists in the scenario but was not declared.
    pub fn is_withheld(&self, tool: &str) -> bool {
        self.withheld.contains(tool)
    }

    /// Registered tool names in sorted order.
    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Registered schemas in name order.
    pub fn schemas(&self) -> impl Iterator<Item = &ToolSchema> {
        self.tools.values()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool is registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Narrow this registry to the declared tool names.
    ///
    /// The scenario's schema stays authoritative: only names are taken from
    /// the declaration. Declared names the scenario does not know are
    /// ignored. An empty declaration keeps every tool.
    #[must_use]
    pub fn restrict_to<'a, I>(&self, declared: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let declared: BTreeSet<&str> = declared.into_iter().collect();
        if declared.is_empty() {
            return self.clone();
        }

        let mut restricted = Self::new();
        for (name, schema) in &self.tools {
            if declared.contains(name.as_str()) {
                restricted.tools.insert(name.clone(), schema.clone());
            } else {
                restricted.withheld.insert(name.clone());
            }
        }
        restricted
    }
}

impl FromIterator<ToolSchema> for CapabilityRegistry {
    fn from_iter<I: IntoIterator<Item = ToolSchema>>(iter: I) -> Self {
        let mut registry = Self::new();
        for schema in iter {
            registry.insert(schema);
        }
        registry
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// What the validator needs to know about the tick being answered.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationContext {
    /// The tick the decision answers.
    pub tick: u64,
    /// The deciding agent.
    pub agent_id: AgentId,
    /// Box that position parameters must fall inside.
    pub world_bounds: WorldBounds,
    /// Out-of-range handling.
    pub policy: ValidationPolicy,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Validate a decision through the full pipeline.
///
/// Returns the (possibly clamped) decision, or the first
/// [`RejectionReason`] encountered.
pub fn validate(
    decision: Decision,
    registry: &CapabilityRegistry,
    context: &ObservationContext,
) -> Result<ValidatedDecision, RejectionReason> {
    // Stage 1: idle always passes
    if decision.is_idle() {
        return Ok(ValidatedDecision::accepted(decision));
    }

    // Stage 2: capability
    let schema = validate_capability(&decision.tool, registry)?;

    // Stage 3: presence and kind
    validate_parameters(&decision, schema)?;

    // Stage 4: bounds
    let mut decision = decision;
    let clamped = validate_bounds(&mut decision, schema, context)?;

    Ok(ValidatedDecision {
        decision,
        clamped,
        fallback: false,
    })
}

/// Validate, substituting an annotated idle decision on failure.
///
/// The rejection, if any, is returned alongside so callers can count it.
pub fn validate_or_idle(
    decision: Decision,
    registry: &CapabilityRegistry,
    context: &ObservationContext,
) -> (ValidatedDecision, Option<RejectionReason>) {
    match validate(decision, registry, context) {
        Ok(validated) => (validated, None),
        Err(reason) => (
            ValidatedDecision::fallback_idle(format!("Rejected: {reason}")),
            Some(reason),
        ),
    }
}

fn validate_capability<'r>(
    tool: &str,
    registry: &'r CapabilityRegistry,
) -> Result<&'r ToolSchema, RejectionReason> {
    registry.get(tool).ok_or_else(|| {
        if registry.is_withheld(tool) {
            RejectionReason::NotDeclared {
                tool: tool.to_owned(),
            }
        } else {
            RejectionReason::UnknownTool {
                tool: tool.to_owned(),
            }
        }
    })
}

fn validate_parameters(decision: &Decision, schema: &ToolSchema) -> Result<(), RejectionReason> {
    for (name, spec) in &schema.parameters {
        match present(decision, name) {
            None if spec.required => {
                return Err(RejectionReason::MissingParameter {
                    tool: schema.name.clone(),
                    param: name.clone(),
                });
            }
            None => {}
            Some(value) => {
                if !kind_matches(spec.kind, value) {
                    return Err(RejectionReason::WrongParameterType {
                        tool: schema.name.clone(),
                        param: name.clone(),
                        expected: spec.kind.as_str().to_owned(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn validate_bounds(
    decision: &mut Decision,
    schema: &ToolSchema,
    context: &ObservationContext,
) -> Result<Vec<String>, RejectionReason> {
    let mut clamped = Vec::new();

    for (name, spec) in &schema.parameters {
        let Some(value) = decision.params.get_mut(name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let Some(repaired) = out_of_bounds_repair(value, spec, &context.world_bounds) else {
            continue;
        };

        match context.policy {
            ValidationPolicy::Reject => {
                return Err(RejectionReason::OutOfBounds {
                    tool: schema.name.clone(),
                    param: name.clone(),
                });
            }
            ValidationPolicy::Clamp => {
                *value = repaired;
                clamped.push(name.clone());
            }
        }
    }

    Ok(clamped)
}

/// The clamped replacement for `value`, or `None` when it is in range.
fn out_of_bounds_repair(value: &Value, spec: &ParamSpec, world: &WorldBounds) -> Option<Value> {
    match spec.kind {
        ParamKind::Position => {
            let point = parse_position(value)?;
            if world.contains(point) {
                None
            } else {
                Some(position_value(world.clamp(point)))
            }
        }
        ParamKind::Number => {
            let bounds = spec.bounds?;
            let number = value.as_f64()?;
            if bounds.contains(number) {
                None
            } else {
                serde_json::Number::from_f64(bounds.clamp(number)).map(Value::Number)
            }
        }
        ParamKind::Integer => {
            let bounds = spec.bounds?;
            let number = value.as_f64()?;
            if bounds.contains(number) {
                return None;
            }
            // Nearest whole number inside the bounds, kept integral on the wire.
            let whole = number.max(bounds.min.ceil()).min(bounds.max.floor());
            integer_value(whole)
                .filter(|_| bounds.contains(whole))
                .or_else(|| serde_json::Number::from_f64(bounds.clamp(number)).map(Value::Number))
        }
        ParamKind::String | ParamKind::Boolean | ParamKind::Any => None,
    }
}

/// Encode a whole `f64` as a JSON integer.
fn integer_value(whole: f64) -> Option<Value> {
    // 2^63: i64::MAX does not survive the round trip through f64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if whole.fract() != 0.0 || !(-LIMIT..LIMIT).contains(&whole) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    Some(Value::from(whole as i64))
}

/// A parameter value, treating JSON `null` as absent.
fn present<'d>(decision: &'d Decision, name: &str) -> Option<&'d Value> {
    decision.params.get(name).filter(|value| !value.is_null())
}

fn kind_matches(kind: ParamKind, value: &Value) -> bool {
    match kind {
        ParamKind::Number => value.is_number(),
        ParamKind::Integer => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|number| number.fract() == 0.0)
        }
        ParamKind::String => value.is_string(),
        ParamKind::Boolean => value.is_boolean(),
        ParamKind::Position => parse_position(value).is_some(),
        ParamKind::Any => true,
    }
}

/// Read a `[x, y, z]` array of numbers.
pub fn parse_position(value: &Value) -> Option<Vec3> {
    match value.as_array()?.as_slice() {
        [x, y, z] => Some([x.as_f64()?, y.as_f64()?, z.as_f64()?]),
        _ => None,
    }
}

/// Encode a position as a `[x, y, z]` JSON array.
pub fn position_value(point: Vec3) -> Value {
    Value::Array(
        point
            .iter()
            .filter_map(|coordinate| serde_json::Number::from_f64(*coordinate))
            .map(Value::Number)
            .collect(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> CapabilityRegistry {
        [
            ToolSchema::new("move_to", "Move toward a position")
                .with_param("target_position", ParamSpec::required(ParamKind::Position))
                .with_param(
                    "speed",
                    ParamSpec::optional(ParamKind::Number).with_bounds(0.0, 5.0),
                ),
            ToolSchema::new("collect", "Pick up a resource")
                .with_param("resource", ParamSpec::required(ParamKind::String)),
        ]
        .into_iter()
        .collect()
    }

    fn context(policy: ValidationPolicy) -> ObservationContext {
        ObservationContext {
            tick: 3,
            agent_id: AgentId::from("a"),
            world_bounds: WorldBounds::centered(50.0, 10.0),
            policy,
        }
    }

    fn move_to(position: Value) -> Decision {
        Decision::new("move_to").with_param("target_position", position)
    }

    #[test]
    fn idle_is_always_valid() {
        let result = validate(
            Decision::idle(None),
            &CapabilityRegistry::new(),
            &context(ValidationPolicy::Reject),
        );
        assert!(result.unwrap().decision.is_idle());
    }

    #[test]
    fn accepts_well_formed_decision() {
        let decision = move_to(json!([1.0, 0.0, 2.0])).with_param("speed", json!(2));
        let validated = validate(decision.clone(), &registry(), &context(ValidationPolicy::Reject))
            .unwrap();
        assert_eq!(validated.decision, decision);
        assert!(validated.clamped.is_empty());
        assert!(!validated.fallback);
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let result = validate(
            Decision::new("fly"),
            &registry(),
            &context(ValidationPolicy::Reject),
        );
        assert_eq!(
            result.unwrap_err(),
            RejectionReason::UnknownTool {
                tool: "fly".to_owned()
            }
        );
    }

    #[test]
    fn undeclared_tool_is_distinguished() {
        let restricted = registry().restrict_to(["move_to"]);
        assert!(restricted.contains("move_to"));
        assert!(!restricted.contains("collect"));

        let result = validate(
            Decision::new("collect").with_param("resource", json!("berry_001")),
            &restricted,
            &context(ValidationPolicy::Reject),
        );
        assert_eq!(
            result.unwrap_err(),
            RejectionReason::NotDeclared {
                tool: "collect".to_owned()
            }
        );
    }

    #[test]
    fn empty_declaration_keeps_every_tool() {
        let all = registry().restrict_to(std::iter::empty::<&str>());
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn missing_and_mistyped_parameters_are_rejected() {
        let ctx = context(ValidationPolicy::Reject);

        let missing = validate(Decision::new("move_to"), &registry(), &ctx).unwrap_err();
        assert!(matches!(missing, RejectionReason::MissingParameter { param, .. } if param == "target_position"));

        let null = validate(move_to(Value::Null), &registry(), &ctx).unwrap_err();
        assert!(matches!(null, RejectionReason::MissingParameter { .. }));

        let mistyped = validate(move_to(json!("north")), &registry(), &ctx).unwrap_err();
        assert!(matches!(
            mistyped,
            RejectionReason::WrongParameterType { expected, .. } if expected == "position"
        ));

        let short = validate(move_to(json!([1.0, 2.0])), &registry(), &ctx).unwrap_err();
        assert!(matches!(short, RejectionReason::WrongParameterType { .. }));
    }

    #[test]
    fn out_of_bounds_position_is_rejected_by_default() {
        let result = validate(
            move_to(json!([80.0, 0.0, 0.0])),
            &registry(),
            &context(ValidationPolicy::default()),
        );
        assert!(matches!(
            result.unwrap_err(),
            RejectionReason::OutOfBounds { param, .. } if param == "target_position"
        ));
    }

    #[test]
    fn clamp_policy_repairs_out_of_range_values() {
        let decision = move_to(json!([80.0, -3.0, 10.0])).with_param("speed", json!(9.5));
        let validated = validate(decision, &registry(), &context(ValidationPolicy::Clamp)).unwrap();

        assert_eq!(
            validated.decision.params.get("target_position"),
            Some(&json!([50.0, 0.0, 10.0]))
        );
        assert_eq!(validated.decision.params.get("speed"), Some(&json!(5.0)));
        assert_eq!(validated.clamped, vec!["speed".to_owned(), "target_position".to_owned()]);
    }

    #[test]
    fn clamped_integer_stays_an_integer() {
        let registry: CapabilityRegistry = [ToolSchema::new("plant", "Plant seeds").with_param(
            "amount",
            ParamSpec::required(ParamKind::Integer).with_bounds(0.0, 5.0),
        )]
        .into_iter()
        .collect();
        let ctx = context(ValidationPolicy::Clamp);

        let high = validate(
            Decision::new("plant").with_param("amount", json!(9)),
            &registry,
            &ctx,
        )
        .unwrap();
        let amount = high.decision.params.get("amount").unwrap();
        assert_eq!(amount, &json!(5));
        assert_eq!(amount.as_i64(), Some(5));
        assert_eq!(high.clamped, vec!["amount".to_owned()]);

        let low = validate(
            Decision::new("plant").with_param("amount", json!(-2)),
            &registry,
            &ctx,
        )
        .unwrap();
        assert_eq!(low.decision.params.get("amount").unwrap().as_i64(), Some(0));
    }

    #[test]
    fn validate_or_idle_annotates_fallback() {
        let (validated, reason) = validate_or_idle(
            Decision::new("fly"),
            &registry(),
            &context(ValidationPolicy::Reject),
        );
        assert!(validated.decision.is_idle());
        assert!(validated.fallback);
        assert!(reason.is_some());
        assert_eq!(
            validated.decision.reasoning.as_deref(),
            Some("Rejected: unknown tool 'fly'")
        );
    }

    #[test]
    fn integer_kind_accepts_whole_floats() {
        assert!(kind_matches(ParamKind::Integer, &json!(3)));
        assert!(kind_matches(ParamKind::Integer, &json!(3.0)));
        assert!(!kind_matches(ParamKind::Integer, &json!(3.5)));
    }
}
