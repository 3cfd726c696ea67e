//! Objective engine: progress snapshots, weighted scoring, pass/fail.
//!
//! Scoring is per metric on a 0-100 scale:
//!
//! - **Higher is better**: `min(100, current / target * 100)`.
//! - **Lower is better**: `100` while `current <= target`, then ten points
//!   lost per unit above target, floored at `0`.
//!
//! The total is the weight-averaged per-metric score (`0` when every weight
//! is zero). Pass/fail is decided separately: a run that exceeds its time
//! limit fails, otherwise it passes when every `required` metric meets its
//! target. An unmet required metric never changes the total score.
//!
//! A `NaN` progress value counts as `0` for both scoring and gating.
//!
//! All maps are ordered by metric name, so the floating-point summation
//! order is fixed and a result never depends on how the objective was
//! written.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use arena_types::{MetricDefinition, Objective, ProgressSnapshot, ScoreResult};
use tracing::debug;

/// Upper bound of a per-metric and total score.
pub const MAX_SCORE: f64 = 100.0;

/// Points lost per unit above target for lower-is-better metrics.
pub const LOWER_IS_BETTER_PENALTY: f64 = 10.0;

/// Errors raised while loading an objective.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObjectiveError {
    /// A metric definition cannot be scored.
    #[error("invalid metric '{metric}': {reason}")]
    InvalidMetric {
        /// The offending metric.
        metric: String,
        /// What is wrong with it.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Metric sources
// ---------------------------------------------------------------------------

/// Read-only lookup of the world quantity behind a metric name.
pub trait MetricSource {
    /// Current value of `metric`, or `None` if the world does not track it.
    fn metric_value(&self, metric: &str) -> Option<f64>;
}

impl MetricSource for BTreeMap<String, f64> {
    fn metric_value(&self, metric: &str) -> Option<f64> {
        self.get(metric).copied()
    }
}

impl<S: BuildHasher> MetricSource for HashMap<String, f64, S> {
    fn metric_value(&self, metric: &str) -> Option<f64> {
        self.get(metric).copied()
    }
}

impl MetricSource for ProgressSnapshot {
    fn metric_value(&self, metric: &str) -> Option<f64> {
        self.0.get(metric).copied()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check one metric definition.
///
/// # Errors
///
/// Returns [`ObjectiveError::InvalidMetric`] for a non-finite target or
/// weight, a negative weight, or a zero target on a higher-is-better
/// metric (ratio scoring would divide by zero).
pub fn validate_metric(name: &str, metric: &MetricDefinition) -> Result<(), ObjectiveError> {
    let invalid = |reason: &str| ObjectiveError::InvalidMetric {
        metric: name.to_owned(),
        reason: reason.to_owned(),
    };

    if !metric.target.is_finite() {
        return Err(invalid("target must be a finite number"));
    }
    if !metric.weight.is_finite() {
        return Err(invalid("weight must be a finite number"));
    }
    if metric.weight < 0.0 {
        return Err(invalid("weight must not be negative"));
    }
    if !metric.lower_is_better && metric.target == 0.0 {
        return Err(invalid("target must not be zero when higher is better"));
    }
    Ok(())
}

/// Check every metric of an objective, in name order.
///
/// # Errors
///
/// Returns the first [`ObjectiveError::InvalidMetric`] found.
pub fn validate_objective(objective: &Objective) -> Result<(), ObjectiveError> {
    objective
        .success_metrics
        .iter()
        .try_for_each(|(name, metric)| validate_metric(name, metric))
}

// ---------------------------------------------------------------------------
// Progress and scoring
// ---------------------------------------------------------------------------

/// Build a progress snapshot by reading each metric from the world.
///
/// Metrics the world does not track read as `0`.
pub fn compute_progress<'a, M, I>(world: &M, metric_names: I) -> ProgressSnapshot
where
    M: MetricSource + ?Sized,
    I: IntoIterator<Item = &'a str>,
{
    metric_names
        .into_iter()
        .map(|name| {
            let value = world.metric_value(name).unwrap_or(0.0);
            (name.to_owned(), value)
        })
        .collect()
}

/// Score a single metric on the 0-100 scale.
///
/// `NaN` counts as `0`. A higher-is-better metric with a zero target has
/// no defined ratio and scores `0`; [`validate_objective`] rejects such
/// definitions before an episode starts.
pub fn metric_score(current: f64, metric: &MetricDefinition) -> f64 {
    let current = nan_as_zero(current);

    let raw = if metric.lower_is_better {
        if current <= metric.target {
            MAX_SCORE
        } else {
            MAX_SCORE - (current - metric.target) * LOWER_IS_BETTER_PENALTY
        }
    } else if metric.target == 0.0 {
        0.0
    } else {
        current / metric.target * MAX_SCORE
    };

    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, MAX_SCORE)
}

/// Weighted average of per-metric scores; `0` when the weights sum to zero.
pub fn weighted_total(
    per_metric_scores: &BTreeMap<String, f64>,
    metrics: &BTreeMap<String, MetricDefinition>,
) -> f64 {
    let (weighted, total_weight) = metrics
        .iter()
        .fold((0.0, 0.0), |(sum, weights), (name, metric)| {
            let score = per_metric_scores.get(name).copied().unwrap_or(0.0);
            (sum + score * metric.weight, weights + metric.weight)
        });

    if total_weight <= 0.0 {
        return 0.0;
    }
    (weighted / total_weight).clamp(0.0, MAX_SCORE)
}

/// Score every metric and compute the weighted total.
///
/// `passed` reflects required metrics only; time limits are applied by
/// [`determine_pass_fail`] (or [`ObjectiveEngine::evaluate`], which does
/// both).
pub fn compute_score(
    progress: &ProgressSnapshot,
    metrics: &BTreeMap<String, MetricDefinition>,
) -> ScoreResult {
    let per_metric_scores: BTreeMap<String, f64> = metrics
        .iter()
        .map(|(name, metric)| (name.clone(), metric_score(progress.value(name), metric)))
        .collect();
    let total_score = weighted_total(&per_metric_scores, metrics);
    let unmet_required = unmet_required(progress, metrics);

    ScoreResult {
        per_metric_scores,
        total_score,
        passed: unmet_required.is_empty(),
        unmet_required,
        timed_out: false,
    }
}

/// Outcome of pass/fail gating.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassFail {
    /// Whether the objective was passed.
    pub passed: bool,
    /// Required metrics below target, in name order.
    pub unmet_required: Vec<String>,
    /// Whether the run exceeded its time limit.
    pub timed_out: bool,
}

/// Decide pass/fail from required metrics and the time limit.
///
/// Exceeding a non-zero time limit (`elapsed > time_limit`) fails the run
/// whatever the metric values. Otherwise the run passes when every required
/// metric meets its target in its own direction.
pub fn determine_pass_fail(
    progress: &ProgressSnapshot,
    metrics: &BTreeMap<String, MetricDefinition>,
    elapsed: u64,
    time_limit: u64,
) -> PassFail {
    let timed_out = time_limit > 0 && elapsed > time_limit;
    let unmet_required = unmet_required(progress, metrics);
    PassFail {
        passed: !timed_out && unmet_required.is_empty(),
        unmet_required,
        timed_out,
    }
}

const fn nan_as_zero(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

fn unmet_required(
    progress: &ProgressSnapshot,
    metrics: &BTreeMap<String, MetricDefinition>,
) -> Vec<String> {
    metrics
        .iter()
        .filter(|(name, metric)| {
            metric.required && !metric.is_met(nan_as_zero(progress.value(name)))
        })
        .map(|(name, _)| name.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A validated objective, ready to score progress for a whole episode.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveEngine {
    objective: Objective,
}

impl ObjectiveEngine {
    /// Validate `objective` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectiveError::InvalidMetric`] if any metric cannot be
    /// scored. A scenario must not start with such an objective.
    pub fn load(objective: Objective) -> Result<Self, ObjectiveError> {
        validate_objective(&objective)?;
        debug!(
            metrics = objective.success_metrics.len(),
            time_limit = objective.time_limit,
            extensions = objective.extensions.len(),
            "Objective loaded"
        );
        Ok(Self { objective })
    }

    /// The wrapped objective.
    pub const fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Time limit in ticks (`0` = unlimited).
    pub const fn time_limit(&self) -> u64 {
        self.objective.time_limit
    }

    /// Read the current value of every objective metric from `world`.
    pub fn progress<M: MetricSource + ?Sized>(&self, world: &M) -> ProgressSnapshot {
        compute_progress(world, self.objective.metric_names())
    }

    /// Full score for `progress` after `elapsed` ticks.
    pub fn evaluate(&self, progress: &ProgressSnapshot, elapsed: u64) -> ScoreResult {
        let metrics = &self.objective.success_metrics;
        let mut result = compute_score(progress, metrics);
        let gate = determine_pass_fail(progress, metrics, elapsed, self.objective.time_limit);
        result.passed = gate.passed;
        result.unmet_required = gate.unmet_required;
        result.timed_out = gate.timed_out;
        result
    }
}
