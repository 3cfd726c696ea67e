//! Configuration loading and typed config structures for Agent Arena.
//!
//! The canonical configuration lives in `arena-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads the file and applies
//! environment overrides.
//!
//! The episode objective is part of the configuration and deserializes
//! straight into [`Objective`], so unknown objective keys survive loading.

use std::path::{Path, PathBuf};

use arena_types::{MetricDefinition, Objective};
use serde::Deserialize;

use crate::validation::ValidationPolicy;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `arena-config.yaml`. Every section has
/// defaults, so an empty file yields the built-in foraging setup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArenaConfig {
    /// Which scenario to run and how to seed it.
    #[serde(default)]
    pub scenario: ScenarioConfig,

    /// The episode objective handed to every agent.
    #[serde(default = "default_objective")]
    pub objective: Objective,

    /// Tick pacing and exchange timeouts.
    #[serde(default)]
    pub episode: EpisodeConfig,

    /// Decision validation settings.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Session channel sizing.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Infrastructure connection strings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where the episode report goes.
    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            scenario: ScenarioConfig::default(),
            objective: default_objective(),
            episode: EpisodeConfig::default(),
            validation: ValidationConfig::default(),
            transport: TransportConfig::default(),
            infrastructure: InfrastructureConfig::default(),
            logging: LoggingConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl ArenaConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `NATS_URL` overrides `infrastructure.nats_url` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.infrastructure.apply_env_overrides();
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.episode.decision_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "episode.decision_timeout_ms",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.transport.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "transport.channel_capacity",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.transport.control_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "transport.control_capacity",
                reason: "must be at least 1".to_owned(),
            });
        }
        if !(self.scenario.world_half_extent.is_finite() && self.scenario.world_half_extent > 0.0)
        {
            return Err(ConfigError::Invalid {
                field: "scenario.world_half_extent",
                reason: "must be a positive number".to_owned(),
            });
        }
        Ok(())
    }
}

/// Scenario selection and demo world layout.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioConfig {
    /// Scenario name reported in observations.
    #[serde(default = "default_scenario_name")]
    pub name: String,

    /// Random seed for the world layout.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of collectible resources placed at start.
    #[serde(default = "default_resource_count")]
    pub resource_count: u32,

    /// Number of hazards placed at start.
    #[serde(default = "default_hazard_count")]
    pub hazard_count: u32,

    /// Half the side length of the square world.
    #[serde(default = "default_world_half_extent")]
    pub world_half_extent: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: default_scenario_name(),
            seed: default_seed(),
            resource_count: default_resource_count(),
            hazard_count: default_hazard_count(),
            world_half_extent: default_world_half_extent(),
        }
    }
}

/// Episode pacing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EpisodeConfig {
    /// Real-time milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Milliseconds an agent has to answer an observation.
    #[serde(default = "default_decision_timeout_ms")]
    pub decision_timeout_ms: u64,

    /// Hard tick cap independent of the objective's time limit
    /// (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Agents that must register before the first tick (0 = start at once).
    #[serde(default = "default_min_agents")]
    pub min_agents: usize,

    /// Consecutive decision timeouts after which a silent agent is marked
    /// disconnected so it can register again (0 = never).
    #[serde(default = "default_disconnect_after_timeouts")]
    pub disconnect_after_timeouts: u64,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            decision_timeout_ms: default_decision_timeout_ms(),
            max_ticks: 0,
            min_agents: default_min_agents(),
            disconnect_after_timeouts: default_disconnect_after_timeouts(),
        }
    }
}

/// Decision validation settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ValidationConfig {
    /// What to do with out-of-range values.
    #[serde(default)]
    pub policy: ValidationPolicy,
}

/// Session channel sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TransportConfig {
    /// Buffered messages per session direction.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Buffered registration and disconnect requests.
    #[serde(default = "default_control_capacity")]
    pub control_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            control_capacity: default_control_capacity(),
        }
    }
}

/// Infrastructure connection strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// NATS messaging URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,
}

impl InfrastructureConfig {
    /// Override infrastructure URLs with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NATS_URL") {
            self.nats_url = val;
        }
    }
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG`
    /// is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Episode report output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReportConfig {
    /// Write the report as pretty JSON to this path when set.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_scenario_name() -> String {
    "foraging".to_owned()
}

const fn default_seed() -> u64 {
    42
}

const fn default_resource_count() -> u32 {
    7
}

const fn default_hazard_count() -> u32 {
    4
}

const fn default_world_half_extent() -> f64 {
    50.0
}

const fn default_tick_interval_ms() -> u64 {
    100
}

const fn default_decision_timeout_ms() -> u64 {
    5000
}

const fn default_min_agents() -> usize {
    1
}

const fn default_disconnect_after_timeouts() -> u64 {
    5
}

const fn default_channel_capacity() -> usize {
    16
}

const fn default_control_capacity() -> usize {
    64
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_objective() -> Objective {
    Objective::new("Collect every resource while avoiding hazards.")
        .with_metric(
            "resources_collected",
            MetricDefinition::target(7.0).required(),
        )
        .with_metric(
            "damage_taken",
            MetricDefinition::target(0.0)
                .with_weight(0.5)
                .lower_is_better(),
        )
        .with_metric(
            "distance_traveled",
            MetricDefinition::target(300.0)
                .with_weight(0.25)
                .lower_is_better(),
        )
        .with_time_limit(600)
}
