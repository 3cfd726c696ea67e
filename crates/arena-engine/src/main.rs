//! Environment binary for Agent Arena.
//!
//! This is the main entry point that wires together the scenario, the
//! objective engine, the NATS agent bridge, and operator controls. It loads
//! configuration, waits for agents to register, and runs one episode until
//! a termination condition is met.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `arena-config.yaml` (or `ARENA_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the scenario world from its seed
//! 4. Create operator state and hook Ctrl-C to a graceful stop
//! 5. Open the control queue
//! 6. Connect to NATS and start the registration listeners
//! 7. Run the episode
//! 8. Publish and store the episode report

mod error;
mod foraging;
mod nats_transport;
mod report;

use std::path::PathBuf;
use std::sync::Arc;

use arena_core::config::{ArenaConfig, LoggingConfig};
use arena_core::operator::OperatorState;
use arena_core::runner::{self, EpisodeSettings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::foraging::ForagingScenario;
use crate::nats_transport::NatsBridge;
use crate::report::ReportObserver;

/// Ticks between progress summaries in the log.
const SUMMARY_EVERY_TICKS: u64 = 50;

/// Application entry point for the environment.
///
/// # Errors
///
/// Returns an error if any initialization step or the episode itself fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is not up yet, so remember whether the
    //    file was found and report it once it is.
    let (config, config_path) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("arena-engine starting");
    match &config_path {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }
    info!(
        scenario = config.scenario.name,
        seed = config.scenario.seed,
        tick_interval_ms = config.episode.tick_interval_ms,
        decision_timeout_ms = config.episode.decision_timeout_ms,
        policy = ?config.validation.policy,
        "Episode configuration"
    );

    // 3. Build the scenario.
    if config.scenario.name != foraging::SCENARIO_NAME {
        return Err(EngineError::Scenario {
            message: format!("unknown scenario '{}'", config.scenario.name),
        }
        .into());
    }
    let mut scenario = ForagingScenario::from_config(&config.scenario);

    // 4. Create operator state.
    let operator = Arc::new(OperatorState::new(
        config.episode.tick_interval_ms,
        config.episode.max_ticks,
    ));
    {
        let operator = Arc::clone(&operator);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, stopping episode");
                    operator.request_stop();
                }
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });
    }
    info!(
        max_ticks = operator.max_ticks(),
        tick_interval_ms = operator.tick_interval_ms(),
        "Operator state initialized"
    );

    // 5. Open the control queue.
    let (control, mut control_rx) = runner::control_channel(
        config.transport.control_capacity,
        config.transport.channel_capacity,
    );

    // 6. Connect to NATS and start listening for agents.
    let nats_url = &config.infrastructure.nats_url;
    info!(nats_url = nats_url, "Connecting to NATS");
    let bridge = NatsBridge::connect(nats_url).await?;
    let listeners = bridge.spawn_listeners(control).await?;
    info!(min_agents = config.episode.min_agents, "Waiting for agents");

    // 7. Run the episode.
    let settings = EpisodeSettings::from_config(&config.episode, &config.validation);
    let mut observer = ReportObserver::new(SUMMARY_EVERY_TICKS);
    let result = runner::run_episode(
        &mut scenario,
        config.objective.clone(),
        &settings,
        &mut control_rx,
        &operator,
        &mut observer,
    )
    .await;
    for listener in &listeners {
        listener.abort();
    }
    let report = result.map_err(EngineError::from)?;

    // 8. Publish and store the report.
    if let Err(e) = bridge.publish_report(&report).await {
        warn!(error = %e, "Episode report not published");
    }
    if let Some(path) = &config.report.output_path {
        report::write_report(path, &report)?;
    }

    info!(
        end_reason = ?report.end_reason,
        ticks = report.ticks,
        "arena-engine shutdown complete"
    );
    Ok(())
}

/// Load configuration from `ARENA_CONFIG`, or `arena-config.yaml` in the
/// working directory. Falls back to defaults when the file is missing.
fn load_config() -> Result<(ArenaConfig, Option<PathBuf>), EngineError> {
    let config_path = std::env::var("ARENA_CONFIG")
        .map_or_else(|_unset| PathBuf::from("arena-config.yaml"), PathBuf::from);
    if config_path.exists() {
        let config = ArenaConfig::from_file(&config_path)?;
        Ok((config, Some(config_path)))
    } else {
        let config = ArenaConfig::parse("{}")?;
        Ok((config, None))
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
