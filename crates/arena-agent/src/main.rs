//! Reference agent process for Agent Arena.
//!
//! Registers one agent with the environment over NATS, answers each
//! observation with a decision from a built-in policy, and exits when the
//! episode ends.
//!
//! # Architecture
//!
//! ```text
//! NATS (observation) --> Policy --> NATS (decision)
//! ```
//!
//! Configuration comes from environment variables; see
//! [`config::AgentConfig::from_env`].

mod config;
mod error;
mod nats;
mod policy;
mod runner;

use anyhow::Context as _;
use arena_core::agent::IdleAgent;
use arena_types::AgentId;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{AgentConfig, PolicyKind};
use crate::nats::NatsClient;
use crate::policy::ForagerPolicy;
use crate::runner::AgentRunner;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the NATS connection, or registration
/// fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("arena-agent starting");

    // Load configuration from environment
    let config = AgentConfig::from_env().context("loading agent configuration")?;
    info!(
        nats_url = config.nats_url,
        agent_id = config.agent_id,
        policy = ?config.policy,
        declared_tools = ?config.declared_tools,
        "configuration loaded"
    );

    // Connect to NATS
    let nats = NatsClient::connect(&config.nats_url, AgentId::new(config.agent_id.clone()))
        .await
        .context("connecting to NATS")?;

    // Run the chosen policy
    match config.policy {
        PolicyKind::Idle => {
            AgentRunner::new(nats, IdleAgent, config.declared_tools)
                .run()
                .await
                .context("running idle agent")?;
        }
        PolicyKind::Forager => {
            AgentRunner::new(nats, ForagerPolicy::new(), config.declared_tools)
                .run()
                .await
                .context("running forager")?;
        }
    }

    info!("arena-agent shutdown complete");
    Ok(())
}
