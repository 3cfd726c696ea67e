//! Configuration for the agent process.
//!
//! All configuration is loaded from environment variables so several
//! agents can run side by side from the same binary.

use std::str::FromStr;

use crate::error::AgentError;

/// Which built-in policy drives the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Always idle.
    Idle,
    /// Avoid hazards, walk to the nearest resource, explore otherwise.
    Forager,
}

impl FromStr for PolicyKind {
    type Err = AgentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "forager" | "simple_forager" => Ok(Self::Forager),
            other => Err(AgentError::Config(format!("unknown policy: {other}"))),
        }
    }
}

/// Complete agent configuration loaded from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// NATS server URL (e.g. `nats://localhost:4222`).
    pub nats_url: String,
    /// Identity to register as.
    pub agent_id: String,
    /// Decision policy.
    pub policy: PolicyKind,
    /// Tools to declare at registration; empty accepts every scenario tool.
    pub declared_tools: Vec<String>,
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional variables:
    /// - `NATS_URL` -- NATS server connection string (default `nats://localhost:4222`)
    /// - `AGENT_ID` -- identity to register as (default `forager_1`)
    /// - `AGENT_POLICY` -- `forager` or `idle` (default `forager`)
    /// - `AGENT_TOOLS` -- comma-separated tool names to declare (default: all)
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if a value does not parse.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from any name-to-value lookup.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if a value does not parse or the
    /// agent id is blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let nats_url = lookup("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_owned());
        let agent_id = lookup("AGENT_ID").unwrap_or_else(|| "forager_1".to_owned());
        if agent_id.trim().is_empty() {
            return Err(AgentError::Config("AGENT_ID must not be blank".to_owned()));
        }
        let policy = lookup("AGENT_POLICY")
            .map_or(Ok(PolicyKind::Forager), |value| value.parse())?;
        let declared_tools = lookup("AGENT_TOOLS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            nats_url,
            agent_id,
            policy,
            declared_tools,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = AgentConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.nats_url, "nats://localhost:4222");
        assert_eq!(config.agent_id, "forager_1");
        assert_eq!(config.policy, PolicyKind::Forager);
        assert!(config.declared_tools.is_empty());
    }

    #[test]
    fn reads_every_variable() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("NATS_URL", "nats://arena:4222"),
            ("AGENT_ID", "scout"),
            ("AGENT_POLICY", "IDLE"),
            ("AGENT_TOOLS", "move_to, collect,,"),
        ]))
        .unwrap();
        assert_eq!(config.nats_url, "nats://arena:4222");
        assert_eq!(config.agent_id, "scout");
        assert_eq!(config.policy, PolicyKind::Idle);
        assert_eq!(config.declared_tools, vec!["move_to", "collect"]);
    }

    #[test]
    fn rejects_unknown_policy_and_blank_id() {
        assert!(matches!(
            AgentConfig::from_lookup(lookup(&[("AGENT_POLICY", "genius")])),
            Err(AgentError::Config(_))
        ));
        assert!(matches!(
            AgentConfig::from_lookup(lookup(&[("AGENT_ID", "  ")])),
            Err(AgentError::Config(_))
        ));
    }
}
