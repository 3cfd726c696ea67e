//! NATS subject names.
//!
//! # Subject Convention
//!
//! - **Register (request/reply):** `arena.register` -- [`Registration`] in,
//!   [`RegistrationAck`] back
//! - **Disconnect:** `arena.disconnect` -- [`DisconnectNotice`]
//! - **Observation:** `arena.{agent_id}.observation` -- engine to agent
//! - **Decision:** `arena.{agent_id}.decision` -- agent to engine,
//!   a [`DecisionMessage`]
//! - **Score:** `arena.{agent_id}.score` -- the agent's own
//!   [`ScoreReport`] at episode end
//! - **Episode end:** `arena.episode.end` -- the full [`EpisodeReport`]
//!
//! [`Registration`]: crate::Registration
//! [`RegistrationAck`]: crate::RegistrationAck
//! [`DisconnectNotice`]: crate::DisconnectNotice
//! [`DecisionMessage`]: crate::DecisionMessage
//! [`ScoreReport`]: crate::ScoreReport
//! [`EpisodeReport`]: crate::EpisodeReport

use crate::ids::AgentId;

/// Registration request subject.
pub const REGISTER: &str = "arena.register";

/// Disconnect notice subject.
pub const DISCONNECT: &str = "arena.disconnect";

/// Episode report subject.
pub const EPISODE_END: &str = "arena.episode.end";

/// Observations for one agent.
pub fn observation(agent_id: &AgentId) -> String {
    format!("arena.{agent_id}.observation")
}

/// Decisions from one agent.
pub fn decision(agent_id: &AgentId) -> String {
    format!("arena.{agent_id}.decision")
}

/// Final score for one agent.
pub fn score(agent_id: &AgentId) -> String {
    format!("arena.{agent_id}.score")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_agent_subjects_embed_the_id() {
        let agent = AgentId::from("forager_1");
        assert_eq!(observation(&agent), "arena.forager_1.observation");
        assert_eq!(decision(&agent), "arena.forager_1.decision");
        assert_eq!(score(&agent), "arena.forager_1.score");
    }
}
