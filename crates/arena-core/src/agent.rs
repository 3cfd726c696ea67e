//! The agent contract.
//!
//! An agent is anything that turns an [`Observation`] into a [`Decision`].
//! Closures qualify. Episode hooks are an optional extra discovered through
//! [`Agent::lifecycle`]; an agent without them is just a function.
//!
//! Agents carry no framework-managed state: whatever memory an agent keeps
//! lives in its own fields, and everything it learns about the world
//! arrives in the observation.

use arena_types::{Decision, Objective, Observation, ScoreReport};

/// Optional episode hooks.
pub trait EpisodeLifecycle {
    /// Called once, before the first decision of an episode.
    fn on_episode_start(&mut self, _objective: &Objective) {}

    /// Called once when the episode ends, with this agent's final score.
    fn on_episode_end(&mut self, _report: &ScoreReport) {}
}

/// Decision-making contract.
pub trait Agent: Send {
    /// Choose this tick's action.
    fn decide(&mut self, observation: &Observation) -> Decision;

    /// The agent's episode hooks, if it has any.
    fn lifecycle(&mut self) -> Option<&mut dyn EpisodeLifecycle> {
        None
    }
}

impl<F> Agent for F
where
    F: FnMut(&Observation) -> Decision + Send,
{
    fn decide(&mut self, observation: &Observation) -> Decision {
        self(observation)
    }
}

/// An agent that always idles.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleAgent;

impl Agent for IdleAgent {
    fn decide(&mut self, _observation: &Observation) -> Decision {
        Decision::idle(None)
    }
}
