//! Shared type definitions for Agent Arena.
//!
//! This crate is the wire contract between the environment process and
//! agent processes. Everything here is plain data with `serde` derives;
//! behavior lives in `arena-core`. Types flow downstream to `TypeScript`
//! via `ts-rs` for agent SDK authors.
//!
//! # Modules
//!
//! - [`ids`] -- Agent, session, and episode identifiers
//! - [`objective`] -- Objectives and metric definitions
//! - [`observation`] -- Per-tick observation and progress snapshot
//! - [`decision`] -- Decisions, wire envelope, and validated decisions
//! - [`capability`] -- Tool schemas and world bounds
//! - [`session`] -- Registration handshake
//! - [`subjects`] -- NATS subject names shared by engine and agents
//! - [`score`] -- Score results and episode reports
//! - [`enums`] -- Session states, rejection reasons, end reasons

pub mod capability;
pub mod decision;
pub mod enums;
pub mod ids;
pub mod objective;
pub mod observation;
pub mod score;
pub mod session;
pub mod subjects;

// Re-export all public types at crate root for convenience.
pub use capability::{NumericBounds, ParamKind, ParamSpec, ToolSchema, Vec3, WorldBounds};
pub use decision::{Decision, DecisionMessage, IDLE_TOOL, Params, ValidatedDecision};
pub use enums::{EpisodeEndReason, MissKind, RejectionReason, SessionState};
pub use ids::{AgentId, EpisodeId, SessionId};
pub use objective::{Extensions, MetricDefinition, Objective};
pub use observation::{Observation, ProgressSnapshot, WorldFields};
pub use score::{AgentTally, EpisodeReport, ScoreReport, ScoreResult};
pub use session::{DisconnectNotice, Registration, RegistrationAck};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // Files are written to the `bindings/` directory relative to the
        // crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::AgentId::export_all();
        let _ = crate::ids::SessionId::export_all();
        let _ = crate::ids::EpisodeId::export_all();

        // Enums
        let _ = crate::enums::SessionState::export_all();
        let _ = crate::enums::RejectionReason::export_all();
        let _ = crate::enums::MissKind::export_all();
        let _ = crate::enums::EpisodeEndReason::export_all();

        // Objective and observation
        let _ = crate::objective::MetricDefinition::export_all();
        let _ = crate::objective::Objective::export_all();
        let _ = crate::observation::ProgressSnapshot::export_all();
        let _ = crate::observation::Observation::export_all();

        // Decisions and tools
        let _ = crate::decision::Decision::export_all();
        let _ = crate::decision::DecisionMessage::export_all();
        let _ = crate::decision::ValidatedDecision::export_all();
        let _ = crate::capability::ParamKind::export_all();
        let _ = crate::capability::NumericBounds::export_all();
        let _ = crate::capability::ParamSpec::export_all();
        let _ = crate::capability::ToolSchema::export_all();
        let _ = crate::capability::WorldBounds::export_all();

        // Handshake and reports
        let _ = crate::session::Registration::export_all();
        let _ = crate::session::RegistrationAck::export_all();
        let _ = crate::session::DisconnectNotice::export_all();
        let _ = crate::score::ScoreResult::export_all();
        let _ = crate::score::AgentTally::export_all();
        let _ = crate::score::ScoreReport::export_all();
        let _ = crate::score::EpisodeReport::export_all();
    }
}
