//! Error types for the environment binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and episode execution.

/// Top-level error for the environment binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: arena_core::config::ConfigError,
    },

    /// Episode runner failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: arena_core::runner::RunnerError,
    },

    /// The configured scenario cannot be built.
    #[error("scenario error: {message}")]
    Scenario {
        /// Description of the scenario failure.
        message: String,
    },

    /// NATS connection or messaging failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// The episode report could not be written.
    #[error("report error: {message}")]
    Report {
        /// Description of the report failure.
        message: String,
    },
}
