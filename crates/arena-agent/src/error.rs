//! Error types for the agent process.
//!
//! Uses `thiserror` for typed errors that surface through the agent
//! pipeline: configuration, NATS connectivity, registration, payload
//! decoding.

/// Errors that can occur while running an agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Failed to connect to or communicate with the NATS server.
    #[error("NATS error: {0}")]
    Nats(String),

    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),

    /// The environment refused the registration.
    #[error("registration rejected: {0}")]
    Rejected(String),

    /// Serialization or deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
