//! Error types for the stress detection engine
//!
//! Sessions never return these to the host during normal operation. They
//! surface at the edges: payload conversion, configuration loading, the
//! handle-based engine API, and trace parsing.

use thiserror::Error;

/// Errors that can occur outside the session's degraded-operation paths
#[derive(Debug, Error)]
pub enum StressError {
    #[error("Invalid event payload: {0}")]
    InvalidEventPayload(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Unknown PIN event type: {0}")]
    UnknownPinEventType(String),

    #[error("Failed to parse trace: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}
