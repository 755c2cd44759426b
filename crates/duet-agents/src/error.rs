//! Session error taxonomy with fatal classification.
//!
//! Construction-time failures (bad config, unreachable backend) are fatal:
//! no retry loop starts. Inference failures are not: the session driver
//! records them against the current attempt and moves on to the next retry.

use thiserror::Error;

/// Unified error type for session construction and attempt execution.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Configuration is invalid or missing required fields.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The inference backend could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A caller violated an API contract.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A model invocation failed (network, timeout, backend crash).
    #[error("Inference failure: {0}")]
    Inference(String),

    /// Any other error that doesn't fit the above categories.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SessionError {
    /// `true` when the session cannot usefully continue.
    ///
    /// Non-fatal errors consume the current attempt; the retry loop then
    /// proceeds with the next role assignment.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Connection(_) | Self::InvalidArgument(_)
        )
    }
}
