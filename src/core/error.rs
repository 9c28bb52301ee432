//! Error taxonomy for the bridge.

use thiserror::Error;

use crate::core::model::TaskId;

/// Failures surfaced by the command channel and the upstream call surface.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The scheduler binary is missing, cannot be made executable, or exits
    /// right after launch. The bridge stays in simulation mode afterwards.
    #[error("scheduler process unavailable: {0}")]
    ProcessUnavailable(String),

    /// The process died or the stream broke and a restart did not help.
    #[error("command channel failure: {0}")]
    ChannelFailure(String),

    /// The read loop reached its deadline without any output at all.
    #[error("timed out waiting for `{command}`")]
    Timeout { command: String },

    /// The scheduler answered with its own error or usage text.
    #[error("scheduler rejected the command: {0}")]
    Rejected(String),

    /// Output was captured but required fields were missing.
    #[error("unparsable scheduler output: {0}")]
    UnparsableOutput(String),

    #[error("task {id} not found")]
    NotFound { id: TaskId },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns true for failures that one restart-and-retry may fix.
    ///
    /// Rejections and parse failures are never retried: resending a command
    /// the scheduler understood could duplicate its side effects.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ChannelFailure(_) | Self::Timeout { .. } | Self::Io(_)
        )
    }
}

/// Result alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
