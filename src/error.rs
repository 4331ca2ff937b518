use std::path::Path;

use thiserror::Error;

/// Error types for the swarm-calib library.
///
/// Only these errors stop a calibration. Per-evaluation problems (a crashed
/// simulator, an unscorable catalog) are reported through
/// [`RunFailure`](crate::execution::RunFailure) and
/// [`EvaluationError`](crate::constraints::EvaluationError) instead and end up
/// as a penalty fitness.
#[derive(Error, Debug)]
pub enum CalibError {
    /// Malformed parameter-space, constraint or engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or writing checkpoints, outputs or working directories failed.
    #[error("I/O failure while {context}: {source}")]
    FatalIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error indicating a mismatch in vector dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid state in the engine or a snapshot of it.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl CalibError {
    /// Build a [`CalibError::Config`] from anything printable.
    pub fn config(msg: impl Into<String>) -> Self {
        CalibError::Config(msg.into())
    }

    /// Wrap an I/O error with a description of the operation and path.
    pub fn io(action: &str, path: &Path, source: std::io::Error) -> Self {
        CalibError::FatalIo {
            context: format!("{} {}", action, path.display()),
            source,
        }
    }

    /// Whether the error came from configuration rather than the environment.
    pub fn is_config(&self) -> bool {
        matches!(self, CalibError::Config(_))
    }
}

// Bounds problems are always configuration problems
impl From<crate::parameters::bounds::BoundsError> for CalibError {
    fn from(err: crate::parameters::bounds::BoundsError) -> Self {
        CalibError::Config(format!("{}", err))
    }
}

/// Result type alias for swarm-calib operations.
pub type Result<T> = std::result::Result<T, CalibError>;
