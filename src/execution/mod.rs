//! # Simulator execution
//!
//! An [`ExecutionHandler`] turns one parameter vector into the catalogs of one
//! simulator run. Every way a run can go wrong is a [`RunFailure`] carried in
//! the [`RunResult`]; none of them stops the calibration.
//!
//! [`SubprocessHandler`] is the production implementation: it runs an external
//! executable in an isolated directory with a timeout.

use ndarray::Array1;
use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CatalogData;

pub mod config;
pub mod param_file;
pub mod subprocess;
pub mod workdir;

pub use config::{CatalogFile, ExecutionConfig, RetentionPolicy};
pub use param_file::SimulatorParameters;
pub use subprocess::SubprocessHandler;
pub use workdir::RunDirectory;

/// Why a simulator run produced no usable catalogs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunFailure {
    #[error("expected {expected} parameter values, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("cannot prepare run directory: {0}")]
    Workspace(String),

    #[error("cannot start {executable}: {reason}")]
    Spawn { executable: String, reason: String },

    #[error("lost track of the simulator process: {0}")]
    Process(String),

    #[error("timed out after {seconds} s")]
    Timeout { seconds: f64 },

    #[error("cancelled")]
    Cancelled,

    #[error("exited with status {code}: {stderr_tail}")]
    NonZeroExit { code: i32, stderr_tail: String },

    #[error("terminated by a signal: {stderr_tail}")]
    Terminated { stderr_tail: String },

    #[error("expected output {path} was not written")]
    MissingOutput { path: PathBuf },

    #[error("cannot parse output {path}: {reason}")]
    MalformedOutput { path: PathBuf, reason: String },
}

impl RunFailure {
    /// Short machine-friendly name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            RunFailure::DimensionMismatch { .. } => "dimension_mismatch",
            RunFailure::Workspace(_) => "workspace",
            RunFailure::Spawn { .. } => "spawn",
            RunFailure::Process(_) => "process",
            RunFailure::Timeout { .. } => "timeout",
            RunFailure::Cancelled => "cancelled",
            RunFailure::NonZeroExit { .. } => "non_zero_exit",
            RunFailure::Terminated { .. } => "terminated",
            RunFailure::MissingOutput { .. } => "missing_output",
            RunFailure::MalformedOutput { .. } => "malformed_output",
        }
    }
}

/// Outcome of one simulator run
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    Success(CatalogData),
    Failed(RunFailure),
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success(_))
    }
}

/// Runs the simulator for one parameter vector.
///
/// Implementations are shared by every evaluation worker, so they must be
/// safe to call concurrently. Calls with the same vector may run in
/// different directories but must not interfere with each other.
pub trait ExecutionHandler: Send + Sync {
    fn evaluate_run(&self, values: &Array1<f64>) -> RunResult;
}
