//! # swarm-calib
//!
//! `swarm-calib` calibrates the free parameters of an external galaxy-formation
//! simulator with Particle Swarm Optimization.
//!
//! The library provides:
//! - A bounded parameter space loaded from a plain text file
//! - An execution handler running the simulator in isolated directories with a timeout
//! - Observational constraints (mass functions, scaling relations) and pluggable score aggregation
//! - A checkpointable particle swarm engine evaluating particles in parallel
//!
//! Failed simulator runs never stop a calibration; they receive a penalty
//! fitness. Only configuration and I/O problems surface as [`CalibError`].
//!
//! ## Basic Usage
//!
//! ```
//! use std::sync::Arc;
//! use swarm_calib::fitness::FnObjective;
//! use swarm_calib::parameters::ParameterSpace;
//! use swarm_calib::pso::{PsoConfig, PsoEngine, TerminationReason};
//!
//! let space: ParameterSpace = "SfrEfficiency 0 1\n".parse()?;
//! let objective = FnObjective::new(|x: &ndarray::Array1<f64>| (x[0] - 0.3).powi(2));
//! let config = PsoConfig::new().with_swarm_size(8).with_max_iterations(20).with_seed(7);
//!
//! let result = PsoEngine::new(Arc::new(space), config, objective)?.run()?;
//! assert_eq!(result.termination, TerminationReason::MaxIterationsReached);
//! assert!((result.best_position[0] - 0.3).abs() < 0.05);
//! # Ok::<(), swarm_calib::CalibError>(())
//! ```
//!
//! A full calibration against a real simulator is described by a JSON file;
//! see [`driver`].

pub mod cancel;
pub mod catalog;
pub mod constraints;
pub mod driver;
pub mod error;
pub mod execution;
pub mod fitness;
pub mod logging;
pub mod parameters;
pub mod pso;
pub mod shutdown;

mod utils;

// Re-exports for convenience
pub use cancel::CancellationToken;
pub use driver::{Calibration, CalibrationConfig};
pub use error::{CalibError, Result};
pub use execution::{ExecutionHandler, RunFailure, RunResult};
pub use fitness::{Evaluation, FitnessEvaluator, Objective};
pub use parameters::ParameterSpace;
pub use pso::{PsoConfig, PsoEngine, PsoResult};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
