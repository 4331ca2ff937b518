//! Wiring a complete calibration from one JSON configuration file.
//!
//! ```json
//! {
//!   "parameter_space": "space.txt",
//!   "simulator": {
//!     "executable": "./sage",
//!     "template": "template.par",
//!     "work_root": "runs",
//!     "catalogs": [{"label": "z0", "path": "model_z0.dat"}],
//!     "timeout_secs": 900
//!   },
//!   "constraints": [
//!     {"id": "SMF_z0", "kind": "mass_function", "catalog": "z0",
//!      "column": "StellarMass", "observed": "obs/smf_z0.dat", "volume": 125000}
//!   ],
//!   "pso": {"swarm_size": 20, "max_iterations": 50, "seed": 1},
//!   "output_dir": "results"
//! }
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::constraints::{AggregationRule, ConstraintSet, ConstraintSpec};
use crate::error::{CalibError, Result};
use crate::execution::{ExecutionConfig, ExecutionHandler, SubprocessHandler};
use crate::fitness::FitnessEvaluator;
use crate::parameters::ParameterSpace;
use crate::pso::{output, CheckpointConfig, OptimizationState, PsoConfig, PsoEngine, PsoResult};

pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const BEST_FIT_FILE: &str = "best_fit.txt";
pub const TRACE_FILE: &str = "trace.tsv";
pub const PARTICLES_FILE: &str = "particles.tsv";

/// Everything a calibration needs
#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationConfig {
    pub parameter_space: PathBuf,
    pub simulator: ExecutionConfig,
    pub constraints: Vec<ConstraintSpec>,
    /// Identifiers of the constraints to use; all of them when absent
    #[serde(default)]
    pub active_constraints: Option<Vec<String>>,
    #[serde(default)]
    pub aggregation: AggregationRule,
    #[serde(default)]
    pub pso: PsoConfig,
    pub output_dir: PathBuf,
    /// Continue from the checkpoint if there is one
    #[serde(default)]
    pub resume: bool,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl CalibrationConfig {
    /// Read a configuration file and resolve its relative paths
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| CalibError::config(format!("Cannot read {}: {}", path.display(), e)))?;
        let mut config: Self = serde_json::from_str(&text)?;

        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        config.resolve_paths(&base_dir);
        Ok(config)
    }

    /// Make every relative path relative to `base_dir`
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        };
        resolve(&mut self.parameter_space);
        resolve(&mut self.output_dir);
        if let Some(checkpoint) = self.pso.checkpoint.as_mut() {
            resolve(&mut checkpoint.path);
        }
        self.simulator.resolve_paths(base_dir);
        self.base_dir = base_dir.to_path_buf();
    }

    /// The constraint specifications selected by `active_constraints`
    pub fn active_specs(&self) -> Result<Vec<ConstraintSpec>> {
        let Some(active) = &self.active_constraints else {
            return Ok(self.constraints.clone());
        };
        active
            .iter()
            .map(|id| {
                self.constraints
                    .iter()
                    .find(|spec| &spec.id == id)
                    .cloned()
                    .ok_or_else(|| CalibError::config(format!("Unknown constraint '{}'", id)))
            })
            .collect()
    }

    fn checkpoint_config(&self) -> CheckpointConfig {
        self.pso.checkpoint.clone().unwrap_or_else(|| CheckpointConfig {
            path: self.output_dir.join(CHECKPOINT_FILE),
            every: 1,
        })
    }
}

/// A ready-to-run calibration
pub struct Calibration {
    config: CalibrationConfig,
    space: Arc<ParameterSpace>,
    evaluator: FitnessEvaluator,
    cancel: CancellationToken,
}

impl Calibration {
    /// Build a calibration that runs the configured simulator executable
    pub fn new(config: CalibrationConfig) -> Result<Self> {
        let space = Arc::new(ParameterSpace::load(&config.parameter_space)?);
        let cancel = CancellationToken::new();
        let handler = SubprocessHandler::new(config.simulator.clone(), Arc::clone(&space))?
            .with_cancellation(cancel.clone());
        Self::build(config, space, Arc::new(handler), cancel)
    }

    /// Build a calibration around any execution handler
    pub fn with_handler(config: CalibrationConfig, handler: Arc<dyn ExecutionHandler>) -> Result<Self> {
        let space = Arc::new(ParameterSpace::load(&config.parameter_space)?);
        Self::build(config, space, handler, CancellationToken::new())
    }

    fn build(
        config: CalibrationConfig,
        space: Arc<ParameterSpace>,
        handler: Arc<dyn ExecutionHandler>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.pso.validate()?;
        let specs = config.active_specs()?;
        let constraints = ConstraintSet::from_specs(&specs, config.aggregation, &config.base_dir)?;
        info!(
            parameters = space.dimension(),
            constraints = constraints.len(),
            aggregation = constraints.aggregation().name(),
            "calibration configured"
        );
        let evaluator = FitnessEvaluator::new(handler, constraints).with_penalty(config.pso.penalty_fitness)?;

        Ok(Self {
            config,
            space,
            evaluator,
            cancel,
        })
    }

    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(CalibrationConfig::load(path)?)
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Raising this token stops the calibration after killing running simulations
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the swarm to completion and write the result files
    pub fn run(self) -> Result<PsoResult> {
        let output_dir = self.config.output_dir.clone();
        fs::create_dir_all(&output_dir).map_err(|e| CalibError::io("creating output directory", &output_dir, e))?;

        let checkpoint = self.config.checkpoint_config();
        let mut pso = self.config.pso.clone();
        pso.checkpoint = Some(checkpoint.clone());

        let engine = if self.config.resume && checkpoint.path.exists() {
            let state = OptimizationState::load(&checkpoint.path)?;
            PsoEngine::resume(Arc::clone(&self.space), pso, self.evaluator, state)?
        } else {
            if self.config.resume {
                warn!(path = %checkpoint.path.display(), "no checkpoint to resume from, starting afresh");
            }
            PsoEngine::new(Arc::clone(&self.space), pso, self.evaluator)?
        };
        let result = engine.with_cancellation(self.cancel).run()?;

        output::write_best_fit(&output_dir.join(BEST_FIT_FILE), &self.space, &result)?;
        output::write_trace(&output_dir.join(TRACE_FILE), &result.history)?;
        if self.config.pso.record_particles {
            output::write_particle_history(&output_dir.join(PARTICLES_FILE), &result.particle_history, &result)?;
        }
        info!(
            fitness = result.best_fitness,
            termination = %result.termination,
            output = %output_dir.display(),
            "calibration finished"
        );
        Ok(result)
    }
}

/// Load a configuration file and run the calibration it describes
pub fn run_from_file<P: AsRef<Path>>(path: P) -> Result<PsoResult> {
    Calibration::from_config_file(path)?.run()
}
