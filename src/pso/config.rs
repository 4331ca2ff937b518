//! Swarm configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CalibError, Result};
use crate::fitness::DEFAULT_PENALTY;

/// Whether lower or higher fitness is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationSense {
    #[default]
    Minimize,
    Maximize,
}

impl OptimizationSense {
    /// Whether `candidate` is strictly better than `incumbent`
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            OptimizationSense::Minimize => candidate < incumbent,
            OptimizationSense::Maximize => candidate > incumbent,
        }
    }

    /// The fitness given to failed evaluations
    pub fn worst(self, penalty: f64) -> f64 {
        match self {
            OptimizationSense::Minimize => penalty,
            OptimizationSense::Maximize => -penalty,
        }
    }
}

/// How particle velocities start out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialVelocity {
    #[default]
    Zero,
    /// Uniform in `±velocity_limit · width` per dimension
    Random,
}

/// Stop once the global best stops improving
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Convergence {
    /// Smallest improvement over `window` iterations that counts as progress
    pub tolerance: f64,
    pub window: usize,
}

/// Where and how often to save the optimization state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub path: PathBuf,
    /// Save after every `every`-th completed iteration, and at termination
    #[serde(default = "default_every")]
    pub every: usize,
}

fn default_every() -> usize {
    1
}

/// Configuration of a particle swarm optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsoConfig {
    pub swarm_size: usize,
    /// Inertia weight `w`
    pub inertia: f64,
    /// Cognitive coefficient `c1`, pull towards the personal best
    pub cognitive: f64,
    /// Social coefficient `c2`, pull towards the global best
    pub social: f64,
    /// Number of evaluation rounds, including the initial one
    pub max_iterations: usize,
    pub convergence: Option<Convergence>,
    /// Stop when a new global best lies closer than this to the previous one
    pub min_step: Option<f64>,
    /// Largest velocity component as a fraction of the parameter's range
    pub velocity_limit: Option<f64>,
    pub initial_velocity: InitialVelocity,
    pub zero_velocity_on_boundary: bool,
    pub sense: OptimizationSense,
    pub penalty_fitness: f64,
    pub seed: Option<u64>,
    /// Concurrent evaluations; 0 uses one per available core
    pub workers: usize,
    /// Warn when more than this fraction of an iteration's evaluations fail
    pub failure_warning_fraction: f64,
    pub checkpoint: Option<CheckpointConfig>,
    /// Keep every particle position and fitness for the particle history output
    pub record_particles: bool,
}

impl Default for PsoConfig {
    fn default() -> Self {
        Self {
            swarm_size: 40,
            inertia: 0.729,
            cognitive: 1.49445,
            social: 1.49445,
            max_iterations: 100,
            convergence: None,
            min_step: None,
            velocity_limit: Some(0.5),
            initial_velocity: InitialVelocity::Zero,
            zero_velocity_on_boundary: true,
            sense: OptimizationSense::Minimize,
            penalty_fitness: DEFAULT_PENALTY,
            seed: None,
            workers: 0,
            failure_warning_fraction: 0.5,
            checkpoint: None,
            record_particles: false,
        }
    }
}

impl PsoConfig {
    /// Create a configuration with the standard constriction coefficients
    ///
    /// Defaults:
    /// - Swarm size: 40
    /// - Inertia: 0.729, cognitive and social: 1.49445
    /// - Max iterations: 100
    /// - Velocity limit: half of each parameter's range
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_swarm_size(mut self, swarm_size: usize) -> Self {
        self.swarm_size = swarm_size;
        self
    }

    /// Set the inertia, cognitive and social coefficients
    pub fn with_coefficients(mut self, inertia: f64, cognitive: f64, social: f64) -> Self {
        self.inertia = inertia;
        self.cognitive = cognitive;
        self.social = social;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_convergence(mut self, tolerance: f64, window: usize) -> Self {
        self.convergence = Some(Convergence { tolerance, window });
        self
    }

    pub fn with_min_step(mut self, min_step: f64) -> Self {
        self.min_step = Some(min_step);
        self
    }

    pub fn with_velocity_limit(mut self, limit: Option<f64>) -> Self {
        self.velocity_limit = limit;
        self
    }

    pub fn with_initial_velocity(mut self, initial_velocity: InitialVelocity) -> Self {
        self.initial_velocity = initial_velocity;
        self
    }

    pub fn with_zero_velocity_on_boundary(mut self, zero: bool) -> Self {
        self.zero_velocity_on_boundary = zero;
        self
    }

    pub fn with_sense(mut self, sense: OptimizationSense) -> Self {
        self.sense = sense;
        self
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty_fitness = penalty;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_failure_warning_fraction(mut self, fraction: f64) -> Self {
        self.failure_warning_fraction = fraction;
        self
    }

    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>, every: usize) -> Self {
        self.checkpoint = Some(CheckpointConfig {
            path: path.into(),
            every,
        });
        self
    }

    pub fn with_record_particles(mut self, record: bool) -> Self {
        self.record_particles = record;
        self
    }

    /// Fitness given to failed evaluations in this configuration's sense
    pub fn worst_fitness(&self) -> f64 {
        self.sense.worst(self.penalty_fitness)
    }

    /// Reject configurations the engine cannot run
    pub fn validate(&self) -> Result<()> {
        if self.swarm_size == 0 {
            return Err(CalibError::config("Swarm size must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(CalibError::config("Max iterations must be at least 1"));
        }
        if !self.inertia.is_finite() {
            return Err(CalibError::config(format!("Invalid inertia {}", self.inertia)));
        }
        for (name, value) in [("cognitive", self.cognitive), ("social", self.social)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(CalibError::config(format!(
                    "The {} coefficient must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        if let Some(limit) = self.velocity_limit {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(CalibError::config(format!("Velocity limit must be positive, got {}", limit)));
            }
        }
        if self.initial_velocity == InitialVelocity::Random && self.velocity_limit.is_none() {
            return Err(CalibError::config("Random initial velocities need a velocity limit"));
        }
        if !(self.penalty_fitness.is_finite() && self.penalty_fitness > 0.0) {
            return Err(CalibError::config(format!(
                "Penalty fitness must be finite and positive, got {}",
                self.penalty_fitness
            )));
        }
        if let Some(convergence) = self.convergence {
            if convergence.window == 0 || !(convergence.tolerance.is_finite() && convergence.tolerance >= 0.0) {
                return Err(CalibError::config(format!(
                    "Invalid convergence criterion: tolerance {} over {} iterations",
                    convergence.tolerance, convergence.window
                )));
            }
        }
        if let Some(min_step) = self.min_step {
            if !(min_step.is_finite() && min_step >= 0.0) {
                return Err(CalibError::config(format!("Invalid minimum step {}", min_step)));
            }
        }
        if !(0.0..=1.0).contains(&self.failure_warning_fraction) {
            return Err(CalibError::config(format!(
                "Failure warning fraction must be in [0, 1], got {}",
                self.failure_warning_fraction
            )));
        }
        if let Some(checkpoint) = &self.checkpoint {
            if checkpoint.every == 0 {
                return Err(CalibError::config("Checkpoint interval must be at least 1"));
            }
        }
        Ok(())
    }
}
