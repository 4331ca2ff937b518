//! The particle swarm state machine.

use ndarray::Array1;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::error::{CalibError, Result};
use crate::fitness::{Evaluation, Objective};
use crate::parameters::ParameterSpace;
use crate::pso::checkpoint::{OptimizationState, RngState, FORMAT_VERSION};
use crate::pso::config::PsoConfig;
use crate::pso::swarm::{RoundSummary, Swarm};

/// Why an optimization stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Converged,
    MaxIterationsReached,
    Cancelled,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Converged => write!(f, "converged"),
            TerminationReason::MaxIterationsReached => write!(f, "maximum iterations reached"),
            TerminationReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Where the engine is in its life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initializing,
    /// About to evaluate every particle for iteration `i`
    Evaluating(usize),
    /// Evaluations of iteration `i` are in; bests and particles are next
    Updating(usize),
    Converged,
    MaxIterationsReached,
    Cancelled,
}

impl EngineState {
    pub fn is_terminal(self) -> bool {
        self.termination().is_some()
    }

    pub fn termination(self) -> Option<TerminationReason> {
        match self {
            EngineState::Converged => Some(TerminationReason::Converged),
            EngineState::MaxIterationsReached => Some(TerminationReason::MaxIterationsReached),
            EngineState::Cancelled => Some(TerminationReason::Cancelled),
            _ => None,
        }
    }
}

impl From<TerminationReason> for EngineState {
    fn from(reason: TerminationReason) -> Self {
        match reason {
            TerminationReason::Converged => EngineState::Converged,
            TerminationReason::MaxIterationsReached => EngineState::MaxIterationsReached,
            TerminationReason::Cancelled => EngineState::Cancelled,
        }
    }
}

/// Per-iteration diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub best_fitness: f64,
    /// Mean over the iteration's successful evaluations
    pub mean_fitness: Option<f64>,
    pub evaluated: usize,
    pub failed: usize,
}

/// Every particle's position and fitness in one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleRound {
    pub iteration: usize,
    pub positions: Vec<Array1<f64>>,
    pub fitness: Vec<f64>,
}

/// Final outcome of an optimization
#[derive(Debug, Clone, PartialEq)]
pub struct PsoResult {
    pub best_position: Array1<f64>,
    pub best_fitness: f64,
    /// Whether the best fitness comes from a successful evaluation
    pub best_valid: bool,
    pub termination: TerminationReason,
    /// Completed iterations, the initial evaluation round included
    pub iterations: usize,
    pub evaluations: usize,
    pub failed_evaluations: usize,
    pub history: Vec<IterationRecord>,
    /// Personal best position and fitness of every particle
    pub personal_bests: Vec<(Array1<f64>, f64)>,
    pub particle_history: Vec<ParticleRound>,
}

impl fmt::Display for PsoResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Particle Swarm Optimization Result:")?;
        writeln!(f, "  Termination: {}", self.termination)?;
        writeln!(f, "  Best fitness: {:.6e}", self.best_fitness)?;
        writeln!(f, "  Best fitness from a successful run: {}", self.best_valid)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(
            f,
            "  Evaluations: {} ({} failed)",
            self.evaluations, self.failed_evaluations
        )?;
        writeln!(f, "  Best position: {}", self.best_position)?;
        Ok(())
    }
}

/// Particle swarm optimizer over a [`ParameterSpace`].
///
/// The engine is a state machine advanced by [`PsoEngine::step`]; [`PsoEngine::run`]
/// steps until a terminal state. Each evaluation round runs on a dedicated
/// thread pool and completes for every particle before any best is updated.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use swarm_calib::fitness::FnObjective;
/// use swarm_calib::parameters::ParameterSpace;
/// use swarm_calib::pso::{PsoConfig, PsoEngine};
///
/// let space: ParameterSpace = "x -1 1\ny -1 1\n".parse()?;
/// let objective = FnObjective::new(|p: &ndarray::Array1<f64>| p.mapv(|v| v * v).sum());
/// let config = PsoConfig::new().with_swarm_size(10).with_max_iterations(30).with_seed(1);
///
/// let result = PsoEngine::new(Arc::new(space), config, objective)?.run()?;
/// assert!(result.best_fitness < 0.1);
/// # Ok::<(), swarm_calib::CalibError>(())
/// ```
pub struct PsoEngine<O: Objective> {
    space: Arc<ParameterSpace>,
    config: PsoConfig,
    objective: O,
    rng: ChaCha8Rng,
    swarm: Option<Swarm>,
    state: EngineState,
    completed: usize,
    evaluations: usize,
    failed_evaluations: usize,
    history: Vec<IterationRecord>,
    particle_history: Vec<ParticleRound>,
    pending: Vec<Evaluation>,
    pool: rayon::ThreadPool,
    cancel: CancellationToken,
}

impl<O: Objective> PsoEngine<O> {
    /// Create an engine in the [`EngineState::Initializing`] state
    pub fn new(space: Arc<ParameterSpace>, config: PsoConfig, objective: O) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let pool = build_pool(config.workers)?;

        Ok(Self {
            space,
            config,
            objective,
            rng,
            swarm: None,
            state: EngineState::Initializing,
            completed: 0,
            evaluations: 0,
            failed_evaluations: 0,
            history: Vec::new(),
            particle_history: Vec::new(),
            pending: Vec::new(),
            pool,
            cancel: CancellationToken::new(),
        })
    }

    /// Continue from a snapshot.
    ///
    /// The snapshot must match the space (same parameter names in the same
    /// order) and the configured swarm size.
    pub fn resume(
        space: Arc<ParameterSpace>,
        config: PsoConfig,
        objective: O,
        snapshot: OptimizationState,
    ) -> Result<Self> {
        let names = space.names();
        if snapshot.parameter_names != names {
            return Err(CalibError::config(format!(
                "Checkpoint parameters {:?} do not match the parameter space {:?}",
                snapshot.parameter_names, names
            )));
        }
        if snapshot.swarm.len() != config.swarm_size {
            return Err(CalibError::config(format!(
                "Checkpoint holds {} particles, configuration asks for {}",
                snapshot.swarm.len(),
                config.swarm_size
            )));
        }
        let dim = space.dimension();
        let vectors_match = snapshot.swarm.global_best_position.len() == dim
            && snapshot.swarm.particles.iter().all(|p| {
                p.position.len() == dim && p.velocity.len() == dim && p.best_position.len() == dim
            });
        if !vectors_match {
            return Err(CalibError::DimensionMismatch(format!(
                "checkpoint vectors do not have {} components",
                dim
            )));
        }

        let mut engine = Self::new(space, config, objective)?;
        engine.rng = snapshot.rng.restore();
        engine.completed = snapshot.iteration;
        engine.evaluations = snapshot.evaluations;
        engine.failed_evaluations = snapshot.failed_evaluations;
        engine.history = snapshot.history;
        engine.particle_history = snapshot.particle_history;
        engine.swarm = Some(snapshot.swarm);
        engine.state = match snapshot.termination {
            Some(reason) => reason.into(),
            None if engine.completed >= engine.config.max_iterations => EngineState::MaxIterationsReached,
            None => EngineState::Evaluating(engine.completed),
        };
        info!(iteration = engine.completed, state = ?engine.state, "resumed from checkpoint");
        Ok(engine)
    }

    /// Share a cancellation token, e.g. with the execution handler
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn swarm(&self) -> Option<&Swarm> {
        self.swarm.as_ref()
    }

    pub fn config(&self) -> &PsoConfig {
        &self.config
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// Completed iterations
    pub fn iterations(&self) -> usize {
        self.completed
    }

    /// Advance by one state transition and return the new state
    pub fn step(&mut self) -> Result<EngineState> {
        self.state = match self.state {
            EngineState::Initializing => {
                let swarm = Swarm::initialize(&self.space, &self.config, &mut self.rng);
                info!(
                    particles = swarm.len(),
                    dimension = self.space.dimension(),
                    "initialized swarm"
                );
                self.swarm = Some(swarm);
                EngineState::Evaluating(0)
            }
            EngineState::Evaluating(i) => self.evaluate(i)?,
            EngineState::Updating(i) => self.update(i)?,
            terminal => terminal,
        };
        Ok(self.state)
    }

    /// Step until the optimization stops
    pub fn run(mut self) -> Result<PsoResult> {
        while !self.state.is_terminal() {
            self.step()?;
        }
        self.result()
    }

    fn swarm_ref(&self) -> Result<&Swarm> {
        self.swarm
            .as_ref()
            .ok_or_else(|| CalibError::InvalidState("swarm is not initialized".to_string()))
    }

    fn evaluate(&mut self, iteration: usize) -> Result<EngineState> {
        let swarm = self.swarm_ref()?;
        let objective = &self.objective;
        let cancel = &self.cancel;

        // Collecting in particle order is the barrier
        let results: Vec<Evaluation> = self.pool.install(|| {
            swarm
                .particles
                .par_iter()
                .map(|particle| {
                    if cancel.is_cancelled() {
                        Evaluation::abandoned()
                    } else {
                        objective.evaluate(&particle.position)
                    }
                })
                .collect()
        });

        if self.cancel.is_cancelled() {
            info!(iteration, "cancelled, discarding the iteration in progress");
            self.save_cancelled_checkpoint()?;
            return Ok(EngineState::Cancelled);
        }

        debug!(iteration, evaluated = results.len(), "evaluations complete");
        self.pending = results;
        Ok(EngineState::Updating(iteration))
    }

    fn update(&mut self, iteration: usize) -> Result<EngineState> {
        let evaluations = std::mem::take(&mut self.pending);
        let sense = self.config.sense;
        let worst = self.config.worst_fitness();
        let swarm = self
            .swarm
            .as_mut()
            .ok_or_else(|| CalibError::InvalidState("swarm is not initialized".to_string()))?;
        if evaluations.len() != swarm.len() {
            return Err(CalibError::InvalidState(format!(
                "{} evaluations for {} particles",
                evaluations.len(),
                swarm.len()
            )));
        }

        let summary = swarm.record_evaluations(&evaluations, sense, worst, iteration == 0);
        let record = IterationRecord {
            iteration,
            best_fitness: swarm.global_best_fitness,
            mean_fitness: summary.mean_fitness,
            evaluated: summary.evaluated,
            failed: summary.failed,
        };
        if self.config.record_particles {
            self.particle_history.push(ParticleRound {
                iteration,
                positions: swarm.particles.iter().map(|p| p.position.clone()).collect(),
                fitness: swarm.particles.iter().map(|p| p.fitness.unwrap_or(worst)).collect(),
            });
        }

        self.evaluations += summary.evaluated;
        self.failed_evaluations += summary.failed;
        self.history.push(record);
        self.completed = iteration + 1;
        self.log_iteration(&record, &summary);

        let next = match self.termination(&summary) {
            Some(reason) => {
                info!(iteration, reason = %reason, "optimization finished");
                EngineState::from(reason)
            }
            None => {
                if let Some(swarm) = self.swarm.as_mut() {
                    swarm.update_particles(&self.space, &self.config, &mut self.rng);
                }
                EngineState::Evaluating(iteration + 1)
            }
        };

        if let Some(checkpoint) = &self.config.checkpoint {
            if next.is_terminal() || self.completed % checkpoint.every == 0 {
                let path = checkpoint.path.clone();
                self.snapshot_with(next.termination())?.save(&path)?;
                debug!(path = %path.display(), iteration, "checkpoint written");
            }
        }
        Ok(next)
    }

    fn log_iteration(&self, record: &IterationRecord, summary: &RoundSummary) {
        info!(
            iteration = record.iteration,
            best = record.best_fitness,
            mean = ?record.mean_fitness,
            "{} of {} evaluations failed",
            record.failed,
            record.evaluated
        );
        if summary.improved {
            if let Some(swarm) = &self.swarm {
                info!(
                    iteration = record.iteration,
                    fitness = swarm.global_best_fitness,
                    position = %swarm.global_best_position,
                    "new global best"
                );
            }
        }
        if record.evaluated > 0 {
            let fraction = record.failed as f64 / record.evaluated as f64;
            if fraction > self.config.failure_warning_fraction {
                warn!(
                    iteration = record.iteration,
                    failed = record.failed,
                    evaluated = record.evaluated,
                    "more than {:.0}% of evaluations failed",
                    self.config.failure_warning_fraction * 100.0
                );
            }
        }
    }

    fn termination(&self, summary: &RoundSummary) -> Option<TerminationReason> {
        let gbest_valid = self.swarm.as_ref().is_some_and(|s| s.global_best_valid);

        if gbest_valid {
            if let Some(convergence) = self.config.convergence {
                let n = self.history.len();
                if n > convergence.window {
                    let now = self.history[n - 1].best_fitness;
                    let before = self.history[n - 1 - convergence.window].best_fitness;
                    if (before - now).abs() < convergence.tolerance {
                        return Some(TerminationReason::Converged);
                    }
                }
            }
            if let Some(min_step) = self.config.min_step {
                if summary.improved && self.completed > 1 && summary.step <= min_step {
                    return Some(TerminationReason::Converged);
                }
            }
        }

        if self.completed >= self.config.max_iterations {
            return Some(TerminationReason::MaxIterationsReached);
        }
        None
    }

    /// Save the last complete iteration when cancelled mid-evaluation
    fn save_cancelled_checkpoint(&self) -> Result<()> {
        if let Some(checkpoint) = &self.config.checkpoint {
            if self.completed > 0 {
                self.snapshot_with(None)?.save(&checkpoint.path)?;
            }
        }
        Ok(())
    }

    fn snapshot_with(&self, termination: Option<TerminationReason>) -> Result<OptimizationState> {
        Ok(OptimizationState {
            format_version: FORMAT_VERSION,
            parameter_names: self.space.names(),
            iteration: self.completed,
            evaluations: self.evaluations,
            failed_evaluations: self.failed_evaluations,
            swarm: self.swarm_ref()?.clone(),
            history: self.history.clone(),
            particle_history: self.particle_history.clone(),
            termination,
            rng: RngState::capture(&self.rng),
        })
    }

    /// Snapshot of the optimization between iterations
    pub fn snapshot(&self) -> Result<OptimizationState> {
        match self.state {
            EngineState::Evaluating(_) => self.snapshot_with(None),
            EngineState::Converged | EngineState::MaxIterationsReached => {
                self.snapshot_with(self.state.termination())
            }
            // A cancelled engine resumes where the last complete iteration left off
            EngineState::Cancelled if self.completed > 0 => self.snapshot_with(None),
            other => Err(CalibError::InvalidState(format!(
                "cannot snapshot an engine in state {:?}",
                other
            ))),
        }
    }

    /// Summary of the optimization so far
    pub fn result(&self) -> Result<PsoResult> {
        let swarm = self.swarm_ref()?;
        let termination = self.state.termination().ok_or_else(|| {
            CalibError::InvalidState(format!("optimization still running in state {:?}", self.state))
        })?;

        Ok(PsoResult {
            best_position: swarm.global_best_position.clone(),
            best_fitness: swarm.global_best_fitness,
            best_valid: swarm.global_best_valid,
            termination,
            iterations: self.completed,
            evaluations: self.evaluations,
            failed_evaluations: self.failed_evaluations,
            history: self.history.clone(),
            personal_bests: swarm
                .particles
                .iter()
                .map(|p| (p.best_position.clone(), p.best_fitness))
                .collect(),
            particle_history: self.particle_history.clone(),
        })
    }
}

fn build_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|idx| format!("swarm-eval-{}", idx))
        .build()
        .map_err(|e| CalibError::config(format!("Cannot start evaluation workers: {}", e)))
}
