//! Turning a parameter vector into a single fitness value.
//!
//! The engine only sees the [`Objective`] trait. [`FitnessEvaluator`] is the
//! production objective: it runs the simulator through an
//! [`ExecutionHandler`], scores the catalogs with a [`ConstraintSet`] and
//! absorbs every failure into a fixed penalty. [`FnObjective`] wraps a plain
//! closure for synthetic problems and tests.

use ndarray::Array1;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::CatalogData;
use crate::constraints::{ConstraintSet, EvaluationError};
use crate::error::{CalibError, Result};
use crate::execution::{ExecutionHandler, RunFailure, RunResult};

/// Fitness assigned to failed evaluations unless configured otherwise
pub const DEFAULT_PENALTY: f64 = 1e20;

/// How an evaluation ended
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Success,
    /// The simulator did not produce usable catalogs
    RunFailed(RunFailure),
    /// The catalogs could not be compared with the observations
    ScoringFailed(EvaluationError),
    /// Skipped because the calibration was cancelled
    Abandoned,
}

/// Fitness of one particle position and how it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub fitness: f64,
    pub outcome: EvaluationOutcome,
}

impl Evaluation {
    pub fn success(fitness: f64) -> Self {
        Self {
            fitness,
            outcome: EvaluationOutcome::Success,
        }
    }

    pub fn failed(fitness: f64, outcome: EvaluationOutcome) -> Self {
        Self { fitness, outcome }
    }

    /// Placeholder for a particle that was never evaluated
    pub fn abandoned() -> Self {
        Self {
            fitness: f64::NAN,
            outcome: EvaluationOutcome::Abandoned,
        }
    }

    /// Successful with a finite fitness
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, EvaluationOutcome::Success) && self.fitness.is_finite()
    }
}

/// Something the swarm can optimize.
///
/// Called concurrently from the evaluation workers.
pub trait Objective: Sync {
    fn evaluate(&self, position: &Array1<f64>) -> Evaluation;
}

/// An [`Objective`] backed by a closure that always succeeds
pub struct FnObjective<F> {
    f: F,
}

impl<F> FnObjective<F>
where
    F: Fn(&Array1<f64>) -> f64 + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Objective for FnObjective<F>
where
    F: Fn(&Array1<f64>) -> f64 + Sync,
{
    fn evaluate(&self, position: &Array1<f64>) -> Evaluation {
        Evaluation::success((self.f)(position))
    }
}

/// Simulator runs scored against observational constraints
pub struct FitnessEvaluator {
    handler: Arc<dyn ExecutionHandler>,
    constraints: ConstraintSet,
    penalty: f64,
}

impl FitnessEvaluator {
    pub fn new(handler: Arc<dyn ExecutionHandler>, constraints: ConstraintSet) -> Self {
        Self {
            handler,
            constraints,
            penalty: DEFAULT_PENALTY,
        }
    }

    /// Set the fitness of failed evaluations; must exceed every real score
    pub fn with_penalty(mut self, penalty: f64) -> Result<Self> {
        if !(penalty.is_finite() && penalty > 0.0) {
            return Err(CalibError::config(format!(
                "Penalty fitness must be finite and positive, got {}",
                penalty
            )));
        }
        self.penalty = penalty;
        Ok(self)
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Score already-produced catalogs
    pub fn score(&self, catalogs: &CatalogData) -> Evaluation {
        let scores = self.constraints.score(catalogs);
        for (id, score) in scores.iter() {
            debug!(constraint = id, score = ?score.value(), "constraint scored");
        }

        match self.constraints.aggregate(&scores) {
            Some(fitness) if fitness < self.penalty => Evaluation::success(fitness),
            Some(fitness) => {
                let error = EvaluationError::ExceedsPenalty { fitness };
                warn!(error = %error, "evaluation scored as failure");
                Evaluation::failed(self.penalty, EvaluationOutcome::ScoringFailed(error))
            }
            None if !self.constraints.has_weighted_constraint() => {
                let error = EvaluationError::NothingWeighted;
                warn!(error = %error, "evaluation scored as failure");
                Evaluation::failed(self.penalty, EvaluationOutcome::ScoringFailed(error))
            }
            None => {
                let error = scores
                    .first_error()
                    .map(|(_, e)| e.clone())
                    .unwrap_or_else(|| EvaluationError::NonFinite {
                        constraint: "aggregate".to_string(),
                    });
                warn!(error = %error, "evaluation scored as failure");
                Evaluation::failed(self.penalty, EvaluationOutcome::ScoringFailed(error))
            }
        }
    }
}

impl Objective for FitnessEvaluator {
    fn evaluate(&self, position: &Array1<f64>) -> Evaluation {
        match self.handler.evaluate_run(position) {
            RunResult::Success(catalogs) => self.score(&catalogs),
            RunResult::Failed(failure) => {
                warn!(kind = failure.kind(), reason = %failure, "simulation run failed");
                Evaluation::failed(self.penalty, EvaluationOutcome::RunFailed(failure))
            }
        }
    }
}
