//! Particles, the swarm and the canonical PSO update rule.
//!
//! For each particle and each dimension `j`, with independent `r1, r2 ~ U[0, 1)`:
//!
//! ```text
//! v_j ← w·v_j + c1·r1·(pbest_j − x_j) + c2·r2·(gbest_j − x_j)
//! x_j ← x_j + v_j
//! ```
//!
//! Velocities are then clipped to `±limit · width_j` and positions to the
//! parameter bounds.

use ndarray::Array1;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::fitness::Evaluation;
use crate::parameters::ParameterSpace;
use crate::pso::config::{InitialVelocity, OptimizationSense, PsoConfig};

/// One candidate solution and its memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub position: Array1<f64>,
    pub velocity: Array1<f64>,
    pub best_position: Array1<f64>,
    pub best_fitness: f64,
    /// Whether the personal best comes from a successful evaluation
    pub best_valid: bool,
    /// Fitness at the current position, once evaluated
    pub fitness: Option<f64>,
}

impl Particle {
    fn new(position: Array1<f64>, velocity: Array1<f64>, worst: f64) -> Self {
        Self {
            best_position: position.clone(),
            position,
            velocity,
            best_fitness: worst,
            best_valid: false,
            fitness: None,
        }
    }
}

/// What one round of evaluations changed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundSummary {
    pub evaluated: usize,
    pub failed: usize,
    /// Mean fitness over the successful evaluations
    pub mean_fitness: Option<f64>,
    /// Whether the global best changed
    pub improved: bool,
    /// Distance between the previous and the new global best position
    pub step: f64,
}

/// The particles plus the best position any of them has seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swarm {
    pub particles: Vec<Particle>,
    pub global_best_position: Array1<f64>,
    pub global_best_fitness: f64,
    pub global_best_valid: bool,
}

impl Swarm {
    /// Scatter particles uniformly over the space
    pub fn initialize(space: &ParameterSpace, config: &PsoConfig, rng: &mut impl Rng) -> Self {
        let worst = config.worst_fitness();
        let widths = space.widths();

        let particles: Vec<Particle> = (0..config.swarm_size)
            .map(|_| {
                let position = space.sample_uniform(rng);
                let velocity = match (config.initial_velocity, config.velocity_limit) {
                    (InitialVelocity::Random, Some(limit)) => widths.mapv(|w| {
                        let vmax = limit * w;
                        rng.gen_range(-vmax..=vmax)
                    }),
                    _ => Array1::zeros(space.dimension()),
                };
                Particle::new(position, velocity, worst)
            })
            .collect();

        let global_best_position = particles
            .first()
            .map(|p| p.position.clone())
            .unwrap_or_else(|| Array1::zeros(space.dimension()));

        Self {
            particles,
            global_best_position,
            global_best_fitness: worst,
            global_best_valid: false,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Apply one round of evaluations, in particle order.
    ///
    /// Failed or non-finite evaluations count as `worst`. In the first round
    /// personal bests are set to the initial positions whatever their fitness;
    /// afterwards they, and the global best, only change on strict improvement.
    pub fn record_evaluations(
        &mut self,
        evaluations: &[Evaluation],
        sense: OptimizationSense,
        worst: f64,
        first_round: bool,
    ) -> RoundSummary {
        let mut failed = 0;
        let mut sum = 0.0;

        for (particle, evaluation) in self.particles.iter_mut().zip(evaluations) {
            let success = evaluation.is_success();
            let fitness = if success { evaluation.fitness } else { worst };
            if success {
                sum += fitness;
            } else {
                failed += 1;
            }
            particle.fitness = Some(fitness);

            if first_round || sense.is_better(fitness, particle.best_fitness) {
                particle.best_position = particle.position.clone();
                particle.best_fitness = fitness;
                particle.best_valid = success;
            }
        }

        let evaluated = evaluations.len().min(self.particles.len());
        let succeeded = evaluated - failed;
        let previous = self.global_best_position.clone();

        let mut improved = false;
        for (idx, particle) in self.particles.iter().enumerate() {
            let take = if first_round && idx == 0 {
                true
            } else {
                sense.is_better(particle.best_fitness, self.global_best_fitness)
            };
            if take {
                self.global_best_position = particle.best_position.clone();
                self.global_best_fitness = particle.best_fitness;
                self.global_best_valid = particle.best_valid;
                improved = true;
            }
        }

        let step = (&self.global_best_position - &previous).mapv(|d| d * d).sum().sqrt();
        RoundSummary {
            evaluated,
            failed,
            mean_fitness: (succeeded > 0).then(|| sum / succeeded as f64),
            improved,
            step,
        }
    }

    /// Move every particle one step
    pub fn update_particles(&mut self, space: &ParameterSpace, config: &PsoConfig, rng: &mut impl Rng) {
        let bounds = space.bounds();
        let gbest = &self.global_best_position;

        for particle in &mut self.particles {
            for (j, bound) in bounds.iter().enumerate() {
                let r1: f64 = rng.gen();
                let r2: f64 = rng.gen();
                let x = particle.position[j];

                let mut v = config.inertia * particle.velocity[j]
                    + config.cognitive * r1 * (particle.best_position[j] - x)
                    + config.social * r2 * (gbest[j] - x);
                if let Some(limit) = config.velocity_limit {
                    let vmax = limit * bound.width();
                    v = v.clamp(-vmax, vmax);
                }

                let moved = x + v;
                let clamped = bound.clamp(moved);
                if clamped != moved && config.zero_velocity_on_boundary {
                    v = 0.0;
                }
                particle.position[j] = clamped;
                particle.velocity[j] = v;
            }
            particle.fitness = None;
        }
    }
}
