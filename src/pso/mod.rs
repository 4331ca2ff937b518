//! # Particle Swarm Optimization
//!
//! A swarm of particles moves through the [`ParameterSpace`](crate::parameters::ParameterSpace),
//! each pulled towards its own best position and the best position of the
//! whole swarm. Every iteration evaluates all particles concurrently, then
//! updates the bests and moves the particles.
//!
//! Iteration 0 evaluates the initial positions; `max_iterations` counts it.
//! The global best never gets worse. Failed evaluations carry the penalty
//! fitness, so they can only become a best when nothing better was ever seen.
//!
//! The engine can be checkpointed between iterations and resumed from the
//! checkpoint with the same trajectory it would have followed uninterrupted.

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod output;
pub mod swarm;

pub use checkpoint::{OptimizationState, RngState};
pub use config::{CheckpointConfig, Convergence, InitialVelocity, OptimizationSense, PsoConfig};
pub use engine::{EngineState, IterationRecord, ParticleRound, PsoEngine, PsoResult, TerminationReason};
pub use swarm::{Particle, RoundSummary, Swarm};
