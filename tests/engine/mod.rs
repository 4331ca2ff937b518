//! Particle swarm engine tests

mod cancellation;
mod checkpoint;
mod scenarios;
