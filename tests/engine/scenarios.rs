//! End-to-end swarm runs on synthetic objectives.

use approx::assert_relative_eq;
use ndarray::Array1;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use swarm_calib::constraints::{ConstraintSet, WeightedSum};
use swarm_calib::execution::RunFailure;
use swarm_calib::fitness::{FitnessEvaluator, FnObjective};
use swarm_calib::pso::{EngineState, OptimizationSense, PsoConfig, PsoEngine, TerminationReason};

use crate::test_helpers::{approx_eq, space, FailingHandler, PartlyFailing};

fn quadratic(x: &Array1<f64>) -> f64 {
    (x[0] - 0.7).powi(2)
}

#[test]
fn test_quadratic_in_one_dimension() {
    let config = PsoConfig::new().with_swarm_size(4).with_max_iterations(50).with_seed(2024);
    let engine = PsoEngine::new(space("x 0 1\n"), config, FnObjective::new(quadratic)).unwrap();
    let result = engine.run().unwrap();

    assert_eq!(result.termination, TerminationReason::MaxIterationsReached);
    assert_eq!(result.iterations, 50);
    assert_eq!(result.evaluations, 200);
    assert_eq!(result.failed_evaluations, 0);
    assert!(result.best_valid);
    assert!(
        approx_eq(result.best_position[0], 0.7, 1e-3),
        "best position {}",
        result.best_position
    );
    assert_relative_eq!(result.best_fitness, quadratic(&result.best_position));
}

#[test]
fn test_sphere_in_three_dimensions() {
    let config = PsoConfig::new().with_swarm_size(20).with_max_iterations(80).with_seed(5);
    let objective = FnObjective::new(|x: &Array1<f64>| x.mapv(|v| v * v).sum());
    let result = PsoEngine::new(space("a -5 5\nb -5 5\nc -5 5\n"), config, objective)
        .unwrap()
        .run()
        .unwrap();

    assert!(result.best_fitness < 1e-4, "best fitness {}", result.best_fitness);
}

#[test]
fn test_every_run_failing() {
    let handler = Arc::new(FailingHandler::new(RunFailure::Spawn {
        executable: "sage".to_string(),
        reason: "not found".to_string(),
    }));
    let constraints = ConstraintSet::new(Box::new(WeightedSum));
    let evaluator = FitnessEvaluator::new(handler.clone(), constraints);

    let config = PsoConfig::new()
        .with_swarm_size(5)
        .with_max_iterations(4)
        .with_convergence(1e-3, 1)
        .with_seed(1);
    let result = PsoEngine::new(space("x 0 1\ny 0 1\n"), config, evaluator)
        .unwrap()
        .run()
        .unwrap();

    // Penalty never improves, but the stagnation is not convergence
    assert_eq!(result.termination, TerminationReason::MaxIterationsReached);
    assert_eq!(result.best_fitness, 1e20);
    assert!(!result.best_valid);
    assert_eq!(result.failed_evaluations, 20);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 20);
    for record in &result.history {
        assert_eq!(record.best_fitness, 1e20);
        assert_eq!(record.failed, 5);
        assert_eq!(record.mean_fitness, None);
    }
}

#[test]
fn test_timeouts_keep_initial_personal_bests() {
    let handler = Arc::new(FailingHandler::new(RunFailure::Timeout { seconds: 60.0 }));
    let evaluator = FitnessEvaluator::new(handler, ConstraintSet::new(Box::new(WeightedSum)));
    let config = PsoConfig::new().with_swarm_size(6).with_max_iterations(10).with_seed(9);
    let mut engine = PsoEngine::new(space("x 0 1\ny -1 1\n"), config, evaluator).unwrap();

    assert_eq!(engine.step().unwrap(), EngineState::Evaluating(0));
    let initial: Vec<Array1<f64>> = engine
        .swarm()
        .unwrap()
        .particles
        .iter()
        .map(|p| p.position.clone())
        .collect();

    assert_eq!(engine.step().unwrap(), EngineState::Updating(0));
    assert_eq!(engine.step().unwrap(), EngineState::Evaluating(1));
    assert_eq!(engine.step().unwrap(), EngineState::Updating(1));
    assert_eq!(engine.step().unwrap(), EngineState::Evaluating(2));

    let swarm = engine.swarm().unwrap();
    for (particle, start) in swarm.particles.iter().zip(&initial) {
        assert_eq!(&particle.best_position, start);
        assert_eq!(particle.best_fitness, 1e20);
        assert!(!particle.best_valid);
    }
    assert_eq!(swarm.global_best_position, initial[0]);
}

#[test]
fn test_global_best_never_regresses() {
    let objective = PartlyFailing {
        fitness: |x: &Array1<f64>| (x[0] - 0.9).powi(2) + (3.0 * x[1]).sin().abs(),
        fails: |x: &Array1<f64>| x[0] > 0.8,
    };
    let config = PsoConfig::new().with_swarm_size(12).with_max_iterations(30).with_seed(77);
    let result = PsoEngine::new(space("x 0 1\ny 0 2\n"), config, objective)
        .unwrap()
        .run()
        .unwrap();

    for pair in result.history.windows(2) {
        assert!(pair[1].best_fitness <= pair[0].best_fitness);
    }
    assert!(result.best_valid);
    assert!(result.best_position[0] <= 0.8);
    for (position, fitness) in &result.personal_bests {
        assert!(*fitness >= result.best_fitness);
        assert!(position[0] >= 0.0 && position[0] <= 1.0);
    }
}

#[test]
fn test_maximize() {
    let config = PsoConfig::new()
        .with_swarm_size(8)
        .with_max_iterations(40)
        .with_sense(OptimizationSense::Maximize)
        .with_seed(3);
    let objective = FnObjective::new(|x: &Array1<f64>| -(x[0] - 0.25).powi(2));
    let result = PsoEngine::new(space("x 0 1\n"), config, objective).unwrap().run().unwrap();

    assert!(approx_eq(result.best_position[0], 0.25, 1e-3));
    for pair in result.history.windows(2) {
        assert!(pair[1].best_fitness >= pair[0].best_fitness);
    }
}

#[test]
fn test_convergence_window() {
    let config = PsoConfig::new()
        .with_swarm_size(4)
        .with_max_iterations(100)
        .with_convergence(1e-9, 3)
        .with_seed(4);
    let result = PsoEngine::new(space("x 0 1\n"), config, FnObjective::new(|_: &Array1<f64>| 1.0))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(result.termination, TerminationReason::Converged);
    assert_eq!(result.iterations, 4);
}

#[test]
fn test_min_step() {
    let config = PsoConfig::new()
        .with_swarm_size(6)
        .with_max_iterations(50)
        .with_min_step(10.0)
        .with_seed(8);
    let result = PsoEngine::new(space("x 0 1\n"), config, FnObjective::new(|x: &Array1<f64>| x[0]))
        .unwrap()
        .run()
        .unwrap();

    // Any new best is closer than 10 to the previous one
    assert_eq!(result.termination, TerminationReason::Converged);
    assert!(result.iterations > 1 && result.iterations < 50);
}

#[test]
fn test_worker_count_does_not_change_the_trajectory() {
    let run = |workers: usize| {
        let config = PsoConfig::new()
            .with_swarm_size(10)
            .with_max_iterations(15)
            .with_workers(workers)
            .with_seed(21);
        let objective = FnObjective::new(|x: &Array1<f64>| (x[0] - 0.3).powi(2) + (x[1] + 0.2).powi(2));
        PsoEngine::new(space("x -1 1\ny -1 1\n"), config, objective)
            .unwrap()
            .run()
            .unwrap()
    };

    let serial = run(1);
    let parallel = run(4);
    assert_eq!(serial.best_position, parallel.best_position);
    assert_eq!(serial.history, parallel.history);
}

#[test]
fn test_particle_history() {
    let config = PsoConfig::new()
        .with_swarm_size(3)
        .with_max_iterations(5)
        .with_record_particles(true)
        .with_seed(10);
    let result = PsoEngine::new(space("x 0 1\ny 0 1\n"), config, FnObjective::new(quadratic))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(result.particle_history.len(), 5);
    for (idx, round) in result.particle_history.iter().enumerate() {
        assert_eq!(round.iteration, idx);
        assert_eq!(round.positions.len(), 3);
        for (position, fitness) in round.positions.iter().zip(&round.fitness) {
            assert_relative_eq!(*fitness, quadratic(position));
        }
    }
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let objective = FnObjective::new(quadratic);
    let err = PsoEngine::new(space("x 0 1\n"), PsoConfig::new().with_swarm_size(0), objective).err();
    assert!(err.unwrap().is_config());
}
