//! Checkpointing and resuming.

use ndarray::Array1;
use std::path::Path;

use swarm_calib::fitness::FnObjective;
use swarm_calib::pso::{EngineState, OptimizationState, PsoConfig, PsoEngine, TerminationReason};

use crate::test_helpers::space;

fn objective() -> FnObjective<fn(&Array1<f64>) -> f64> {
    fn rosenbrock(x: &Array1<f64>) -> f64 {
        100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
    }
    FnObjective::new(rosenbrock as fn(&Array1<f64>) -> f64)
}

fn config() -> PsoConfig {
    PsoConfig::new().with_swarm_size(6).with_max_iterations(8).with_seed(31)
}

const SPACE: &str = "a -2 2\nb -1 3\n";

#[test]
fn test_resume_follows_the_same_trajectory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let uninterrupted = PsoEngine::new(space(SPACE), config(), objective()).unwrap().run().unwrap();

    let mut engine = PsoEngine::new(space(SPACE), config().with_checkpoint(&path, 1), objective()).unwrap();
    while engine.state() != EngineState::Evaluating(3) {
        engine.step().unwrap();
    }
    let saved = OptimizationState::load(&path).unwrap();
    assert_eq!(saved.iteration, 3);
    assert_eq!(saved, engine.snapshot().unwrap());
    drop(engine);

    let resumed = PsoEngine::resume(space(SPACE), config(), objective(), saved)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(resumed.best_position, uninterrupted.best_position);
    assert_eq!(resumed.best_fitness, uninterrupted.best_fitness);
    assert_eq!(resumed.history, uninterrupted.history);
    assert_eq!(resumed.evaluations, uninterrupted.evaluations);
    assert_eq!(resumed.personal_bests, uninterrupted.personal_bests);
}

#[test]
fn test_checkpoint_interval_and_final_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut engine = PsoEngine::new(space(SPACE), config().with_checkpoint(&path, 3), objective()).unwrap();
    while engine.iterations() < 2 {
        engine.step().unwrap();
    }
    assert!(!path.exists());
    while engine.iterations() < 3 {
        engine.step().unwrap();
    }
    assert_eq!(OptimizationState::load(&path).unwrap().iteration, 3);

    let result = engine.run().unwrap();
    let last = OptimizationState::load(&path).unwrap();
    assert_eq!(last.iteration, 8);
    assert_eq!(last.termination, Some(TerminationReason::MaxIterationsReached));

    // Resuming a finished optimization just reports it again
    let again = PsoEngine::resume(space(SPACE), config(), objective(), last).unwrap();
    assert_eq!(again.state(), EngineState::MaxIterationsReached);
    assert_eq!(again.run().unwrap(), result);
}

#[test]
fn test_resume_rejects_mismatched_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    PsoEngine::new(space(SPACE), config().with_checkpoint(&path, 1), objective())
        .unwrap()
        .run()
        .unwrap();
    let saved = OptimizationState::load(&path).unwrap();

    let renamed = PsoEngine::resume(space("a -2 2\nc -1 3\n"), config(), objective(), saved.clone());
    assert!(renamed.err().unwrap().is_config());

    let reordered = PsoEngine::resume(space("b -1 3\na -2 2\n"), config(), objective(), saved.clone());
    assert!(reordered.err().unwrap().is_config());

    let bigger = PsoEngine::resume(space(SPACE), config().with_swarm_size(7), objective(), saved);
    assert!(bigger.err().unwrap().is_config());
}

#[test]
fn test_snapshot_requires_a_complete_iteration() {
    let mut engine = PsoEngine::new(space(SPACE), config(), objective()).unwrap();
    assert!(engine.snapshot().is_err());

    engine.step().unwrap();
    engine.step().unwrap();
    assert_eq!(engine.state(), EngineState::Updating(0));
    assert!(engine.snapshot().is_err());

    engine.step().unwrap();
    assert!(engine.snapshot().is_ok());
}

#[test]
fn test_unwritable_checkpoint_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "not a directory").unwrap();
    let path: &Path = &blocker.join("state.json");

    let err = PsoEngine::new(space(SPACE), config().with_checkpoint(path, 1), objective())
        .unwrap()
        .run()
        .unwrap_err();
    assert!(matches!(err, swarm_calib::CalibError::FatalIo { .. }));
}
