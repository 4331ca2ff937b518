//! Cancelling a running optimization.

use ndarray::Array1;
use std::sync::atomic::{AtomicUsize, Ordering};

use swarm_calib::fitness::{Evaluation, Objective};
use swarm_calib::pso::{OptimizationState, PsoConfig, PsoEngine, TerminationReason};
use swarm_calib::CancellationToken;

use crate::test_helpers::space;

/// Raises the token on its `cancel_at`-th evaluation
struct CancelDuring {
    token: CancellationToken,
    calls: AtomicUsize,
    cancel_at: usize,
}

impl CancelDuring {
    fn new(token: CancellationToken, cancel_at: usize) -> Self {
        Self {
            token,
            calls: AtomicUsize::new(0),
            cancel_at,
        }
    }
}

impl Objective for CancelDuring {
    fn evaluate(&self, position: &Array1<f64>) -> Evaluation {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.cancel_at {
            self.token.cancel();
        }
        Evaluation::success((position[0] - 0.4).powi(2))
    }
}

fn config() -> PsoConfig {
    PsoConfig::new().with_swarm_size(4).with_max_iterations(6).with_workers(1).with_seed(12)
}

#[test]
fn test_cancel_discards_the_iteration_in_progress() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let token = CancellationToken::new();

    // The ninth evaluation is the first one of iteration 2
    let objective = CancelDuring::new(token.clone(), 9);
    let result = PsoEngine::new(space("x 0 1\n"), config().with_checkpoint(&path, 5), objective)
        .unwrap()
        .with_cancellation(token)
        .run()
        .unwrap();

    assert_eq!(result.termination, TerminationReason::Cancelled);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.evaluations, 8);
    assert_eq!(result.history.len(), 2);

    let saved = OptimizationState::load(&path).unwrap();
    assert_eq!(saved.iteration, 2);
    assert_eq!(saved.termination, None);

    // Resuming continues exactly where an uninterrupted run would be
    let fresh = || CancelDuring::new(CancellationToken::new(), usize::MAX);
    let resumed = PsoEngine::resume(space("x 0 1\n"), config(), fresh(), saved)
        .unwrap()
        .run()
        .unwrap();
    let uninterrupted = PsoEngine::new(space("x 0 1\n"), config(), fresh()).unwrap().run().unwrap();

    assert_eq!(resumed.termination, TerminationReason::MaxIterationsReached);
    assert_eq!(resumed.history, uninterrupted.history);
    assert_eq!(resumed.best_position, uninterrupted.best_position);
}

#[test]
fn test_cancel_before_start() {
    let token = CancellationToken::new();
    token.cancel();
    let objective = CancelDuring::new(token.clone(), usize::MAX);
    let engine = PsoEngine::new(space("x 0 1\n"), config(), objective).unwrap().with_cancellation(token);

    let result = engine.run().unwrap();
    assert_eq!(result.termination, TerminationReason::Cancelled);
    assert_eq!(result.iterations, 0);
    assert_eq!(result.evaluations, 0);
}
