//! Cooperative cancellation shared by the engine and the execution handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A flag that, once raised, stays raised.
///
/// Clones share the same flag. The engine checks it before each evaluation and
/// at the evaluation barrier; the subprocess handler checks it while waiting on
/// a child and kills the child when it is raised.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
