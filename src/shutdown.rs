//! Turning interrupt signals into a cancellation.
//!
//! A calibration runs on a blocking thread while a small tokio runtime waits
//! for SIGINT or SIGTERM. The first signal raises the calibration's
//! [`CancellationToken`]: running simulators are killed, the last complete
//! iteration is checkpointed and the run ends as `Cancelled` with its result
//! files written.

use std::future::Future;

use tokio::task::{self, JoinError};
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::driver::Calibration;
use crate::error::{CalibError, Result};
use crate::pso::PsoResult;

/// Resolves on the first SIGINT or SIGTERM.
///
/// Never resolves if the handlers cannot be installed.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "cannot install signal handlers, interrupts will not be checkpointed");
            return std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

/// Resolves on the first Ctrl+C.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C"),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl+C, interrupts will not be checkpointed");
            std::future::pending::<()>().await
        }
    }
}

/// Run blocking `work`, raising `token` if `signal` resolves first.
///
/// The work is still awaited after the token is raised, so whatever it does on
/// cancellation (checkpointing, writing outputs) completes before returning.
pub async fn run_until<T, W, S>(token: CancellationToken, work: W, signal: S) -> Result<T>
where
    T: Send + 'static,
    W: FnOnce() -> Result<T> + Send + 'static,
    S: Future<Output = ()>,
{
    let mut handle = task::spawn_blocking(work);
    tokio::select! {
        joined = &mut handle => return flatten(joined),
        () = signal => {
            info!("cancelling, waiting for the current iteration to wind down");
            token.cancel();
        }
    }
    flatten(handle.await)
}

fn flatten<T>(joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(CalibError::InvalidState(format!("calibration task failed: {}", e))),
    }
}

/// Run a calibration, cancelling it cleanly on SIGINT or SIGTERM
pub fn run_interruptible(calibration: Calibration) -> Result<PsoResult> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| CalibError::FatalIo {
            context: "starting the signal runtime".to_string(),
            source,
        })?;
    let token = calibration.cancellation_token();
    runtime.block_on(run_until(token, move || calibration.run(), shutdown_signal()))
}
