use std::future::Future;

use log::{debug, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Background task turning an interrupt into cancellation of a run.
///
/// The relay fires at most once. Dropping it stops the listener without
/// cancelling the run.
#[derive(Debug)]
pub struct InterruptRelay {
    handle: JoinHandle<()>,
}

impl InterruptRelay {
    /// Listens for Ctrl-C and cancels `run` when it arrives.
    pub fn spawn(run: CancellationToken) -> Self {
        Self::spawn_with(run, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for interrupt, reason: {}", err);
                std::future::pending::<()>().await;
            }
        })
    }

    /// Cancels `run` once `interrupt` completes.
    pub fn spawn_with<F>(run: CancellationToken, interrupt: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::task::spawn(async move {
            interrupt.await;
            debug!("interrupt received, stopping");
            run.cancel();
        });
        Self { handle }
    }
}

impl Drop for InterruptRelay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
