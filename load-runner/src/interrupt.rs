//! Operator interrupts: the first one cancels the run and lets it drain, a second one asks the
//! process to quit right away.

use crate::scheduler::CancelHandle;
use std::future::Future;
use std::io;

/// Waits on `next_interrupt` (normally `tokio::signal::ctrl_c`). Returns `true` once a second
/// interrupt arrives after the run was cancelled, `false` if the interrupt source fails.
pub async fn watch_interrupts<F, Fut>(cancel: CancelHandle, mut next_interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if let Err(e) = next_interrupt().await {
        tracing::warn!(error = %e, "failed to listen for interrupts");
        return false;
    }
    cancel.cancel();
    match next_interrupt().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "failed to listen for a second interrupt");
            false
        }
    }
}
