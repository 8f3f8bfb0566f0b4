use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;

/// Await a future or a shutdown signal, whichever comes first.
///
/// - Returns `Ok(output)` when the future completes
/// - Returns `Err(())` on shutdown; the future is dropped unfinished
pub async fn select_or_shutdown<F: Future>(
    future: F,
    shutdown_notify: Arc<Notify>,
) -> Result<F::Output, ()> {
    tokio::select! {
        output = future => Ok(output),
        _ = shutdown_notify.notified() => Err(()),
    }
}
