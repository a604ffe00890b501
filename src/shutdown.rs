use crate::metrics::Registry;
use std::time::Duration;
use tracing::debug;

/// Flush every backend, then wait out the daemon's own flush interval when the
/// container is about to be torn down. Returns whether it waited.
///
/// The daemon buffers samples and forwards them on its own ~10s schedule, so
/// without the wait the last samples of a task die with a disposable container.
pub async fn flush_and_wait(registry: &Registry, grace: Duration, disposable: bool) -> bool {
    registry.flush();

    if !disposable || grace.is_zero() {
        return false;
    }

    debug!(grace = ?grace, "Waiting for the daemon to flush before exit");
    tokio::time::sleep(grace).await;
    true
}
