//! Background idle-timeout sweep.
//!
//! Runs as a background task polling the session manager once a minute.
//! An Active session whose idle time exceeds the configured timeout is
//! expired by the sweep; the manager owns the revert policy.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::manager::SessionManager;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the session timeout sweep background task.
///
/// The task ticks every minute until the `CancellationToken` fires,
/// invoking [`SessionManager::check_timeout`] on each tick.
#[must_use]
pub fn spawn_timeout_sweep(
    manager: Arc<SessionManager>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("session timeout sweep shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = manager.check_timeout(&cancel).await {
                        error!(?err, "session timeout check failed");
                    }
                }
            }
        }
    })
}
