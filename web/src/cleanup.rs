//! Background sweep of expired session records.

use std::sync::Arc;
use std::time::Duration;

use sessionware_core::SessionStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// The one long-lived background task: periodically asks the store to
/// delete expired records.
///
/// Stores expire lazily — [`SessionStore::load`] treats an idle-expired row
/// as absent without removing it — so without a sweep, dead rows accumulate
/// forever. A failed sweep is logged and retried on the next tick; it is
/// never fatal.
///
/// Dropping the task stops it too, but only [`shutdown`](Self::shutdown)
/// waits until the task has fully terminated.
#[derive(Debug)]
pub struct CleanupTask {
    stop: watch::Sender<()>,
    handle: JoinHandle<()>,
}

impl CleanupTask {
    /// Spawn the sweep task. The first sweep runs one full `interval` after
    /// the call, not immediately.
    #[must_use]
    pub fn spawn(store: Arc<dyn SessionStore>, interval: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(());
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval's first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = store.delete_expired().await {
                            warn!(error = %err, "expired-session sweep failed");
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            debug!("expired-session sweep stopped");
        });
        Self { stop, handle }
    }

    /// Whether the task has terminated.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task to stop and wait for it to terminate.
    ///
    /// After this resolves, no further sweeps run.
    pub async fn shutdown(self) {
        // Closing the channel wakes the `changed()` arm.
        drop(self.stop);
        if let Err(err) = self.handle.await {
            warn!(error = %err, "expired-session sweep task did not stop cleanly");
        }
    }
}
