use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::CacheStore;

/// Handle of the background sweep task. Dropping it stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Periodically purges expired entries. The task only holds a weak reference
/// and exits once the store has been dropped.
pub(crate) fn spawn_sweeper(store: &Arc<CacheStore>, period: Duration) -> SweeperHandle {
    let store: Weak<CacheStore> = Arc::downgrade(store);

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // First tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let Some(store) = store.upgrade() else {
                debug!("Cache store dropped, stopping sweeper");
                break;
            };
            let purged = store.purge_expired().await;
            if purged > 0 {
                debug!("Cache sweep purged {} expired entries", purged);
            }
        }
    });

    SweeperHandle { task }
}
