//! Background idle eviction.
//!
//! Every `reap_interval` the reaper closes connections that have sat idle for
//! at least `idle_timeout`, never taking the pool below `min`, then opens
//! connections again if the pool has fallen below `min`.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::driver::Driver;

use super::Shared;

pub(super) fn spawn<D: Driver>(shared: &Arc<Shared<D>>) {
    let weak = Arc::downgrade(shared);
    let shutdown = shared.shutdown.clone();
    let period = shared.options.reap_interval;

    shared.tasks.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // the pool was dropped without a drain
            let Some(shared) = weak.upgrade() else { break };
            reap_once(&shared).await;
        }
    });
}

pub(super) async fn reap_once<D: Driver>(shared: &Arc<Shared<D>>) {
    let idle_timeout = shared.options.idle_timeout;
    let mut removable = shared.pool.status().size.saturating_sub(shared.options.min);

    if removable > 0 {
        let evicted = shared
            .pool
            .retain(|slot, _| {
                if removable > 0 && slot.idle_since.elapsed() >= idle_timeout {
                    removable -= 1;
                    false
                } else {
                    true
                }
            })
            .removed;
        if !evicted.is_empty() {
            debug!(pool = %shared.name(), evicted = evicted.len(), "evicting idle connections");
            shared.destroy_all(evicted).await;
        }
    }

    let refilled = shared.fill_to_min().await;
    if refilled > 0 {
        debug!(pool = %shared.name(), refilled, "pool topped up to min");
    }
}
