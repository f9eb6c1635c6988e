#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use rpool::Pool;
use rpool::test_utils::MemoryDriver;

static TRACING: Once = Once::new();

/// Route pool logs through the test harness so they show up on failure.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

pub const LOCAL: &str = "rethinkdb://localhost:28015/test";

/// Poll until `pool` reports at least `n` queued callers.
pub async fn wait_for_waiters(pool: &Pool<MemoryDriver>, n: usize) {
    for _ in 0..500 {
        if pool.status().waiting >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("expected {n} waiters, saw {}", pool.status().waiting);
}
