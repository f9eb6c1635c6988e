//! Priority-ordered admission in front of the deadpool primitive.
//!
//! The gate holds exactly `max` permits, the same as the pool's `max_size`, so
//! a caller that holds a permit never blocks inside deadpool waiting for
//! capacity. Waiters are served lowest priority number first, FIFO within a
//! priority.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

/// Returned when the gate was closed before or while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GateClosed;

pub(crate) struct PriorityGate {
    state: Mutex<GateState>,
}

struct GateState {
    permits: usize,
    closed: bool,
    next_seq: u64,
    waiters: BinaryHeap<Waiter>,
}

struct Waiter {
    priority: u32,
    seq: u64,
    tx: oneshot::Sender<Permit>,
}

// BinaryHeap is a max-heap; invert so the smallest (priority, seq) pops first.
impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

/// One unit of pool capacity. Dropping it hands the capacity to the next
/// waiter, or back to the gate.
pub(crate) struct Permit {
    gate: Option<Arc<PriorityGate>>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.release();
        }
    }
}

impl PriorityGate {
    pub(crate) fn new(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GateState {
                permits,
                closed: false,
                next_seq: 0,
                waiters: BinaryHeap::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a permit.
    ///
    /// Cancel safe: a permit delivered to a dropped waiter is released again.
    pub(crate) async fn acquire(self: &Arc<Self>, priority: u32) -> Result<Permit, GateClosed> {
        let rx = {
            let mut state = self.lock();
            if state.closed {
                return Err(GateClosed);
            }
            if state.permits > 0 && state.waiters.is_empty() {
                state.permits -= 1;
                return Ok(self.permit());
            }
            let (tx, rx) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.waiters.push(Waiter { priority, seq, tx });
            rx
        };
        rx.await.map_err(|_| GateClosed)
    }

    /// Take a permit only if one is free and nobody is queued.
    pub(crate) fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut state = self.lock();
        if state.closed || state.permits == 0 || !state.waiters.is_empty() {
            return None;
        }
        state.permits -= 1;
        Some(self.permit())
    }

    /// Reject queued and future waiters. Outstanding permits stay valid.
    pub(crate) fn close(&self) {
        let waiters = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.waiters)
        };
        // dropping the senders wakes every waiter with GateClosed
        drop(waiters);
    }

    /// Number of callers currently queued.
    pub(crate) fn waiting(&self) -> usize {
        self.lock()
            .waiters
            .iter()
            .filter(|w| !w.tx.is_closed())
            .count()
    }

    fn permit(self: &Arc<Self>) -> Permit {
        Permit {
            gate: Some(Arc::clone(self)),
        }
    }

    fn release(self: Arc<Self>) {
        let mut state = self.lock();
        while let Some(waiter) = state.waiters.pop() {
            match waiter.tx.send(self.permit()) {
                Ok(()) => return,
                // the waiter gave up; disarm so the drop does not re-enter
                Err(mut permit) => {
                    permit.gate = None;
                }
            }
        }
        state.permits += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn free_permits_are_immediate() {
        let gate = PriorityGate::new(2);
        let a = gate.acquire(0).await.unwrap();
        let _b = gate.acquire(0).await.unwrap();
        assert!(gate.try_acquire().is_none());
        drop(a);
        assert!(gate.try_acquire().is_some());
    }

    #[tokio::test]
    async fn lower_priority_number_is_served_first() {
        let gate = PriorityGate::new(1);
        let held = gate.acquire(0).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let arrivals = [("low-a", 5), ("high", 1), ("low-b", 5), ("mid", 3)];
        for (queued, (label, priority)) in arrivals.into_iter().enumerate() {
            let gate = Arc::clone(&gate);
            let tx = tx.clone();
            let observer = Arc::clone(&gate);
            tokio::spawn(async move {
                let permit = gate.acquire(priority).await.unwrap();
                tx.send(label).unwrap();
                drop(permit);
            });
            // make the enqueue order deterministic
            while observer.lock().waiters.len() <= queued {
                tokio::task::yield_now().await;
            }
        }
        drop(held);

        let mut order = Vec::new();
        for _ in 0..4 {
            order.push(rx.recv().await.unwrap());
        }
        assert_eq!(order, ["high", "mid", "low-a", "low-b"]);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_a_permit() {
        let gate = PriorityGate::new(1);
        let held = gate.acquire(0).await.unwrap();
        let timed_out = tokio::time::timeout(Duration::from_millis(10), gate.acquire(0)).await;
        assert!(timed_out.is_err());
        drop(held);
        assert!(gate.try_acquire().is_some());
    }

    #[tokio::test]
    async fn close_wakes_waiters() {
        let gate = PriorityGate::new(1);
        let _held = gate.acquire(0).await.unwrap();
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire(0).await.map(|_| ()) })
        };
        while gate.waiting() == 0 {
            tokio::task::yield_now().await;
        }
        gate.close();
        assert_eq!(waiter.await.unwrap(), Err(GateClosed));
        assert_eq!(gate.acquire(0).await.err(), Some(GateClosed));
    }
}
