use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{EndpointConfig, EndpointSet};

/// Round-robin cursor over an endpoint set.
///
/// Each pool owns its own selector; clones share the cursor. The cursor is
/// advanced before it is read, so with two endpoints the first three picks
/// are `[1, 0, 1]`.
#[derive(Debug, Clone)]
pub struct EndpointSelector {
    endpoints: Arc<EndpointSet>,
    cursor: Arc<AtomicUsize>,
}

impl EndpointSelector {
    #[must_use]
    pub fn new(endpoints: EndpointSet) -> Self {
        Self {
            endpoints: Arc::new(endpoints),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Advance the cursor and return the endpoint it now points at.
    ///
    /// The advance is a single atomic update, so concurrent connection
    /// creation never skips or repeats a slot.
    pub fn next(&self) -> &EndpointConfig {
        let len = self.endpoints.len();
        let prev = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
            .unwrap_or_else(|c| c);
        &self.endpoints[(prev + 1) % len]
    }

    /// Index of the endpoint most recently returned by [`next`](Self::next).
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(hosts: &[&str]) -> EndpointSet {
        EndpointSet::new(hosts.iter().map(|h| EndpointConfig::new(*h)).collect()).unwrap()
    }

    fn host(ep: &EndpointConfig) -> &str {
        ep.host.as_deref().unwrap()
    }

    #[test]
    fn two_endpoints_start_at_second() {
        let selector = EndpointSelector::new(set(&["zero", "one"]));
        let picks: Vec<_> = (0..3).map(|_| host(selector.next()).to_string()).collect();
        assert_eq!(picks, ["one", "zero", "one"]);
    }

    #[test]
    fn n_picks_cover_every_endpoint_then_wrap() {
        let selector = EndpointSelector::new(set(&["a", "b", "c", "d"]));
        let first: Vec<_> = (0..4).map(|_| host(selector.next()).to_string()).collect();
        let mut sorted = first.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 4);
        assert_eq!(host(selector.next()), first[0]);
    }

    #[test]
    fn single_endpoint_rotation_is_a_no_op() {
        let selector = EndpointSelector::new(set(&["only"]));
        for _ in 0..5 {
            assert_eq!(host(selector.next()), "only");
        }
        assert_eq!(selector.position(), 0);
    }

    #[test]
    fn clones_share_the_cursor() {
        let a = EndpointSelector::new(set(&["x", "y"]));
        let b = a.clone();
        assert_eq!(host(a.next()), "y");
        assert_eq!(host(b.next()), "x");
    }
}
