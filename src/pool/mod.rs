//! Pool lifecycle: construction, checkout, status, and drain.
//!
//! A [`Pool`] wraps a `deadpool` managed pool. deadpool owns the idle set and
//! the `max` bound; this layer adds endpoint rotation on create, the driver's
//! liveness probe on reuse, priority-ordered checkout, `min` warm
//! connections, idle eviction, and drain.

mod gate;
mod handle;
mod manager;
mod options;
mod reaper;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use deadpool::managed::{self, Object};
use futures_util::future::join_all;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::driver::Driver;
use crate::endpoint::{EndpointSelector, EndpointSet, EndpointSpec};
use crate::error::RpoolError;

use gate::{Permit, PriorityGate};
use manager::{ConnectionManager, PoolSlot};

pub use handle::PooledConnection;
pub use options::{ErrorCallback, PoolBuilder, PoolOptions, QueueMode};

/// Point-in-time view of the pool's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Configured upper bound
    pub max: usize,
    /// Live connections, idle or borrowed
    pub size: usize,
    /// Connections sitting in the idle set
    pub idle: usize,
    /// Checkouts in progress or borrowed, counted from the moment a caller
    /// is granted capacity
    pub in_use: usize,
    /// Callers queued for a connection
    pub waiting: usize,
}

/// State shared by the pool, its borrowed handles, and the reaper task.
pub(crate) struct Shared<D: Driver> {
    pool: managed::Pool<ConnectionManager<D>>,
    driver: Arc<D>,
    selector: EndpointSelector,
    options: PoolOptions,
    gate: Arc<PriorityGate>,
    drained: AtomicBool,
    in_use: AtomicUsize,
    returned: Notify,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl<D: Driver> Shared<D> {
    pub(crate) fn name(&self) -> &str {
        &self.options.name
    }

    pub(crate) fn manager(&self) -> &ConnectionManager<D> {
        self.pool.manager()
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }

    /// Turn a granted permit into a borrowed connection.
    ///
    /// The checkout counts as in flight for drain before deadpool is asked
    /// for a connection, so a drain that starts while a connection is being
    /// opened waits for it and closes it.
    async fn checkout(
        self: &Arc<Self>,
        permit: Permit,
    ) -> Result<PooledConnection<D>, RpoolError> {
        let in_flight = InFlight::enter(self);
        if self.is_drained() {
            return Err(RpoolError::PoolDrained);
        }
        let object = self.pool.get().await?;
        if self.is_drained() {
            let mut slot = Object::take(object);
            drop(permit);
            debug!(pool = %self.name(), "pool drained during checkout; closing connection");
            self.manager().destroy(&mut slot.conn).await;
            return Err(RpoolError::PoolDrained);
        }
        Ok(PooledConnection::new(object, permit, in_flight, Arc::clone(self)))
    }

    /// Close a connection without making the caller wait. Drain waits for
    /// these tasks before it returns.
    pub(crate) fn destroy_in_background(self: &Arc<Self>, mut conn: D::Connection) {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(pool = %self.name(), "no runtime to close connection on; dropping it");
            return;
        }
        let shared = Arc::clone(self);
        self.tasks.spawn(async move {
            shared.manager().destroy(&mut conn).await;
        });
    }

    async fn destroy_all(&self, slots: Vec<PoolSlot<D::Connection>>) {
        let manager = self.manager();
        join_all(slots.into_iter().map(|mut slot| async move {
            manager.destroy(&mut slot.conn).await;
        }))
        .await;
    }

    async fn wait_for_returns(&self) {
        loop {
            let returned = self.returned.notified();
            if self.in_use.load(Ordering::SeqCst) == 0 {
                return;
            }
            returned.await;
        }
    }

    /// Top the pool up to `min` using only free capacity, so queued callers
    /// are never delayed. Returns how many checkouts succeeded.
    ///
    /// Idle connections borrowed along the way go back with their idle clock
    /// untouched, so topping up never postpones their eviction.
    async fn fill_to_min(self: &Arc<Self>) -> usize {
        let status = self.pool.status();
        let min = self.options.min;
        if status.size >= min || self.is_drained() {
            return 0;
        }
        // holding every idle connection at once forces the deficit to be created
        let wanted = status.available + (min - status.size);
        let permits: Vec<_> = (0..wanted)
            .map_while(|_| self.gate.try_acquire())
            .collect();
        let checkouts = join_all(permits.into_iter().map(|permit| self.checkout(permit))).await;
        let mut warmed = 0;
        for checkout in checkouts {
            match checkout {
                Ok(conn) => {
                    warmed += 1;
                    conn.put_back();
                }
                Err(e) => debug!(pool = %self.name(), error = %e, "warm-up checkout failed"),
            }
        }
        warmed
    }
}

/// One checkout counted against drain, from the moment its permit is granted
/// until the connection is handed back or the checkout gives up.
pub(crate) struct InFlight<D: Driver> {
    shared: Arc<Shared<D>>,
}

impl<D: Driver> InFlight<D> {
    fn enter(shared: &Arc<Shared<D>>) -> Self {
        shared.in_use.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: Arc::clone(shared),
        }
    }
}

impl<D: Driver> Drop for InFlight<D> {
    fn drop(&mut self) {
        self.shared.in_use.fetch_sub(1, Ordering::SeqCst);
        self.shared.returned.notify_waiters();
    }
}

/// Bounded connection pool over a [`Driver`].
///
/// Cheap to clone; clones share the same connections.
pub struct Pool<D: Driver> {
    shared: Arc<Shared<D>>,
}

impl<D: Driver> Clone for Pool<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

// Manual Debug implementation because drivers are not required to be Debug
impl<D: Driver> fmt::Debug for Pool<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.shared.name())
            .field("endpoints", &self.shared.selector.endpoints().len())
            .field("status", &self.status())
            .field("drained", &self.shared.is_drained())
            .finish()
    }
}

impl<D: Driver> Pool<D> {
    #[must_use]
    pub fn builder(driver: D, endpoints: impl Into<EndpointSpec>) -> PoolBuilder<D> {
        PoolBuilder::new(driver, endpoints)
    }

    /// Build a pool, open `min` connections, and start the idle reaper.
    ///
    /// # Errors
    /// Returns `RpoolError::UnsupportedProtocol`, `InvalidUrl`,
    /// `EmptyEndpointSet`, or `ConfigError` before any connection attempt.
    pub async fn new(
        driver: D,
        endpoints: impl Into<EndpointSpec>,
        options: PoolOptions,
    ) -> Result<Self, RpoolError> {
        options.validate()?;
        let endpoints: EndpointSet = endpoints.into().resolve()?;
        let selector = EndpointSelector::new(endpoints);
        let driver = Arc::new(driver);

        let manager = ConnectionManager::new(Arc::clone(&driver), selector.clone(), &options);
        let pool = managed::Pool::builder(manager)
            .max_size(options.max)
            .queue_mode(options.queue_mode.into())
            .build()
            .map_err(|e| RpoolError::ConfigError(format!("failed to build pool: {e}")))?;

        let shared = Arc::new(Shared {
            pool,
            driver,
            gate: PriorityGate::new(options.max),
            selector,
            options,
            drained: AtomicBool::new(false),
            in_use: AtomicUsize::new(0),
            returned: Notify::new(),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        info!(
            pool = %shared.name(),
            max = shared.options.max,
            min = shared.options.min,
            endpoints = shared.selector.endpoints().len(),
            "pool created"
        );

        let warmed = shared.fill_to_min().await;
        info!(pool = %shared.name(), warmed, min = shared.options.min, "pool warm-up finished");

        reaper::spawn(&shared);

        Ok(Self { shared })
    }

    #[must_use]
    pub fn options(&self) -> &PoolOptions {
        &self.shared.options
    }

    /// The driver connections are opened with.
    #[must_use]
    pub fn driver(&self) -> &D {
        &self.shared.driver
    }

    #[must_use]
    pub fn endpoints(&self) -> &EndpointSet {
        self.shared.selector.endpoints()
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let status = self.shared.pool.status();
        PoolStatus {
            max: status.max_size,
            size: status.size,
            idle: status.available,
            in_use: self.shared.in_use.load(Ordering::SeqCst),
            waiting: self.shared.gate.waiting(),
        }
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.shared.is_drained()
    }

    /// Borrow a connection at the default (highest) priority.
    ///
    /// # Errors
    /// See [`acquire_with_priority`](Self::acquire_with_priority).
    pub async fn acquire(&self) -> Result<PooledConnection<D>, RpoolError> {
        self.acquire_with_priority(None).await
    }

    /// Borrow a connection, queueing behind lower priority numbers when the
    /// pool is at capacity. Equal priorities are served in arrival order.
    ///
    /// # Errors
    /// Returns `RpoolError::PoolDrained` after [`drain`](Self::drain),
    /// `RpoolError::AcquireTimeout` when `acquire_timeout` elapses, and
    /// `RpoolError::ConnectionError` when a new connection had to be opened
    /// and the driver failed.
    pub async fn acquire_with_priority(
        &self,
        priority: Option<u32>,
    ) -> Result<PooledConnection<D>, RpoolError> {
        if self.shared.is_drained() {
            return Err(RpoolError::PoolDrained);
        }
        let priority = self.shared.options.clamp_priority(priority);
        match self.shared.options.acquire_timeout {
            Some(limit) => tokio::time::timeout(limit, self.checkout(priority))
                .await
                .map_err(|_| {
                    debug!(pool = %self.shared.name(), priority, "acquire timed out");
                    RpoolError::AcquireTimeout(limit)
                })?,
            None => self.checkout(priority).await,
        }
    }

    async fn checkout(&self, priority: u32) -> Result<PooledConnection<D>, RpoolError> {
        let permit = self
            .shared
            .gate
            .acquire(priority)
            .await
            .map_err(|_| RpoolError::PoolDrained)?;
        self.shared.checkout(permit).await
    }

    /// Shut the pool down.
    ///
    /// New and queued acquisitions fail with `PoolDrained`, idle connections
    /// are closed, borrowed connections are closed as they come back (bounded
    /// by `drain_timeout` when set), and the reaper stops. Calling it again is
    /// a no-op.
    pub async fn drain(&self) {
        let shared = &self.shared;
        if shared.drained.swap(true, Ordering::SeqCst) {
            debug!(pool = %shared.name(), "pool already drained");
            return;
        }
        info!(
            pool = %shared.name(),
            in_use = shared.in_use.load(Ordering::SeqCst),
            "draining pool"
        );

        shared.gate.close();
        shared.shutdown.cancel();

        let idle = shared.pool.retain(|_, _| false).removed;
        debug!(pool = %shared.name(), idle = idle.len(), "closing idle connections");
        shared.destroy_all(idle).await;

        match shared.options.drain_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, shared.wait_for_returns())
                    .await
                    .is_err()
                {
                    warn!(
                        pool = %shared.name(),
                        in_use = shared.in_use.load(Ordering::SeqCst),
                        "drain timed out; remaining connections close when released"
                    );
                }
            }
            None => shared.wait_for_returns().await,
        }

        shared.tasks.close();
        shared.tasks.wait().await;

        // anything a straggling warm-up put back after the first sweep
        let leftover = shared.pool.retain(|_, _| false).removed;
        shared.destroy_all(leftover).await;
        shared.pool.close();
        info!(pool = %shared.name(), "pool drained");
    }
}
