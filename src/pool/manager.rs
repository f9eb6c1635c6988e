use std::sync::Arc;

use deadpool::managed::{self, Metrics, RecycleError, RecycleResult};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::driver::{Driver, DriverError};
use crate::endpoint::EndpointSelector;

use super::options::{ErrorCallback, PoolOptions};

/// A pooled connection plus the moment it last went idle.
///
/// deadpool's own metrics restart at checkout, so idle time is tracked here
/// from the release instead.
pub(crate) struct PoolSlot<C> {
    pub(crate) conn: C,
    pub(crate) idle_since: Instant,
}

impl<C> PoolSlot<C> {
    fn new(conn: C) -> Self {
        Self {
            conn,
            idle_since: Instant::now(),
        }
    }

    /// Restart the idle clock.
    pub(crate) fn touch(&mut self) {
        self.idle_since = Instant::now();
    }
}

/// deadpool manager binding the driver and the endpoint selector.
///
/// `create` picks the next endpoint and connects; `recycle` runs the driver's
/// liveness probe and closes connections that fail it so deadpool can replace
/// them.
pub(crate) struct ConnectionManager<D: Driver> {
    driver: Arc<D>,
    selector: EndpointSelector,
    name: String,
    on_create_error: Option<ErrorCallback>,
    on_destroy_error: Option<ErrorCallback>,
}

impl<D: Driver> ConnectionManager<D> {
    pub(crate) fn new(driver: Arc<D>, selector: EndpointSelector, options: &PoolOptions) -> Self {
        Self {
            driver,
            selector,
            name: options.name.clone(),
            on_create_error: options.on_create_error.clone(),
            on_destroy_error: options.on_destroy_error.clone(),
        }
    }

    /// Close `conn` through the driver. Failures are reported and swallowed;
    /// the connection is gone either way.
    pub(crate) async fn destroy(&self, conn: &mut D::Connection) {
        if let Err(e) = self.driver.close(conn).await {
            warn!(pool = %self.name, error = %e, "failed to close connection");
            if let Some(callback) = &self.on_destroy_error {
                callback(&e);
            }
        } else {
            debug!(pool = %self.name, "connection closed");
        }
    }
}

impl<D: Driver> managed::Manager for ConnectionManager<D> {
    type Type = PoolSlot<D::Connection>;
    type Error = DriverError;

    async fn create(&self) -> Result<PoolSlot<D::Connection>, DriverError> {
        let endpoint = self.selector.next();
        debug!(pool = %self.name, endpoint = %endpoint, "opening connection");
        match self.driver.connect(endpoint).await {
            Ok(conn) => Ok(PoolSlot::new(conn)),
            Err(e) => {
                warn!(pool = %self.name, endpoint = %endpoint, error = %e, "failed to open connection");
                if let Some(callback) = &self.on_create_error {
                    callback(&e);
                }
                Err(e)
            }
        }
    }

    async fn recycle(
        &self,
        slot: &mut PoolSlot<D::Connection>,
        _: &Metrics,
    ) -> RecycleResult<DriverError> {
        if self.driver.is_open(&mut slot.conn).await {
            return Ok(());
        }
        debug!(pool = %self.name, "discarding connection that failed validation");
        self.destroy(&mut slot.conn).await;
        Err(RecycleError::Message("connection is no longer open".into()))
    }
}
