use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use deadpool::managed::Object;

use crate::driver::Driver;

use super::gate::Permit;
use super::manager::ConnectionManager;
use super::{InFlight, Shared};

/// A connection borrowed from the pool.
///
/// Dereferences to the driver's connection. The connection goes back to the
/// pool exactly once: through [`release`](Self::release), through
/// [`destroy`](Self::destroy), or when the handle is dropped. Both methods
/// consume the handle, so a second release does not compile.
pub struct PooledConnection<D: Driver> {
    // the object must be back in deadpool before the permit lets the next
    // waiter in, and both before drain stops counting this checkout
    object: Option<Object<ConnectionManager<D>>>,
    permit: Option<Permit>,
    in_flight: Option<InFlight<D>>,
    shared: Arc<Shared<D>>,
}

impl<D: Driver> PooledConnection<D> {
    pub(crate) fn new(
        object: Object<ConnectionManager<D>>,
        permit: Permit,
        in_flight: InFlight<D>,
        shared: Arc<Shared<D>>,
    ) -> Self {
        Self {
            object: Some(object),
            permit: Some(permit),
            in_flight: Some(in_flight),
            shared,
        }
    }

    /// Return the connection to the pool's idle set.
    ///
    /// Liveness is checked on the next checkout, not here. After the pool has
    /// been drained the connection is closed instead.
    pub fn release(mut self) {
        self.give_back(true);
    }

    /// Return the connection without restarting its idle clock.
    pub(crate) fn put_back(mut self) {
        self.give_back(false);
    }

    /// Remove the connection from the pool for good and close it.
    ///
    /// Use this for a connection known to be broken; the pool opens a
    /// replacement on demand.
    pub async fn destroy(mut self) {
        let Some(object) = self.object.take() else {
            return;
        };
        let mut slot = Object::take(object);
        self.permit.take();
        self.shared.manager().destroy(&mut slot.conn).await;
        self.in_flight.take();
    }

    fn give_back(&mut self, touch: bool) {
        let Some(mut object) = self.object.take() else {
            return;
        };
        if self.shared.is_drained() {
            self.shared.destroy_in_background(Object::take(object).conn);
        } else {
            if touch {
                object.touch();
            }
            drop(object);
        }
        self.permit.take();
        self.in_flight.take();
    }

    fn object(&self) -> &Object<ConnectionManager<D>> {
        self.object
            .as_ref()
            .expect("pooled connection already released")
    }

    fn object_mut(&mut self) -> &mut Object<ConnectionManager<D>> {
        self.object
            .as_mut()
            .expect("pooled connection already released")
    }
}

impl<D: Driver> Deref for PooledConnection<D> {
    type Target = D::Connection;

    fn deref(&self) -> &Self::Target {
        &self.object().conn
    }
}

impl<D: Driver> DerefMut for PooledConnection<D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object_mut().conn
    }
}

impl<D: Driver> Drop for PooledConnection<D> {
    fn drop(&mut self) {
        self.give_back(true);
    }
}

impl<D: Driver> fmt::Debug for PooledConnection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.shared.name())
            .field("released", &self.object.is_none())
            .finish()
    }
}
