//! The database driver seam.
//!
//! The pool never speaks a wire protocol itself. It opens, probes, and closes
//! connections through a [`Driver`] implementation, and queries receive the
//! driver's connection type directly.

use async_trait::async_trait;

use crate::endpoint::EndpointConfig;

/// Error produced by a driver; kept boxed so callers can downcast to the
/// driver's own error type.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Connect/close/liveness primitives the pool is built on.
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use rpool::{Driver, DriverError, EndpointConfig};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Driver for Echo {
///     type Connection = String;
///     type Value = String;
///
///     async fn connect(&self, endpoint: &EndpointConfig) -> Result<String, DriverError> {
///         Ok(endpoint.host.clone().unwrap_or_else(|| "localhost".into()))
///     }
///
///     async fn close(&self, _conn: &mut String) -> Result<(), DriverError> {
///         Ok(())
///     }
///
///     async fn is_open(&self, _conn: &mut String) -> bool {
///         true
///     }
/// }
/// ```
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// A live connection handle.
    type Connection: Send + 'static;
    /// A single value produced by a query (a document, a row, ...).
    type Value: Send + 'static;

    /// Open a connection to `endpoint`.
    async fn connect(&self, endpoint: &EndpointConfig) -> Result<Self::Connection, DriverError>;

    /// Close `conn`. The connection is dropped afterwards whatever the outcome.
    async fn close(&self, conn: &mut Self::Connection) -> Result<(), DriverError>;

    /// Liveness probe used before an idle connection is handed out again.
    async fn is_open(&self, conn: &mut Self::Connection) -> bool;
}
