//! Bounded async connection pool for stateful database clients.
//!
//! `rpool` keeps a set of live connections to one or more database servers
//! and lends them out to callers:
//!
//! - endpoints come from connection strings (`rethinkdb://user:pw@host:port/db`),
//!   option objects, or lists of either, and new connections rotate across
//!   them round-robin;
//! - at most `max` connections exist at once; callers beyond that queue,
//!   lower priority numbers first;
//! - idle connections are probed before reuse and closed after
//!   `idle_timeout`, never dropping below `min`;
//! - [`Pool::run`] borrows a connection, runs a query, reads any cursor to the
//!   end, and always gives the connection back;
//! - [`Pool::drain`] closes everything exactly once.
//!
//! The wire protocol lives behind the [`Driver`] trait.
//!
//! ```rust,no_run
//! use rpool::prelude::*;
//! use rpool::test_utils::MemoryDriver;
//!
//! # async fn demo() -> Result<(), RpoolError> {
//! let driver = MemoryDriver::new();
//! let pool = Pool::builder(driver.clone(), "rethinkdb://localhost:28015/app")
//!     .max(4)
//!     .build()
//!     .await?;
//!
//! let result = pool
//!     .run(driver.expr(serde_json::json!(42)), &RunOptions::new())
//!     .await?;
//! assert_eq!(result.into_value(), Some(serde_json::json!(42)));
//!
//! pool.drain().await;
//! # Ok(()) }
//! ```

pub mod driver;
pub mod endpoint;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod query;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use driver::{Driver, DriverError};
pub use endpoint::{
    Credentials, EndpointConfig, EndpointOptions, EndpointSelector, EndpointSet, EndpointSpec,
    parse_db_url, redact_url, resolve_endpoints,
};
pub use error::{ErrorKind, RpoolError};
pub use pool::{
    ErrorCallback, Pool, PoolBuilder, PoolOptions, PoolStatus, PooledConnection, QueueMode,
};
pub use query::{
    BoxedQuery, Cursor, Job, JobOutput, Query, QueryResult, QueryUnit, Response, RunOptions,
    StreamCursor,
};
