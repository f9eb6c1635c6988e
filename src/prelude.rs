//! Convenient imports for common functionality.
//!
//! ```rust
//! use rpool::prelude::*;
//! ```

pub use crate::driver::{Driver, DriverError};
pub use crate::endpoint::{EndpointConfig, EndpointSpec};
pub use crate::error::{ErrorKind, RpoolError};
pub use crate::pool::{Pool, PoolBuilder, PoolOptions, PoolStatus, PooledConnection, QueueMode};
pub use crate::query::{Job, JobOutput, Query, QueryResult, QueryUnit, Response, RunOptions};
