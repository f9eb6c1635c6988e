use std::time::Duration;

use thiserror::Error;

use crate::driver::DriverError;

/// Coarse classification of [`RpoolError`] values.
///
/// Lets callers branch on the failure class without matching every variant:
/// ```rust
/// use rpool::{ErrorKind, RpoolError};
///
/// let err = RpoolError::UnsupportedProtocol("http:".into());
/// assert_eq!(err.kind(), ErrorKind::Configuration);
/// assert!(!err.kind().is_retriable());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad endpoint or pool configuration; never retried
    Configuration,
    /// The driver could not open a connection
    Creation,
    /// No connection became available in time
    AcquireTimeout,
    /// A query or its cursor failed on a live connection
    Execution,
    /// The pool was drained before the request
    Drained,
    /// Anything else
    Other,
}

impl ErrorKind {
    /// Whether retrying the same request later can reasonably succeed.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Creation | Self::AcquireTimeout)
    }
}

#[derive(Debug, Error)]
pub enum RpoolError {
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Invalid connection string: {0}")]
    InvalidUrl(String),

    #[error("Endpoint set is empty")]
    EmptyEndpointSet,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(#[source] DriverError),

    #[error("Timed out after {0:?} waiting for a connection")]
    AcquireTimeout(Duration),

    #[error("Pool has been drained")]
    PoolDrained,

    #[error("Query execution error: {0}")]
    ExecutionError(#[source] DriverError),

    #[error("Cursor error: {0}")]
    CursorError(#[source] DriverError),

    #[error("Other pool error: {0}")]
    Other(String),
}

impl RpoolError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedProtocol(_)
            | Self::InvalidUrl(_)
            | Self::EmptyEndpointSet
            | Self::ConfigError(_) => ErrorKind::Configuration,
            Self::ConnectionError(_) => ErrorKind::Creation,
            Self::AcquireTimeout(_) => ErrorKind::AcquireTimeout,
            Self::ExecutionError(_) | Self::CursorError(_) => ErrorKind::Execution,
            Self::PoolDrained => ErrorKind::Drained,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// The driver error behind this failure, if the driver produced one.
    #[must_use]
    pub fn driver_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::ConnectionError(e) | Self::ExecutionError(e) | Self::CursorError(e) => {
                Some(e.as_ref())
            }
            _ => None,
        }
    }
}

impl From<deadpool::managed::PoolError<DriverError>> for RpoolError {
    fn from(err: deadpool::managed::PoolError<DriverError>) -> Self {
        use deadpool::managed::PoolError;
        match err {
            PoolError::Backend(e) => RpoolError::ConnectionError(e),
            PoolError::Closed => RpoolError::PoolDrained,
            other => RpoolError::Other(format!("pool checkout failed: {other}")),
        }
    }
}
