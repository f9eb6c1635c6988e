use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::{Driver, DriverError};
use crate::endpoint::EndpointSpec;
use crate::error::RpoolError;

use super::Pool;

/// Callback invoked with a driver error the pool absorbs (create/close).
pub type ErrorCallback = Arc<dyn Fn(&DriverError) + Send + Sync>;

/// Order in which idle connections are reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    /// Oldest idle connection first; spreads use across connections
    #[default]
    Fifo,
    /// Most recently returned first; lets surplus connections go idle and expire
    Lifo,
}

impl From<QueueMode> for deadpool::managed::QueueMode {
    fn from(mode: QueueMode) -> Self {
        match mode {
            QueueMode::Fifo => deadpool::managed::QueueMode::Fifo,
            QueueMode::Lifo => deadpool::managed::QueueMode::Lifo,
        }
    }
}

/// Pool configuration. Fixed once the pool is built.
///
/// Deserializes from the same keys the pool accepted as a plain options
/// object, with durations in milliseconds:
/// ```rust
/// use std::time::Duration;
/// use rpool::PoolOptions;
///
/// let opts: PoolOptions = serde_json::from_str(r#"{"max": 4, "idleTimeoutMillis": 500}"#)?;
/// assert_eq!(opts.max, 4);
/// assert_eq!(opts.min, 1);
/// assert_eq!(opts.idle_timeout, Duration::from_millis(500));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoolOptions {
    /// Name attached to every log record
    pub name: String,
    /// Upper bound on live connections
    pub max: usize,
    /// Connections kept open even when idle
    pub min: usize,
    #[serde(rename = "idleTimeoutMillis", with = "millis")]
    pub idle_timeout: Duration,
    #[serde(rename = "reapIntervalMillis", with = "millis")]
    pub reap_interval: Duration,
    /// `None` waits for capacity indefinitely
    #[serde(rename = "acquireTimeoutMillis", with = "opt_millis")]
    pub acquire_timeout: Option<Duration>,
    /// `None` makes `drain` wait for every borrowed connection
    #[serde(rename = "drainTimeoutMillis", with = "opt_millis")]
    pub drain_timeout: Option<Duration>,
    /// Number of distinct acquisition priorities; `0..priority_range`
    pub priority_range: u32,
    pub queue_mode: QueueMode,
    #[serde(skip)]
    pub on_create_error: Option<ErrorCallback>,
    #[serde(skip)]
    pub on_destroy_error: Option<ErrorCallback>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            name: "rpool".to_string(),
            max: 10,
            min: 1,
            idle_timeout: Duration::from_secs(30),
            reap_interval: Duration::from_secs(1),
            acquire_timeout: None,
            drain_timeout: None,
            priority_range: 1,
            queue_mode: QueueMode::Fifo,
            on_create_error: None,
            on_destroy_error: None,
        }
    }
}

// Manual Debug implementation because the callbacks are opaque closures
impl fmt::Debug for PoolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolOptions")
            .field("name", &self.name)
            .field("max", &self.max)
            .field("min", &self.min)
            .field("idle_timeout", &self.idle_timeout)
            .field("reap_interval", &self.reap_interval)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("drain_timeout", &self.drain_timeout)
            .field("priority_range", &self.priority_range)
            .field("queue_mode", &self.queue_mode)
            .field("on_create_error", &self.on_create_error.as_ref().map(|_| "<callback>"))
            .field("on_destroy_error", &self.on_destroy_error.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl PoolOptions {
    /// Check the bounds before a pool is built.
    ///
    /// # Errors
    /// Returns `RpoolError::ConfigError` naming the offending field.
    pub fn validate(&self) -> Result<(), RpoolError> {
        if self.max == 0 {
            return Err(RpoolError::ConfigError("max must be at least 1".to_string()));
        }
        if self.min > self.max {
            return Err(RpoolError::ConfigError(format!(
                "min ({}) must not exceed max ({})",
                self.min, self.max
            )));
        }
        if self.priority_range == 0 {
            return Err(RpoolError::ConfigError(
                "priority_range must be at least 1".to_string(),
            ));
        }
        if self.reap_interval.is_zero() {
            return Err(RpoolError::ConfigError(
                "reap_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Map a requested priority into `0..priority_range`. Missing means 0
    /// (served first); out of range means the last slot.
    #[must_use]
    pub fn clamp_priority(&self, priority: Option<u32>) -> u32 {
        let last = self.priority_range.saturating_sub(1);
        priority.map_or(0, |p| p.min(last))
    }
}

/// Fluent builder for a [`Pool`].
///
/// ```rust,no_run
/// # use rpool::prelude::*;
/// # async fn demo<D: Driver>(driver: D) -> Result<(), RpoolError> {
/// let pool = Pool::builder(driver, "rethinkdb://db1:28015/app")
///     .max(20)
///     .min(2)
///     .on_create_error(|e| eprintln!("connect failed: {e}"))
///     .build()
///     .await?;
/// # let _ = pool; Ok(()) }
/// ```
pub struct PoolBuilder<D: Driver> {
    driver: D,
    endpoints: EndpointSpec,
    options: PoolOptions,
}

impl<D: Driver> PoolBuilder<D> {
    #[must_use]
    pub fn new(driver: D, endpoints: impl Into<EndpointSpec>) -> Self {
        Self {
            driver,
            endpoints: endpoints.into(),
            options: PoolOptions::default(),
        }
    }

    /// Replace every option at once, e.g. with values loaded from a file.
    #[must_use]
    pub fn options(mut self, options: PoolOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = name.into();
        self
    }

    #[must_use]
    pub fn max(mut self, max: usize) -> Self {
        self.options.max = max;
        self
    }

    #[must_use]
    pub fn min(mut self, min: usize) -> Self {
        self.options.min = min;
        self
    }

    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.options.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn reap_interval(mut self, interval: Duration) -> Self {
        self.options.reap_interval = interval;
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.options.acquire_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.options.drain_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn priority_range(mut self, range: u32) -> Self {
        self.options.priority_range = range;
        self
    }

    #[must_use]
    pub fn queue_mode(mut self, mode: QueueMode) -> Self {
        self.options.queue_mode = mode;
        self
    }

    #[must_use]
    pub fn on_create_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DriverError) + Send + Sync + 'static,
    {
        self.options.on_create_error = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_destroy_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DriverError) + Send + Sync + 'static,
    {
        self.options.on_destroy_error = Some(Arc::new(callback));
        self
    }

    /// Build the pool and warm it up to `min` connections.
    ///
    /// # Errors
    /// Returns a configuration error for bad endpoints or options. Connection
    /// failures during warm-up are logged, not returned.
    pub async fn build(self) -> Result<Pool<D>, RpoolError> {
        Pool::new(self.driver, self.endpoints, self.options).await
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub(super) fn serialize<S: Serializer>(
        value: &Option<Duration>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|v| v.map(Duration::from_millis))
    }
}
