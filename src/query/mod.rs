//! Query units and their results.
//!
//! A [`QueryUnit`] is either already bound to a [`Query`] or is a factory
//! that builds one from the live driver. Queries answer with a [`Response`],
//! which may be a lazy [`Cursor`]; the runner always hands callers a fully
//! materialized [`QueryResult`].

mod runner;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::driver::{Driver, DriverError};

/// Something that can run against a borrowed connection.
#[async_trait]
pub trait Query<D: Driver>: Send + Sync {
    async fn run(
        &self,
        conn: &mut D::Connection,
        options: &RunOptions,
    ) -> Result<Response<D::Value>, DriverError>;
}

/// A lazily produced sequence of values.
#[async_trait]
pub trait Cursor<V>: Send {
    /// Read the remaining values, in order.
    async fn to_vec(&mut self) -> Result<Vec<V>, DriverError>;
}

/// Adapts any fallible stream into a [`Cursor`].
pub struct StreamCursor<S> {
    stream: S,
}

impl<S> StreamCursor<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S, V> Cursor<V> for StreamCursor<S>
where
    S: Stream<Item = Result<V, DriverError>> + Send + Unpin,
    V: Send,
{
    async fn to_vec(&mut self) -> Result<Vec<V>, DriverError> {
        let mut out = Vec::new();
        while let Some(item) = self.stream.next().await {
            out.push(item?);
        }
        Ok(out)
    }
}

/// What a query hands back before normalization.
pub enum Response<V> {
    Value(V),
    Cursor(Box<dyn Cursor<V>>),
}

impl<V> Response<V> {
    #[must_use]
    pub fn cursor(cursor: impl Cursor<V> + 'static) -> Self {
        Response::Cursor(Box::new(cursor))
    }

    /// Materialize a cursor; plain values pass through.
    ///
    /// # Errors
    /// Returns the cursor's error if reading it fails.
    pub async fn materialize(self) -> Result<QueryResult<V>, DriverError> {
        match self {
            Response::Value(value) => Ok(QueryResult::Value(value)),
            Response::Cursor(mut cursor) => cursor.to_vec().await.map(QueryResult::Rows),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Response<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Response::Cursor(_) => f.debug_tuple("Cursor").field(&"<cursor>").finish(),
        }
    }
}

/// A query outcome with any cursor already read to the end.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<V> {
    Value(V),
    Rows(Vec<V>),
}

impl<V> QueryResult<V> {
    #[must_use]
    pub fn is_rows(&self) -> bool {
        matches!(self, QueryResult::Rows(_))
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&V> {
        match self {
            QueryResult::Value(v) => Some(v),
            QueryResult::Rows(_) => None,
        }
    }

    #[must_use]
    pub fn as_rows(&self) -> Option<&[V]> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            QueryResult::Value(_) => None,
        }
    }

    #[must_use]
    pub fn into_value(self) -> Option<V> {
        match self {
            QueryResult::Value(v) => Some(v),
            QueryResult::Rows(_) => None,
        }
    }

    #[must_use]
    pub fn into_rows(self) -> Option<Vec<V>> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            QueryResult::Value(_) => None,
        }
    }
}

pub type BoxedQuery<D> = Arc<dyn Query<D>>;

type QueryFactory<D> = Box<dyn FnOnce(&D) -> BoxedQuery<D> + Send>;

/// A query ready to run, or a factory that needs the driver first.
pub enum QueryUnit<D: Driver> {
    Bound(BoxedQuery<D>),
    Unbound(QueryFactory<D>),
}

impl<D: Driver> QueryUnit<D> {
    pub fn bound(query: impl Query<D> + 'static) -> Self {
        QueryUnit::Bound(Arc::new(query))
    }

    /// Defer building the query until it runs, when the live driver is
    /// passed to `factory`.
    pub fn unbound<F, Q>(factory: F) -> Self
    where
        F: FnOnce(&D) -> Q + Send + 'static,
        Q: Query<D> + 'static,
    {
        QueryUnit::Unbound(Box::new(move |driver: &D| -> BoxedQuery<D> {
            Arc::new(factory(driver))
        }))
    }

    pub(crate) fn bind(self, driver: &D) -> BoxedQuery<D> {
        match self {
            QueryUnit::Bound(query) => query,
            QueryUnit::Unbound(factory) => factory(driver),
        }
    }
}

impl<D: Driver> fmt::Debug for QueryUnit<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryUnit::Bound(_) => f.write_str("QueryUnit::Bound"),
            QueryUnit::Unbound(_) => f.write_str("QueryUnit::Unbound"),
        }
    }
}

/// A single unit or an ordered, possibly nested, batch of them.
pub enum Job<D: Driver> {
    Single(QueryUnit<D>),
    Batch(Vec<Job<D>>),
}

impl<D: Driver> From<QueryUnit<D>> for Job<D> {
    fn from(unit: QueryUnit<D>) -> Self {
        Job::Single(unit)
    }
}

impl<D: Driver> From<Vec<QueryUnit<D>>> for Job<D> {
    fn from(units: Vec<QueryUnit<D>>) -> Self {
        Job::Batch(units.into_iter().map(Job::Single).collect())
    }
}

/// Output shaped like the [`Job`] that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutput<V> {
    Single(QueryResult<V>),
    Batch(Vec<JobOutput<V>>),
}

impl<V> JobOutput<V> {
    #[must_use]
    pub fn into_single(self) -> Option<QueryResult<V>> {
        match self {
            JobOutput::Single(result) => Some(result),
            JobOutput::Batch(_) => None,
        }
    }

    #[must_use]
    pub fn into_batch(self) -> Option<Vec<JobOutput<V>>> {
        match self {
            JobOutput::Batch(items) => Some(items),
            JobOutput::Single(_) => None,
        }
    }
}

/// Options passed through to the query, plus the checkout priority.
///
/// ```rust
/// use rpool::RunOptions;
///
/// let opts = RunOptions::new().with("durability", "soft").with_priority(2);
/// assert_eq!(opts.get("durability").and_then(|v| v.as_str()), Some("soft"));
/// assert_eq!(opts.priority, Some(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Checkout priority; not sent to the driver
    #[serde(skip)]
    pub priority: Option<u32>,
    #[serde(flatten)]
    pub values: Map<String, JsonValue>,
}

impl RunOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.values.get(key)
    }
}
