//! In-memory driver for tests and benchmarks.
//!
//! [`MemoryDriver`] opens fake connections instantly and records every
//! connect and close so tests can assert on pool behaviour without a server.
//! Failures can be injected per call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

use crate::driver::{Driver, DriverError};
use crate::endpoint::EndpointConfig;
use crate::query::{Query, QueryUnit, Response, RunOptions, StreamCursor};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("connection refused by {0}")]
    ConnectRefused(String),

    #[error("failed to close connection {0}")]
    CloseFailed(u64),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("cursor failed: {0}")]
    CursorFailed(String),

    #[error("connection {0} is closed")]
    ConnectionClosed(u64),
}

#[derive(Default)]
struct State {
    next_id: AtomicU64,
    connects: AtomicUsize,
    closes: AtomicUsize,
    failing_connects: AtomicUsize,
    failing_closes: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
    endpoints: Mutex<Vec<EndpointConfig>>,
    closed: Mutex<Vec<u64>>,
    live: Mutex<HashMap<u64, Arc<AtomicBool>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Driver whose connections live in process memory. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    state: Arc<State>,
}

/// A fake connection handed out by [`MemoryDriver`].
#[derive(Debug)]
pub struct MemoryConnection {
    pub id: u64,
    pub endpoint: EndpointConfig,
    pub queries: usize,
    open: Arc<AtomicBool>,
}

impl MemoryConnection {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl MemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.state.failing_connects.store(n, Ordering::Release);
    }

    /// Make every connection attempt take `delay` before it resolves.
    pub fn set_connect_delay(&self, delay: Duration) {
        *lock(&self.state.connect_delay) = Some(delay);
    }

    /// Make every close report an error. The connection is still closed.
    pub fn fail_closes(&self, fail: bool) {
        self.state.failing_closes.store(fail, Ordering::Release);
    }

    /// Mark every open connection dead so the next liveness probe fails.
    pub fn kill_all(&self) {
        for open in lock(&self.state.live).values() {
            open.store(false, Ordering::Release);
        }
    }

    /// Mark one connection dead.
    pub fn kill(&self, id: u64) {
        if let Some(open) = lock(&self.state.live).get(&id) {
            open.store(false, Ordering::Release);
        }
    }

    /// Connection attempts so far, failed ones included.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::Acquire)
    }

    /// Connections opened and not yet closed.
    #[must_use]
    pub fn open_count(&self) -> usize {
        lock(&self.state.live).len()
    }

    /// Endpoints of successful connections, in connect order.
    #[must_use]
    pub fn connected_endpoints(&self) -> Vec<EndpointConfig> {
        lock(&self.state.endpoints).clone()
    }

    /// Ids of closed connections, in close order.
    #[must_use]
    pub fn closed_ids(&self) -> Vec<u64> {
        lock(&self.state.closed).clone()
    }

    /// A query that answers with `value`.
    #[must_use]
    pub fn expr(&self, value: impl Into<JsonValue>) -> MemoryQuery {
        MemoryQuery::Value(value.into())
    }

    fn take_connect_failure(&self) -> bool {
        self.state
            .failing_connects
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    type Connection = MemoryConnection;
    type Value = JsonValue;

    async fn connect(&self, endpoint: &EndpointConfig) -> Result<MemoryConnection, DriverError> {
        self.state.connects.fetch_add(1, Ordering::AcqRel);
        let delay = *lock(&self.state.connect_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.take_connect_failure() {
            let host = endpoint.host.clone().unwrap_or_else(|| "localhost".to_string());
            return Err(MemoryError::ConnectRefused(host).into());
        }
        let id = self.state.next_id.fetch_add(1, Ordering::AcqRel);
        let open = Arc::new(AtomicBool::new(true));
        lock(&self.state.live).insert(id, Arc::clone(&open));
        lock(&self.state.endpoints).push(endpoint.clone());
        Ok(MemoryConnection {
            id,
            endpoint: endpoint.clone(),
            queries: 0,
            open,
        })
    }

    async fn close(&self, conn: &mut MemoryConnection) -> Result<(), DriverError> {
        self.state.closes.fetch_add(1, Ordering::AcqRel);
        conn.open.store(false, Ordering::Release);
        lock(&self.state.live).remove(&conn.id);
        lock(&self.state.closed).push(conn.id);
        if self.state.failing_closes.load(Ordering::Acquire) {
            return Err(MemoryError::CloseFailed(conn.id).into());
        }
        Ok(())
    }

    async fn is_open(&self, conn: &mut MemoryConnection) -> bool {
        conn.is_open()
    }
}

/// Queries understood by [`MemoryConnection`].
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryQuery {
    /// Answer with a single value
    Value(JsonValue),
    /// Answer with a cursor over these rows
    Rows(Vec<JsonValue>),
    /// Fail with `MemoryError::QueryFailed`
    Fail(String),
    /// Answer with a cursor that yields `rows`, then fails
    BrokenCursor { rows: Vec<JsonValue>, message: String },
    /// Wait, then answer with the value
    Delay(Duration, JsonValue),
    /// Answer with the id of the connection the query ran on
    ConnectionId,
    /// Answer with the run option stored under this key, or null
    RunOption(String),
}

#[async_trait]
impl Query<MemoryDriver> for MemoryQuery {
    async fn run(
        &self,
        conn: &mut MemoryConnection,
        options: &RunOptions,
    ) -> Result<Response<JsonValue>, DriverError> {
        if !conn.is_open() {
            return Err(MemoryError::ConnectionClosed(conn.id).into());
        }
        conn.queries += 1;
        match self {
            MemoryQuery::Value(value) => Ok(Response::Value(value.clone())),
            MemoryQuery::Rows(rows) => {
                let items: Vec<Result<JsonValue, DriverError>> =
                    rows.iter().cloned().map(Ok).collect();
                Ok(Response::cursor(StreamCursor::new(stream::iter(items))))
            }
            MemoryQuery::Fail(message) => Err(MemoryError::QueryFailed(message.clone()).into()),
            MemoryQuery::BrokenCursor { rows, message } => {
                let mut items: Vec<Result<JsonValue, DriverError>> =
                    rows.iter().cloned().map(Ok).collect();
                items.push(Err(MemoryError::CursorFailed(message.clone()).into()));
                Ok(Response::cursor(StreamCursor::new(stream::iter(items))))
            }
            MemoryQuery::Delay(pause, value) => {
                tokio::time::sleep(*pause).await;
                Ok(Response::Value(value.clone()))
            }
            MemoryQuery::ConnectionId => Ok(Response::Value(json!(conn.id))),
            MemoryQuery::RunOption(key) => Ok(Response::Value(
                options.get(key).cloned().unwrap_or(JsonValue::Null),
            )),
        }
    }
}

impl From<MemoryQuery> for QueryUnit<MemoryDriver> {
    fn from(query: MemoryQuery) -> Self {
        QueryUnit::bound(query)
    }
}
