use futures_util::FutureExt;
use futures_util::future::{BoxFuture, join_all};
use tracing::{debug, trace};

use crate::driver::Driver;
use crate::error::RpoolError;
use crate::pool::Pool;

use super::{Job, JobOutput, QueryResult, QueryUnit, RunOptions};

impl<D: Driver> Pool<D> {
    /// Borrow a connection, run `unit` on it, read any cursor to the end, and
    /// give the connection back.
    ///
    /// The connection is released whether the query succeeds or fails, and
    /// is released before the result is returned.
    ///
    /// # Errors
    /// Acquisition errors pass through unchanged. A failing query yields
    /// `RpoolError::ExecutionError` and a failing cursor
    /// `RpoolError::CursorError`; both carry the driver's own error.
    pub async fn run(
        &self,
        unit: impl Into<QueryUnit<D>>,
        options: &RunOptions,
    ) -> Result<QueryResult<D::Value>, RpoolError> {
        let unit = unit.into();
        let mut conn = self.acquire_with_priority(options.priority).await?;
        let query = unit.bind(self.driver());

        let response = query.run(&mut conn, options).await;
        let outcome = match response {
            Ok(response) => response
                .materialize()
                .await
                .map_err(RpoolError::CursorError),
            Err(e) => Err(RpoolError::ExecutionError(e)),
        };
        conn.release();

        match &outcome {
            Ok(_) => trace!(pool = %self.options().name, "query finished"),
            Err(e) => debug!(pool = %self.options().name, error = %e, "query failed"),
        }
        outcome
    }

    /// Run every unit concurrently, each on its own connection.
    ///
    /// Waits for all of them, so every borrowed connection is back in the
    /// pool when this returns. Results keep the input order; on failure the
    /// error of the earliest failing unit in that order is returned.
    ///
    /// # Errors
    /// See [`run`](Self::run).
    pub async fn run_all<I>(
        &self,
        units: I,
        options: &RunOptions,
    ) -> Result<Vec<QueryResult<D::Value>>, RpoolError>
    where
        I: IntoIterator,
        I::Item: Into<QueryUnit<D>>,
    {
        join_all(units.into_iter().map(|unit| self.run(unit, options)))
            .await
            .into_iter()
            .collect()
    }

    /// Run a single unit or a nested batch, returning output of the same
    /// shape.
    ///
    /// # Errors
    /// See [`run_all`](Self::run_all).
    pub async fn run_job(
        &self,
        job: impl Into<Job<D>>,
        options: &RunOptions,
    ) -> Result<JobOutput<D::Value>, RpoolError> {
        self.run_nested(job.into(), options).await
    }

    fn run_nested<'a>(
        &'a self,
        job: Job<D>,
        options: &'a RunOptions,
    ) -> BoxFuture<'a, Result<JobOutput<D::Value>, RpoolError>> {
        async move {
            match job {
                Job::Single(unit) => self.run(unit, options).await.map(JobOutput::Single),
                Job::Batch(jobs) => {
                    join_all(jobs.into_iter().map(|job| self.run_nested(job, options)))
                        .await
                        .into_iter()
                        .collect::<Result<Vec<_>, _>>()
                        .map(JobOutput::Batch)
                }
            }
        }
        .boxed()
    }
}
