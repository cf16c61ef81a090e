//! Resilient statement execution.
//!
//! Every statement issued through a [`Db`](crate::Db) or a leased
//! [`Connection`](crate::Connection) runs through [`Executor::execute`]:
//!
//! 1. Bind parameters are normalized (date/times become UTC text).
//! 2. The statement is dispatched and timed.
//! 3. On success the statement is logged according to its kind and duration.
//! 4. On failure the error code decides between another attempt after
//!    `retry_backoff` and a terminal [`Error::Query`].
//!
//! Retries are bounded by [`ResiliencePolicy::max_retries`] and counted per
//! call. A panic inside the driver is caught and reported as a terminal
//! error with code `DRIVER_PANIC`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use larvitdb_driver::Queryable;
use larvitdb_types::{DriverError, Params, QueryResult, codes, statement};
use tokio::time::Instant;
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::instrumentation::span_names;
use crate::metrics::Metrics;
use crate::policy::ResiliencePolicy;

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Do not warn if this query exceeds the slow query threshold.
    pub ignore_long_query_warning: bool,
}

impl QueryOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress the slow query warning for this call.
    #[must_use]
    pub fn ignore_long_query_warning(mut self, ignore: bool) -> Self {
        self.ignore_long_query_warning = ignore;
        self
    }
}

/// One attempt at running a statement.
#[derive(Debug, Clone)]
pub(crate) struct QueryAttempt<'a> {
    sql: &'a str,
    params: &'a Params,
    /// Retries before this attempt.
    retry_count: u32,
    started: Instant,
}

impl QueryAttempt<'_> {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Applies a [`ResiliencePolicy`] to statements.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Executor<'a> {
    policy: &'a ResiliencePolicy,
    metrics: &'a Metrics,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(policy: &'a ResiliencePolicy, metrics: &'a Metrics) -> Self {
        Self { policy, metrics }
    }

    /// Run a statement on `target`, retrying recoverable errors.
    pub(crate) async fn execute<Q: Queryable + ?Sized>(
        &self,
        target: &mut Q,
        sql: &str,
        params: Params,
        options: QueryOptions,
        connection_id: Option<u64>,
    ) -> Result<QueryResult> {
        let params = params.normalized();
        let span = tracing::debug_span!(
            span_names::QUERY,
            db.operation = statement::extract_operation(sql),
            connection_id = connection_id,
        );

        self.run(target, sql, &params, options, connection_id)
            .instrument(span)
            .await
    }

    async fn run<Q: Queryable + ?Sized>(
        &self,
        target: &mut Q,
        sql: &str,
        params: &Params,
        options: QueryOptions,
        connection_id: Option<u64>,
    ) -> Result<QueryResult> {
        let mut retry_count = 0;

        loop {
            let attempt = QueryAttempt {
                sql,
                params,
                retry_count,
                started: Instant::now(),
            };

            let outcome = AssertUnwindSafe(target.execute(sql, params.as_slice()))
                .catch_unwind()
                .await;

            let err = match outcome {
                Ok(Ok(result)) => {
                    self.log_success(&attempt, options, connection_id);
                    return Ok(result);
                }
                Ok(Err(err)) => err,
                Err(payload) => {
                    let err = DriverError::panicked(panic_message(payload.as_ref()));
                    tracing::error!(
                        sql = sql,
                        params = %params.to_json(),
                        connection_id = connection_id,
                        code = codes::DRIVER_PANIC,
                        "driver panicked: {}",
                        err.message
                    );
                    self.metrics.record_failure();
                    return Err(Error::query(sql, params, retry_count, err));
                }
            };

            if !self.policy.is_recoverable(err.code()) {
                tracing::error!(
                    sql = sql,
                    params = %params.to_json(),
                    connection_id = connection_id,
                    code = err.code(),
                    "database error msg: {}",
                    err.message
                );
                self.metrics.record_failure();
                return Err(Error::query(sql, params, retry_count, err));
            }

            if retry_count >= self.policy.max_retries {
                tracing::error!(
                    sql = sql,
                    params = %params.to_json(),
                    connection_id = connection_id,
                    code = err.code(),
                    retry = retry_count,
                    "exhausted retries ({retry_count}) for database recoverable error: {}",
                    err.message
                );
                self.metrics.record_failure();
                return Err(Error::query(sql, params, retry_count, err));
            }

            retry_count += 1;
            tracing::warn!(
                sql = sql,
                params = %params.to_json(),
                connection_id = connection_id,
                code = err.code(),
                retry = retry_count,
                "retrying database recoverable error: {}",
                err.message
            );
            self.metrics.record_retry();
            tokio::time::sleep(self.policy.retry_backoff).await;
        }
    }

    fn log_success(
        &self,
        attempt: &QueryAttempt<'_>,
        options: QueryOptions,
        connection_id: Option<u64>,
    ) {
        let elapsed = attempt.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let slow = self.policy.is_slow(elapsed) && !options.ignore_long_query_warning;

        // Data-modifying statements are always logged so a state can be replayed.
        if statement::is_modifying_data(attempt.sql) {
            tracing::debug!(
                sql = attempt.sql,
                params = %attempt.params.to_json(),
                elapsed_ms = elapsed_ms,
                connection_id = connection_id,
                retry = attempt.retry_count,
                "ran sql"
            );
        }

        if slow {
            tracing::warn!(
                sql = attempt.sql,
                params = %attempt.params.to_json(),
                elapsed_ms = elapsed_ms,
                connection_id = connection_id,
                "slow query"
            );
        } else if statement::is_select(attempt.sql) {
            tracing::trace!(
                sql = attempt.sql,
                params = %attempt.params.to_json(),
                elapsed_ms = elapsed_ms,
                connection_id = connection_id,
                "ran sql"
            );
        }

        self.metrics.record_success(slow);
    }
}

/// Log a statement that is dispatched without the retry loop.
pub(crate) fn log_dispatch(sql: &str, params: &Params) {
    if statement::is_modifying_data(sql) {
        tracing::debug!(sql = sql, params = %params.to_json(), "ran sql");
    } else if statement::is_select(sql) {
        tracing::trace!(sql = sql, params = %params.to_json(), "ran sql");
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "driver panicked".to_string()
    }
}
