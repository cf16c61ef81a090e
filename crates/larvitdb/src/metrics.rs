//! Query and lifecycle counters.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Counters shared by every handle of one [`Db`](crate::Db).
#[derive(Debug)]
pub(crate) struct Metrics {
    created_at: Instant,
    inner: Mutex<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    probe_attempts: u64,
    pools_created: u64,
    queries_executed: u64,
    queries_failed: u64,
    retries: u64,
    slow_queries: u64,
    connections_leased: u64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self {
            created_at: Instant::now(),
            inner: Mutex::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_probe(&self) {
        self.inner.lock().probe_attempts += 1;
    }

    pub(crate) fn record_pool_created(&self) {
        self.inner.lock().pools_created += 1;
    }

    pub(crate) fn record_success(&self, slow: bool) {
        let mut inner = self.inner.lock();
        inner.queries_executed += 1;
        if slow {
            inner.slow_queries += 1;
        }
    }

    pub(crate) fn record_failure(&self) {
        self.inner.lock().queries_failed += 1;
    }

    pub(crate) fn record_retry(&self) {
        self.inner.lock().retries += 1;
    }

    pub(crate) fn record_lease(&self) {
        self.inner.lock().connections_leased += 1;
    }

    pub(crate) fn snapshot(&self) -> QueryMetrics {
        let inner = self.inner.lock();
        QueryMetrics {
            probe_attempts: inner.probe_attempts,
            pools_created: inner.pools_created,
            queries_executed: inner.queries_executed,
            queries_failed: inner.queries_failed,
            retries: inner.retries,
            slow_queries: inner.slow_queries,
            connections_leased: inner.connections_leased,
            uptime: self.created_at.elapsed(),
        }
    }
}

/// A snapshot of the counters of one [`Db`](crate::Db).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMetrics {
    /// Probe connections attempted during startup.
    pub probe_attempts: u64,
    /// Pools created. More than one means a setup statement failed.
    pub pools_created: u64,
    /// Queries that completed successfully.
    pub queries_executed: u64,
    /// Queries that failed terminally.
    pub queries_failed: u64,
    /// Retries of recoverable errors.
    pub retries: u64,
    /// Successful queries over the slow query threshold.
    pub slow_queries: u64,
    /// Connections leased through `get_connection`.
    pub connections_leased: u64,
    /// Time since the database handle was created.
    pub uptime: Duration,
}

impl QueryMetrics {
    /// Fraction of finished queries that succeeded (0.0 to 1.0).
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.queries_executed + self.queries_failed;
        if total == 0 {
            return 1.0;
        }
        self.queries_executed as f64 / total as f64
    }

    /// Average retries per finished query.
    #[must_use]
    pub fn retries_per_query(&self) -> f64 {
        let total = self.queries_executed + self.queries_failed;
        if total == 0 {
            return 0.0;
        }
        self.retries as f64 / total as f64
    }
}
