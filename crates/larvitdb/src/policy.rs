//! Retry and logging policy.

use std::collections::BTreeSet;
use std::time::Duration;

use larvitdb_types::codes;

/// How queries are retried and when they are reported as slow.
///
/// Set once when the [`Db`](crate::Db) is built and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResiliencePolicy {
    /// Retries after the first attempt for recoverable errors (default: 3).
    pub max_retries: u32,
    /// Error codes that are retried.
    pub recoverable_error_codes: BTreeSet<String>,
    /// Queries running longer than this are logged as warnings. `None`
    /// disables slow query logging.
    pub slow_query_threshold: Option<Duration>,
    /// Pause before retrying a recoverable query error.
    pub retry_backoff: Duration,
    /// Pause between failed connection attempts during startup.
    pub reconnect_backoff: Duration,
}

impl Default for ResiliencePolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            recoverable_error_codes: [codes::PROTOCOL_CONNECTION_LOST, codes::ER_LOCK_DEADLOCK]
                .into_iter()
                .map(str::to_string)
                .collect(),
            slow_query_threshold: Some(Duration::from_secs(10)),
            retry_backoff: Duration::from_millis(50),
            reconnect_backoff: Duration::from_secs(1),
        }
    }
}

impl ResiliencePolicy {
    /// Create a policy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether errors with this code are retried.
    #[must_use]
    pub fn is_recoverable(&self, code: &str) -> bool {
        self.recoverable_error_codes.contains(code)
    }

    /// Whether a query that took `elapsed` counts as slow.
    #[must_use]
    pub fn is_slow(&self, elapsed: Duration) -> bool {
        self.slow_query_threshold
            .is_some_and(|threshold| elapsed > threshold)
    }

    /// Set the number of retries.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Replace the set of recoverable error codes.
    #[must_use]
    pub fn recoverable_error_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recoverable_error_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Add one recoverable error code.
    #[must_use]
    pub fn with_recoverable_code(mut self, code: impl Into<String>) -> Self {
        self.recoverable_error_codes.insert(code.into());
        self
    }

    /// Set the slow query threshold.
    #[must_use]
    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = Some(threshold);
        self
    }

    /// Disable slow query logging.
    #[must_use]
    pub fn disable_slow_query_log(mut self) -> Self {
        self.slow_query_threshold = None;
        self
    }

    /// Set the pause before retrying a recoverable error.
    #[must_use]
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the pause between connection attempts during startup.
    #[must_use]
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }
}
