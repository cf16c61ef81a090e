//! Error types for the resilience layer.

use larvitdb_driver::ConfigError;
use larvitdb_types::{DriverError, Params};
use thiserror::Error;

/// Result type for larvitdb operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned to callers of [`Db`](crate::Db) and
/// [`Connection`](crate::Connection).
#[derive(Debug, Error)]
pub enum Error {
    /// A statement failed terminally: the error was not recoverable, retries
    /// ran out, or the driver panicked.
    #[error("{message} (code: {code}) sql: {sql} params: {params}")]
    Query {
        /// The statement that failed.
        sql: String,
        /// Normalized bind parameters, rendered as JSON.
        params: String,
        /// Symbolic error code.
        code: String,
        /// Driver message.
        message: String,
        /// Retries performed before giving up.
        retries: u32,
        /// The driver error of the last attempt.
        #[source]
        source: DriverError,
    },

    /// Leasing or releasing a connection failed.
    #[error("connection lease failed: {0}")]
    Lease(#[source] DriverError),

    /// A transaction primitive failed.
    #[error("{operation} failed: {source}")]
    Transaction {
        /// `begin_transaction`, `commit` or `rollback`.
        operation: &'static str,
        /// The driver error.
        #[source]
        source: DriverError,
    },

    /// A streaming query could not be started.
    #[error("stream query failed: {0}")]
    Stream(#[source] DriverError),

    /// Closing the pool failed.
    #[error("closing pool failed: {0}")]
    Close(#[source] DriverError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No pool is available, because the database was closed.
    #[error("no pool configured")]
    NoPool,
}

impl Error {
    pub(crate) fn query(sql: &str, params: &Params, retries: u32, source: DriverError) -> Self {
        Self::Query {
            sql: sql.to_string(),
            params: params.to_json(),
            code: source.code.clone(),
            message: source.message.clone(),
            retries,
            source,
        }
    }

    /// The driver error code behind this error, if there is one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => Some(code),
            Self::Lease(e) | Self::Stream(e) | Self::Close(e) => Some(e.code()),
            Self::Transaction { source, .. } => Some(source.code()),
            Self::Config(_) | Self::NoPool => None,
        }
    }

    /// Number of retries performed before a query failed.
    #[must_use]
    pub fn retries(&self) -> u32 {
        match self {
            Self::Query { retries, .. } => *retries,
            _ => 0,
        }
    }

    /// The statement text, for query errors.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Query { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larvitdb_types::codes;

    #[test]
    fn test_query_error_carries_context() {
        let params = Params::from(vec![1, 2]);
        let err = Error::query(
            "SELECT * FROM t WHERE a = ? AND b = ?",
            &params,
            3,
            DriverError::new(codes::ER_LOCK_DEADLOCK, "Deadlock found"),
        );

        assert_eq!(err.code(), Some(codes::ER_LOCK_DEADLOCK));
        assert_eq!(err.retries(), 3);
        assert_eq!(err.sql(), Some("SELECT * FROM t WHERE a = ? AND b = ?"));
        let text = err.to_string();
        assert!(text.contains("Deadlock found"));
        assert!(text.contains("[1,2]"));
    }

    #[test]
    fn test_no_pool_has_no_code() {
        assert_eq!(Error::NoPool.code(), None);
        assert_eq!(Error::NoPool.to_string(), "no pool configured");
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error as _;

        let err = Error::Lease(DriverError::pool_closed());
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("pool is closed (code: POOL_CLOSED)"));
    }
}
