//! Driver-level error type.
//!
//! Drivers report failures as a [`DriverError`] carrying a symbolic code. The
//! resilience layer decides whether to retry purely by comparing that code
//! against its configured set of recoverable codes.

use thiserror::Error;

/// Symbolic error codes, named after the MySQL server error constants.
pub mod codes {
    /// The connection to the server was lost mid-statement.
    pub const PROTOCOL_CONNECTION_LOST: &str = "PROTOCOL_CONNECTION_LOST";
    /// Deadlock found when trying to get a lock (errno 1213).
    pub const ER_LOCK_DEADLOCK: &str = "ER_LOCK_DEADLOCK";
    /// Lock wait timeout exceeded (errno 1205).
    pub const ER_LOCK_WAIT_TIMEOUT: &str = "ER_LOCK_WAIT_TIMEOUT";
    /// Syntax error (errno 1064).
    pub const ER_PARSE_ERROR: &str = "ER_PARSE_ERROR";
    /// Table does not exist (errno 1146).
    pub const ER_NO_SUCH_TABLE: &str = "ER_NO_SUCH_TABLE";
    /// Table already exists (errno 1050).
    pub const ER_TABLE_EXISTS_ERROR: &str = "ER_TABLE_EXISTS_ERROR";
    /// Duplicate key (errno 1062).
    pub const ER_DUP_ENTRY: &str = "ER_DUP_ENTRY";
    /// Unknown column (errno 1054).
    pub const ER_BAD_FIELD_ERROR: &str = "ER_BAD_FIELD_ERROR";
    /// Unknown database (errno 1049).
    pub const ER_BAD_DB_ERROR: &str = "ER_BAD_DB_ERROR";
    /// Access denied for user (errno 1045).
    pub const ER_ACCESS_DENIED_ERROR: &str = "ER_ACCESS_DENIED_ERROR";
    /// Parent row is referenced by a foreign key (errno 1451).
    pub const ER_ROW_IS_REFERENCED_2: &str = "ER_ROW_IS_REFERENCED_2";
    /// Child row has no parent (errno 1452).
    pub const ER_NO_REFERENCED_ROW_2: &str = "ER_NO_REFERENCED_ROW_2";
    /// Connection was killed (errno 1927).
    pub const ER_CONNECTION_KILLED: &str = "ER_CONNECTION_KILLED";
    /// Server shut down in progress (errno 1053).
    pub const ER_SERVER_SHUTDOWN: &str = "ER_SERVER_SHUTDOWN";
    /// Too many connections (errno 1040).
    pub const ER_CON_COUNT_ERROR: &str = "ER_CON_COUNT_ERROR";
    /// Could not reach the server.
    pub const ECONNREFUSED: &str = "ECONNREFUSED";
    /// Connecting timed out.
    pub const ETIMEDOUT: &str = "ETIMEDOUT";
    /// The pool has been closed.
    pub const POOL_CLOSED: &str = "POOL_CLOSED";
    /// The driver panicked while executing.
    pub const DRIVER_PANIC: &str = "DRIVER_PANIC";
    /// No more specific code is known.
    pub const UNKNOWN: &str = "UNKNOWN";

    /// Map a MySQL server errno to its symbolic code.
    #[must_use]
    pub fn from_errno(errno: u16) -> &'static str {
        match errno {
            1040 => ER_CON_COUNT_ERROR,
            1045 => ER_ACCESS_DENIED_ERROR,
            1049 => ER_BAD_DB_ERROR,
            1050 => ER_TABLE_EXISTS_ERROR,
            1053 => ER_SERVER_SHUTDOWN,
            1054 => ER_BAD_FIELD_ERROR,
            1062 => ER_DUP_ENTRY,
            1064 => ER_PARSE_ERROR,
            1146 => ER_NO_SUCH_TABLE,
            1205 => ER_LOCK_WAIT_TIMEOUT,
            1213 => ER_LOCK_DEADLOCK,
            1451 => ER_ROW_IS_REFERENCED_2,
            1452 => ER_NO_REFERENCED_ROW_2,
            1927 => ER_CONNECTION_KILLED,
            _ => UNKNOWN,
        }
    }
}

/// An error reported by a database driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (code: {code})")]
pub struct DriverError {
    /// Symbolic code, see [`codes`].
    pub code: String,
    /// Server errno, when the server reported the failure.
    pub errno: Option<u16>,
    /// SQLSTATE, when the server reported one.
    pub sql_state: Option<String>,
    /// Human readable message.
    pub message: String,
}

impl DriverError {
    /// Create an error with a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            errno: None,
            sql_state: None,
            message: message.into(),
        }
    }

    /// Create an error from a server errno, resolving its symbolic code.
    pub fn server(errno: u16, sql_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: codes::from_errno(errno).to_string(),
            errno: Some(errno),
            sql_state: Some(sql_state.into()),
            message: message.into(),
        }
    }

    /// The connection to the server was lost.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::new(codes::PROTOCOL_CONNECTION_LOST, message)
    }

    /// The pool was closed.
    pub fn pool_closed() -> Self {
        Self::new(codes::POOL_CLOSED, "pool is closed")
    }

    /// The driver panicked.
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::new(codes::DRIVER_PANIC, message)
    }

    /// The symbolic code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(codes::from_errno(1213), codes::ER_LOCK_DEADLOCK);
        assert_eq!(codes::from_errno(1146), codes::ER_NO_SUCH_TABLE);
        assert_eq!(codes::from_errno(9999), codes::UNKNOWN);
    }

    #[test]
    fn test_server_error_resolves_code() {
        let err = DriverError::server(1213, "40001", "Deadlock found");
        assert_eq!(err.code(), "ER_LOCK_DEADLOCK");
        assert_eq!(err.errno, Some(1213));
        assert_eq!(err.to_string(), "Deadlock found (code: ER_LOCK_DEADLOCK)");
    }

    #[test]
    fn test_connection_lost_code() {
        let err = DriverError::connection_lost("socket closed");
        assert_eq!(err.code(), codes::PROTOCOL_CONNECTION_LOST);
        assert!(err.errno.is_none());
    }
}
