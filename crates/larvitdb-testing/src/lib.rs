//! # larvitdb-testing
//!
//! Test infrastructure for `larvitdb`.
//!
//! ## Features
//!
//! - [`MockDriver`]: an in-memory driver with scriptable failures, panics,
//!   delays and counters for probes, pools, leases and statements
//! - [`LogCapture`]: a `tracing` layer recording events for assertions on
//!   levels, messages and structured fields
//! - [`MySqlContainer`]: a disposable MySQL 8 server via testcontainers
//!
//! ## Example
//!
//! ```rust,ignore
//! use larvitdb::Db;
//! use larvitdb_testing::{LogCapture, MockDriver};
//!
//! let (logs, _guard) = LogCapture::install();
//! let driver = MockDriver::new();
//! driver.fail_probes(1);
//!
//! let db = Db::builder(driver.clone()).build()?;
//! db.ready().await;
//!
//! assert_eq!(driver.probes(), 2);
//! assert!(logs.contains(tracing::Level::INFO, "database ready"));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod container;
pub mod logs;
pub mod mock;

pub use container::MySqlContainer;
pub use logs::{CapturedEvent, LogCapture};
pub use mock::{ExecutedStatement, MockConnection, MockDriver, MockPool};

/// Errors from test infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum TestingError {
    /// The container could not be started or inspected.
    #[error("container error: {0}")]
    Container(#[from] testcontainers::TestcontainersError),
}
