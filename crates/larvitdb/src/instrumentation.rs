//! Span names and attribute keys.
//!
//! All output goes through `tracing`. Levels are used as follows:
//!
//! | level   | what                                                        |
//! |---------|-------------------------------------------------------------|
//! | `error` | terminal query failures, failed setup statements            |
//! | `warn`  | retries, failed connection attempts, slow queries           |
//! | `info`  | readiness, pool closed, tables removed                      |
//! | `debug` | every data-modifying statement                              |
//! | `trace` | every `SELECT`                                              |
//!
//! Events carry the structured fields `sql`, `params` (JSON), `elapsed_ms`,
//! `connection_id`, `code` and `retry` where they apply. No subscriber is
//! installed by this crate.

/// Database system identifier.
pub const DB_SYSTEM: &str = "mysql";

/// Span names.
pub mod span_names {
    /// Establishing the pool.
    pub const ESTABLISH: &str = "larvitdb.establish";
    /// Statement execution, including retries.
    pub const QUERY: &str = "larvitdb.query";
    /// Dropping all tables.
    pub const REMOVE_ALL_TABLES: &str = "larvitdb.remove_all_tables";
    /// Opening a row stream.
    pub const STREAM: &str = "larvitdb.stream";
}

