//! # larvitdb-types
//!
//! Pure, I/O-free building blocks shared by the larvitdb driver layer and the
//! resilience core.
//!
//! This crate holds no connections and performs no I/O. It provides:
//!
//! - [`SqlValue`] and [`Params`]: bind parameters and their normalization
//! - [`Row`], [`Column`] and [`QueryResult`]: what a statement returns
//! - [`DriverError`] and the [`codes`] it is classified by
//! - [`statement`]: textual statement classification used for logging
//!
//! ## Example
//!
//! ```rust
//! use larvitdb_types::{Params, SqlValue, statement};
//! use chrono::{TimeZone, Utc};
//!
//! let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
//! let params = Params::from(at).normalized();
//!
//! assert_eq!(params.as_slice(), &[SqlValue::Text("2024-03-01 12:30:05".into())]);
//! assert!(statement::is_modifying_data("DELETE FROM users"));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod row;
pub mod statement;
pub mod value;

pub use error::{DriverError, codes};
pub use row::{Column, QueryResult, Row};
pub use value::{DATETIME_FORMAT, Params, SqlValue, format_datetime};
