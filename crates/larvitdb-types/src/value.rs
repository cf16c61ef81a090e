//! Bind parameter values and their normalization.
//!
//! Every statement is dispatched with an ordered sequence of [`SqlValue`]s.
//! Before dispatch the sequence is normalized: date/time values are rewritten
//! into the textual form MySQL accepts for `DATETIME` columns, in UTC and
//! without a zone marker or fractional seconds.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

/// Format used for normalized date/time bind parameters.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a UTC instant as `YYYY-MM-DD HH:MM:SS`.
///
/// Fractional seconds are truncated, not rounded.
#[must_use]
pub fn format_datetime(at: &DateTime<Utc>) -> String {
    at.format(DATETIME_FORMAT).to_string()
}

/// A single bind parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Boolean, sent as `TINYINT(1)`.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A point in time. Rewritten to [`SqlValue::Text`] by normalization.
    DateTime(DateTime<Utc>),
}

impl SqlValue {
    /// Whether this value is a date/time that normalization rewrites.
    #[must_use]
    pub fn is_datetime(&self) -> bool {
        matches!(self, Self::DateTime(_))
    }

    /// Whether this value is SQL `NULL`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the text content, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Integer content, if this value holds a number that fits in `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::UInt(n) => i64::try_from(*n).ok(),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Return the normalized form of this value.
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::DateTime(at) => Self::Text(format_datetime(&at)),
            other => other,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for SqlValue {
            fn from(v: $t) -> Self {
                Self::Int(i64::from(v))
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for SqlValue {
            fn from(v: $t) -> Self {
                Self::UInt(u64::from(v))
            }
        })*
    };
}

// u8 is deliberately absent so that `Vec<u8>` stays a byte string.
impl_from_signed!(i8, i16, i32, i64);
impl_from_unsigned!(u16, u32, u64);

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for SqlValue {
    fn from(v: DateTime<Tz>) -> Self {
        Self::DateTime(v.with_timezone(&Utc))
    }
}

/// Naive timestamps are taken to already be in UTC.
impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v.and_utc())
    }
}

impl From<std::time::SystemTime> for SqlValue {
    fn from(v: std::time::SystemTime) -> Self {
        Self::DateTime(DateTime::<Utc>::from(v))
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// An ordered sequence of bind parameters.
///
/// Anything that is not already a sequence converts into a one-element
/// sequence, so `db.query(sql, 5)` and `db.query(sql, vec![5])` are the same
/// call. `()` means no parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Params(Vec<SqlValue>);

impl Params {
    /// An empty parameter list.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a parameter.
    #[must_use]
    pub fn push(mut self, value: impl Into<SqlValue>) -> Self {
        self.0.push(value.into());
        self
    }

    /// Rewrite every date/time parameter into its wire text form.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self(self.0.into_iter().map(SqlValue::normalized).collect())
    }

    /// Borrow the parameters as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[SqlValue] {
        &self.0
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume into the underlying vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<SqlValue> {
        self.0
    }

    /// Render as compact JSON for log lines.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| format!("{:?}", self.0))
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Self::new()
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for Params {
    fn from(values: Vec<T>) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<SqlValue>, const N: usize> From<[T; N]> for Params {
    fn from(values: [T; N]) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl From<&[SqlValue]> for Params {
    fn from(values: &[SqlValue]) -> Self {
        Self(values.to_vec())
    }
}

macro_rules! impl_single_param {
    ($($t:ty),*) => {
        $(impl From<$t> for Params {
            fn from(v: $t) -> Self {
                Self(vec![SqlValue::from(v)])
            }
        })*
    };
}

impl_single_param!(
    SqlValue,
    bool,
    i32,
    i64,
    u32,
    u64,
    f64,
    String,
    &str,
    NaiveDateTime
);

impl<Tz: TimeZone> From<DateTime<Tz>> for Params {
    fn from(v: DateTime<Tz>) -> Self {
        Self(vec![SqlValue::from(v)])
    }
}

impl FromIterator<SqlValue> for Params {
    fn from_iter<I: IntoIterator<Item = SqlValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Params {
    type Item = SqlValue;
    type IntoIter = std::vec::IntoIter<SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};
    use proptest::prelude::*;

    #[test]
    fn test_datetime_normalized_to_utc_text() {
        let at = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 58).unwrap();
        assert_eq!(
            SqlValue::from(at).normalized(),
            SqlValue::Text("2023-12-31 23:59:58".into())
        );
    }

    #[test]
    fn test_offset_datetime_converted_to_utc() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let at = tz.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        assert_eq!(
            SqlValue::from(at).normalized(),
            SqlValue::Text("2023-12-31 23:00:00".into())
        );
    }

    #[test]
    fn test_fractional_seconds_truncated() {
        let at = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_milli_opt(8, 15, 30, 999)
            .unwrap();
        assert_eq!(
            SqlValue::from(at).normalized(),
            SqlValue::Text("2024-06-01 08:15:30".into())
        );
    }

    #[test]
    fn test_non_datetime_untouched() {
        let params = Params::from(vec![
            SqlValue::Int(7),
            SqlValue::Text("2024-01-01T00:00:00Z".into()),
            SqlValue::Null,
        ]);
        assert_eq!(params.clone().normalized(), params);
    }

    #[test]
    fn test_single_value_wrapped() {
        assert_eq!(Params::from(5).as_slice(), &[SqlValue::Int(5)]);
        assert_eq!(Params::from("x").as_slice(), &[SqlValue::Text("x".into())]);
        assert!(Params::from(()).is_empty());
    }

    #[test]
    fn test_bytes_stay_bytes() {
        let value = SqlValue::from(vec![1u8, 2, 3]);
        assert_eq!(value, SqlValue::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn test_option_maps_to_null() {
        assert!(SqlValue::from(None::<i32>).is_null());
        assert_eq!(SqlValue::from(Some(3i32)), SqlValue::Int(3));
    }

    #[test]
    fn test_params_json() {
        let params = Params::new().push(1).push("a").push(SqlValue::Null);
        assert_eq!(params.to_json(), r#"[1,"a",null]"#);
    }

    proptest! {
        #[test]
        fn prop_normalized_datetime_shape(
            secs in 0i64..4_102_444_800i64,
            nanos in 0u32..1_000_000_000u32
        ) {
            let at = Utc.timestamp_opt(secs, nanos).unwrap();
            let normalized = SqlValue::from(at).normalized();
            let text = normalized.as_str().unwrap();

            prop_assert_eq!(text.len(), 19);
            prop_assert_eq!(&text[10..11], " ");
            prop_assert!(!text.ends_with('Z'));
            prop_assert!(!text.contains('.'));
            prop_assert!(!text.contains('+'));
            let parsed = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT).unwrap();
            prop_assert_eq!(parsed.and_utc().timestamp(), secs);
        }
    }
}
