//! Database column values and their coercion into sample values and label text.

use chrono::{DateTime, SecondsFormat, Utc};

/// A single column value as returned by the database driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// Any integer type.
    Int(i64),

    /// Any floating point type.
    Float(f64),

    /// Timestamp, normalized to UTC.
    Timestamp(DateTime<Utc>),

    /// Boolean value.
    Bool(bool),

    /// Raw bytes (bytea, or text that is not valid UTF-8).
    Bytes(Vec<u8>),

    /// UTF-8 text.
    Text(String),

    /// SQL NULL.
    Null,

    /// A type the exporter cannot interpret; carries the type name.
    Unsupported(String),
}

impl DbValue {
    /// Short name of the value kind, used in logs and error messages.
    pub fn kind(&self) -> &str {
        match self {
            DbValue::Int(_) => "integer",
            DbValue::Float(_) => "float",
            DbValue::Timestamp(_) => "timestamp",
            DbValue::Bool(_) => "boolean",
            DbValue::Bytes(_) => "bytes",
            DbValue::Text(_) => "text",
            DbValue::Null => "null",
            DbValue::Unsupported(name) => name,
        }
    }
}

impl std::fmt::Display for DbValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbValue::Int(v) => write!(f, "{}", v),
            DbValue::Float(v) => write!(f, "{}", v),
            DbValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            DbValue::Bool(v) => write!(f, "{}", v),
            DbValue::Bytes(v) => write!(f, "{}", String::from_utf8_lossy(v)),
            DbValue::Text(v) => write!(f, "{}", v),
            DbValue::Null => write!(f, "NULL"),
            DbValue::Unsupported(name) => write!(f, "<{}>", name),
        }
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Int(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Int(v as i64)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Float(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Bool(v)
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        DbValue::Bytes(v)
    }
}

impl From<DateTime<Utc>> for DbValue {
    fn from(v: DateTime<Utc>) -> Self {
        DbValue::Timestamp(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(DbValue::Null)
    }
}

/// Convert a column value to a sample value.
///
/// NULL maps to `(NaN, true)`: an absent value is representable.
/// Only unparseable text/bytes and unsupported kinds return `ok = false`.
pub fn coerce_to_number(value: &DbValue) -> (f64, bool) {
    match value {
        DbValue::Int(v) => (*v as f64, true),
        DbValue::Float(v) => (*v, true),
        DbValue::Timestamp(v) => (v.timestamp() as f64, true),
        DbValue::Bool(v) => (if *v { 1.0 } else { 0.0 }, true),
        DbValue::Null => (f64::NAN, true),
        DbValue::Bytes(v) => match std::str::from_utf8(v) {
            Ok(s) => parse_float(s),
            Err(_) => (f64::NAN, false),
        },
        DbValue::Text(v) => parse_float(v),
        DbValue::Unsupported(_) => (f64::NAN, false),
    }
}

fn parse_float(s: &str) -> (f64, bool) {
    match s.parse::<f64>() {
        Ok(v) => (v, true),
        Err(_) => (f64::NAN, false),
    }
}

/// Convert a column value to label text.
///
/// The result is raw bytes because byte columns may hold text in a
/// non-UTF-8 encoding; see [`crate::encoding::validate_and_fix`].
/// Returns `None` only for unsupported kinds.
pub fn coerce_to_text(value: &DbValue, time_as_string: bool) -> Option<Vec<u8>> {
    let text = match value {
        DbValue::Int(v) => v.to_string().into_bytes(),
        DbValue::Float(v) => v.to_string().into_bytes(),
        DbValue::Timestamp(v) => {
            if time_as_string {
                v.to_rfc3339_opts(SecondsFormat::Nanos, true).into_bytes()
            } else {
                format!("{}{:03}", v.timestamp(), v.timestamp_subsec_millis()).into_bytes()
            }
        }
        DbValue::Null => Vec::new(),
        DbValue::Bytes(v) => v.clone(),
        DbValue::Text(v) => v.clone().into_bytes(),
        DbValue::Bool(v) => {
            if *v {
                b"true".to_vec()
            } else {
                b"false".to_vec()
            }
        }
        DbValue::Unsupported(_) => return None,
    };
    Some(text)
}
