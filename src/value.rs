//! Values held by the internal variable store.
//!
//! A variable's value is a closed tagged union. Mutating a variable always goes through
//! [`VariableKind::coerce`], which either produces a value of the declared kind or explains
//! why the input can not be represented as one.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Serialize;
use strum_macros::{Display, EnumIter};

/// Text timestamp layouts accepted when coercing into [`VariableKind::Timestamp`], after RFC 3339.
const TIMESTAMP_LAYOUTS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// The declared type of a variable.
#[derive(Debug, Display, EnumIter, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum VariableKind {
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "integer")]
    Integer,
    #[strum(serialize = "timestamp")]
    Timestamp,
    #[strum(serialize = "text")]
    Text,
}

/// The current value of a variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VariableValue {
    Float(f64),
    Integer(i64),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl VariableValue {
    /// The kind tag matching this value.
    pub fn kind(&self) -> VariableKind {
        match self {
            Self::Float(_) => VariableKind::Float,
            Self::Integer(_) => VariableKind::Integer,
            Self::Timestamp(_) => VariableKind::Timestamp,
            Self::Text(_) => VariableKind::Text,
        }
    }

    /// Numeric view of this value, used for range checks and conversions.
    ///
    /// Timestamps and text have no numeric view.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(v),
            Self::Integer(v) => Some(v as f64),
            Self::Timestamp(_) | Self::Text(_) => None,
        }
    }
}

impl core::fmt::Display for VariableValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            // Debug keeps the decimal point on whole numbers (`220.0`, not `220`).
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for VariableValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<NaiveDateTime> for VariableValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<DateTime<Local>> for VariableValue {
    fn from(value: DateTime<Local>) -> Self {
        Self::Timestamp(value.naive_local())
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl VariableKind {
    /// Convert `raw` into a value of this kind.
    ///
    /// The conversion is total over the input variants: every combination either succeeds or
    /// returns a reason for the failure. Float inputs are truncated toward zero when an integer
    /// is required.
    pub fn coerce(self, raw: VariableValue) -> Result<VariableValue, String> {
        use VariableValue as V;

        match (self, raw) {
            (Self::Float, V::Float(v)) => finite(v).map(V::Float),
            (Self::Float, V::Integer(v)) => Ok(V::Float(v as f64)),
            (Self::Float, V::Text(text)) => text
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("\"{text}\" is not a number ({e})"))
                .and_then(finite)
                .map(V::Float),

            (Self::Integer, V::Integer(v)) => Ok(V::Integer(v)),
            (Self::Integer, V::Float(v)) => {
                let v = finite(v)?.trunc();
                // i64::MAX as f64 rounds up to 2^63, which does not fit.
                if v < i64::MIN as f64 || v >= i64::MAX as f64 {
                    return Err(format!("{v} does not fit in a 64-bit integer"));
                }
                Ok(V::Integer(v as i64))
            }
            (Self::Integer, V::Text(text)) => text
                .trim()
                .parse::<i64>()
                .map(V::Integer)
                .map_err(|e| format!("\"{text}\" is not an integer ({e})")),

            (Self::Timestamp, V::Timestamp(v)) => Ok(V::Timestamp(v)),
            (Self::Timestamp, V::Integer(secs)) => Local
                .timestamp_opt(secs, 0)
                .single()
                .map(|dt| V::Timestamp(dt.naive_local()))
                .ok_or_else(|| format!("{secs} is not a valid unix timestamp")),
            (Self::Timestamp, V::Text(text)) => parse_timestamp(text.trim())
                .map(V::Timestamp)
                .ok_or_else(|| format!("\"{text}\" is not a recognised timestamp")),

            (Self::Text, raw) => Ok(V::Text(raw.to_string())),

            (kind, raw) => Err(format!("a {} value can not become {kind}", raw.kind())),
        }
    }
}

fn finite(v: f64) -> Result<f64, String> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("{v} is not a finite number"))
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    TIMESTAMP_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
}
