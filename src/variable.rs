//! A single entry of the internal variable store, and how its value is rendered for display.

use core::fmt::Write;

use serde::Serialize;

use crate::value::{VariableKind, VariableValue};

/// Format used for float variables unless one is set with [`VariableInfo::with_format`].
pub const DEFAULT_NUMERIC_FORMAT: &str = "{:.1}";
/// Format used for timestamp variables unless one is set with [`VariableInfo::with_format`].
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything the store knows about one variable.
///
/// Use [`VariableInfo::new`] followed by the `with_*` methods to describe a variable. The value
/// can only be changed afterwards through [`VariableStore::set`](crate::store::VariableStore::set).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableInfo {
    /// Human readable label.
    pub(crate) name: String,
    pub(crate) value: VariableValue,
    pub(crate) kind: VariableKind,
    pub(crate) description: String,
    pub(crate) unit: Option<String>,
    /// Inclusive lower bound. Only enforced together with `max`.
    pub(crate) min: Option<f64>,
    /// Inclusive upper bound. Only enforced together with `min`.
    pub(crate) max: Option<f64>,
    /// Numeric/string template, or a strftime pattern for timestamps.
    pub(crate) format: String,
}

impl VariableInfo {
    /// Describe a variable whose declared kind is that of `initial`.
    pub fn new(
        name: impl Into<String>,
        initial: impl Into<VariableValue>,
        description: impl Into<String>,
    ) -> Self {
        let value = initial.into();
        let kind = value.kind();
        let format = match kind {
            VariableKind::Timestamp => DEFAULT_TIMESTAMP_FORMAT,
            VariableKind::Float => DEFAULT_NUMERIC_FORMAT,
            VariableKind::Integer | VariableKind::Text => "{}",
        };
        Self {
            name: name.into(),
            value,
            kind,
            description: description.into(),
            unit: None,
            min: None,
            max: None,
            format: format.to_owned(),
        }
    }

    /// Set the engineering unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the inclusive range. Both bounds must be present for the range to be enforced.
    pub fn with_range(mut self, min: impl Into<Option<f64>>, max: impl Into<Option<f64>>) -> Self {
        self.min = min.into();
        self.max = max.into();
        self
    }

    /// Set the format specifier.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &VariableValue {
        &self.value
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// The enforced range, if both bounds are set.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.min.zip(self.max)
    }

    /// Render the current value with this variable's format specifier.
    pub fn render(&self) -> Result<String, FormatError> {
        match &self.value {
            VariableValue::Timestamp(ts) => {
                let mut out = String::new();
                write!(out, "{}", ts.format(&self.format))
                    .map_err(|_| FormatError::TimestampPattern(self.format.clone()))?;
                Ok(out)
            }
            value => render_template(&self.format, value),
        }
    }
}

/// Why a value could not be rendered with its format specifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("invalid timestamp pattern \"{0}\"")]
    TimestampPattern(String),
    #[error("template \"{0}\" must contain exactly one placeholder")]
    Placeholder(String),
    #[error("unsupported placeholder \"{{{0}}}\"")]
    Spec(String),
    #[error("precision can not be applied to text")]
    TextPrecision,
}

/// Substitute `value` into a template such as `"{:.1}"`, `"{} V"` or `"{:.2f}"`.
fn render_template(template: &str, value: &VariableValue) -> Result<String, FormatError> {
    let mut out = String::with_capacity(template.len() + 8);
    let mut placeholders = 0;
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.as_str().starts_with('{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.as_str().starts_with('}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let rest = chars.as_str();
                let end = rest
                    .find('}')
                    .ok_or_else(|| FormatError::Placeholder(template.to_owned()))?;
                let spec = &rest[..end];
                chars = rest[end + 1..].chars();
                placeholders += 1;
                render_placeholder(&mut out, spec, value)?;
            }
            '}' => return Err(FormatError::Placeholder(template.to_owned())),
            c => out.push(c),
        }
    }

    if placeholders != 1 {
        return Err(FormatError::Placeholder(template.to_owned()));
    }
    Ok(out)
}

fn render_placeholder(
    out: &mut String,
    spec: &str,
    value: &VariableValue,
) -> Result<(), FormatError> {
    let precision = parse_precision(spec)?;

    // Writing into a String can not fail.
    let _ = match (precision, value) {
        (None, value) => write!(out, "{value}"),
        (Some(_), VariableValue::Text(_) | VariableValue::Timestamp(_)) => {
            return Err(FormatError::TextPrecision);
        }
        (Some(p), value) => {
            let number = value.as_f64().unwrap_or_default();
            write!(out, "{number:.p$}")
        }
    };
    Ok(())
}

/// Accepts `""`, `":"`, `":.N"` and `":.Nf"`.
fn parse_precision(spec: &str) -> Result<Option<usize>, FormatError> {
    let invalid = || FormatError::Spec(spec.to_owned());

    let Some(spec) = spec.strip_prefix(':') else {
        return if spec.is_empty() {
            Ok(None)
        } else {
            Err(invalid())
        };
    };
    if spec.is_empty() {
        return Ok(None);
    }
    let digits = spec.strip_prefix('.').ok_or_else(invalid)?;
    let digits = digits.strip_suffix('f').unwrap_or(digits);
    digits.parse::<usize>().map(Some).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn float_uses_precision() {
        let info = VariableInfo::new("Voltage", 220.04, "Current voltage").with_unit("V");
        assert_eq!(info.render().unwrap(), "220.0");

        let info = info.with_format("{:.2f} V");
        assert_eq!(info.render().unwrap(), "220.04 V");
    }

    #[test]
    fn integer_without_precision() {
        let info = VariableInfo::new("Count", 42i64, "Counter");
        assert_eq!(info.format(), "{}");
        assert_eq!(info.render().unwrap(), "42");

        let info = info.with_format("{:.1}");
        assert_eq!(info.render().unwrap(), "42.0");
    }

    #[test]
    fn timestamp_uses_pattern() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 5, 9)
            .unwrap();
        let info = VariableInfo::new("Timestamp", ts, "Current timestamp");
        assert_eq!(info.render().unwrap(), "2024-03-01 08:05:09");

        let info = info.with_format("%H:%M");
        assert_eq!(info.render().unwrap(), "08:05");
    }

    #[test]
    fn escaped_braces() {
        let info = VariableInfo::new("Voltage", 1.0, "").with_format("{{{:.1}}}");
        assert_eq!(info.render().unwrap(), "{1.0}");
    }

    #[test]
    fn rendering_anomalies() {
        let info = VariableInfo::new("Label", "abc", "").with_format("{:.1}");
        assert_eq!(info.render(), Err(FormatError::TextPrecision));

        let info = VariableInfo::new("Voltage", 1.0, "").with_format("no placeholder");
        assert!(matches!(info.render(), Err(FormatError::Placeholder(_))));

        let info = VariableInfo::new("Voltage", 1.0, "").with_format("{} and {}");
        assert!(matches!(info.render(), Err(FormatError::Placeholder(_))));

        let info = VariableInfo::new("Voltage", 1.0, "").with_format("{:x}");
        assert!(matches!(info.render(), Err(FormatError::Spec(_))));

        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let info = VariableInfo::new("Timestamp", ts, "").with_format("%Q");
        assert!(matches!(info.render(), Err(FormatError::TimestampPattern(_))));
    }

    #[test]
    fn bounds_need_both_sides() {
        let info = VariableInfo::new("Voltage", 1.0, "").with_range(0.0, None);
        assert_eq!(info.bounds(), None);
        let info = info.with_range(0.0, 380.0);
        assert_eq!(info.bounds(), Some((0.0, 380.0)));
    }
}
