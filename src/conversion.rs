//! Read/write conversion rules between register values and displayed values.
//!
//! A register mapping may carry one expression per direction. `read` turns the stored value into
//! what is displayed (e.g. `value * 0.1` for a register in deci-volts), `write` turns a user
//! supplied value back into what the register holds (`value * 10`). A direction without an
//! expression passes values through unchanged.

use serde::{Deserialize, Serialize};

use crate::{
    expression::{EvalError, Expression},
    value::VariableValue,
};

/// Conversion expressions for both directions of a variable mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<String>,
}

impl Conversion {
    /// Identity in both directions.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn with_read(mut self, expression: impl Into<String>) -> Self {
        self.read = Some(expression.into());
        self
    }

    pub fn with_write(mut self, expression: impl Into<String>) -> Self {
        self.write = Some(expression.into());
        self
    }

    /// Register -> display direction.
    pub fn apply_read(&self, value: &VariableValue) -> Result<VariableValue, EvalError> {
        apply(self.read.as_deref(), value)
    }

    /// Display -> register direction.
    pub fn apply_write(&self, value: &VariableValue) -> Result<VariableValue, EvalError> {
        apply(self.write.as_deref(), value)
    }

    /// The configured expressions which do not parse, with the reason.
    pub fn invalid_expressions(&self) -> impl Iterator<Item = (&str, EvalError)> {
        [self.read.as_deref(), self.write.as_deref()]
            .into_iter()
            .flatten()
            .filter_map(|src| Expression::parse(src).err().map(|e| (src, e)))
    }
}

/// Evaluate `expression` against `value`, or return `value` unchanged when there is none.
pub fn convert(expression: Option<&str>, value: f64) -> Result<f64, EvalError> {
    match expression {
        Some(src) => Expression::parse(src)?.eval(value),
        None => Ok(value),
    }
}

fn apply(expression: Option<&str>, value: &VariableValue) -> Result<VariableValue, EvalError> {
    let Some(src) = expression else {
        return Ok(value.clone());
    };
    let input = value
        .as_f64()
        .ok_or(EvalError::NonNumericInput(value.kind()))?;
    convert(Some(src), input).map(VariableValue::Float)
}
