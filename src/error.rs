//! Our error types for frame decoding and the variable store.

use thiserror::Error;

use crate::{expression::EvalError, registers::RegisterAddress, value::VariableKind};

pub type Result<T> = core::result::Result<T, Error>;

/// Every failure the decoder, the variable store and the config layer can report.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Frame too short: {len} bytes")]
    FrameTooShort { len: usize },
    #[error("Frame too long for checksum verification: {len} bytes")]
    FrameTooLong { len: usize },
    #[error("Unknown function code: {0}")]
    UnknownFunctionCode(u8),
    #[error("Unknown register: {0}")]
    UnknownRegister(RegisterAddress),
    #[error("No protocol loaded")]
    NoProtocolLoaded,
    #[error("Checksum mismatch: expected {expected:#06X}, found {found:#06X}")]
    ChecksumMismatch { expected: u16, found: u16 },
    #[error("Conversion failed: {0}")]
    Evaluation(#[from] EvalError),
    #[error("Variable {0} does not exist")]
    UnknownVariable(String),
    #[error("Cannot convert value for {key} to {kind}: {reason}")]
    TypeConversion {
        key: String,
        kind: VariableKind,
        reason: String,
    },
    #[error("Value {value} out of range for {key} [{min}, {max}]")]
    Range {
        key: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),
    #[error("Invalid configuration document: {0}")]
    Config(#[from] serde_json::Error),
}
