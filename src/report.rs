//! Human readable rendering of decode results.
//!
//! Every outcome of a decode, successful or not, maps to a fixed message template so the
//! display layer never has to inspect errors itself.

use core::fmt::Write;

use crate::{
    decoder::{DecodeResult, MIN_FRAME_LEN},
    error::{Error, Result},
};

/// Shown if a report can not be assembled.
pub const FORMAT_FAILURE: &str = "Error formatting decode result";

/// Render the outcome of a decode.
pub fn format_result(outcome: &Result<DecodeResult>) -> String {
    match outcome {
        Ok(result) => format_decode(result),
        Err(err) => format_failure(err),
    }
}

/// Render a successful decode.
///
/// Register lines only appear for resolved registers, the value line only when there is one.
pub fn format_decode(result: &DecodeResult) -> String {
    write_decode(result).unwrap_or_else(|_| FORMAT_FAILURE.to_owned())
}

fn write_decode(result: &DecodeResult) -> core::result::Result<String, core::fmt::Error> {
    let mut out = String::new();
    writeln!(out, "Decode result:")?;
    write!(
        out,
        "Function code: {} ({})",
        result.function_code, result.function_name
    )?;

    if let Some(register) = &result.register {
        write!(out, "\nRegister address: {}", register.address)?;
        write!(out, "\nRegister name: {}", register.name)?;
        write!(out, "\nDescription: {}", register.description)?;
        if let Some(value) = &register.value {
            write!(out, "\nVariable value: {value}")?;
        }
        write!(out, "\nRaw data: {}", register.payload.hex())?;
    }
    Ok(out)
}

/// Render a failed decode.
pub fn format_failure(err: &Error) -> String {
    match err {
        Error::FrameTooShort { len } => format!(
            "Unable to decode frame: {len} bytes received, at least {MIN_FRAME_LEN} required"
        ),
        Error::FrameTooLong { len } => {
            format!("Unable to decode frame: {len} bytes exceeds the maximum RTU frame size")
        }
        Error::UnknownFunctionCode(code) => {
            format!("Unable to decode frame: unknown function code {code}")
        }
        Error::NoProtocolLoaded => "Unable to decode frame: no protocol loaded".to_owned(),
        Error::ChecksumMismatch { expected, found } => format!(
            "Unable to decode frame: checksum mismatch (expected 0x{expected:04X}, found 0x{found:04X})"
        ),
        other => format!("Unable to decode frame: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decoder::{Payload, RegisterReading},
        registers::RegisterAddress,
        value::VariableValue,
    };

    fn function_only() -> DecodeResult {
        DecodeResult {
            function_code: 3,
            function_name: "Read".into(),
            register: None,
        }
    }

    fn with_register(value: Option<VariableValue>) -> DecodeResult {
        DecodeResult {
            register: Some(RegisterReading {
                address: RegisterAddress(0x1000),
                name: "Voltage".into(),
                description: "Grid voltage".into(),
                value,
                payload: Payload::default(),
            }),
            ..function_only()
        }
    }

    #[test]
    fn function_only_report() {
        let text = format_decode(&function_only());
        assert_eq!(text, "Decode result:\nFunction code: 3 (Read)");
        assert!(!text.contains("Register"));
        assert!(!text.contains("Raw data"));
    }

    #[test]
    fn register_report() {
        let text = format_decode(&with_register(None));
        assert_eq!(
            text,
            "Decode result:\n\
             Function code: 3 (Read)\n\
             Register address: 0x1000\n\
             Register name: Voltage\n\
             Description: Grid voltage\n\
             Raw data: "
        );
        assert!(!text.contains("Variable value"));
    }

    #[test]
    fn register_and_value_report() {
        let text = format_decode(&with_register(Some(VariableValue::Float(220.0))));
        assert!(text.contains("\nRegister name: Voltage\n"));
        assert!(text.contains("\nVariable value: 220.0\n"));
    }

    #[test]
    fn failure_messages_are_distinct() {
        let failures = [
            Error::FrameTooShort { len: 2 },
            Error::FrameTooLong { len: 300 },
            Error::UnknownFunctionCode(0x2B),
            Error::NoProtocolLoaded,
            Error::ChecksumMismatch {
                expected: 0x85C0,
                found: 0x0000,
            },
        ];
        let messages: Vec<String> = failures.iter().map(format_failure).collect();
        assert_eq!(
            messages[0],
            "Unable to decode frame: 2 bytes received, at least 4 required"
        );
        assert_eq!(messages[2], "Unable to decode frame: unknown function code 43");
        assert_eq!(
            messages[4],
            "Unable to decode frame: checksum mismatch (expected 0x85C0, found 0x0000)"
        );
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn format_result_dispatches() {
        assert_eq!(
            format_result(&Ok(function_only())),
            format_decode(&function_only())
        );
        assert_eq!(
            format_result(&Err(Error::NoProtocolLoaded)),
            "Unable to decode frame: no protocol loaded"
        );
    }
}
