//! This crate decodes Modbus RTU frames against a protocol descriptor loaded at runtime, and keeps
//! the internal variables whose values decoded registers report.
//!
//! A protocol descriptor names the function codes and registers of one device protocol. Registers
//! can be mapped onto a variable of the [`store::VariableStore`], with an arithmetic conversion
//! applied when the value is read back (`"value * 0.1"`) or written (`"value * 10"`).
//!
//! Decoding never touches a transport: frames are handed in as bytes, and results come back as
//! a structured [`decoder::DecodeResult`] or as display text from [`report`].
//!
//! Frame layout as decoded:
//! * Byte 0: unit address (ignored)
//! * Byte 1: function code
//! * Bytes 2-3: register address, big-endian
//! * Bytes 4 to len-2: payload
//! * Last 2 bytes: CRC-16 (only checked on request)
//!
//! Logging goes through `tracing`; installing a subscriber is up to the application.

pub mod config;
pub mod conversion;
pub mod decoder;
pub mod error;
pub mod expression;
pub mod parser;
pub mod protocol;
pub mod registers;
pub mod report;
pub mod store;
pub mod value;
pub mod variable;

#[cfg(test)]
mod mock_observer;
