//! Frame decoding against a protocol descriptor.
//!
//! Frame layout, as far as this decoder is concerned:
//!
//! | byte      | meaning                                                 |
//! |-----------|---------------------------------------------------------|
//! | 0         | unit address (not interpreted)                          |
//! | 1         | function code                                           |
//! | 2..4      | register address, big-endian                            |
//! | 4..len-2  | payload                                                 |
//! | len-2..   | integrity field (Modbus RTU CRC-16, little-endian)      |
//!
//! The integrity field is only checked with [`ChecksumPolicy::Verify`].

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    protocol::ProtocolDescriptor,
    registers::RegisterAddress,
    store::VariableStore,
    value::VariableValue,
};

/// Smallest frame holding a unit address, a function code and a register address.
pub const MIN_FRAME_LEN: usize = 4;
/// Length of the trailing integrity field.
pub const CHECKSUM_LEN: usize = 2;
/// Largest Modbus RTU ADU, integrity field included.
pub const MAX_VERIFIED_FRAME_LEN: usize = 256;

/// What to do with the trailing integrity field of each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumPolicy {
    /// Strip the field without looking at it.
    #[default]
    Ignore,
    /// Check the field holds the Modbus RTU CRC-16 of the rest of the frame.
    Verify,
}

/// Bytes following the register address, up to the integrity field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Uppercase hex, without separators.
    pub fn hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl Serialize for Payload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

/// A register recognised by the protocol, and the value behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterReading {
    pub address: RegisterAddress,
    pub name: String,
    pub description: String,
    /// Converted value of the mapped variable, if the register has a mapping.
    pub value: Option<VariableValue>,
    pub payload: Payload,
}

/// Structured result of decoding one frame.
///
/// `register` is `None` when the function code is known but the register address is not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeResult {
    pub function_code: u8,
    pub function_name: String,
    pub register: Option<RegisterReading>,
}

impl DecodeResult {
    /// Whether the register address was recognised as well as the function code.
    pub fn is_resolved(&self) -> bool {
        self.register.is_some()
    }

    /// Converted variable value, if any.
    pub fn value(&self) -> Option<&VariableValue> {
        self.register.as_ref().and_then(|r| r.value.as_ref())
    }
}

/// Decodes frames. Holds no state besides its checksum policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    checksum: ChecksumPolicy,
}

impl FrameDecoder {
    pub fn new(checksum: ChecksumPolicy) -> Self {
        Self { checksum }
    }

    pub fn checksum_policy(&self) -> ChecksumPolicy {
        self.checksum
    }

    /// Decode `frame` using `protocol`, resolving mapped variables from `store`.
    ///
    /// Unknown registers and failing conversions degrade to a partial result; the store is
    /// only read, never written.
    pub fn decode(
        &self,
        frame: &[u8],
        protocol: &ProtocolDescriptor,
        store: &VariableStore,
    ) -> Result<DecodeResult> {
        if frame.len() < MIN_FRAME_LEN {
            warn!(len = frame.len(), "frame too short");
            return Err(Error::FrameTooShort { len: frame.len() });
        }
        if self.checksum == ChecksumPolicy::Verify {
            verify_crc(frame)?;
        }

        let function_code = frame[1];
        let Some(function_name) = protocol.function_name(function_code) else {
            warn!(function_code, "unknown function code");
            return Err(Error::UnknownFunctionCode(function_code));
        };
        let mut result = DecodeResult {
            function_code,
            function_name: function_name.to_owned(),
            register: None,
        };

        let address = RegisterAddress::from_be_bytes([frame[2], frame[3]]);
        let Some(register) = protocol.register(address) else {
            debug!(%address, function_code, "register not in protocol");
            return Ok(result);
        };

        let value = register
            .variable_mapping
            .as_ref()
            .and_then(|mapping| {
                let Some(stored) = store.get(&mapping.variable) else {
                    warn!(%address, variable = %mapping.variable, "mapped variable does not exist");
                    return None;
                };
                match mapping.conversion.apply_read(&stored) {
                    Ok(converted) => Some(converted),
                    Err(err) => {
                        warn!(%address, variable = %mapping.variable, %err, "error converting value");
                        Some(stored)
                    }
                }
            });

        let payload_end = frame.len().saturating_sub(CHECKSUM_LEN).max(MIN_FRAME_LEN);
        result.register = Some(RegisterReading {
            address,
            name: register.name.clone(),
            description: register.description.clone(),
            value,
            payload: Payload(frame[MIN_FRAME_LEN..payload_end].to_vec()),
        });
        Ok(result)
    }
}

/// Decode `frame` with the default decoder (integrity field ignored).
pub fn decode(
    frame: &[u8],
    protocol: &ProtocolDescriptor,
    store: &VariableStore,
) -> Result<DecodeResult> {
    FrameDecoder::default().decode(frame, protocol, store)
}

fn verify_crc(frame: &[u8]) -> Result<()> {
    if frame.len() > MAX_VERIFIED_FRAME_LEN {
        warn!(len = frame.len(), "frame too long to verify");
        return Err(Error::FrameTooLong { len: frame.len() });
    }
    let (body, trailer) = frame.split_at(frame.len() - CHECKSUM_LEN);
    let expected = crc16::State::<crc16::MODBUS>::calculate(body);
    let found = u16::from_le_bytes([trailer[0], trailer[1]]);
    if expected != found {
        warn!(expected, found, "checksum mismatch");
        return Err(Error::ChecksumMismatch { expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        conversion::Conversion,
        protocol::{RegisterDescriptor, VariableMapping},
        registers::RegisterMapping,
        variable::VariableInfo,
    };

    fn protocol() -> ProtocolDescriptor {
        ProtocolDescriptor::new(
            [(3, "Read".to_owned()), (6, "Write".to_owned())],
            [
                (
                    RegisterAddress(0x1000),
                    RegisterDescriptor::new("Voltage", "Grid voltage").with_mapping(
                        VariableMapping::new("voltage")
                            .with_conversion(Conversion::identity().with_read("value * 0.1")),
                    ),
                ),
                (
                    RegisterAddress(0x1001),
                    RegisterDescriptor::new("Current", "Output current").with_mapping(
                        VariableMapping::new("current")
                            .with_conversion(Conversion::identity().with_read("value / 0")),
                    ),
                ),
                (
                    RegisterAddress(0x1002),
                    RegisterDescriptor::new("Status", "Device status"),
                ),
                (
                    RegisterAddress(0x1003),
                    RegisterDescriptor::new("Frequency", "")
                        .with_mapping(VariableMapping::new("frequency")),
                ),
            ],
        )
    }

    /// Raw register scale: voltage stored in deci-volts, no range.
    fn store() -> VariableStore {
        VariableStore::new(
            [
                ("voltage", VariableInfo::new("Voltage", 2200.0, "")),
                ("current", VariableInfo::new("Current", 5.0, "")),
            ],
            RegisterMapping::default(),
        )
    }

    #[test]
    fn short_frames() {
        let (protocol, store) = (protocol(), store());
        for len in 0..MIN_FRAME_LEN {
            let frame = vec![0x03; len];
            assert!(matches!(
                decode(&frame, &protocol, &store),
                Err(Error::FrameTooShort { len: l }) if l == len
            ));
        }
    }

    #[test]
    fn unknown_function_code() {
        let (protocol, store) = (protocol(), store());
        for code in [0x00, 0x04, 0x10, 0xFF] {
            let frame = [0x01, code, 0x10, 0x00, 0x00, 0x00];
            assert!(matches!(
                decode(&frame, &protocol, &store),
                Err(Error::UnknownFunctionCode(c)) if c == code
            ));
        }
    }

    #[test]
    fn full_decode_with_read_conversion() {
        let result = decode(
            &[0x01, 0x03, 0x10, 0x00, 0xAB, 0xCD],
            &protocol(),
            &store(),
        )
        .unwrap();

        assert_eq!(result.function_code, 3);
        assert_eq!(result.function_name, "Read");
        let register = result.register.as_ref().unwrap();
        assert_eq!(register.address, RegisterAddress(0x1000));
        assert_eq!(register.name, "Voltage");
        assert_eq!(register.description, "Grid voltage");
        let value = result.value().and_then(VariableValue::as_f64).unwrap();
        assert!((value - 220.0).abs() < 1e-9);
        assert!(register.payload.is_empty());
    }

    #[test]
    fn unknown_register_is_function_only() {
        let result = decode(&[0x01, 0x03, 0x20, 0x00, 0x00, 0x00], &protocol(), &store()).unwrap();
        assert_eq!(result.function_name, "Read");
        assert!(!result.is_resolved());
        assert_eq!(result.value(), None);
    }

    #[test]
    fn register_without_mapping_has_no_value() {
        let result = decode(&[0x01, 0x06, 0x10, 0x02, 0x00, 0x01], &protocol(), &store()).unwrap();
        let register = result.register.unwrap();
        assert_eq!(register.name, "Status");
        assert_eq!(register.value, None);
    }

    #[test]
    fn failing_conversion_falls_back_to_raw_value() {
        let result = decode(&[0x01, 0x03, 0x10, 0x01, 0x00, 0x00], &protocol(), &store()).unwrap();
        assert_eq!(result.value(), Some(&VariableValue::Float(5.0)));
    }

    #[test]
    fn mapping_to_missing_variable() {
        let result = decode(&[0x01, 0x03, 0x10, 0x03, 0x00, 0x00], &protocol(), &store()).unwrap();
        assert!(result.is_resolved());
        assert_eq!(result.value(), None);
    }

    #[test]
    fn payload_slicing() {
        let (protocol, store) = (protocol(), store());

        // Exactly the header: nothing left once the integrity field would be removed.
        let result = decode(&[0x01, 0x03, 0x10, 0x02], &protocol, &store).unwrap();
        assert!(result.register.unwrap().payload.is_empty());

        // Header plus one byte: slice end would fall before its start.
        let result = decode(&[0x01, 0x03, 0x10, 0x02, 0xEE], &protocol, &store).unwrap();
        assert!(result.register.unwrap().payload.is_empty());

        let result = decode(
            &[0x01, 0x03, 0x10, 0x02, 0x00, 0x2A, 0xBE, 0xEF, 0x12, 0x34],
            &protocol,
            &store,
        )
        .unwrap();
        let payload = result.register.unwrap().payload;
        assert_eq!(payload.as_bytes(), &[0x00, 0x2A, 0xBE, 0xEF]);
        assert_eq!(payload.hex(), "002ABEEF");
    }

    #[test]
    fn decoding_does_not_mutate_store() {
        let store = store();
        let before = store.get("voltage");
        decode(&[0x01, 0x03, 0x10, 0x00, 0x00, 0x00], &protocol(), &store).unwrap();
        assert_eq!(store.get("voltage"), before);
    }

    #[test]
    fn checksum_verification() {
        let (protocol, store) = (protocol(), store());
        let decoder = FrameDecoder::new(ChecksumPolicy::Verify);

        // Read holding register 0x1000, count 1 with its RTU CRC.
        let mut frame = vec![0x01, 0x03, 0x10, 0x00, 0x00, 0x01];
        let crc = crc16::State::<crc16::MODBUS>::calculate(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        let result = decoder.decode(&frame, &protocol, &store).unwrap();
        assert_eq!(result.register.unwrap().payload.as_bytes(), &[0x00, 0x01]);

        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(
            decoder.decode(&frame, &protocol, &store),
            Err(Error::ChecksumMismatch { .. })
        ));
        // The default policy does not look at the field.
        assert!(decode(&frame, &protocol, &store).is_ok());
    }

    #[test]
    fn known_crc_vector() {
        // Read holding register 0x0020, count 1: 01 03 00 20 00 01, CRC 85 C0.
        let frame = [0x01, 0x03, 0x00, 0x20, 0x00, 0x01, 0x85, 0xC0];
        assert!(verify_crc(&frame).is_ok());
        assert!(matches!(
            verify_crc(&[0x01, 0x03, 0x00, 0x20, 0x00, 0x01, 0xC0, 0x85]),
            Err(Error::ChecksumMismatch {
                expected: 0xC085,
                found: 0x85C0
            })
        ));
    }

    #[test]
    fn oversized_frames_can_not_be_verified() {
        let frame = vec![0x01; MAX_VERIFIED_FRAME_LEN + 1];
        let decoder = FrameDecoder::new(ChecksumPolicy::Verify);
        assert!(matches!(
            decoder.decode(&frame, &protocol(), &store()),
            Err(Error::FrameTooLong { .. })
        ));
    }
}
