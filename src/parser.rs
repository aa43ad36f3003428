use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    decoder::{DecodeResult, FrameDecoder},
    error::{Error, Result},
    protocol::ProtocolDescriptor,
    registers::RegisterAddress,
    report,
    store::VariableStore,
    value::VariableValue,
};

/// A decoding session: the variable store, the active protocol and a decoder.
///
/// The protocol can be switched at any time, including while other threads are parsing. Each
/// parse sees either the old or the new descriptor in full, never a mix of both.
pub struct FrameParser {
    store: Arc<VariableStore>,
    decoder: FrameDecoder,
    protocol: RwLock<Option<Arc<ProtocolDescriptor>>>,
}

impl core::fmt::Debug for FrameParser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrameParser")
            .field("decoder", &self.decoder)
            .field("protocol_loaded", &self.protocol.read().is_some())
            .finish_non_exhaustive()
    }
}

impl FrameParser {
    /// Create a parser with no protocol loaded.
    pub fn new(store: Arc<VariableStore>, decoder: FrameDecoder) -> Self {
        Self {
            store,
            decoder,
            protocol: RwLock::new(None),
        }
    }

    /// Replace the active protocol.
    pub fn set_protocol(&self, descriptor: impl Into<Arc<ProtocolDescriptor>>) {
        let descriptor = descriptor.into();
        for (address, expression, err) in descriptor.invalid_conversions() {
            warn!(%address, expression, %err, "conversion expression does not parse");
        }
        info!(
            function_codes = descriptor.function_codes().count(),
            registers = descriptor.registers().count(),
            "protocol loaded"
        );
        *self.protocol.write() = Some(descriptor);
    }

    /// Unload the active protocol. Parsing fails until a new one is set.
    pub fn clear_protocol(&self) {
        debug!("protocol cleared");
        *self.protocol.write() = None;
    }

    /// The active protocol, if any.
    pub fn protocol(&self) -> Option<Arc<ProtocolDescriptor>> {
        self.protocol.read().clone()
    }

    pub fn store(&self) -> &Arc<VariableStore> {
        &self.store
    }

    /// Decode `frame` against the active protocol.
    pub fn parse(&self, frame: &[u8]) -> Result<DecodeResult> {
        let protocol = self.active()?;
        self.decoder.decode(frame, &protocol, &self.store)
    }

    /// Decode `frame` and render the outcome for display.
    pub fn parse_to_report(&self, frame: &[u8]) -> String {
        report::format_result(&self.parse(frame))
    }

    /// Convert a user supplied value into the raw form written to `address`.
    ///
    /// Applies the write conversion of the register's variable mapping; registers without a
    /// mapping take the value unchanged.
    pub fn encode_register_value(
        &self,
        address: RegisterAddress,
        input: impl Into<VariableValue>,
    ) -> Result<VariableValue> {
        let protocol = self.active()?;
        let Some(register) = protocol.register(address) else {
            warn!(%address, "register not in protocol");
            return Err(Error::UnknownRegister(address));
        };
        let input = input.into();
        match &register.variable_mapping {
            Some(mapping) => Ok(mapping.conversion.apply_write(&input)?),
            None => Ok(input),
        }
    }

    fn active(&self) -> Result<Arc<ProtocolDescriptor>> {
        self.protocol().ok_or_else(|| {
            error!("no protocol loaded");
            Error::NoProtocolLoaded
        })
    }
}
