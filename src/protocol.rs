//! In-memory protocol descriptors.
//!
//! A descriptor names the function codes and registers of one device protocol and tells the
//! decoder which registers are backed by internal variables. Descriptors are loaded as data,
//! typically from a JSON document:
//!
//! ```json
//! {
//!   "function_codes": { "3": "Read Holding Registers" },
//!   "registers": {
//!     "0x1000": {
//!       "name": "Voltage",
//!       "description": "Grid voltage",
//!       "variable_mapping": { "name": "voltage", "conversion": { "read": "value * 0.1" } }
//!     }
//!   }
//! }
//! ```
//!
//! A descriptor is never modified once built; switching protocols replaces the whole descriptor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    conversion::Conversion, error::Result, expression::EvalError, registers::RegisterAddress,
};

/// Link between a register and the internal variable holding its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableMapping {
    /// Variable key in the store.
    #[serde(rename = "name")]
    pub variable: String,
    #[serde(default)]
    pub conversion: Conversion,
}

impl VariableMapping {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            conversion: Conversion::identity(),
        }
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }
}

/// One register known to a protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_mapping: Option<VariableMapping>,
}

impl RegisterDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            variable_mapping: None,
        }
    }

    pub fn with_mapping(mut self, mapping: VariableMapping) -> Self {
        self.variable_mapping = Some(mapping);
        self
    }
}

/// The complete schema of one device protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDescriptor {
    #[serde(default)]
    function_codes: BTreeMap<u8, String>,
    #[serde(default)]
    registers: BTreeMap<RegisterAddress, RegisterDescriptor>,
}

impl ProtocolDescriptor {
    pub fn new(
        function_codes: impl IntoIterator<Item = (u8, String)>,
        registers: impl IntoIterator<Item = (RegisterAddress, RegisterDescriptor)>,
    ) -> Self {
        Self {
            function_codes: function_codes.into_iter().collect(),
            registers: registers.into_iter().collect(),
        }
    }

    /// Parse a protocol document.
    pub fn from_json(document: &str) -> Result<Self> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn function_name(&self, code: u8) -> Option<&str> {
        self.function_codes.get(&code).map(String::as_str)
    }

    pub fn register(&self, address: RegisterAddress) -> Option<&RegisterDescriptor> {
        self.registers.get(&address)
    }

    pub fn function_codes(&self) -> impl Iterator<Item = (u8, &str)> {
        self.function_codes.iter().map(|(c, n)| (*c, n.as_str()))
    }

    pub fn registers(&self) -> impl Iterator<Item = (RegisterAddress, &RegisterDescriptor)> {
        self.registers.iter().map(|(a, r)| (*a, r))
    }

    /// Conversion expressions which do not parse.
    ///
    /// Such registers still decode (with the unconverted value); this lets a loader warn about
    /// them up front.
    pub fn invalid_conversions(&self) -> Vec<(RegisterAddress, String, EvalError)> {
        self.registers
            .iter()
            .filter_map(|(address, register)| {
                register.variable_mapping.as_ref().map(|m| (address, m))
            })
            .flat_map(|(address, mapping)| {
                mapping
                    .conversion
                    .invalid_expressions()
                    .map(move |(src, err)| (*address, src.to_owned(), err))
            })
            .collect()
    }
}
