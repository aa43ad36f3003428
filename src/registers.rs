//! This module is used to define register addresses and the registers backed by internal variables.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// A 16-bit register address.
///
/// Rendered as `0x` followed by four uppercase hex digits, e.g. `0x1000`, which is also the form
/// used as register keys in protocol descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegisterAddress(pub u16);

impl RegisterAddress {
    /// Address stored big-endian in two frame bytes.
    pub fn from_be_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }
}

impl core::fmt::Display for RegisterAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl From<u16> for RegisterAddress {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<RegisterAddress> for u16 {
    fn from(value: RegisterAddress) -> Self {
        value.0
    }
}

impl From<RegisterAddress> for String {
    fn from(value: RegisterAddress) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid register address \"{0}\", expected 0x followed by up to 4 hex digits")]
pub struct InvalidRegisterAddress(String);

impl FromStr for RegisterAddress {
    type Err = InvalidRegisterAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRegisterAddress(s.to_owned());
        let digits = s
            .trim()
            .strip_prefix("0x")
            .or_else(|| s.trim().strip_prefix("0X"))
            .ok_or_else(invalid)?;
        if digits.is_empty()
            || digits.len() > 4
            || !digits.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(invalid());
        }
        u16::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| invalid())
    }
}

impl TryFrom<String> for RegisterAddress {
    type Error = InvalidRegisterAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Registers backed by the built-in internal variables.
#[derive(Debug, Copy, Clone, EnumIter, PartialEq, Eq)]
#[repr(u16)]
pub enum MappedRegister {
    /// __R/W__ - Voltage, backed by `voltage`.
    Voltage = 0x1000,
    /// __R/W__ - Current, backed by `current`.
    Current = 0x1001,
    /// __R/W__ - Active power, backed by `power`.
    Power = 0x1002,
    /// __R/W__ - Total energy consumption, backed by `energy`.
    Energy = 0x1003,
    /// __R__ - Timestamp of the last update, backed by `timestamp`.
    Timestamp = 0x1004,
}

impl MappedRegister {
    /// Key of the internal variable holding this register's value.
    pub const fn variable_key(self) -> &'static str {
        match self {
            Self::Voltage => "voltage",
            Self::Current => "current",
            Self::Power => "power",
            Self::Energy => "energy",
            Self::Timestamp => "timestamp",
        }
    }

    pub const fn address(self) -> RegisterAddress {
        RegisterAddress(self as u16)
    }
}

impl From<MappedRegister> for RegisterAddress {
    fn from(value: MappedRegister) -> Self {
        value.address()
    }
}

/// Static table of register address -> variable key.
///
/// Built once, never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMapping {
    entries: BTreeMap<RegisterAddress, String>,
}

impl RegisterMapping {
    pub fn new<A, K>(entries: impl IntoIterator<Item = (A, K)>) -> Self
    where
        A: Into<RegisterAddress>,
        K: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(address, key)| (address.into(), key.into()))
                .collect(),
        }
    }

    /// Key of the variable backing `address`, if any.
    pub fn variable_key(&self, address: RegisterAddress) -> Option<&str> {
        self.entries.get(&address).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegisterAddress, &str)> {
        self.entries.iter().map(|(a, k)| (*a, k.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RegisterMapping {
    /// The built-in table, see [`MappedRegister`].
    fn default() -> Self {
        Self::new(MappedRegister::iter().map(|r| (r.address(), r.variable_key())))
    }
}
