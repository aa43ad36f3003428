//! The application configuration document.
//!
//! Only the protocol catalogue is interpreted here. Everything else (serial settings, window
//! state, ...) is carried through untouched, so a document can be loaded, changed and written back
//! without losing sections this crate knows nothing about. Reading and writing files is left to
//! the caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info};

use crate::error::{Error, Result};

/// A protocol the user can pick from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolEntry {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Descriptor document for this protocol.
    pub config_file: String,
}

impl ProtocolEntry {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        config_file: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            config_file: config_file.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Known protocols, by display name.
    #[serde(default)]
    pub protocols: BTreeMap<String, ProtocolEntry>,
    /// Display name of the protocol selected last, empty if none.
    #[serde(default)]
    pub last_protocol: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let protocols = [
            (
                "Growatt Inverter Modbus RTU Protocol_II V1.24",
                ProtocolEntry::new(
                    "growatt_inverter",
                    "Growatt inverter communication protocol",
                    "growatt_protocol.json",
                ),
            ),
            (
                "CHINT CPS SCAxxKTL-T Series Modbus Protocol",
                ProtocolEntry::new(
                    "chint_inverter",
                    "CHINT CPS series inverter communication protocol",
                    "chint_protocol.json",
                ),
            ),
        ]
        .into_iter()
        .map(|(name, entry)| (name.to_owned(), entry))
        .collect();

        let mut other = Map::new();
        other.insert(
            "serial_settings".to_owned(),
            json!({
                "port": "COM1",
                "baudrate": 9600,
                "parity": "N",
                "stopbits": 1,
                "bytesize": 8,
                "timeout": 1000
            }),
        );

        Self {
            protocols,
            last_protocol: String::new(),
            other,
        }
    }
}

impl AppConfig {
    pub fn from_json(document: &str) -> Result<Self> {
        serde_json::from_str(document).map_err(|err| {
            error!(%err, "error loading configuration");
            Error::Config(err)
        })
    }

    /// Serialise with indentation, the way the document is kept on disk.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Record `name` as the selected protocol and return its entry.
    pub fn select_protocol(&mut self, name: &str) -> Result<&ProtocolEntry> {
        let Some(entry) = self.protocols.get(name) else {
            error!(name, "unknown protocol");
            return Err(Error::UnknownProtocol(name.to_owned()));
        };
        info!(name, id = %entry.id, "protocol selected");
        self.last_protocol = name.to_owned();
        Ok(entry)
    }

    /// The last selected protocol, if it is still known.
    pub fn last_selected(&self) -> Option<(&str, &ProtocolEntry)> {
        self.protocols
            .get_key_value(&self.last_protocol)
            .map(|(name, entry)| (name.as_str(), entry))
    }
}
