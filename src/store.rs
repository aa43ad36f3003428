use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use chrono::Local;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::{
    error::{Error, Result},
    registers::{RegisterAddress, RegisterMapping},
    value::VariableValue,
    variable::VariableInfo,
};

/// Key of the variable refreshed by [`VariableStore::update_timestamp`].
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Receives a callback after every successful change to a variable.
pub trait VariableObserver: Send + Sync {
    fn on_variable_updated(&self, key: &str);
}

/// Publish change notifications onto a channel instead of handling them in place.
impl VariableObserver for Sender<String> {
    fn on_variable_updated(&self, key: &str) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(key.to_owned());
    }
}

/// UI metadata of an editable variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableMetadata {
    pub key: String,
    pub display_name: String,
    pub unit: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Input hint, `"min - max"`.
    pub placeholder: String,
}

/// Result of [`VariableStore::batch_set`].
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub failures: Vec<(String, Error)>,
}

impl BatchOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        self.failures.iter().map(|(key, _)| key.as_str()).collect()
    }
}

/// The internal variables of a session.
///
/// Every mutation goes through [`Self::set`] (or [`Self::update_timestamp`]), which validates
/// type and range before storing the value and then notifies observers. Reads may happen
/// concurrently; writes are serialised. Observers are called after all locks are released, so
/// they are free to call back into the store.
pub struct VariableStore {
    variables: RwLock<BTreeMap<String, VariableInfo>>,
    register_mapping: RegisterMapping,
    observers: Mutex<Vec<Arc<dyn VariableObserver>>>,
}

impl core::fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VariableStore")
            .field("variables", &*self.variables.read())
            .field("register_mapping", &self.register_mapping)
            .field("observers", &self.observers.lock().len())
            .finish()
    }
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl VariableStore {
    /// A store holding exactly `variables`, resolving registers through `register_mapping`.
    pub fn new<K: Into<String>>(
        variables: impl IntoIterator<Item = (K, VariableInfo)>,
        register_mapping: RegisterMapping,
    ) -> Self {
        Self {
            variables: RwLock::new(
                variables
                    .into_iter()
                    .map(|(key, info)| (key.into(), info))
                    .collect(),
            ),
            register_mapping,
            observers: Mutex::new(Vec::new()),
        }
    }

    /// The built-in variable set and register mapping.
    pub fn with_defaults() -> Self {
        Self::new(default_variables(), RegisterMapping::default())
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<VariableValue> {
        self.variables.read().get(key).map(|info| info.value.clone())
    }

    /// Snapshot of everything known about `key`.
    pub fn variable_info(&self, key: &str) -> Option<VariableInfo> {
        self.variables.read().get(key).cloned()
    }

    /// Current value of `key`, rendered with its format specifier.
    ///
    /// A value which can not be rendered with its format falls back to its plain form.
    pub fn get_formatted(&self, key: &str) -> Option<String> {
        let variables = self.variables.read();
        let info = variables.get(key)?;
        Some(render_or_plain(key, info))
    }

    /// Formatted values of all variables.
    pub fn formatted_values(&self) -> Vec<(String, String)> {
        self.variables
            .read()
            .iter()
            .map(|(key, info)| (key.clone(), render_or_plain(key, info)))
            .collect()
    }

    /// Validate and store a new value for `key`, then notify observers.
    pub fn set(&self, key: &str, raw: impl Into<VariableValue>) -> Result<()> {
        self.store(key, raw.into(), true)?;
        self.notify(key);
        Ok(())
    }

    /// Apply [`Self::set`] to every entry. One failure does not stop the others.
    pub fn batch_set<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> BatchOutcome
    where
        K: Into<String>,
        V: Into<VariableValue>,
    {
        let mut outcome = BatchOutcome::default();
        for (key, raw) in entries {
            let key = key.into();
            if let Err(err) = self.set(&key, raw) {
                outcome.failures.push((key, err));
            }
        }
        outcome
    }

    /// Set the timestamp variable to now. Not range checked.
    pub fn update_timestamp(&self) -> Result<()> {
        self.store(TIMESTAMP_KEY, Local::now().into(), false)?;
        self.notify(TIMESTAMP_KEY);
        Ok(())
    }

    /// Value of the variable backing `address`.
    pub fn resolve_by_register(&self, address: RegisterAddress) -> Option<VariableValue> {
        let key = self.register_mapping.variable_key(address)?;
        self.get(key)
    }

    pub fn register_mapping(&self) -> &RegisterMapping {
        &self.register_mapping
    }

    /// Metadata for the user editable variables (all but the timestamp).
    pub fn metadata(&self) -> Vec<VariableMetadata> {
        self.variables
            .read()
            .iter()
            .filter(|(key, _)| key.as_str() != TIMESTAMP_KEY)
            .map(|(key, info)| VariableMetadata {
                key: key.clone(),
                display_name: info.name.clone(),
                unit: info.unit.clone(),
                min: info.min,
                max: info.max,
                placeholder: format!("{} - {}", bound(info.min), bound(info.max)),
            })
            .collect()
    }

    /// Register an observer. Adding the same observer twice has no effect.
    pub fn add_observer(&self, observer: Arc<dyn VariableObserver>) {
        let mut observers = self.observers.lock();
        if !observers.iter().any(|o| same_observer(o, &observer)) {
            observers.push(observer);
        }
    }

    /// Unregister an observer. Removing an unknown observer has no effect.
    pub fn remove_observer(&self, observer: &Arc<dyn VariableObserver>) {
        self.observers.lock().retain(|o| !same_observer(o, observer));
    }

    fn store(&self, key: &str, raw: VariableValue, check_range: bool) -> Result<()> {
        let mut variables = self.variables.write();
        let Some(info) = variables.get_mut(key) else {
            error!(key, "variable does not exist");
            return Err(Error::UnknownVariable(key.to_owned()));
        };

        let value = info.kind.coerce(raw).map_err(|reason| {
            error!(key, kind = %info.kind, %reason, "type conversion failed");
            Error::TypeConversion {
                key: key.to_owned(),
                kind: info.kind,
                reason,
            }
        })?;

        if check_range {
            if let (Some((min, max)), Some(number)) = (info.bounds(), value.as_f64()) {
                if number < min || number > max {
                    error!(key, value = number, min, max, "value out of range");
                    return Err(Error::Range {
                        key: key.to_owned(),
                        value: number,
                        min,
                        max,
                    });
                }
            }
        }

        debug!(key, %value, "variable updated");
        info.value = value;
        Ok(())
    }

    fn notify(&self, key: &str) {
        // Snapshot so observers run without any store lock held.
        let observers = self.observers.lock().clone();
        for observer in observers {
            observer.on_variable_updated(key);
        }
    }
}

fn same_observer(a: &Arc<dyn VariableObserver>, b: &Arc<dyn VariableObserver>) -> bool {
    core::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn render_or_plain(key: &str, info: &VariableInfo) -> String {
    info.render().unwrap_or_else(|err| {
        warn!(key, format = %info.format, %err, "error formatting value");
        info.value.to_string()
    })
}

fn bound(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_owned(), |v| format!("{v:?}"))
}

/// The built-in variables, created with their defaults.
pub fn default_variables() -> Vec<(&'static str, VariableInfo)> {
    vec![
        (
            TIMESTAMP_KEY,
            VariableInfo::new("Timestamp", Local::now(), "Current timestamp"),
        ),
        (
            "voltage",
            VariableInfo::new("Voltage", 220.0, "Current voltage")
                .with_unit("V")
                .with_range(0.0, 380.0),
        ),
        (
            "current",
            VariableInfo::new("Current", 0.0, "Current amperage")
                .with_unit("A")
                .with_range(0.0, 100.0),
        ),
        (
            "power",
            VariableInfo::new("Power", 0.0, "Active power")
                .with_unit("kW")
                .with_range(0.0, 999_999.9),
        ),
        (
            "energy",
            VariableInfo::new("Energy", 0.0, "Total energy consumption")
                .with_unit("kWh")
                .with_range(0.0, 999_999.9),
        ),
    ]
}
