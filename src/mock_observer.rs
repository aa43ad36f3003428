//! We use this mocking module in unit tests to record variable change notifications.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::store::VariableObserver;

/// Our mock observer, recording every key it is notified about.
pub struct MockObserver {
    /// Prefix written before each key in the shared log, so several observers can share one.
    name: Option<&'static str>,
    /// Keys in notification order.
    log: Arc<Mutex<Vec<String>>>,
}

impl MockObserver {
    /// Observer with its own log.
    pub fn new() -> Self {
        Self {
            name: None,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Observer appending `"<name>:<key>"` to a shared log.
    pub fn named(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: Some(name),
            log,
        }
    }

    /// Notifications received so far.
    pub fn updates(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl VariableObserver for MockObserver {
    fn on_variable_updated(&self, key: &str) {
        let entry = match self.name {
            Some(name) => format!("{name}:{key}"),
            None => key.to_owned(),
        };
        self.log.lock().push(entry);
    }
}
