//! Process-wide tunables

use bosun_core::{Error, Result};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Shared settings map, updated by `update_settings` actions
#[derive(Debug, Clone, Default)]
pub struct Settings {
    inner: Arc<RwLock<Map<String, Value>>>,
}

impl Settings {
    /// Create empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create settings with initial values
    pub fn with_values(values: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(values)),
        }
    }

    /// Merge keys into the settings, replacing existing values
    pub fn merge(&self, values: Map<String, Value>) {
        self.inner.write().extend(values);
    }

    /// Merge an encoded blob: a JSON object or a string holding one
    pub fn merge_encoded(&self, data: &Value) -> Result<usize> {
        let values = match data {
            Value::Object(map) => map.clone(),
            Value::String(encoded) => serde_json::from_str::<Map<String, Value>>(encoded)?,
            other => {
                return Err(Error::MalformedPayload(format!(
                    "settings must be an object or encoded object, got {other}"
                )));
            }
        };

        let count = values.len();
        self.merge(values);
        Ok(count)
    }

    /// Read one setting
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    /// Snapshot of all settings
    pub fn snapshot(&self) -> Value {
        Value::Object(self.inner.read().clone())
    }
}
