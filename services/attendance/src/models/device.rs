//! Device binding model

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-session map of device identifier → matric number
///
/// First write wins; bindings are additive only and are never rendered into
/// the archive output or returned by any route. The device identifier is a
/// weak, non-authoritative lookup key, not an ownership token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceMap {
    #[serde(flatten)]
    pub bindings: HashMap<String, String>,
}

impl DeviceMap {
    pub fn get(&self, device_id: &str) -> Option<&str> {
        self.bindings.get(device_id).map(String::as_str)
    }

    pub fn insert(&mut self, device_id: String, matric: String) {
        self.bindings.insert(device_id, matric);
    }
}
