use crate::error::CoreError;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

/// Well-known settings keys read by the core
pub mod keys {
    /// Whether size enrichment may run (`refine/require-size`)
    pub const REQUIRE_SIZE: &str = "refine/require-size";
    /// Worker pool size for concurrent backend invocations
    pub const WORKER_PERMITS: &str = "worker-pool/permits";
    /// Review server URL consumed by ratings-class backends
    pub const REVIEW_SERVER: &str = "review-server";
}

/// Flat key→value configuration surface consumed by the core.
///
/// The core does not own configuration; it reads backend enablement and
/// enrichment toggles from here at flag-evaluation time. Values are JSON
/// so backends can stash structured configuration without the core
/// caring about the shape.
#[derive(Debug, Default)]
pub struct Settings {
    values: RwLock<HashMap<String, Value>>,
}

impl Settings {
    /// Create an empty settings store; getters fall back to defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a JSON object file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: HashMap<String, Value> = serde_json::from_str(&raw)?;
        Ok(Self {
            values: RwLock::new(parsed),
        })
    }

    /// Set a value
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.into(), value.into());
    }

    /// Raw value for `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    /// Boolean value for `key`, with a default when unset or not a bool
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Integer value for `key`, with a default when unset or not a number
    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
    }

    /// String value for `key`
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|v| v.as_str().map(|s| s.to_string()))
    }

    /// Whether the named backend is enabled; backends are enabled unless
    /// explicitly disabled
    pub fn backend_enabled(&self, name: &str) -> bool {
        self.get_bool(&format!("backend/{name}/enabled"), true)
    }

    /// Enable or disable the named backend
    pub fn set_backend_enabled(&self, name: &str, enabled: bool) {
        self.set(format!("backend/{name}/enabled"), enabled);
    }
}
