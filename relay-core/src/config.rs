//! # Relay configuration
//!
//! A plain string key/value store. Keys are dotted (`device.response_timeout`)
//! and typed accessors parse on read, so a missing or malformed value falls
//! back to the caller's default.
//!
//! ## Environment overrides
//! ```rust
//! use relay_core::RelayConfig;
//!
//! let mut config = RelayConfig::new();
//! config.load_from_iter(
//!     "RELAY__",
//!     [("RELAY__DEVICE__RESPONSE_TIMEOUT".to_string(), "45".to_string())],
//! );
//!
//! assert_eq!(config.snapshot().get_u64("device.response_timeout"), Some(45));
//! ```
//!
//! In a deployment the same keys come from the process environment:
//!
//! ```bash
//! export RELAY__STORAGE__BUCKET=relay-staging
//! ```

use std::collections::HashMap;

/// Default prefix for environment-provided settings.
pub const ENV_PREFIX: &str = "RELAY__";

#[derive(Debug, Default)]
pub struct RelayConfig {
    values: HashMap<String, String>,
}

impl RelayConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Set a key only if nothing set it yet.
    pub fn set_default<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Copy prefixed pairs into the store.
    ///
    /// `RELAY__STORAGE__READ_ACCESS_TTL` becomes `storage.read_access_ttl`.
    pub fn load_from_iter<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                if stripped.is_empty() {
                    continue;
                }
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.set(normalized, value);
            }
        }
    }

    /// Load every `prefix`-ed variable from the process environment.
    pub fn load_env(&mut self, prefix: &str) {
        self.load_from_iter(prefix, std::env::vars());
    }

    pub fn snapshot(&self) -> RelayConfigSnapshot {
        RelayConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelayConfigSnapshot {
    map: HashMap<String, String>,
}

impl RelayConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    /// Non-empty string value.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse::<i64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)
            .and_then(|v| v.trim().to_ascii_lowercase().parse::<bool>().ok())
    }
}
