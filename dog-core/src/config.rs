//! # DogRS Configuration
//!
//! A string key/value store mirroring Feathers' `app.set()` / `app.get()`.
//! Structured sections (such as the `tenancy` dimension list) are stored as
//! JSON strings under a single key and decoded by the crate that owns them.
//!
//! ```rust
//! use dog_core::DogApp;
//! let app = DogApp::<(), ()>::new();
//!
//! app.set("tenancy.deny_without_tenant", "false");
//! assert_eq!(app.get("tenancy.deny_without_tenant"), Some("false".to_string()));
//! ```
//!
//! Environment overrides use a prefix and `__` as the path separator:
//! `DOG__TENANCY__DENY_WITHOUT_TENANT=true` → `tenancy.deny_without_tenant`,
//! loaded with `cfg.load_vars("DOG__", std::env::vars())`.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct DogConfig {
    values: HashMap<String, String>,
}

impl DogConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Copy `PREFIX…` variables from `vars` into the store.
    ///
    /// Returns the number of keys set.
    pub fn load_vars<I>(&mut self, prefix: &str, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut n = 0;
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                if normalized.is_empty() {
                    continue;
                }
                self.set(normalized, value);
                n += 1;
            }
        }
        n
    }

    pub fn snapshot(&self) -> DogConfigSnapshot {
        DogConfigSnapshot::new(self.values.clone())
    }
}

/// Read-only copy of the config taken when a call starts.
#[derive(Debug, Clone, Default)]
pub struct DogConfigSnapshot {
    map: HashMap<String, String>,
}

impl DogConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }

    /// Decode a JSON-valued key. `None` if the key is absent.
    #[cfg(feature = "serde")]
    pub fn get_json<T>(&self, key: &str) -> Option<Result<T, serde_json::Error>>
    where
        T: serde::de::DeserializeOwned,
    {
        self.get(key).map(serde_json::from_str)
    }
}
