//! Agent configuration.
//!
//! Configuration is a flat string key/value store. Hosts provide their own
//! [`ConfigStore`]; [`MemoryConfig`] covers tests and simple embeddings.
//! Values are read when they are needed, so a change takes effect on the
//! next command.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Key holding the mail server URI.
pub const MAILSERVER_KEY: &str = "mailserver";

/// Mail server used when none is configured.
pub const DEFAULT_MAILSERVER: &str = "smtp://localhost:25/";

/// Read access to agent configuration.
pub trait ConfigStore: Send + Sync {
    /// Returns the value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;

    /// Returns the value for `key`, or `default` if unset.
    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }
}

/// In-memory configuration with per-key defaults.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    values: RwLock<HashMap<String, String>>,
    defaults: RwLock<HashMap<String, String>>,
}

impl MemoryConfig {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with the agent's defaults registered.
    #[must_use]
    pub fn with_agent_defaults() -> Self {
        let config = Self::new();
        config.set_default(MAILSERVER_KEY, DEFAULT_MAILSERVER);
        config
    }

    /// Sets a value, overriding any default.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Removes a value; the default, if any, applies again.
    pub fn unset(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Registers the value returned when `key` is unset.
    pub fn set_default(&self, key: impl Into<String>, value: impl Into<String>) {
        self.defaults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }
}

impl ConfigStore for MemoryConfig {
    fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Some(value.clone());
        }
        self.defaults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}
