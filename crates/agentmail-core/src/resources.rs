//! Bundled agent resources.
//!
//! The agent ships a manifest and one JSON schema per message type. They are
//! read through a [`ResourceLoader`] so hosts can substitute their own.

use serde::Deserialize;
use std::collections::HashMap;

/// Path of the agent manifest.
pub const MANIFEST_PATH: &str = "manifest.json";

/// Path of the `send-mail` command schema.
pub const SEND_MAIL_SCHEMA_PATH: &str = "schema/send-mail-command.json";

/// Path of the `mail-sent` event schema.
pub const MAIL_SENT_SCHEMA_PATH: &str = "schema/mail-sent-event.json";

/// Resource lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    /// No resource exists at this path.
    #[error("resource not found: {0}")]
    NotFound(String),
}

/// Source of named resource documents.
pub trait ResourceLoader: Send + Sync {
    /// Returns the bytes of the resource at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] for unknown paths.
    fn load(&self, path: &str) -> Result<Vec<u8>, ResourceError>;
}

/// Identity of the agent, as declared in its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentManifest {
    /// Unique agent identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Agent version.
    pub version: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
}

/// Resources compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedResources;

impl ResourceLoader for EmbeddedResources {
    fn load(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let bytes: &[u8] = match path {
            MANIFEST_PATH => include_bytes!("../resources/manifest.json"),
            SEND_MAIL_SCHEMA_PATH => include_bytes!("../resources/schema/send-mail-command.json"),
            MAIL_SENT_SCHEMA_PATH => include_bytes!("../resources/schema/mail-sent-event.json"),
            _ => return Err(ResourceError::NotFound(path.to_string())),
        };
        Ok(bytes.to_vec())
    }
}

/// Resources held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryResources {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryResources {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies every embedded resource.
    #[must_use]
    pub fn embedded() -> Self {
        let mut resources = Self::new();
        for path in [MANIFEST_PATH, SEND_MAIL_SCHEMA_PATH, MAIL_SENT_SCHEMA_PATH] {
            if let Ok(bytes) = EmbeddedResources.load(path) {
                resources.entries.insert(path.to_string(), bytes);
            }
        }
        resources
    }

    /// Adds or replaces a resource.
    #[must_use]
    pub fn with(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(path.into(), bytes.into());
        self
    }

    /// Removes a resource.
    #[must_use]
    pub fn without(mut self, path: &str) -> Self {
        self.entries.remove(path);
        self
    }
}

impl ResourceLoader for MemoryResources {
    fn load(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(path.to_string()))
    }
}
