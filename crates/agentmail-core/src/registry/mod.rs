//! Type registry.
//!
//! Maps logical message names to structural schemas and decodes raw payloads
//! into validated [`TypedValue`]s. The registry is populated once while the
//! agent starts and is only read afterwards: registration needs `&mut self`,
//! so once the registry is shared behind an `Arc` it cannot change.
//!
//! Schemas and types live in separate namespaces. A type binds a message
//! name (`send-mail`) to a registered schema (`send-mail-command`).

mod schema;
mod value;

pub use schema::{Field, FieldType, MessageSchema};
pub use value::{Record, ValidationError, Value};

use std::collections::HashMap;
use std::sync::Arc;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A schema or type with this name is already registered.
    #[error("duplicate name: {0}")]
    DuplicateName(String),

    /// The referenced schema has not been registered.
    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    /// The message name has not been registered as a type.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// A schema definition is malformed.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// A payload does not conform to the schema of its type.
    #[error("invalid `{name}` payload: {source}")]
    Validation {
        /// Message name being decoded.
        name: String,
        /// What was wrong with the payload.
        #[source]
        source: ValidationError,
    },
}

impl RegistryError {
    /// Returns the validation failure, if this is one.
    #[must_use]
    pub const fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Handle to a registered schema.
#[derive(Debug, Clone)]
pub struct SchemaHandle {
    schema: Arc<MessageSchema>,
}

impl SchemaHandle {
    /// Returns the schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &MessageSchema {
        &self.schema
    }
}

/// Handle to a registered message type.
#[derive(Debug, Clone)]
pub struct TypeHandle {
    name: String,
    schema: Arc<MessageSchema>,
}

impl TypeHandle {
    /// Returns the message name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the schema bound to this type.
    #[must_use]
    pub fn schema(&self) -> &MessageSchema {
        &self.schema
    }
}

/// A payload decoded against a registered type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    name: String,
    record: Record,
}

impl TypedValue {
    /// Returns the message name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the decoded fields.
    #[must_use]
    pub const fn record(&self) -> &Record {
        &self.record
    }

    /// Consumes the value, returning the decoded fields.
    #[must_use]
    pub fn into_record(self) -> Record {
        self.record
    }
}

/// Message name → schema mapping.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    schemas: HashMap<String, Arc<MessageSchema>>,
    types: HashMap<String, TypeHandle>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if a schema with the same
    /// name exists; the existing entry is left untouched.
    pub fn register_schema(
        &mut self,
        schema: MessageSchema,
    ) -> Result<SchemaHandle, RegistryError> {
        if self.schemas.contains_key(schema.name()) {
            return Err(RegistryError::DuplicateName(schema.name().to_string()));
        }

        let schema = Arc::new(schema);
        self.schemas
            .insert(schema.name().to_string(), Arc::clone(&schema));
        tracing::debug!(
            schema = schema.name(),
            fields = schema.fields().len(),
            "schema registered"
        );
        Ok(SchemaHandle { schema })
    }

    /// Binds a message name to a registered schema.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownSchema`] if the schema is not
    /// registered, or [`RegistryError::DuplicateName`] if the type name is
    /// taken.
    pub fn register_type(
        &mut self,
        name: impl Into<String>,
        schema_name: &str,
    ) -> Result<TypeHandle, RegistryError> {
        let name = name.into();
        let schema = self
            .schemas
            .get(schema_name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownSchema(schema_name.to_string()))?;
        if self.types.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let handle = TypeHandle {
            name: name.clone(),
            schema,
        };
        self.types.insert(name, handle.clone());
        tracing::debug!(message_type = handle.name(), schema = schema_name, "type registered");
        Ok(handle)
    }

    /// Returns true if `name` is a registered message type.
    #[must_use]
    pub fn contains_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Looks up a registered message type.
    #[must_use]
    pub fn type_handle(&self, name: &str) -> Option<&TypeHandle> {
        self.types.get(name)
    }

    /// Decodes a JSON payload as the named message type.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownType`] for unregistered names and
    /// [`RegistryError::Validation`] for non-conforming payloads.
    pub fn decode(
        &self,
        name: &str,
        payload: &serde_json::Value,
    ) -> Result<TypedValue, RegistryError> {
        let handle = self
            .types
            .get(name)
            .ok_or_else(|| RegistryError::UnknownType(name.to_string()))?;
        let record = handle
            .schema
            .validate(payload)
            .map_err(|source| RegistryError::Validation {
                name: name.to_string(),
                source,
            })?;
        Ok(TypedValue {
            name: name.to_string(),
            record,
        })
    }

    /// Decodes raw JSON bytes as the named message type.
    ///
    /// # Errors
    ///
    /// Same as [`decode`](Self::decode); bytes that are not JSON are a
    /// [`ValidationError::InvalidJson`].
    pub fn decode_bytes(&self, name: &str, raw: &[u8]) -> Result<TypedValue, RegistryError> {
        if !self.contains_type(name) {
            return Err(RegistryError::UnknownType(name.to_string()));
        }
        let payload: serde_json::Value =
            serde_json::from_slice(raw).map_err(|e| RegistryError::Validation {
                name: name.to_string(),
                source: ValidationError::InvalidJson(e.to_string()),
            })?;
        self.decode(name, &payload)
    }
}
