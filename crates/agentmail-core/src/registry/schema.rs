//! Message schemas.
//!
//! A schema is a named, ordered list of typed fields. Schema definitions are
//! shipped as JSON documents:
//!
//! ```json
//! {
//!   "name": "mail-sent-event",
//!   "fields": [{ "name": "id", "type": "string" }]
//! }
//! ```

use super::RegistryError;
use super::value::{Record, ValidationError, Value, json_kind};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// Type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// 64-bit signed integer.
    Long,
    /// 64-bit float; any JSON number is accepted.
    Double,
    /// Boolean.
    Boolean,
}

impl FieldType {
    /// Returns the type name as used in schema documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Long => "long",
            Self::Double => "double",
            Self::Boolean => "boolean",
        }
    }

    /// Decodes a JSON value as this type, without coercion.
    fn decode(self, value: &serde_json::Value) -> Option<Value> {
        match (self, value) {
            (Self::String, serde_json::Value::String(s)) => Some(Value::String(s.clone())),
            (Self::Long, serde_json::Value::Number(n)) => n.as_i64().map(Value::Long),
            (Self::Double, serde_json::Value::Number(n)) => n.as_f64().map(Value::Double),
            (Self::Boolean, serde_json::Value::Bool(b)) => Some(Value::Boolean(*b)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, typed schema field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Field type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Structural description of a message.
///
/// Schemas are immutable once built; the registry hands out shared
/// references to them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSchema")]
pub struct MessageSchema {
    name: String,
    doc: Option<String>,
    fields: Vec<Field>,
}

#[derive(Deserialize)]
struct RawSchema {
    name: String,
    #[serde(default)]
    doc: Option<String>,
    fields: Vec<Field>,
}

impl TryFrom<RawSchema> for MessageSchema {
    type Error = RegistryError;

    fn try_from(raw: RawSchema) -> Result<Self, Self::Error> {
        let fields = raw.fields.into_iter().map(|f| (f.name, f.field_type));
        let mut schema = Self::new(raw.name, fields)?;
        schema.doc = raw.doc;
        Ok(schema)
    }
}

impl MessageSchema {
    /// Builds a schema from `(field name, field type)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidSchema`] if the name is empty or a
    /// field name appears twice.
    pub fn new<N, I>(name: impl Into<String>, fields: I) -> Result<Self, RegistryError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, FieldType)>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidSchema("schema name is empty".into()));
        }

        let fields: Vec<Field> = fields
            .into_iter()
            .map(|(n, field_type)| Field {
                name: n.into(),
                field_type,
            })
            .collect();

        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(RegistryError::InvalidSchema(format!(
                    "schema `{name}` declares field `{}` twice",
                    field.name
                )));
            }
        }

        Ok(Self {
            name,
            doc: None,
            fields,
        })
    }

    /// Parses a schema definition document.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidSchema`] if the document is malformed.
    pub fn from_json(definition: &[u8]) -> Result<Self, RegistryError> {
        serde_json::from_slice(definition).map_err(|e| RegistryError::InvalidSchema(e.to_string()))
    }

    /// Returns the schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the schema documentation, if any.
    #[must_use]
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Returns the declared fields in order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Validates a JSON payload and decodes it into a [`Record`].
    ///
    /// Every declared field must be present with a compatible type and no
    /// undeclared field may appear. Nothing is returned unless the whole
    /// payload conforms.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self, payload: &serde_json::Value) -> Result<Record, ValidationError> {
        let serde_json::Value::Object(object) = payload else {
            return Err(ValidationError::NotAnObject {
                found: json_kind(payload),
            });
        };

        if let Some(unknown) = object
            .keys()
            .find(|key| !self.fields.iter().any(|f| &f.name == *key))
        {
            return Err(ValidationError::UnknownField {
                field: unknown.clone(),
            });
        }

        let mut record = Record::new();
        for field in &self.fields {
            let raw = object
                .get(&field.name)
                .ok_or_else(|| ValidationError::MissingField {
                    field: field.name.clone(),
                })?;
            let value =
                field
                    .field_type
                    .decode(raw)
                    .ok_or_else(|| ValidationError::TypeMismatch {
                        field: field.name.clone(),
                        expected: field.field_type,
                        found: json_kind(raw),
                    })?;
            record = record.with(field.name.clone(), value);
        }
        Ok(record)
    }
}
