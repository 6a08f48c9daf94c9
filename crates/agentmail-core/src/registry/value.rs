//! Decoded field values and records.

use super::schema::FieldType;
use std::fmt;

/// Reasons a payload does not conform to its schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Payload is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    /// Payload is valid JSON but not an object.
    #[error("payload must be an object, found {found}")]
    NotAnObject {
        /// JSON kind that was found instead.
        found: &'static str,
    },

    /// A declared field is absent.
    #[error("missing field `{field}`")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// A field is present with an incompatible type.
    #[error("field `{field}` must be {expected}, found {found}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Type declared by the schema.
        expected: FieldType,
        /// JSON kind that was found instead.
        found: &'static str,
    },

    /// The payload carries a field the schema does not declare.
    #[error("unknown field `{field}`")]
    UnknownField {
        /// Field name.
        field: String,
    },
}

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string.
    String(String),
    /// 64-bit signed integer.
    Long(i64),
    /// 64-bit float.
    Double(f64),
    /// Boolean.
    Boolean(bool),
}

impl Value {
    /// Returns the string content, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the type this value was decoded as.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::String(_) => FieldType::String,
            Self::Long(_) => FieldType::Long,
            Self::Double(_) => FieldType::Double,
            Self::Boolean(_) => FieldType::Boolean,
        }
    }

    /// Converts back to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Long(n) => serde_json::Value::from(*n),
            Self::Double(n) => serde_json::Value::from(*n),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Long(n) => write!(f, "{n}"),
            Self::Double(n) => write!(f, "{n}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Long(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

/// An ordered set of named values.
///
/// Records produced by the registry hold exactly the schema's fields, in
/// schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Adds a field, replacing any previous value with the same name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
        self
    }

    /// Returns a field value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    /// Returns a string field.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] or
    /// [`ValidationError::TypeMismatch`] when the field is absent or not a
    /// string.
    pub fn get_str(&self, name: &str) -> Result<&str, ValidationError> {
        let value = self.get(name).ok_or_else(|| ValidationError::MissingField {
            field: name.to_string(),
        })?;
        value.as_str().ok_or_else(|| ValidationError::TypeMismatch {
            field: name.to_string(),
            expected: FieldType::String,
            found: value.field_type().as_str(),
        })
    }

    /// Iterates over the fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Converts the record into a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(n, v)| (n.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Name of a JSON value's kind, for error messages.
pub(crate) const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
