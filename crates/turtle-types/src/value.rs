use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::CredentialId;

/// Polymorphic value carried by an [`Event`](crate::Event).
///
/// The log stores one value column for every property; which variant is
/// valid depends on the property. Consumers read it back through the typed
/// accessors below, which fail with [`TypeError::ValueMismatch`] rather
/// than coercing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum EventValue {
    Null,
    String(String),
    Bool(bool),
    Integer(i64),
    Uuid(uuid::Uuid),
}

/// Discriminant of an [`EventValue`], used in error reporting and in the
/// per-property schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    String,
    Bool,
    Integer,
    Uuid,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Uuid => "uuid",
        };
        write!(f, "{s}")
    }
}

impl EventValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::String(_) => ValueType::String,
            Self::Bool(_) => ValueType::Bool,
            Self::Integer(_) => ValueType::Integer,
            Self::Uuid(_) => ValueType::Uuid,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Encode an optional credential reference (`None` becomes `Null`).
    pub fn from_reference(id: Option<CredentialId>) -> Self {
        match id {
            Some(id) => Self::Uuid(*id.as_uuid()),
            None => Self::Null,
        }
    }

    pub fn as_string(&self, property: &'static str) -> Result<&str, TypeError> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(mismatch(property, ValueType::String, other)),
        }
    }

    pub fn as_bool(&self, property: &'static str) -> Result<bool, TypeError> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(mismatch(property, ValueType::Bool, other)),
        }
    }

    pub fn as_integer(&self, property: &'static str) -> Result<i64, TypeError> {
        match self {
            Self::Integer(n) => Ok(*n),
            other => Err(mismatch(property, ValueType::Integer, other)),
        }
    }

    /// Read a nullable credential reference.
    pub fn as_reference(&self, property: &'static str) -> Result<Option<CredentialId>, TypeError> {
        match self {
            Self::Null => Ok(None),
            Self::Uuid(u) => Ok(Some(CredentialId::from_uuid(*u))),
            other => Err(mismatch(property, ValueType::Uuid, other)),
        }
    }
}

impl From<String> for EventValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for EventValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<bool> for EventValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<u16> for EventValue {
    fn from(n: u16) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for EventValue {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<CredentialId> for EventValue {
    fn from(id: CredentialId) -> Self {
        Self::Uuid(*id.as_uuid())
    }
}

fn mismatch(property: &'static str, expected: ValueType, found: &EventValue) -> TypeError {
    TypeError::ValueMismatch {
        property,
        expected,
        found: found.value_type(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_reject_wrong_variant() {
        let v = EventValue::from("twelve");
        let err = v.as_integer("length").unwrap_err();
        assert_eq!(
            err,
            TypeError::ValueMismatch {
                property: "length",
                expected: ValueType::Integer,
                found: ValueType::String,
            }
        );
    }

    #[test]
    fn reference_accepts_null_and_uuid() {
        assert_eq!(EventValue::Null.as_reference("parentId").unwrap(), None);
        let id = CredentialId::new();
        assert_eq!(EventValue::from(id).as_reference("parentId").unwrap(), Some(id));
        assert!(EventValue::Bool(true).as_reference("parentId").is_err());
    }

    #[test]
    fn json_shape_is_tagged() {
        let json = serde_json::to_value(EventValue::Integer(12)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "integer", "value": 12}));
        let json = serde_json::to_value(EventValue::Null).unwrap();
        assert_eq!(json, serde_json::json!({"type": "null"}));
    }
}
