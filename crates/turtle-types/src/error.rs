use thiserror::Error;

use crate::value::ValueType;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("value mismatch for '{property}': expected {expected}, found {found}")]
    ValueMismatch {
        property: &'static str,
        expected: ValueType,
        found: ValueType,
    },

    #[error("value for '{property}' out of range: {value}")]
    OutOfRange { property: &'static str, value: i64 },

    #[error("unknown property: {0}")]
    UnknownProperty(String),

    #[error("unknown credential type: {0}")]
    UnknownCredentialType(i64),
}
