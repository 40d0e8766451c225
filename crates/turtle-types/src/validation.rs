use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::CredentialId;

/// Recoverable, per-item failure reported alongside a batch's results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ValidationError {
    /// The id does not resolve to a live credential.
    NotFound { id: CredentialId },
    /// A create tried to reuse an id that is already taken.
    AlreadyExists { id: CredentialId },
    /// Walking parents from this id never reached a root.
    CyclicHierarchy { id: CredentialId },
    /// A reorder at this start id would push sibling positions past `u32::MAX`.
    OrderOverflow { id: CredentialId },
}

impl ValidationError {
    pub fn id(&self) -> CredentialId {
        match self {
            Self::NotFound { id }
            | Self::AlreadyExists { id }
            | Self::CyclicHierarchy { id }
            | Self::OrderOverflow { id } => *id,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "not found: {id}"),
            Self::AlreadyExists { id } => write!(f, "already exists: {id}"),
            Self::CyclicHierarchy { id } => write!(f, "cyclic hierarchy at {id}"),
            Self::OrderOverflow { id } => write!(f, "order index overflow at {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_tagged_by_kind() {
        let id = CredentialId::new();
        let json = serde_json::to_value(ValidationError::NotFound { id }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "notFound", "id": id.to_string()}));
    }
}
