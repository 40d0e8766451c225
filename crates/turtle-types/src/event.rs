use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::CredentialId;
use crate::value::{EventValue, ValueType};

/// Schema tag carried by every credential event.
pub const CREDENTIAL_ENTITY_TYPE: &str = "credential";

/// Lifecycle classification of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Create,
    Edit,
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "Create",
            Self::Edit => "Edit",
            Self::Delete => "Delete",
        };
        write!(f, "{s}")
    }
}

/// A credential field that events can write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Property {
    Name,
    Login,
    Key,
    IsAvailableUpperLatin,
    IsAvailableLowerLatin,
    IsAvailableNumber,
    IsAvailableSpecialSymbols,
    CustomAvailableCharacters,
    Length,
    Regex,
    Type,
    OrderIndex,
    ParentId,
}

impl Property {
    pub const ALL: [Property; 13] = [
        Self::Name,
        Self::Login,
        Self::Key,
        Self::IsAvailableUpperLatin,
        Self::IsAvailableLowerLatin,
        Self::IsAvailableNumber,
        Self::IsAvailableSpecialSymbols,
        Self::CustomAvailableCharacters,
        Self::Length,
        Self::Regex,
        Self::Type,
        Self::OrderIndex,
        Self::ParentId,
    ];

    /// Stable field name as stored in the log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Login => "login",
            Self::Key => "key",
            Self::IsAvailableUpperLatin => "isAvailableUpperLatin",
            Self::IsAvailableLowerLatin => "isAvailableLowerLatin",
            Self::IsAvailableNumber => "isAvailableNumber",
            Self::IsAvailableSpecialSymbols => "isAvailableSpecialSymbols",
            Self::CustomAvailableCharacters => "customAvailableCharacters",
            Self::Length => "length",
            Self::Regex => "regex",
            Self::Type => "type",
            Self::OrderIndex => "orderIndex",
            Self::ParentId => "parentId",
        }
    }

    /// The value variant this property accepts. `ParentId` also accepts `Null`.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Name
            | Self::Login
            | Self::Key
            | Self::CustomAvailableCharacters
            | Self::Regex => ValueType::String,
            Self::IsAvailableUpperLatin
            | Self::IsAvailableLowerLatin
            | Self::IsAvailableNumber
            | Self::IsAvailableSpecialSymbols => ValueType::Bool,
            Self::Length | Self::Type | Self::OrderIndex => ValueType::Integer,
            Self::ParentId => ValueType::Uuid,
        }
    }

    /// Fails with [`TypeError::ValueMismatch`] unless `value` has the
    /// variant this property accepts.
    pub fn check(&self, value: &EventValue) -> Result<(), TypeError> {
        let expected = self.value_type();
        let found = value.value_type();
        if found == expected || (*self == Self::ParentId && found == ValueType::Null) {
            Ok(())
        } else {
            Err(TypeError::ValueMismatch {
                property: self.as_str(),
                expected,
                found,
            })
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Property {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| TypeError::UnknownProperty(s.to_string()))
    }
}

/// An immutable, sequenced record in the event log.
///
/// `property` is `None` for whole-entity lifecycle markers (create and
/// delete); otherwise the event writes exactly one field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Strictly increasing, assigned by the log at append time.
    pub sequence: u64,
    pub entity_id: CredentialId,
    pub entity_type: String,
    pub property: Option<Property>,
    pub value: EventValue,
    pub actor: String,
    pub kind: EventKind,
}

impl Event {
    /// Returns `true` for create/delete markers that carry no field.
    pub fn is_lifecycle_marker(&self) -> bool {
        self.property.is_none()
    }
}

/// An event that has not been appended yet. The log assigns `sequence`
/// and `actor` when the batch containing it is committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub entity_id: CredentialId,
    pub entity_type: String,
    pub property: Option<Property>,
    pub value: EventValue,
    pub kind: EventKind,
}

impl NewEvent {
    /// Whole-entity create marker.
    pub fn create_marker(entity_id: CredentialId) -> Self {
        Self {
            entity_id,
            entity_type: CREDENTIAL_ENTITY_TYPE.to_string(),
            property: None,
            value: EventValue::Null,
            kind: EventKind::Create,
        }
    }

    /// Whole-entity delete marker (tombstone).
    pub fn delete_marker(entity_id: CredentialId) -> Self {
        Self {
            entity_id,
            entity_type: CREDENTIAL_ENTITY_TYPE.to_string(),
            property: None,
            value: EventValue::Null,
            kind: EventKind::Delete,
        }
    }

    /// A single field write.
    pub fn field(
        kind: EventKind,
        entity_id: CredentialId,
        property: Property,
        value: impl Into<EventValue>,
    ) -> Self {
        Self {
            entity_id,
            entity_type: CREDENTIAL_ENTITY_TYPE.to_string(),
            property: Some(property),
            value: value.into(),
            kind,
        }
    }

    /// Stamp the event with its committed sequence and actor.
    pub fn sequenced(self, sequence: u64, actor: &str) -> Event {
        Event {
            sequence,
            entity_id: self.entity_id,
            entity_type: self.entity_type,
            property: self.property,
            value: self.value,
            actor: actor.to_string(),
            kind: self.kind,
        }
    }
}
