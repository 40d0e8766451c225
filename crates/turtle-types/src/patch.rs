use serde::{Deserialize, Deserializer, Serialize};

use crate::credential::CredentialType;
use crate::event::{EventKind, NewEvent, Property};
use crate::id::CredentialId;
use crate::value::EventValue;

/// Sparse edit of a credential.
///
/// Every field is independently optional: `None` leaves the field
/// untouched, `Some(v)` writes `v`. A patch with no fields set is a no-op.
/// `parent_id` is doubly optional so that `Some(None)` moves the credential
/// to the root group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_available_upper_latin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_available_lower_latin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_available_number: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_available_special_symbols: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_available_characters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub credential_type: Option<CredentialType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_index: Option<u32>,
    #[serde(
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Option<CredentialId>>,
}

impl EditPatch {
    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }

    /// Number of fields this patch writes.
    pub fn field_count(&self) -> usize {
        self.writes().len()
    }

    /// One Edit event per set field, in declaration order.
    pub fn to_events(&self, id: CredentialId) -> Vec<NewEvent> {
        self.writes()
            .into_iter()
            .map(|(property, value)| NewEvent::field(EventKind::Edit, id, property, value))
            .collect()
    }

    fn writes(&self) -> Vec<(Property, EventValue)> {
        let mut out = Vec::new();
        if let Some(v) = &self.name {
            out.push((Property::Name, v.as_str().into()));
        }
        if let Some(v) = &self.login {
            out.push((Property::Login, v.as_str().into()));
        }
        if let Some(v) = &self.key {
            out.push((Property::Key, v.as_str().into()));
        }
        if let Some(v) = self.is_available_upper_latin {
            out.push((Property::IsAvailableUpperLatin, v.into()));
        }
        if let Some(v) = self.is_available_lower_latin {
            out.push((Property::IsAvailableLowerLatin, v.into()));
        }
        if let Some(v) = self.is_available_number {
            out.push((Property::IsAvailableNumber, v.into()));
        }
        if let Some(v) = self.is_available_special_symbols {
            out.push((Property::IsAvailableSpecialSymbols, v.into()));
        }
        if let Some(v) = &self.custom_available_characters {
            out.push((Property::CustomAvailableCharacters, v.as_str().into()));
        }
        if let Some(v) = self.length {
            out.push((Property::Length, v.into()));
        }
        if let Some(v) = &self.regex {
            out.push((Property::Regex, v.as_str().into()));
        }
        if let Some(v) = self.credential_type {
            out.push((Property::Type, v.into()));
        }
        if let Some(v) = self.order_index {
            out.push((Property::OrderIndex, v.into()));
        }
        if let Some(v) = self.parent_id {
            out.push((Property::ParentId, EventValue::from_reference(v)));
        }
        out
    }
}

// A present `null` must stay distinguishable from an absent key.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<CredentialId>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<CredentialId>::deserialize(deserializer).map(Some)
}
