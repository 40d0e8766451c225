use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::event::{EventKind, NewEvent, Property};
use crate::id::CredentialId;
use crate::value::EventValue;

/// What a credential node represents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
    /// A generated secret.
    #[default]
    Value,
    /// A container for other credentials.
    Group,
    /// A reference to another credential.
    Ref,
}

impl CredentialType {
    pub fn code(&self) -> i64 {
        match self {
            Self::Value => 0,
            Self::Group => 1,
            Self::Ref => 2,
        }
    }
}

impl TryFrom<i64> for CredentialType {
    type Error = TypeError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Value),
            1 => Ok(Self::Group),
            2 => Ok(Self::Ref),
            other => Err(TypeError::UnknownCredentialType(other)),
        }
    }
}

impl From<CredentialType> for EventValue {
    fn from(t: CredentialType) -> Self {
        EventValue::Integer(t.code())
    }
}

/// Current state of one credential, folded from its events.
///
/// Snapshots are never stored; they are rebuilt from the log per request.
/// `parent_id` is a weak reference: ownership of children is positional.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: CredentialId,
    pub name: String,
    pub login: String,
    pub key: String,
    pub is_available_upper_latin: bool,
    pub is_available_lower_latin: bool,
    pub is_available_number: bool,
    pub is_available_special_symbols: bool,
    pub custom_available_characters: String,
    pub length: u16,
    pub regex: String,
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    pub order_index: u32,
    pub parent_id: Option<CredentialId>,
}

impl Credential {
    /// A credential with every field at its declared default.
    pub fn empty(id: CredentialId) -> Self {
        Self {
            id,
            name: String::new(),
            login: String::new(),
            key: String::new(),
            is_available_upper_latin: false,
            is_available_lower_latin: false,
            is_available_number: false,
            is_available_special_symbols: false,
            custom_available_characters: String::new(),
            length: 0,
            regex: String::new(),
            credential_type: CredentialType::Value,
            order_index: 0,
            parent_id: None,
        }
    }

    /// Write one field, validating the value against the field's type.
    ///
    /// On error the credential is left unchanged.
    pub fn apply(&mut self, property: Property, value: &EventValue) -> Result<(), TypeError> {
        property.check(value)?;
        let name = property.as_str();
        match property {
            Property::Name => self.name = value.as_string(name)?.to_string(),
            Property::Login => self.login = value.as_string(name)?.to_string(),
            Property::Key => self.key = value.as_string(name)?.to_string(),
            Property::IsAvailableUpperLatin => self.is_available_upper_latin = value.as_bool(name)?,
            Property::IsAvailableLowerLatin => self.is_available_lower_latin = value.as_bool(name)?,
            Property::IsAvailableNumber => self.is_available_number = value.as_bool(name)?,
            Property::IsAvailableSpecialSymbols => {
                self.is_available_special_symbols = value.as_bool(name)?
            }
            Property::CustomAvailableCharacters => {
                self.custom_available_characters = value.as_string(name)?.to_string()
            }
            Property::Length => {
                let n = value.as_integer(name)?;
                self.length = u16::try_from(n)
                    .map_err(|_| TypeError::OutOfRange { property: name, value: n })?;
            }
            Property::Regex => self.regex = value.as_string(name)?.to_string(),
            Property::Type => {
                self.credential_type = CredentialType::try_from(value.as_integer(name)?)?
            }
            Property::OrderIndex => {
                let n = value.as_integer(name)?;
                self.order_index = u32::try_from(n)
                    .map_err(|_| TypeError::OutOfRange { property: name, value: n })?;
            }
            Property::ParentId => self.parent_id = value.as_reference(name)?,
        }
        Ok(())
    }
}

/// Input for creating a credential.
///
/// `id` is optional: when absent the engine assigns a fresh one; when
/// present it must not collide with a live credential.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewCredential {
    pub id: Option<CredentialId>,
    pub name: String,
    pub login: String,
    pub key: String,
    pub is_available_upper_latin: bool,
    pub is_available_lower_latin: bool,
    pub is_available_number: bool,
    pub is_available_special_symbols: bool,
    pub custom_available_characters: String,
    pub length: u16,
    pub regex: String,
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    pub order_index: u32,
    pub parent_id: Option<CredentialId>,
}

impl NewCredential {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn under(mut self, parent_id: Option<CredentialId>, order_index: u32) -> Self {
        self.parent_id = parent_id;
        self.order_index = order_index;
        self
    }

    /// The create marker followed by one Create event per field.
    pub fn to_events(&self, id: CredentialId) -> Vec<NewEvent> {
        let field = |property, value: EventValue| NewEvent::field(EventKind::Create, id, property, value);
        vec![
            NewEvent::create_marker(id),
            field(Property::Name, self.name.as_str().into()),
            field(Property::Login, self.login.as_str().into()),
            field(Property::Key, self.key.as_str().into()),
            field(Property::IsAvailableUpperLatin, self.is_available_upper_latin.into()),
            field(Property::IsAvailableLowerLatin, self.is_available_lower_latin.into()),
            field(Property::IsAvailableNumber, self.is_available_number.into()),
            field(Property::IsAvailableSpecialSymbols, self.is_available_special_symbols.into()),
            field(Property::CustomAvailableCharacters, self.custom_available_characters.as_str().into()),
            field(Property::Length, self.length.into()),
            field(Property::Regex, self.regex.as_str().into()),
            field(Property::Type, self.credential_type.into()),
            field(Property::OrderIndex, self.order_index.into()),
            field(Property::ParentId, EventValue::from_reference(self.parent_id)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_rejects_wrong_type_and_keeps_value() {
        let mut c = Credential::empty(CredentialId::new());
        c.apply(Property::Length, &EventValue::Integer(16)).unwrap();
        assert!(c.apply(Property::Length, &EventValue::from("16")).is_err());
        assert_eq!(c.length, 16);
    }

    #[test]
    fn apply_follows_the_property_schema() {
        let samples = [
            EventValue::Null,
            EventValue::from("x"),
            EventValue::Bool(true),
            EventValue::Integer(1),
            EventValue::from(CredentialId::new()),
        ];
        for property in Property::ALL {
            for value in &samples {
                let mut c = Credential::empty(CredentialId::new());
                let accepted = c.apply(property, value).is_ok();
                assert_eq!(accepted, property.check(value).is_ok(), "{property} <- {value:?}");
            }
        }
        assert!(Property::ParentId.check(&EventValue::Null).is_ok());
        assert!(Property::Name.check(&EventValue::Null).is_err());
    }

    #[test]
    fn apply_rejects_out_of_range_length() {
        let mut c = Credential::empty(CredentialId::new());
        let err = c.apply(Property::Length, &EventValue::Integer(70_000)).unwrap_err();
        assert!(matches!(err, TypeError::OutOfRange { property: "length", .. }));
    }

    #[test]
    fn new_credential_writes_every_field() {
        let id = CredentialId::new();
        let parent = CredentialId::new();
        let events = NewCredential::named("mail").under(Some(parent), 3).to_events(id);
        assert_eq!(events.len(), 1 + Property::ALL.len());
        assert!(events[0].property.is_none());

        let mut c = Credential::empty(id);
        for e in &events[1..] {
            c.apply(e.property.unwrap(), &e.value).unwrap();
        }
        assert_eq!(c.name, "mail");
        assert_eq!(c.order_index, 3);
        assert_eq!(c.parent_id, Some(parent));
    }

    #[test]
    fn credential_type_codes_roundtrip() {
        for t in [CredentialType::Value, CredentialType::Group, CredentialType::Ref] {
            assert_eq!(CredentialType::try_from(t.code()).unwrap(), t);
        }
        assert_eq!(
            CredentialType::try_from(9).unwrap_err(),
            TypeError::UnknownCredentialType(9)
        );
    }
}
