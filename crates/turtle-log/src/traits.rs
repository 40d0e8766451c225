use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use turtle_types::{CredentialId, Event, EventValue, NewEvent, Property, CREDENTIAL_ENTITY_TYPE};

use crate::error::LogResult;

/// Predicate evaluated against the current value of one property.
///
/// Kept as data rather than a closure so stores can push it down into
/// their own query engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValuePredicate {
    Any,
    IsNull,
    AnyOf(BTreeSet<EventValue>),
}

impl ValuePredicate {
    /// Matches references to any of `ids`; `None` matches a null value.
    pub fn references<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = Option<CredentialId>>,
    {
        Self::AnyOf(ids.into_iter().map(EventValue::from_reference).collect())
    }

    pub fn matches(&self, value: &EventValue) -> bool {
        match self {
            Self::Any => true,
            Self::IsNull => value.is_null(),
            Self::AnyOf(values) => values.contains(value),
        }
    }
}

/// The event-log contract consumed by the engine.
///
/// Implementations must guarantee that one `append` call is atomic (every
/// event becomes visible or none does), that sequences are assigned in
/// strictly increasing order, and that reads observe a committed prefix.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Atomically append a batch under one actor tag. Returns the events as
    /// committed, with their assigned sequences.
    async fn append(&self, actor: &str, events: Vec<NewEvent>) -> LogResult<Vec<Event>>;

    /// Highest committed sequence, or 0 for an empty log.
    async fn head(&self) -> LogResult<u64>;

    /// All events for the given entities, in sequence order.
    async fn query_by_entity_ids(&self, ids: &BTreeSet<CredentialId>) -> LogResult<Vec<Event>>;

    /// Entities whose most recent `property` event has a value matching
    /// `predicate`, with that value.
    async fn query_latest_property_by_value(
        &self,
        entity_type: &str,
        property: Property,
        predicate: &ValuePredicate,
    ) -> LogResult<Vec<(CredentialId, EventValue)>>;

    /// Current value of `property` for each of `ids` that has one.
    async fn query_latest_property_of(
        &self,
        entity_type: &str,
        property: Property,
        ids: &BTreeSet<CredentialId>,
    ) -> LogResult<Vec<(CredentialId, EventValue)>>;

    /// `root_ids` plus every entity reachable from them by following
    /// current parent edges downward.
    ///
    /// The default expands a frontier one level per round-trip until a
    /// pass adds nothing new. Stores with a recursive query capability
    /// should override it.
    async fn query_descendant_closure(
        &self,
        root_ids: &BTreeSet<CredentialId>,
    ) -> LogResult<BTreeSet<CredentialId>> {
        let mut closure = root_ids.clone();
        let mut frontier: HashSet<CredentialId> = root_ids.iter().copied().collect();

        while !frontier.is_empty() {
            let predicate = ValuePredicate::references(frontier.iter().map(|id| Some(*id)));
            let children = self
                .query_latest_property_by_value(
                    CREDENTIAL_ENTITY_TYPE,
                    Property::ParentId,
                    &predicate,
                )
                .await?;
            frontier = children
                .into_iter()
                .map(|(id, _)| id)
                .filter(|id| closure.insert(*id))
                .collect();
        }

        Ok(closure)
    }

    /// Change feed: every event with `sequence > cursor`, in order.
    async fn events_after(&self, cursor: u64) -> LogResult<Vec<Event>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_match_null_and_ids() {
        let id = CredentialId::new();
        let predicate = ValuePredicate::references([None, Some(id)]);
        assert!(predicate.matches(&EventValue::Null));
        assert!(predicate.matches(&EventValue::from(id)));
        assert!(!predicate.matches(&EventValue::from(CredentialId::new())));
    }

    #[test]
    fn is_null_only_matches_null() {
        assert!(ValuePredicate::IsNull.matches(&EventValue::Null));
        assert!(!ValuePredicate::IsNull.matches(&EventValue::Bool(false)));
        assert!(ValuePredicate::Any.matches(&EventValue::Bool(false)));
    }
}
