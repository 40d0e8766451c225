//! Log wrappers shared by the engine's tests.

use std::collections::BTreeSet;

use async_trait::async_trait;
use turtle_log::{EventLog, InMemoryEventLog, LogResult, ValuePredicate};
use turtle_types::{CredentialId, Event, EventValue, NewEvent, Property};

use crate::cancel::CancelHandle;

/// Fires `handle` the first time a parent-pointer lookup reaches the log,
/// simulating a caller that gives up while a request is in flight.
pub(crate) struct CancelOnLookup {
    pub(crate) inner: InMemoryEventLog,
    pub(crate) handle: CancelHandle,
}

impl CancelOnLookup {
    pub(crate) fn new(inner: InMemoryEventLog) -> Self {
        Self {
            inner,
            handle: CancelHandle::new(),
        }
    }
}

#[async_trait]
impl EventLog for CancelOnLookup {
    async fn append(&self, actor: &str, events: Vec<NewEvent>) -> LogResult<Vec<Event>> {
        self.inner.append(actor, events).await
    }

    async fn head(&self) -> LogResult<u64> {
        self.inner.head().await
    }

    async fn query_by_entity_ids(&self, ids: &BTreeSet<CredentialId>) -> LogResult<Vec<Event>> {
        self.inner.query_by_entity_ids(ids).await
    }

    async fn query_latest_property_by_value(
        &self,
        entity_type: &str,
        property: Property,
        predicate: &ValuePredicate,
    ) -> LogResult<Vec<(CredentialId, EventValue)>> {
        self.handle.cancel();
        self.inner
            .query_latest_property_by_value(entity_type, property, predicate)
            .await
    }

    async fn query_latest_property_of(
        &self,
        entity_type: &str,
        property: Property,
        ids: &BTreeSet<CredentialId>,
    ) -> LogResult<Vec<(CredentialId, EventValue)>> {
        self.handle.cancel();
        self.inner.query_latest_property_of(entity_type, property, ids).await
    }

    async fn events_after(&self, cursor: u64) -> LogResult<Vec<Event>> {
        self.inner.events_after(cursor).await
    }
}
