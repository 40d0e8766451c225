use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;
use turtle_types::{CredentialId, Event, EventValue, NewEvent, Property};

use crate::error::{LogError, LogResult};
use crate::memory::validate_batch;
use crate::traits::{EventLog, ValuePredicate};

/// A unit of work over a base log.
///
/// Appends are buffered with provisional sequences following the base
/// head observed at [`begin`](Self::begin). Every query answers over the
/// base log plus the buffer, so later steps of a batch see the effects of
/// earlier ones. Buffered events are always reported above the highest
/// base sequence a query returns, so they outrank anything another writer
/// commits in the meantime. [`commit`](Self::commit) hands the whole
/// buffer to the base in a single append; dropping the transaction
/// discards it.
pub struct LogTransaction<'a> {
    base: &'a dyn EventLog,
    actor: String,
    base_head: u64,
    pending: Mutex<Vec<Event>>,
}

impl<'a> LogTransaction<'a> {
    pub async fn begin(base: &'a dyn EventLog, actor: impl Into<String>) -> LogResult<Self> {
        let base_head = base.head().await?;
        Ok(Self {
            base,
            actor: actor.into(),
            base_head,
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Number of buffered events.
    fn pending_len(&self) -> LogResult<usize> {
        Ok(self.pending()?.len())
    }

    /// Append the buffer to the base log. Returns the committed events; an
    /// empty buffer commits nothing.
    pub async fn commit(self) -> LogResult<Vec<Event>> {
        let pending = self
            .pending
            .into_inner()
            .map_err(|_| LogError::LockPoisoned)?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let events: Vec<NewEvent> = pending.into_iter().map(unstamp).collect();
        let committed = self.base.append(&self.actor, events).await?;
        debug!(actor = %self.actor, count = committed.len(), "transaction committed");
        Ok(committed)
    }

    fn pending(&self) -> LogResult<std::sync::MutexGuard<'_, Vec<Event>>> {
        self.pending.lock().map_err(|_| LogError::LockPoisoned)
    }

    /// Buffered events accepted by `keep`, restamped so the first one sits
    /// directly above `floor` when the base has moved past `base_head`.
    fn overlay(&self, floor: u64, keep: impl Fn(&Event) -> bool) -> LogResult<Vec<Event>> {
        let shift = floor.saturating_sub(self.base_head);
        let pending = self.pending()?;
        Ok(pending
            .iter()
            .filter(|e| keep(e))
            .map(|e| {
                let mut event = e.clone();
                event.sequence += shift;
                event
            })
            .collect())
    }

    /// Latest buffered value per entity for `property`.
    fn pending_latest(
        &self,
        entity_type: &str,
        property: Property,
    ) -> LogResult<BTreeMap<CredentialId, EventValue>> {
        let pending = self.pending()?;
        Ok(pending
            .iter()
            .filter(|e| e.property == Some(property) && e.entity_type == entity_type)
            .map(|e| (e.entity_id, e.value.clone()))
            .collect())
    }
}

fn unstamp(event: Event) -> NewEvent {
    NewEvent {
        entity_id: event.entity_id,
        entity_type: event.entity_type,
        property: event.property,
        value: event.value,
        kind: event.kind,
    }
}

impl std::fmt::Debug for LogTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogTransaction")
            .field("actor", &self.actor)
            .field("base_head", &self.base_head)
            .field("pending", &self.pending_len().unwrap_or(0))
            .finish()
    }
}

#[async_trait]
impl EventLog for LogTransaction<'_> {
    async fn append(&self, actor: &str, events: Vec<NewEvent>) -> LogResult<Vec<Event>> {
        if actor != self.actor {
            return Err(LogError::ActorMismatch {
                expected: self.actor.clone(),
                actual: actor.to_string(),
            });
        }
        validate_batch(&events)?;

        let mut pending = self.pending()?;
        let first = self.base_head + pending.len() as u64 + 1;
        let stamped: Vec<Event> = events
            .into_iter()
            .zip(first..)
            .map(|(event, sequence)| event.sequenced(sequence, actor))
            .collect();
        pending.extend(stamped.iter().cloned());
        Ok(stamped)
    }

    async fn head(&self) -> LogResult<u64> {
        let base = self.base.head().await?;
        let buffered = self.pending()?.last().map(|e| e.sequence);
        Ok(match buffered {
            Some(sequence) => sequence + base.saturating_sub(self.base_head),
            None => base,
        })
    }

    async fn query_by_entity_ids(&self, ids: &BTreeSet<CredentialId>) -> LogResult<Vec<Event>> {
        let mut events = self.base.query_by_entity_ids(ids).await?;
        let floor = events.iter().map(|e| e.sequence).max().unwrap_or(self.base_head);
        events.extend(self.overlay(floor, |e| ids.contains(&e.entity_id))?);
        Ok(events)
    }

    async fn query_latest_property_by_value(
        &self,
        entity_type: &str,
        property: Property,
        predicate: &ValuePredicate,
    ) -> LogResult<Vec<(CredentialId, EventValue)>> {
        let base = self
            .base
            .query_latest_property_by_value(entity_type, property, predicate)
            .await?;
        let overrides = self.pending_latest(entity_type, property)?;

        let mut merged: BTreeMap<CredentialId, EventValue> = base
            .into_iter()
            .filter(|(id, _)| !overrides.contains_key(id))
            .collect();
        merged.extend(overrides.into_iter().filter(|(_, v)| predicate.matches(v)));
        Ok(merged.into_iter().collect())
    }

    async fn query_latest_property_of(
        &self,
        entity_type: &str,
        property: Property,
        ids: &BTreeSet<CredentialId>,
    ) -> LogResult<Vec<(CredentialId, EventValue)>> {
        let base = self
            .base
            .query_latest_property_of(entity_type, property, ids)
            .await?;
        let mut merged: BTreeMap<CredentialId, EventValue> = base.into_iter().collect();
        merged.extend(
            self.pending_latest(entity_type, property)?
                .into_iter()
                .filter(|(id, _)| ids.contains(id)),
        );
        Ok(merged.into_iter().collect())
    }

    async fn events_after(&self, cursor: u64) -> LogResult<Vec<Event>> {
        let mut events = self.base.events_after(cursor).await?;
        let floor = events.last().map_or(self.base_head, |e| e.sequence);
        let buffered = self.overlay(floor, |_| true)?;
        events.extend(buffered.into_iter().filter(|e| e.sequence > cursor));
        Ok(events)
    }
}
