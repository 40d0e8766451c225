use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;
use turtle_types::{CredentialId, Event, EventKind, EventValue, NewEvent, Property};

use crate::error::{LogError, LogResult};
use crate::traits::{EventLog, ValuePredicate};

/// In-memory event log for tests, local demos, and embedding.
///
/// Events are held in sequence order. A per-entity position index and a
/// latest-per-(entity, property) index keep the contract's reads cheap.
pub struct InMemoryEventLog {
    inner: RwLock<LogState>,
}

#[derive(Default)]
struct LogState {
    events: Vec<Event>,
    by_entity: HashMap<CredentialId, Vec<usize>>,
    latest: HashMap<(CredentialId, Property), usize>,
}

impl LogState {
    fn head(&self) -> u64 {
        self.events.last().map(|e| e.sequence).unwrap_or(0)
    }

    fn push(&mut self, event: Event) {
        let position = self.events.len();
        self.by_entity.entry(event.entity_id).or_default().push(position);
        if let Some(property) = event.property {
            self.latest.insert((event.entity_id, property), position);
        }
        self.events.push(event);
    }

    fn latest_value(
        &self,
        entity_type: &str,
        id: CredentialId,
        property: Property,
    ) -> Option<&EventValue> {
        self.latest
            .get(&(id, property))
            .map(|&position| &self.events[position])
            .filter(|event| event.entity_type == entity_type)
            .map(|event| &event.value)
    }
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LogState::default()),
        }
    }

    /// Number of committed events.
    pub fn len(&self) -> LogResult<usize> {
        Ok(self.read()?.events.len())
    }

    pub fn is_empty(&self) -> LogResult<bool> {
        Ok(self.read()?.events.is_empty())
    }

    /// Stamp and commit a batch under the write lock.
    ///
    /// `persist` runs after the batch is stamped and before it becomes
    /// visible; if it fails nothing is applied. Durable logs use it to write
    /// ahead.
    pub(crate) fn append_with<F>(
        &self,
        actor: &str,
        events: Vec<NewEvent>,
        persist: F,
    ) -> LogResult<Vec<Event>>
    where
        F: FnOnce(&[Event]) -> LogResult<()>,
    {
        validate_batch(&events)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.write()?;
        let first = state.head() + 1;
        let stamped: Vec<Event> = events
            .into_iter()
            .zip(first..)
            .map(|(event, sequence)| event.sequenced(sequence, actor))
            .collect();

        persist(&stamped)?;

        for event in &stamped {
            state.push(event.clone());
        }

        debug!(actor, first, count = stamped.len(), "batch appended");
        Ok(stamped)
    }

    /// Re-apply an already committed batch (WAL recovery).
    pub(crate) fn restore(&self, batch: Vec<Event>) -> LogResult<()> {
        let mut state = self.write()?;
        let mut expected = state.head() + 1;
        for event in &batch {
            if event.sequence != expected {
                return Err(LogError::Corrupt {
                    sequence: event.sequence,
                    reason: format!("expected sequence {expected}"),
                });
            }
            expected += 1;
        }
        for event in batch {
            state.push(event);
        }
        Ok(())
    }

    fn read(&self) -> LogResult<std::sync::RwLockReadGuard<'_, LogState>> {
        self.inner.read().map_err(|_| LogError::LockPoisoned)
    }

    fn write(&self) -> LogResult<std::sync::RwLockWriteGuard<'_, LogState>> {
        self.inner.write().map_err(|_| LogError::LockPoisoned)
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or(0);
        f.debug_struct("InMemoryEventLog")
            .field("event_count", &count)
            .finish()
    }
}

/// Reject malformed batches before anything is stamped.
pub(crate) fn validate_batch(events: &[NewEvent]) -> LogResult<()> {
    for event in events {
        if event.entity_type.is_empty() {
            return Err(LogError::AppendRejected(format!(
                "event for {} has no entity type",
                event.entity_id
            )));
        }
        if event.kind == EventKind::Delete && event.property.is_some() {
            return Err(LogError::AppendRejected(format!(
                "delete for {} must not name a property",
                event.entity_id
            )));
        }
        if event.kind == EventKind::Edit && event.property.is_none() {
            return Err(LogError::AppendRejected(format!(
                "edit for {} must name a property",
                event.entity_id
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, actor: &str, events: Vec<NewEvent>) -> LogResult<Vec<Event>> {
        self.append_with(actor, events, |_| Ok(()))
    }

    async fn head(&self) -> LogResult<u64> {
        Ok(self.read()?.head())
    }

    async fn query_by_entity_ids(&self, ids: &BTreeSet<CredentialId>) -> LogResult<Vec<Event>> {
        let state = self.read()?;
        let mut positions: Vec<usize> = ids
            .iter()
            .filter_map(|id| state.by_entity.get(id))
            .flatten()
            .copied()
            .collect();
        positions.sort_unstable();
        Ok(positions.into_iter().map(|p| state.events[p].clone()).collect())
    }

    async fn query_latest_property_by_value(
        &self,
        entity_type: &str,
        property: Property,
        predicate: &ValuePredicate,
    ) -> LogResult<Vec<(CredentialId, EventValue)>> {
        let state = self.read()?;
        let mut out: Vec<(CredentialId, EventValue)> = state
            .latest
            .iter()
            .filter(|((_, p), _)| *p == property)
            .map(|(_, &position)| &state.events[position])
            .filter(|event| event.entity_type == entity_type && predicate.matches(&event.value))
            .map(|event| (event.entity_id, event.value.clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        Ok(out)
    }

    async fn query_latest_property_of(
        &self,
        entity_type: &str,
        property: Property,
        ids: &BTreeSet<CredentialId>,
    ) -> LogResult<Vec<(CredentialId, EventValue)>> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|&id| {
                state
                    .latest_value(entity_type, id, property)
                    .map(|value| (id, value.clone()))
            })
            .collect())
    }

    async fn query_descendant_closure(
        &self,
        root_ids: &BTreeSet<CredentialId>,
    ) -> LogResult<BTreeSet<CredentialId>> {
        let state = self.read()?;

        // Invert the current parent edges once, then walk them.
        let mut children: HashMap<CredentialId, Vec<CredentialId>> = HashMap::new();
        for (&(id, property), &position) in &state.latest {
            if property != Property::ParentId {
                continue;
            }
            if let EventValue::Uuid(parent) = state.events[position].value {
                children.entry(CredentialId::from_uuid(parent)).or_default().push(id);
            }
        }

        let mut closure = root_ids.clone();
        let mut stack: Vec<CredentialId> = root_ids.iter().copied().collect();
        while let Some(id) = stack.pop() {
            for &child in children.get(&id).into_iter().flatten() {
                if closure.insert(child) {
                    stack.push(child);
                }
            }
        }
        Ok(closure)
    }

    async fn events_after(&self, cursor: u64) -> LogResult<Vec<Event>> {
        let state = self.read()?;
        let start = state.events.partition_point(|e| e.sequence <= cursor);
        Ok(state.events[start..].to_vec())
    }
}
