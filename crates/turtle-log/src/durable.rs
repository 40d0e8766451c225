use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use tracing::info;
use turtle_types::{CredentialId, Event, EventValue, NewEvent, Property};

use crate::error::LogResult;
use crate::memory::InMemoryEventLog;
use crate::traits::{EventLog, ValuePredicate};
use crate::wal::{WalConfig, WalEntry, WriteAheadLog};

/// Event log persisted to a write-ahead log and served from memory.
///
/// Every append is written to the WAL as one record before it becomes
/// visible. Opening replays the WAL into the in-memory indexes.
pub struct WalEventLog {
    wal: WriteAheadLog,
    memory: InMemoryEventLog,
}

impl WalEventLog {
    pub fn open(path: &Path, config: WalConfig) -> LogResult<Self> {
        let wal = WriteAheadLog::open(path, config)?;
        let memory = InMemoryEventLog::new();

        let entries = wal.recover()?;
        let batches = entries.len();
        for WalEntry { batch } in entries {
            memory.restore(batch)?;
        }

        info!(
            path = %path.display(),
            batches,
            bytes = wal.offset()?,
            events = memory.len()?,
            "event log recovered"
        );
        Ok(Self { wal, memory })
    }
}

impl std::fmt::Debug for WalEventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalEventLog")
            .field("wal", &self.wal)
            .field("memory", &self.memory)
            .finish()
    }
}

#[async_trait]
impl EventLog for WalEventLog {
    async fn append(&self, actor: &str, events: Vec<NewEvent>) -> LogResult<Vec<Event>> {
        self.memory.append_with(actor, events, |batch| {
            self.wal
                .append(&WalEntry {
                    batch: batch.to_vec(),
                })
                .map(|_| ())
        })
    }

    async fn head(&self) -> LogResult<u64> {
        self.memory.head().await
    }

    async fn query_by_entity_ids(&self, ids: &BTreeSet<CredentialId>) -> LogResult<Vec<Event>> {
        self.memory.query_by_entity_ids(ids).await
    }

    async fn query_latest_property_by_value(
        &self,
        entity_type: &str,
        property: Property,
        predicate: &ValuePredicate,
    ) -> LogResult<Vec<(CredentialId, EventValue)>> {
        self.memory
            .query_latest_property_by_value(entity_type, property, predicate)
            .await
    }

    async fn query_latest_property_of(
        &self,
        entity_type: &str,
        property: Property,
        ids: &BTreeSet<CredentialId>,
    ) -> LogResult<Vec<(CredentialId, EventValue)>> {
        self.memory.query_latest_property_of(entity_type, property, ids).await
    }

    async fn query_descendant_closure(
        &self,
        root_ids: &BTreeSet<CredentialId>,
    ) -> LogResult<BTreeSet<CredentialId>> {
        self.memory.query_descendant_closure(root_ids).await
    }

    async fn events_after(&self, cursor: u64) -> LogResult<Vec<Event>> {
        self.memory.events_after(cursor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogError;
    use crate::wal::SyncMode;
    use turtle_types::{EventKind, NewCredential};

    #[tokio::test]
    async fn reopen_restores_events_and_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turtle.wal");
        let id = CredentialId::new();

        {
            let log = WalEventLog::open(&path, WalConfig::default()).unwrap();
            log.append("Service", NewCredential::named("bank").to_events(id))
                .await
                .unwrap();
            log.append(
                "Service",
                vec![NewEvent::field(EventKind::Edit, id, Property::Name, "bank-2")],
            )
            .await
            .unwrap();
        }

        let log = WalEventLog::open(&path, WalConfig::default()).unwrap();
        assert_eq!(log.head().await.unwrap(), 15);
        let names = log
            .query_latest_property_of("credential", Property::Name, &BTreeSet::from([id]))
            .await
            .unwrap();
        assert_eq!(names, vec![(id, EventValue::from("bank-2"))]);

        let next = log
            .append("Service", vec![NewEvent::delete_marker(id)])
            .await
            .unwrap();
        assert_eq!(next[0].sequence, 16);
    }

    #[tokio::test]
    async fn rejected_batch_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turtle.wal");
        let config = WalConfig {
            sync_mode: SyncMode::EveryWrite,
        };
        let log = WalEventLog::open(&path, config.clone()).unwrap();
        let id = CredentialId::new();
        let mut bad = NewEvent::create_marker(id);
        bad.entity_type.clear();

        assert!(matches!(
            log.append("Service", vec![bad]).await,
            Err(LogError::AppendRejected(_))
        ));
        drop(log);

        let log = WalEventLog::open(&path, config).unwrap();
        assert_eq!(log.head().await.unwrap(), 0);
    }
}
