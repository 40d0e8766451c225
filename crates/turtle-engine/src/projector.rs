use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};
use turtle_log::EventLog;
use turtle_types::{Credential, CredentialId, Event, EventKind, EventValue, Property, CREDENTIAL_ENTITY_TYPE};

use crate::error::EngineResult;

/// Builds current-state snapshots from the event log.
pub struct SnapshotProjector<'a> {
    log: &'a dyn EventLog,
}

impl<'a> SnapshotProjector<'a> {
    pub fn new(log: &'a dyn EventLog) -> Self {
        Self { log }
    }

    /// Snapshots for every live id in `ids`, in one log fetch.
    ///
    /// Ids that are tombstoned or were never created are omitted.
    pub async fn project(
        &self,
        ids: &BTreeSet<CredentialId>,
    ) -> EngineResult<BTreeMap<CredentialId, Credential>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let events = self.log.query_by_entity_ids(ids).await?;
        let event_count = events.len();
        let snapshots = fold_events(events);
        debug!(requested = ids.len(), events = event_count, live = snapshots.len(), "projected snapshots");
        Ok(snapshots)
    }
}

#[derive(Default)]
struct Fold {
    last_create: Option<u64>,
    last_delete: Option<u64>,
    fields: HashMap<Property, (u64, EventValue)>,
}

/// Fold events, in any order, into live snapshots.
///
/// Per field the event with the greatest sequence wins. An entity is live
/// when its newest create is newer than its newest delete. Events for
/// other entity types are ignored.
pub fn fold_events<I>(events: I) -> BTreeMap<CredentialId, Credential>
where
    I: IntoIterator<Item = Event>,
{
    let mut folds: BTreeMap<CredentialId, Fold> = BTreeMap::new();

    for event in events {
        if event.entity_type != CREDENTIAL_ENTITY_TYPE {
            continue;
        }
        let fold = folds.entry(event.entity_id).or_default();
        match event.kind {
            EventKind::Create => bump(&mut fold.last_create, event.sequence),
            EventKind::Delete => bump(&mut fold.last_delete, event.sequence),
            EventKind::Edit => {}
        }
        if let Some(property) = event.property {
            let newer = fold
                .fields
                .get(&property)
                .map_or(true, |(seq, _)| *seq <= event.sequence);
            if newer {
                fold.fields.insert(property, (event.sequence, event.value));
            }
        }
    }

    folds
        .into_iter()
        .filter(|(_, fold)| is_live(fold))
        .map(|(id, fold)| {
            let mut credential = Credential::empty(id);
            for (property, (sequence, value)) in &fold.fields {
                if let Err(e) = credential.apply(*property, value) {
                    warn!(%id, sequence, error = %e, "ignoring malformed field value");
                }
            }
            (id, credential)
        })
        .collect()
}

fn bump(slot: &mut Option<u64>, sequence: u64) {
    *slot = Some(slot.map_or(sequence, |s| s.max(sequence)));
}

fn is_live(fold: &Fold) -> bool {
    match (fold.last_create, fold.last_delete) {
        (Some(created), Some(deleted)) => created > deleted,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use turtle_log::InMemoryEventLog;
    use turtle_types::{EditPatch, NewCredential, NewEvent};

    fn stamp(events: Vec<NewEvent>, first: u64) -> Vec<Event> {
        events
            .into_iter()
            .zip(first..)
            .map(|(e, seq)| e.sequenced(seq, "Service"))
            .collect()
    }

    #[tokio::test]
    async fn latest_sequence_wins_per_field() {
        let log = InMemoryEventLog::new();
        let id = CredentialId::new();
        log.append("Service", NewCredential::named("first").to_events(id)).await.unwrap();
        log.append(
            "Service",
            vec![
                NewEvent::field(EventKind::Edit, id, Property::Name, "second"),
                NewEvent::field(EventKind::Edit, id, Property::Length, 24u16),
            ],
        )
        .await
        .unwrap();

        let snapshots = SnapshotProjector::new(&log).project(&BTreeSet::from([id])).await.unwrap();
        let credential = &snapshots[&id];
        assert_eq!(credential.name, "second");
        assert_eq!(credential.length, 24);
        assert_eq!(credential.login, "");
    }

    #[tokio::test]
    async fn unknown_ids_are_omitted() {
        let log = InMemoryEventLog::new();
        let snapshots = SnapshotProjector::new(&log)
            .project(&BTreeSet::from([CredentialId::new()]))
            .await
            .unwrap();
        assert!(snapshots.is_empty());
    }

    #[test]
    fn input_order_does_not_matter() {
        let id = CredentialId::new();
        let mut events = stamp(NewCredential::named("a").to_events(id), 1);
        events.extend(stamp(
            vec![NewEvent::field(EventKind::Edit, id, Property::Name, "b")],
            15,
        ));
        let forward = fold_events(events.clone());
        events.reverse();
        assert_eq!(fold_events(events), forward);
        assert_eq!(forward[&id].name, "b");
    }

    #[test]
    fn edits_after_a_tombstone_do_not_resurrect() {
        let id = CredentialId::new();
        let mut events = stamp(NewCredential::named("a").to_events(id), 1);
        events.push(NewEvent::delete_marker(id).sequenced(15, "Service"));
        events.push(NewEvent::field(EventKind::Edit, id, Property::Name, "late").sequenced(16, "Service"));
        assert!(fold_events(events).is_empty());
    }

    #[test]
    fn fields_without_a_create_are_not_live() {
        let id = CredentialId::new();
        let events = stamp(vec![NewEvent::field(EventKind::Edit, id, Property::Name, "orphan")], 1);
        assert!(fold_events(events).is_empty());
    }

    #[test]
    fn malformed_value_leaves_default() {
        let id = CredentialId::new();
        let mut events = stamp(vec![NewEvent::create_marker(id)], 1);
        events.push(NewEvent::field(EventKind::Edit, id, Property::Length, "twelve").sequenced(2, "Service"));
        events.push(NewEvent::field(EventKind::Edit, id, Property::Name, "ok").sequenced(3, "Service"));

        let snapshot = &fold_events(events)[&id];
        assert_eq!(snapshot.length, 0);
        assert_eq!(snapshot.name, "ok");
    }

    #[test]
    fn empty_patch_changes_nothing_and_length_patch_changes_only_length() {
        let id = CredentialId::new();
        let mut base = NewCredential::named("site");
        base.login = "me".into();
        base.length = 20;
        let mut events = stamp(base.to_events(id), 1);
        let before = fold_events(events.clone())[&id].clone();

        events.extend(stamp(EditPatch::default().to_events(id), 15));
        assert_eq!(fold_events(events.clone())[&id], before);

        let patch = EditPatch {
            length: Some(12),
            ..Default::default()
        };
        events.extend(stamp(patch.to_events(id), 15));
        let after = fold_events(events)[&id].clone();
        assert_eq!(after.length, 12);
        assert_eq!(Credential { length: 20, ..after }, before);
    }

    fn arb_edit(id: CredentialId) -> impl Strategy<Value = NewEvent> {
        prop_oneof![
            "[a-z]{0,8}".prop_map(move |s| NewEvent::field(EventKind::Edit, id, Property::Name, s)),
            any::<u16>().prop_map(move |n| NewEvent::field(EventKind::Edit, id, Property::Length, n)),
            any::<u32>().prop_map(move |n| NewEvent::field(EventKind::Edit, id, Property::OrderIndex, n)),
            any::<bool>().prop_map(move |b| NewEvent::field(EventKind::Edit, id, Property::IsAvailableNumber, b)),
        ]
    }

    fn arb_history() -> impl Strategy<Value = (CredentialId, Vec<NewEvent>)> {
        let id = CredentialId::new();
        proptest::collection::vec(arb_edit(id), 0..24).prop_map(move |edits| (id, edits))
    }

    proptest! {
        #[test]
        fn projection_is_deterministic((id, edits) in arb_history()) {
            let mut events = stamp(NewCredential::named("p").to_events(id), 1);
            events.extend(stamp(edits.clone(), 100));

            let first = fold_events(events.clone());
            let second = fold_events(events);
            prop_assert_eq!(&first, &second);

            // The last write to each property is what the snapshot shows.
            let expected_name = edits
                .iter()
                .rev()
                .find(|e| e.property == Some(Property::Name))
                .map(|e| e.value.clone())
                .unwrap_or(EventValue::from("p"));
            prop_assert_eq!(EventValue::from(first[&id].name.as_str()), expected_name);
        }

        #[test]
        fn tombstone_hides_entity((id, edits) in arb_history(), tail in 0usize..4) {
            let mut events = stamp(NewCredential::named("p").to_events(id), 1);
            events.extend(stamp(edits.clone(), 100));
            events.push(NewEvent::delete_marker(id).sequenced(1_000, "Service"));
            events.extend(stamp(edits.into_iter().take(tail).collect(), 1_001));
            prop_assert!(fold_events(events).is_empty());
        }
    }
}
