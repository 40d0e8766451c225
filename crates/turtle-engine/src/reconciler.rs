use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;
use turtle_log::{EventLog, ValuePredicate};
use turtle_types::{
    Credential, CredentialId, EventKind, EventValue, NewEvent, Property, ReorderOp, ValidationError,
    CREDENTIAL_ENTITY_TYPE,
};

use crate::cancel::CancelToken;
use crate::error::EngineResult;
use crate::projector::SnapshotProjector;

/// Sibling order: ascending `order_index`, ties broken by id.
pub(crate) fn sibling_order(a: &Credential, b: &Credential) -> Ordering {
    a.order_index.cmp(&b.order_index).then_with(|| a.id.cmp(&b.id))
}

/// A change to one credential's position. `None` fields are unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderEdit {
    pub id: CredentialId,
    pub order_index: Option<u32>,
    pub parent_id: Option<Option<CredentialId>>,
}

impl OrderEdit {
    pub fn to_events(&self) -> Vec<NewEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(order_index) = self.order_index {
            events.push(NewEvent::field(EventKind::Edit, self.id, Property::OrderIndex, order_index));
        }
        if let Some(parent_id) = self.parent_id {
            events.push(NewEvent::field(
                EventKind::Edit,
                self.id,
                Property::ParentId,
                EventValue::from_reference(parent_id),
            ));
        }
        events
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub edits: Vec<OrderEdit>,
    pub errors: Vec<ValidationError>,
}

/// Every snapshot a batch of reorder operations can touch, fetched before
/// any of them is evaluated.
#[derive(Clone, Debug, Default)]
pub struct SiblingView {
    snapshots: BTreeMap<CredentialId, Credential>,
}

impl SiblingView {
    pub fn new(snapshots: BTreeMap<CredentialId, Credential>) -> Self {
        Self { snapshots }
    }

    /// Fetch start and insert targets, then the full sibling group of each
    /// start target.
    pub async fn load(
        log: &dyn EventLog,
        ops: &[ReorderOp],
        cancel: &CancelToken,
    ) -> EngineResult<Self> {
        let projector = SnapshotProjector::new(log);

        let targets: BTreeSet<CredentialId> = ops
            .iter()
            .flat_map(|op| op.insert_ids.iter().copied().chain([op.start_id]))
            .collect();
        cancel.check()?;
        let mut snapshots = projector.project(&targets).await?;

        let groups: BTreeSet<Option<CredentialId>> = ops
            .iter()
            .filter_map(|op| snapshots.get(&op.start_id))
            .map(|start| start.parent_id)
            .collect();
        if groups.is_empty() {
            return Ok(Self::new(snapshots));
        }

        cancel.check()?;
        let members: BTreeSet<CredentialId> = log
            .query_latest_property_by_value(
                CREDENTIAL_ENTITY_TYPE,
                Property::ParentId,
                &ValuePredicate::references(groups.iter().copied()),
            )
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| !snapshots.contains_key(id))
            .collect();

        cancel.check()?;
        snapshots.extend(projector.project(&members).await?);
        debug!(groups = groups.len(), snapshots = snapshots.len(), "sibling view loaded");
        Ok(Self::new(snapshots))
    }

    pub fn get(&self, id: &CredentialId) -> Option<&Credential> {
        self.snapshots.get(id)
    }

    /// Live members of the group under `parent_id`, in sibling order.
    pub fn group(&self, parent_id: Option<CredentialId>) -> Vec<&Credential> {
        let mut members: Vec<&Credential> = self
            .snapshots
            .values()
            .filter(|c| c.parent_id == parent_id)
            .collect();
        members.sort_by(|a, b| sibling_order(a, b));
        members
    }
}

/// Compute the order edits for `ops` against one consistent view.
///
/// Each op is evaluated against the view as loaded; no op sees the edits
/// of another. A missing start target skips its op; a missing insert
/// target is reported and dropped from its op.
pub fn reconcile(ops: &[ReorderOp], view: &SiblingView) -> Reconciliation {
    let mut out = Reconciliation::default();

    for op in ops {
        let Some(start) = view.get(&op.start_id) else {
            out.errors.push(ValidationError::NotFound { id: op.start_id });
            continue;
        };

        let cursor = u64::from(start.order_index) + u64::from(op.is_after);

        let requested = op.unique_insert_ids();
        let moving: HashSet<CredentialId> = requested.iter().copied().collect();
        let mut sequence: Vec<&Credential> = Vec::with_capacity(requested.len());
        for id in requested {
            match view.get(&id) {
                Some(credential) => sequence.push(credential),
                None => out.errors.push(ValidationError::NotFound { id }),
            }
        }

        sequence.extend(
            view.group(start.parent_id)
                .into_iter()
                .filter(|c| {
                    if op.is_after {
                        c.order_index > start.order_index
                    } else {
                        c.order_index >= start.order_index
                    }
                })
                .filter(|c| !moving.contains(&c.id)),
        );

        let last = cursor + (sequence.len() as u64).saturating_sub(1);
        let Ok(mut next) = u32::try_from(cursor) else {
            out.errors.push(ValidationError::OrderOverflow { id: op.start_id });
            continue;
        };
        if !sequence.is_empty() && last > u64::from(u32::MAX) {
            out.errors.push(ValidationError::OrderOverflow { id: op.start_id });
            continue;
        }

        for credential in sequence {
            let order_index = (credential.order_index != next).then_some(next);
            let parent_id = (credential.parent_id != start.parent_id).then_some(start.parent_id);
            if order_index.is_some() || parent_id.is_some() {
                out.edits.push(OrderEdit {
                    id: credential.id,
                    order_index,
                    parent_id,
                });
            }
            next = next.saturating_add(1);
        }
    }

    out
}
