use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};
use turtle_log::{EventLog, ValuePredicate};
use turtle_types::{
    Credential, CredentialId, EventValue, GetRequest, Property, ValidationError,
    CREDENTIAL_ENTITY_TYPE,
};

use crate::cancel::CancelToken;
use crate::config::{DescendantStrategy, EngineConfig};
use crate::error::EngineResult;
use crate::projector::SnapshotProjector;
use crate::reconciler::sibling_order;

/// Assembled answer to a [`GetRequest`], minus the change feed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub roots: Vec<Credential>,
    pub children: BTreeMap<CredentialId, Vec<Credential>>,
    /// Root-first chain ending at the requested id.
    pub ancestors: BTreeMap<CredentialId, Vec<Credential>>,
    /// Pre-order, siblings in order, requested id excluded.
    pub descendants: BTreeMap<CredentialId, Vec<Credential>>,
    pub errors: Vec<ValidationError>,
}

/// Parent pointers discovered while chasing ancestors.
struct AncestorWalk {
    /// Every id whose parent pointer was read.
    visited: HashSet<CredentialId>,
    /// The chase stopped at the depth bound with parents left unread.
    truncated: bool,
}

/// Resolves tree-shaped read requests with a single projection.
pub struct HierarchyResolver<'a> {
    log: &'a dyn EventLog,
    config: &'a EngineConfig,
    cancel: &'a CancelToken,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(log: &'a dyn EventLog, config: &'a EngineConfig, cancel: &'a CancelToken) -> Self {
        Self { log, config, cancel }
    }

    pub async fn resolve(&self, request: &GetRequest) -> EngineResult<Resolution> {
        let mut ids: BTreeSet<CredentialId> = BTreeSet::new();

        let root_ids = if request.want_roots {
            self.cancel.check()?;
            let found = self
                .current_parents(&ValuePredicate::IsNull)
                .await?
                .into_iter()
                .map(|(id, _)| id)
                .collect::<Vec<_>>();
            ids.extend(&found);
            found
        } else {
            Vec::new()
        };

        if !request.children_of.is_empty() {
            self.cancel.check()?;
            let predicate = ValuePredicate::references(request.children_of.iter().map(|id| Some(*id)));
            ids.extend(self.current_parents(&predicate).await?.into_iter().map(|(id, _)| id));
        }

        let walk = self.chase_ancestors(&request.ancestors_of).await?;
        ids.extend(&walk.visited);

        let subtree = self.descendant_closure(&request.descendants_of).await?;
        ids.extend(&subtree);

        self.cancel.check()?;
        let snapshots = SnapshotProjector::new(self.log).project(&ids).await?;
        debug!(implicated = ids.len(), live = snapshots.len(), "resolved hierarchy request");

        let tree = ChildIndex::build(&snapshots);
        let mut resolution = Resolution::default();

        let mut roots: Vec<Credential> = root_ids
            .iter()
            .filter_map(|id| snapshots.get(id))
            .filter(|c| c.parent_id.is_none())
            .cloned()
            .collect();
        roots.sort_by(sibling_order);
        resolution.roots = roots;

        for parent in &request.children_of {
            let children = tree.children(*parent).into_iter().cloned().collect();
            resolution.children.insert(*parent, children);
        }

        for id in &request.ancestors_of {
            match assemble_chain(*id, &snapshots, &walk) {
                Ok(chain) => {
                    resolution.ancestors.insert(*id, chain);
                }
                Err(error) => resolution.errors.push(error),
            }
        }

        for id in &request.descendants_of {
            if !snapshots.contains_key(id) {
                resolution.errors.push(ValidationError::NotFound { id: *id });
                continue;
            }
            resolution.descendants.insert(*id, tree.pre_order(*id));
        }

        Ok(resolution)
    }

    async fn current_parents(
        &self,
        predicate: &ValuePredicate,
    ) -> EngineResult<Vec<(CredentialId, EventValue)>> {
        Ok(self
            .log
            .query_latest_property_by_value(CREDENTIAL_ENTITY_TYPE, Property::ParentId, predicate)
            .await?)
    }

    /// Read parent pointers upward, one round-trip per level.
    async fn chase_ancestors(&self, start: &[CredentialId]) -> EngineResult<AncestorWalk> {
        let mut visited: HashSet<CredentialId> = HashSet::new();
        let mut frontier: BTreeSet<CredentialId> = start.iter().copied().collect();
        let mut depth = 0;

        while !frontier.is_empty() && depth < self.config.max_ancestor_depth {
            self.cancel.check()?;
            visited.extend(&frontier);
            let parents = self
                .log
                .query_latest_property_of(CREDENTIAL_ENTITY_TYPE, Property::ParentId, &frontier)
                .await?;
            frontier = parents
                .into_iter()
                .filter_map(|(_, value)| match value {
                    EventValue::Uuid(parent) => Some(CredentialId::from_uuid(parent)),
                    _ => None,
                })
                .filter(|parent| !visited.contains(parent))
                .collect();
            depth += 1;
        }

        let truncated = !frontier.is_empty();
        if truncated {
            warn!(depth, pending = frontier.len(), "ancestor walk hit the depth bound");
        }
        Ok(AncestorWalk { visited, truncated })
    }

    async fn descendant_closure(
        &self,
        roots: &[CredentialId],
    ) -> EngineResult<BTreeSet<CredentialId>> {
        if roots.is_empty() {
            return Ok(BTreeSet::new());
        }
        self.cancel.check()?;
        let roots: BTreeSet<CredentialId> = roots.iter().copied().collect();
        match self.config.descendant_strategy {
            DescendantStrategy::PushDown => Ok(self.log.query_descendant_closure(&roots).await?),
            DescendantStrategy::InMemory => {
                let edges = self.current_parents(&ValuePredicate::Any).await?;
                Ok(expand_closure(&roots, edges))
            }
        }
    }
}

/// Frontier expansion over a prefetched set of current parent edges.
pub(crate) fn expand_closure(
    roots: &BTreeSet<CredentialId>,
    edges: Vec<(CredentialId, EventValue)>,
) -> BTreeSet<CredentialId> {
    let mut children: HashMap<CredentialId, Vec<CredentialId>> = HashMap::new();
    for (child, value) in edges {
        if let EventValue::Uuid(parent) = value {
            children.entry(CredentialId::from_uuid(parent)).or_default().push(child);
        }
    }

    let mut closure = roots.clone();
    let mut frontier: Vec<CredentialId> = roots.iter().copied().collect();
    while !frontier.is_empty() {
        frontier = frontier
            .iter()
            .flat_map(|id| children.get(id).into_iter().flatten().copied())
            .filter(|child| closure.insert(*child))
            .collect();
    }
    closure
}

/// Walk from `id` to its root over projected snapshots, root-first.
fn assemble_chain(
    id: CredentialId,
    snapshots: &BTreeMap<CredentialId, Credential>,
    walk: &AncestorWalk,
) -> Result<Vec<Credential>, ValidationError> {
    let mut current = snapshots.get(&id).ok_or(ValidationError::NotFound { id })?;
    let mut chain = vec![current.clone()];

    while let Some(parent) = current.parent_id {
        if chain.len() > snapshots.len() {
            return Err(ValidationError::CyclicHierarchy { id });
        }
        match snapshots.get(&parent) {
            Some(next) => {
                chain.push(next.clone());
                current = next;
            }
            None if walk.truncated && !walk.visited.contains(&parent) => {
                return Err(ValidationError::CyclicHierarchy { id });
            }
            None => {
                warn!(%id, %parent, "ancestor chain ends at a missing parent");
                break;
            }
        }
    }

    chain.reverse();
    Ok(chain)
}

/// Live snapshots grouped under their parent, in sibling order.
struct ChildIndex<'s> {
    children: HashMap<CredentialId, Vec<&'s Credential>>,
}

impl<'s> ChildIndex<'s> {
    fn build(snapshots: &'s BTreeMap<CredentialId, Credential>) -> Self {
        let mut children: HashMap<CredentialId, Vec<&'s Credential>> = HashMap::new();
        for credential in snapshots.values() {
            if let Some(parent) = credential.parent_id {
                children.entry(parent).or_default().push(credential);
            }
        }
        for group in children.values_mut() {
            group.sort_by(|a, b| sibling_order(a, b));
        }
        Self { children }
    }

    fn children(&self, parent: CredentialId) -> Vec<&'s Credential> {
        self.children.get(&parent).cloned().unwrap_or_default()
    }

    fn pre_order(&self, root: CredentialId) -> Vec<Credential> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([root]);
        let mut stack: Vec<&Credential> = self.children(root).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id) {
                continue;
            }
            out.push(node.clone());
            stack.extend(self.children(node.id).into_iter().rev());
        }
        out
    }
}
