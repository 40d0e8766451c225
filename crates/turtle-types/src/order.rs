use serde::{Deserialize, Serialize};

use crate::id::CredentialId;

/// Place `insert_ids` into the sibling group containing `start_id`,
/// beginning at `start_id`'s position (or just after it when `is_after`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderOp {
    pub insert_ids: Vec<CredentialId>,
    pub start_id: CredentialId,
    pub is_after: bool,
}

impl ReorderOp {
    pub fn new(insert_ids: Vec<CredentialId>, start_id: CredentialId, is_after: bool) -> Self {
        Self {
            insert_ids,
            start_id,
            is_after,
        }
    }

    /// Insert ids in caller order with later duplicates removed.
    pub fn unique_insert_ids(&self) -> Vec<CredentialId> {
        let mut seen = std::collections::HashSet::new();
        self.insert_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }
}
