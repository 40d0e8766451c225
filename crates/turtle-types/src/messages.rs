//! Request/response shapes exchanged with the transport layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::credential::{Credential, NewCredential};
use crate::event::Event;
use crate::id::CredentialId;
use crate::order::ReorderOp;
use crate::patch::EditPatch;
use crate::validation::ValidationError;

/// Tree-shaped read request. The facets are independent and combinable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetRequest {
    pub want_roots: bool,
    pub children_of: Vec<CredentialId>,
    pub ancestors_of: Vec<CredentialId>,
    pub descendants_of: Vec<CredentialId>,
    /// Return every event after this sequence. Omitted means 0, the whole log.
    pub since_cursor: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetResponse {
    pub roots: Vec<Credential>,
    pub children: BTreeMap<CredentialId, Vec<Credential>>,
    /// Root-first chain ending at the requested id.
    pub ancestors: BTreeMap<CredentialId, Vec<Credential>>,
    pub descendants: BTreeMap<CredentialId, Vec<Credential>>,
    pub errors: Vec<ValidationError>,
    pub events: Vec<Event>,
}

/// Apply `patch` to every credential in `ids`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditRequest {
    pub ids: Vec<CredentialId>,
    pub patch: EditPatch,
}

/// Write batch. Stages run in field order: deletes, creates, edits, reorders.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostRequest {
    pub delete_ids: Vec<CredentialId>,
    pub creates: Vec<NewCredential>,
    pub edits: Vec<EditRequest>,
    pub reorders: Vec<ReorderOp>,
    pub since_cursor: u64,
}

impl PostRequest {
    pub fn is_empty(&self) -> bool {
        self.delete_ids.is_empty()
            && self.creates.is_empty()
            && self.edits.is_empty()
            && self.reorders.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostResponse {
    pub created_ids: Vec<CredentialId>,
    pub errors: Vec<ValidationError>,
    pub events: Vec<Event>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_request_defaults_missing_facets() {
        let req: GetRequest = serde_json::from_str(r#"{"wantRoots": true}"#).unwrap();
        assert!(req.want_roots);
        assert!(req.children_of.is_empty());
        assert_eq!(req.since_cursor, 0);
    }

    #[test]
    fn post_request_parses_sparse_edit() {
        let id = CredentialId::new();
        let body = format!(
            r#"{{"edits": [{{"ids": ["{id}"], "patch": {{"length": 12}}}}], "sinceCursor": 0}}"#
        );
        let req: PostRequest = serde_json::from_str(&body).unwrap();
        assert_eq!(req.edits[0].ids, vec![id]);
        assert_eq!(req.edits[0].patch.length, Some(12));
        assert_eq!(req.edits[0].patch.field_count(), 1);
        assert_eq!(req.since_cursor, 0);
        assert!(!req.is_empty());
    }
}
