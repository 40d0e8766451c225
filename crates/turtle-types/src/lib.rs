//! Foundation types for Turtle, a hierarchical credential manager backed by
//! an append-only, field-level event log.
//!
//! Every other Turtle crate depends on `turtle-types`.
//!
//! # Key Types
//!
//! - [`CredentialId`]: UUID v7 identifier of a credential
//! - [`Event`] / [`NewEvent`]: sequenced and not-yet-sequenced field changes
//! - [`EventValue`]: polymorphic value carried by an event
//! - [`Credential`]: current-state snapshot folded from events
//! - [`EditPatch`]: sparse, per-field edit
//! - [`ReorderOp`]: move/insert request within a sibling group
//! - [`ValidationError`]: per-item, recoverable failure

pub mod credential;
pub mod error;
pub mod event;
pub mod id;
pub mod messages;
pub mod order;
pub mod patch;
pub mod validation;
pub mod value;

pub use credential::{Credential, CredentialType, NewCredential};
pub use error::TypeError;
pub use event::{Event, EventKind, NewEvent, Property, CREDENTIAL_ENTITY_TYPE};
pub use id::CredentialId;
pub use messages::{EditRequest, GetRequest, GetResponse, PostRequest, PostResponse};
pub use order::ReorderOp;
pub use patch::EditPatch;
pub use validation::ValidationError;
pub use value::{EventValue, ValueType};
