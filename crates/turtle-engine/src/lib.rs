//! Core engine for the Turtle credential manager.
//!
//! Credentials form a tree and live in an append-only, field-level event
//! log. Nothing here keeps state between calls: every read and write
//! projects fresh snapshots from the log.
//!
//! - [`SnapshotProjector`] folds events into current-state [`Credential`]s.
//! - [`HierarchyResolver`] answers roots / children / ancestors /
//!   descendants requests with a single projection.
//! - [`reconcile`] turns reorder operations into the minimal set of
//!   order and parent edits.
//! - [`MutationPipeline`] runs delete, create, edit and reorder stages in
//!   one transaction and reports the change feed.
//! - [`CredentialService`] ties them together behind `get` and `post`.
//!
//! # Quick Start
//!
//! ```rust
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! use std::sync::Arc;
//! use turtle_engine::{CancelToken, CredentialService, EngineConfig};
//! use turtle_log::InMemoryEventLog;
//! use turtle_types::{GetRequest, NewCredential, PostRequest};
//!
//! let service = CredentialService::new(Arc::new(InMemoryEventLog::new()), EngineConfig::default())?;
//! let cancel = CancelToken::never();
//!
//! let post = PostRequest {
//!     creates: vec![NewCredential::named("email")],
//!     ..Default::default()
//! };
//! let created = service.post(post, &cancel).await?;
//!
//! let get = GetRequest { want_roots: true, ..Default::default() };
//! let roots = service.get(get, &cancel).await?.roots;
//! assert_eq!(roots[0].id, created.created_ids[0]);
//! # Ok::<(), turtle_engine::EngineError>(())
//! # }).unwrap();
//! ```
//!
//! [`Credential`]: turtle_types::Credential

pub mod cancel;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod projector;
pub mod reconciler;
pub mod resolver;
pub mod service;

#[cfg(test)]
mod testing;

pub use cancel::{CancelHandle, CancelToken};
pub use config::{DescendantStrategy, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use pipeline::{MutationOutcome, MutationPipeline, MutationStage, StageContext, StageReport};
pub use projector::{fold_events, SnapshotProjector};
pub use reconciler::{reconcile, OrderEdit, Reconciliation, SiblingView};
pub use resolver::{HierarchyResolver, Resolution};
pub use service::CredentialService;
