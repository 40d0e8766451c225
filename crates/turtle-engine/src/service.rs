use std::sync::Arc;

use tracing::debug;
use turtle_log::EventLog;
use turtle_types::{GetRequest, GetResponse, PostRequest, PostResponse};

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::pipeline::MutationPipeline;
use crate::resolver::HierarchyResolver;

/// Read/write entry point over one event log.
///
/// Holds no state besides the log handle and configuration; every call
/// projects fresh from the log.
#[derive(Clone)]
pub struct CredentialService {
    log: Arc<dyn EventLog>,
    config: EngineConfig,
}

impl CredentialService {
    pub fn new(log: Arc<dyn EventLog>, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { log, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    pub async fn get(&self, request: GetRequest, cancel: &CancelToken) -> EngineResult<GetResponse> {
        let resolution = HierarchyResolver::new(self.log.as_ref(), &self.config, cancel)
            .resolve(&request)
            .await?;

        cancel.check()?;
        let events = self.log.events_after(request.since_cursor).await?;
        debug!(
            roots = resolution.roots.len(),
            errors = resolution.errors.len(),
            events = events.len(),
            "get served"
        );

        Ok(GetResponse {
            roots: resolution.roots,
            children: resolution.children,
            ancestors: resolution.ancestors,
            descendants: resolution.descendants,
            errors: resolution.errors,
            events,
        })
    }

    pub async fn post(&self, request: PostRequest, cancel: &CancelToken) -> EngineResult<PostResponse> {
        let outcome = MutationPipeline::new(self.log.as_ref(), &self.config)
            .apply(&request, cancel)
            .await?;

        Ok(PostResponse {
            created_ids: outcome.created_ids,
            errors: outcome.errors,
            events: outcome.events_since,
        })
    }
}

impl std::fmt::Debug for CredentialService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
