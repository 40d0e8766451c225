use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};
use turtle_log::{EventLog, LogTransaction};
use turtle_types::{CredentialId, Event, NewEvent, PostRequest, ValidationError};

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::projector::SnapshotProjector;
use crate::reconciler::{reconcile, SiblingView};

/// State shared by the stages of one batch.
pub struct StageContext<'r> {
    pub request: &'r PostRequest,
    pub cancel: &'r CancelToken,
    pub actor: &'r str,
    pub created_ids: Vec<CredentialId>,
    pub errors: Vec<ValidationError>,
}

impl<'r> StageContext<'r> {
    pub fn new(request: &'r PostRequest, cancel: &'r CancelToken, actor: &'r str) -> Self {
        Self {
            request,
            cancel,
            actor,
            created_ids: Vec::new(),
            errors: Vec::new(),
        }
    }

    async fn stage(&self, tx: &LogTransaction<'_>, events: Vec<NewEvent>) -> EngineResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        self.cancel.check()?;
        Ok(tx.append(self.actor, events).await?.len())
    }
}

/// One step of the mutation pipeline.
///
/// A stage reads through the transaction, so it observes everything staged
/// before it, and stages its own events into it. Per-item problems go into
/// `ctx.errors`; only log failures and cancellation are returned as `Err`.
#[async_trait]
pub trait MutationStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the number of events staged.
    async fn apply(&self, tx: &LogTransaction<'_>, ctx: &mut StageContext<'_>) -> EngineResult<usize>;
}

/// What one stage did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageReport {
    pub stage_name: String,
    pub events_staged: usize,
    pub errors: usize,
    pub elapsed: Duration,
}

/// Result of a committed batch.
#[derive(Clone, Debug, Default)]
pub struct MutationOutcome {
    pub created_ids: Vec<CredentialId>,
    pub errors: Vec<ValidationError>,
    /// Every event after the caller's cursor, including this batch.
    pub events_since: Vec<Event>,
    pub committed: usize,
    pub stage_reports: Vec<StageReport>,
}

struct DeleteStage;
struct CreateStage;
struct EditStage;
struct ReorderStage;

#[async_trait]
impl MutationStage for DeleteStage {
    fn name(&self) -> &'static str {
        "delete"
    }

    async fn apply(&self, tx: &LogTransaction<'_>, ctx: &mut StageContext<'_>) -> EngineResult<usize> {
        let ids = unique(&ctx.request.delete_ids);
        if ids.is_empty() {
            return Ok(0);
        }
        ctx.cancel.check()?;
        let live = SnapshotProjector::new(tx)
            .project(&ids.iter().copied().collect())
            .await?;

        let mut events = Vec::with_capacity(ids.len());
        for id in ids {
            if live.contains_key(&id) {
                events.push(NewEvent::delete_marker(id));
            } else {
                ctx.errors.push(ValidationError::NotFound { id });
            }
        }
        ctx.stage(tx, events).await
    }
}

#[async_trait]
impl MutationStage for CreateStage {
    fn name(&self) -> &'static str {
        "create"
    }

    async fn apply(&self, tx: &LogTransaction<'_>, ctx: &mut StageContext<'_>) -> EngineResult<usize> {
        let creates = &ctx.request.creates;
        if creates.is_empty() {
            return Ok(0);
        }

        let supplied: BTreeSet<CredentialId> = creates.iter().filter_map(|c| c.id).collect();
        ctx.cancel.check()?;
        let taken = SnapshotProjector::new(tx).project(&supplied).await?;

        let mut seen = HashSet::new();
        let mut events = Vec::new();
        for create in creates {
            let id = match create.id {
                Some(id) if taken.contains_key(&id) || !seen.insert(id) => {
                    ctx.errors.push(ValidationError::AlreadyExists { id });
                    continue;
                }
                Some(id) => id,
                None => CredentialId::new(),
            };
            events.extend(create.to_events(id));
            ctx.created_ids.push(id);
        }
        ctx.stage(tx, events).await
    }
}

#[async_trait]
impl MutationStage for EditStage {
    fn name(&self) -> &'static str {
        "edit"
    }

    async fn apply(&self, tx: &LogTransaction<'_>, ctx: &mut StageContext<'_>) -> EngineResult<usize> {
        let edits: Vec<_> = ctx.request.edits.iter().filter(|e| !e.patch.is_empty()).collect();
        if edits.is_empty() {
            return Ok(0);
        }

        let targets: BTreeSet<CredentialId> = edits.iter().flat_map(|e| e.ids.iter().copied()).collect();
        ctx.cancel.check()?;
        let live = SnapshotProjector::new(tx).project(&targets).await?;

        let mut events = Vec::new();
        let mut missing = HashSet::new();
        for edit in edits {
            for id in unique(&edit.ids) {
                if live.contains_key(&id) {
                    events.extend(edit.patch.to_events(id));
                } else if missing.insert(id) {
                    ctx.errors.push(ValidationError::NotFound { id });
                }
            }
        }
        ctx.stage(tx, events).await
    }
}

#[async_trait]
impl MutationStage for ReorderStage {
    fn name(&self) -> &'static str {
        "reorder"
    }

    async fn apply(&self, tx: &LogTransaction<'_>, ctx: &mut StageContext<'_>) -> EngineResult<usize> {
        let ops = &ctx.request.reorders;
        if ops.is_empty() {
            return Ok(0);
        }

        let view = SiblingView::load(tx, ops, ctx.cancel).await?;
        let reconciliation = reconcile(ops, &view);
        debug!(ops = ops.len(), edits = reconciliation.edits.len(), "reorders reconciled");

        ctx.errors.extend(reconciliation.errors);
        let events = reconciliation.edits.iter().flat_map(|e| e.to_events()).collect();
        ctx.stage(tx, events).await
    }
}

fn unique(ids: &[CredentialId]) -> Vec<CredentialId> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Applies a write batch as one atomic append.
///
/// Stages always run in the order delete, create, edit, reorder. The batch
/// commits once after the last stage; a log failure or cancellation before
/// that point commits nothing.
pub struct MutationPipeline<'a> {
    log: &'a dyn EventLog,
    config: &'a EngineConfig,
    stages: Vec<Box<dyn MutationStage>>,
}

impl<'a> MutationPipeline<'a> {
    pub fn new(log: &'a dyn EventLog, config: &'a EngineConfig) -> Self {
        Self {
            log,
            config,
            stages: vec![
                Box::new(DeleteStage),
                Box::new(CreateStage),
                Box::new(EditStage),
                Box::new(ReorderStage),
            ],
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn apply(
        &self,
        request: &PostRequest,
        cancel: &CancelToken,
    ) -> EngineResult<MutationOutcome> {
        cancel.check()?;
        let tx = LogTransaction::begin(self.log, self.config.actor.as_str()).await?;
        let mut ctx = StageContext::new(request, cancel, &self.config.actor);
        let mut stage_reports = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            cancel.check()?;
            let started = Instant::now();
            let errors_before = ctx.errors.len();
            let events_staged = stage.apply(&tx, &mut ctx).await?;
            let report = StageReport {
                stage_name: stage.name().to_string(),
                events_staged,
                errors: ctx.errors.len() - errors_before,
                elapsed: started.elapsed(),
            };
            debug!(
                stage = %report.stage_name,
                events = report.events_staged,
                errors = report.errors,
                elapsed_us = report.elapsed.as_micros() as u64,
                "stage complete"
            );
            stage_reports.push(report);
        }

        cancel.check()?;
        let committed = tx.commit().await?;
        if !committed.is_empty() {
            info!(
                events = committed.len(),
                head = committed.last().map(|e| e.sequence).unwrap_or_default(),
                errors = ctx.errors.len(),
                "batch committed"
            );
        }

        let events_since = self.log.events_after(request.since_cursor).await?;

        Ok(MutationOutcome {
            created_ids: ctx.created_ids,
            errors: ctx.errors,
            events_since,
            committed: committed.len(),
            stage_reports,
        })
    }
}
