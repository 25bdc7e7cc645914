//! Reconciliation entrypoints.
//!
//! One `Reconciler` per registry handle. Each entrypoint runs a sequential
//! chain of calls to completion; nothing is cached between calls, and every
//! operation re-derives its view of the world from the live snapshot first.
//! That is what makes whole-operation re-invocation safe after a partial
//! failure: the residual work is recomputed, not replayed. Sub-steps are
//! never retried here.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::DefinitionRegistry;
use crate::classify::{self, MutationPath};
use crate::error::{Action, Cause, Partial, ReconcileError};
use crate::locate::{self, LocateError};
use crate::normalize::merge_echoed_properties;
use crate::publish::{self, Advisory, PublishError};
use crate::retire::{self, RetireError};
use crate::tagging::{self, TagApplyError, TagDelta};
use crate::types::{
    DefinitionSnapshot, DefinitionSpec, RevisionId, RevisionState, StateRecord, TagPolicy,
};

/// Result of a create operation.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    /// The record to persist locally.
    pub record: StateRecord,
    /// Advisories raised while building the submission.
    pub advisories: Vec<Advisory>,
}

/// Result of an update operation.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// The record to persist locally.
    pub record: StateRecord,
    /// Advisories raised while building the submission (full updates only).
    pub advisories: Vec<Advisory>,
    /// The prior revision, when this update retired it.
    pub retired: Option<RevisionId>,
}

/// Reconciles declared definitions against the registry.
pub struct Reconciler<R: DefinitionRegistry> {
    registry: Arc<R>,
    tag_policy: TagPolicy,
}

impl<R: DefinitionRegistry> Reconciler<R> {
    /// Create a reconciler over a registry handle with an injected tag
    /// policy.
    pub fn new(registry: Arc<R>, tag_policy: TagPolicy) -> Self {
        Self {
            registry,
            tag_policy,
        }
    }

    /// The injected tag policy.
    pub fn tag_policy(&self) -> &TagPolicy {
        &self.tag_policy
    }

    /// A reference to the registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Create the definition: publish its first revision and return the
    /// record to persist.
    pub async fn create(
        &self,
        spec: &DefinitionSpec,
        cancel: &CancellationToken,
    ) -> Result<CreateOutcome, ReconcileError> {
        let name = spec.name.clone();
        spec.validate()
            .map_err(|e| ReconcileError::new(Action::Creating, &name, Cause::Configuration(e.to_string())))?;

        let tags_all = self.tag_policy.effective(&spec.tags);
        let outcome = publish::publish(self.registry.as_ref(), cancel, spec, tags_all)
            .await
            .map_err(|e| ReconcileError::new(Action::Creating, &name, publish_cause(e)))?;

        Ok(CreateOutcome {
            record: StateRecord::assemble(spec, &outcome.snapshot),
            advisories: outcome.advisories,
        })
    }

    /// Refresh the record from the live snapshot.
    ///
    /// Returns `Ok(None)` when the revision no longer exists remotely (or
    /// has been retired), in which case the caller removes its local record.
    pub async fn read(
        &self,
        record: &StateRecord,
        cancel: &CancellationToken,
    ) -> Result<Option<StateRecord>, ReconcileError> {
        let name = record.spec.name.clone();
        let snapshot =
            match locate::find_by_revision(self.registry.as_ref(), cancel, &record.revision_id())
                .await
            {
                Err(LocateError::NotFound) => return Ok(None),
                Err(e) => return Err(ReconcileError::new(Action::Reading, &name, locate_cause(e))),
                Ok(snapshot) => snapshot,
            };

        // A revision's definition is immutable, so the record's last-applied
        // environment is still the submitted intent; reconciling against it
        // keeps dropped empty values from reappearing as drift. A genuinely
        // different echo replaces the record and surfaces on the next
        // classification.
        let snapshot = normalized_snapshot(&record.spec, snapshot);
        Ok(Some(StateRecord::assemble(&record.spec, &snapshot)))
    }

    /// Reconcile a pending change: either publish a new revision (any
    /// non-tag change) or apply a tag delta in place.
    pub async fn update(
        &self,
        record: &StateRecord,
        spec: &DefinitionSpec,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome, ReconcileError> {
        let name = spec.name.clone();
        spec.validate()
            .map_err(|e| ReconcileError::new(Action::Updating, &name, Cause::Configuration(e.to_string())))?;
        if spec.name != record.spec.name {
            return Err(ReconcileError::new(
                Action::Updating,
                &name,
                Cause::Configuration(format!(
                    "the name is immutable (recorded {:?}); changing it requires replacement",
                    record.spec.name
                )),
            ));
        }

        let tags_all = self.tag_policy.effective(&spec.tags);
        let prior = classify::render_declared(&record.spec, &record.tags_all).map_err(|e| {
            ReconcileError::new(
                Action::Updating,
                &name,
                Cause::Configuration(format!("failed to render prior state for diffing: {e}")),
            )
        })?;
        let desired = classify::render_declared(spec, &tags_all).map_err(|e| {
            ReconcileError::new(
                Action::Updating,
                &name,
                Cause::Configuration(format!("failed to render desired state for diffing: {e}")),
            )
        })?;

        match classify::classify(&prior, &desired) {
            MutationPath::FullUpdate { changed } => {
                debug!(
                    name = %name,
                    paths = %changed.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
                    "non-tag change requires a new revision"
                );
                self.full_update(record, spec, tags_all, cancel).await
            }
            MutationPath::TagsOnly => self.tag_update(record, spec, tags_all, cancel).await,
        }
    }

    async fn full_update(
        &self,
        record: &StateRecord,
        spec: &DefinitionSpec,
        tags_all: BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome, ReconcileError> {
        let name = &spec.name;
        let outcome = publish::publish(self.registry.as_ref(), cancel, spec, tags_all)
            .await
            .map_err(|e| ReconcileError::new(Action::Updating, name, publish_cause(e)))?;
        let published = outcome.snapshot.revision_id().clone();

        let mut retired = None;
        if spec.retire_on_update {
            let prior = RevisionState::Active(record.revision_id());
            match retire::retire_revision(self.registry.as_ref(), cancel, prior).await {
                Ok(state) => retired = Some(state.id().clone()),
                Err(RetireError::Cancelled) => {
                    return Err(ReconcileError::new(Action::Updating, name, Cause::Cancelled))
                }
                Err(RetireError::Remote(source)) => {
                    // The new revision stays active; only the cleanup failed.
                    return Err(ReconcileError::new(
                        Action::Updating,
                        name,
                        Cause::Partial(Partial::RetireFailed {
                            published,
                            prior: record.revision_id(),
                            detail: source,
                        }),
                    ));
                }
            }
        }

        Ok(UpdateOutcome {
            record: StateRecord::assemble(spec, &outcome.snapshot),
            advisories: outcome.advisories,
            retired,
        })
    }

    async fn tag_update(
        &self,
        record: &StateRecord,
        spec: &DefinitionSpec,
        tags_all: BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome, ReconcileError> {
        let name = &spec.name;
        let registry = self.registry.as_ref();

        // Re-derive the tag delta from live state, not from the record: after
        // a partial failure the residual delta is what still needs applying.
        let snapshot = locate::find_by_revision(registry, cancel, &record.revision_id())
            .await
            .map_err(|e| ReconcileError::new(Action::Updating, name, locate_cause(e)))?;

        let snapshot = if snapshot.tags == tags_all {
            // Nothing to mutate; the live set already matches.
            snapshot
        } else {
            let delta = TagDelta::between(&snapshot.tags, &tags_all);
            tagging::apply_tag_delta(registry, cancel, &record.base_id, &delta)
                .await
                .map_err(|e| ReconcileError::new(Action::Updating, name, tag_cause(e)))?;

            locate::find_by_revision(registry, cancel, &record.revision_id())
                .await
                .map_err(|e| ReconcileError::new(Action::Updating, name, locate_cause(e)))?
        };

        let snapshot = normalized_snapshot(spec, snapshot);
        Ok(UpdateOutcome {
            record: StateRecord::assemble(spec, &snapshot),
            advisories: Vec::new(),
            retired: None,
        })
    }

    /// Remove the definition: retire every revision still active under its
    /// base identifier. Nothing left to retire is success.
    pub async fn delete(
        &self,
        record: &StateRecord,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        let name = record.spec.name.clone();
        let registry = self.registry.as_ref();

        let all = locate::find_all_by_base(registry, cancel, &record.base_id)
            .await
            .map_err(|e| ReconcileError::new(Action::Deleting, &name, locate_cause(e)))?;

        for snapshot in all.into_iter().filter(DefinitionSnapshot::is_active) {
            debug!(id = %snapshot.revision_id(), "retiring revision");
            retire::retire_revision(registry, cancel, snapshot.state.clone())
                .await
                .map_err(|e| {
                    let cause = match e {
                        RetireError::Cancelled => Cause::Cancelled,
                        RetireError::Remote(source) => Cause::Remote(source),
                    };
                    ReconcileError::new(Action::Deleting, &name, cause)
                })?;
        }
        Ok(())
    }
}

fn normalized_snapshot(spec: &DefinitionSpec, snapshot: DefinitionSnapshot) -> DefinitionSnapshot {
    let (merged, _consistent) = merge_echoed_properties(&spec.properties, &snapshot.properties);
    DefinitionSnapshot {
        properties: merged,
        ..snapshot
    }
}

fn locate_cause(e: LocateError) -> Cause {
    match e {
        LocateError::NotFound => Cause::NotFound,
        LocateError::Ambiguous(n) => {
            Cause::Remote(format!("expected exactly one matching definition, found {n}"))
        }
        LocateError::Remote(source) => Cause::Remote(source),
        LocateError::Cancelled => Cause::Cancelled,
    }
}

fn publish_cause(e: PublishError) -> Cause {
    match e {
        PublishError::Submit(source) => Cause::Remote(source),
        PublishError::Unconfirmed { id, detail } => {
            Cause::Partial(Partial::PublishedUnconfirmed { id, detail })
        }
        PublishError::Inconsistent { id } => Cause::Inconsistency(format!(
            "revision {id} echoed an environment that does not match the submitted intent"
        )),
        PublishError::Cancelled => Cause::Cancelled,
    }
}

fn tag_cause(e: TagApplyError) -> Cause {
    match e {
        TagApplyError::RemoveFailed(source) | TagApplyError::UpsertFailed(source) => {
            Cause::Remote(source)
        }
        TagApplyError::UpsertAfterRemove { removed, detail } => {
            Cause::Partial(Partial::TagsRemovedButUpsertFailed { removed, detail })
        }
        TagApplyError::Cancelled => Cause::Cancelled,
    }
}
