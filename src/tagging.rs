//! Tag delta computation and application.
//!
//! The registry has no atomic "replace all tags" primitive, only a remove
//! call and an unconditionally-overwriting upsert call. Both target the
//! resource's persistent base identifier, since tags apply across all
//! revisions — never the revision-specific compound identifier.

use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{cancellable, DefinitionRegistry};

/// The two calls needed to reconcile a live tag set with the desired one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDelta {
    /// Keys present on the live resource but absent from the desired set,
    /// in sorted order.
    pub removed: Vec<String>,
    /// The full desired set; the upsert call overwrites any provided key
    /// unconditionally, so no per-key narrowing is needed.
    pub upserts: BTreeMap<String, String>,
}

impl TagDelta {
    /// Compute the delta from the live tag set to the desired one.
    pub fn between(
        current: &BTreeMap<String, String>,
        desired: &BTreeMap<String, String>,
    ) -> Self {
        Self {
            removed: current
                .keys()
                .filter(|key| !desired.contains_key(*key))
                .cloned()
                .collect(),
            upserts: desired.clone(),
        }
    }

    /// Whether applying this delta would issue no calls at all.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.upserts.is_empty()
    }
}

/// Error applying a tag delta.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TagApplyError {
    /// The remove call failed; nothing was mutated.
    #[error("removing tag keys failed: {0}")]
    RemoveFailed(String),
    /// The upsert call failed with no preceding remove; nothing was mutated.
    #[error("upserting tags failed: {0}")]
    UpsertFailed(String),
    /// The remove call succeeded but the upsert call failed, leaving the
    /// resource without the desired tags. Not retried in-process.
    #[error("tag keys {removed:?} were removed but the upsert failed: {detail}")]
    UpsertAfterRemove {
        /// Keys that are already gone from the live resource.
        removed: Vec<String>,
        /// The upsert failure.
        detail: String,
    },
    /// The caller-supplied cancellation fired.
    #[error("cancelled")]
    Cancelled,
}

/// Apply a tag delta against the resource's base identifier.
///
/// Issues the remove call first (skipped when no keys are to be removed),
/// then the upsert call (skipped when the desired set is empty). There is no
/// atomicity across the two.
pub async fn apply_tag_delta<R: DefinitionRegistry>(
    registry: &R,
    cancel: &CancellationToken,
    base_id: &str,
    delta: &TagDelta,
) -> Result<(), TagApplyError> {
    let mut removed_applied = false;

    if !delta.removed.is_empty() {
        debug!(base_id, keys = ?delta.removed, "removing tags");
        match cancellable(cancel, registry.tag_remove(base_id, &delta.removed)).await {
            None => return Err(TagApplyError::Cancelled),
            Some(Err(e)) => return Err(TagApplyError::RemoveFailed(e.to_string())),
            Some(Ok(())) => removed_applied = true,
        }
    }

    if !delta.upserts.is_empty() {
        debug!(base_id, count = delta.upserts.len(), "upserting tags");
        match cancellable(cancel, registry.tag_upsert(base_id, &delta.upserts)).await {
            None => return Err(TagApplyError::Cancelled),
            Some(Err(e)) if removed_applied => {
                return Err(TagApplyError::UpsertAfterRemove {
                    removed: delta.removed.clone(),
                    detail: e.to_string(),
                })
            }
            Some(Err(e)) => return Err(TagApplyError::UpsertFailed(e.to_string())),
            Some(Ok(())) => {}
        }
    }

    Ok(())
}
