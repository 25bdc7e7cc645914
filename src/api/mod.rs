//! External definition-registry interface.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::types::{DefinitionSnapshot, DefinitionSpec, Properties, RevisionId, RevisionStatus};

/// A full definition payload, as accepted by [`DefinitionRegistry::submit`].
///
/// This is the declared spec minus the operator-only fields, with the
/// effective tag set substituted for the declared one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Operator-facing name; the registry derives the base identifier from it.
    pub name: String,
    /// Definition body.
    pub properties: Properties,
    /// Scheduling priority.
    pub scheduling_priority: Option<i32>,
    /// Parameter defaults.
    pub parameters: BTreeMap<String, String>,
    /// Tag-propagation flag.
    pub propagate_tags: bool,
    /// Attempt timeout in seconds.
    pub timeout_seconds: Option<i64>,
    /// Retry attempts.
    pub retry_attempts: Option<i32>,
    /// Effective tag set to associate with the resource.
    pub tags: BTreeMap<String, String>,
}

impl Submission {
    /// Build a submission from a declared spec and its effective tag set.
    pub fn from_spec(spec: &DefinitionSpec, tags_all: BTreeMap<String, String>) -> Self {
        Self {
            name: spec.name.clone(),
            properties: spec.properties.clone(),
            scheduling_priority: spec.scheduling_priority,
            parameters: spec.parameters.clone(),
            propagate_tags: spec.propagate_tags,
            timeout_seconds: spec.timeout_seconds,
            retry_attempts: spec.retry_attempts,
            tags: tags_all,
        }
    }
}

/// Filter for [`DefinitionRegistry::describe`].
///
/// An empty filter matches everything; populated fields are conjunctive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescribeFilter {
    /// Match any revision under one of these base identifiers.
    pub base_ids: Vec<String>,
    /// Match exactly these compound identifiers.
    pub exact_ids: Vec<RevisionId>,
    /// Match only revisions with this status.
    pub status: Option<RevisionStatus>,
}

impl DescribeFilter {
    /// Filter by a single exact revision identifier.
    pub fn exact(id: RevisionId) -> Self {
        Self {
            exact_ids: vec![id],
            ..Self::default()
        }
    }

    /// Filter by a single base identifier, all statuses.
    pub fn base(base_id: impl Into<String>) -> Self {
        Self {
            base_ids: vec![base_id.into()],
            ..Self::default()
        }
    }

    /// Restrict to one status.
    pub fn with_status(mut self, status: RevisionStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// One page of describe results.
#[derive(Debug, Clone, Default)]
pub struct DescribePage {
    /// Matching snapshots in this page.
    pub definitions: Vec<DefinitionSnapshot>,
    /// Token for the next page, absent on the last page.
    pub next_token: Option<String>,
}

/// The versioned definition registry this crate reconciles against.
///
/// Definitions are immutable per revision: `submit` always creates a new
/// revision with a strictly greater number, and only a revision's status may
/// change afterwards (active to retired, never back). Tags attach to the base
/// identifier and apply across all revisions.
///
/// `retire` is idempotent: retiring an unknown or already-retired revision
/// succeeds, which keeps whole-operation re-invocation safe after partial
/// failures.
#[async_trait]
pub trait DefinitionRegistry: Send + Sync {
    /// Error type for registry operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Publish a new immutable revision; returns its assigned identifier.
    async fn submit(&self, submission: &Submission) -> Result<RevisionId, Self::Error>;

    /// Fetch one page of snapshots matching the filter.
    async fn describe(
        &self,
        filter: &DescribeFilter,
        page_token: Option<&str>,
    ) -> Result<DescribePage, Self::Error>;

    /// Retire one revision. Idempotent.
    async fn retire(&self, id: &RevisionId) -> Result<(), Self::Error>;

    /// Insert or overwrite tags on the resource's base identifier.
    async fn tag_upsert(
        &self,
        base_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), Self::Error>;

    /// Remove tag keys from the resource's base identifier.
    async fn tag_remove(&self, base_id: &str, keys: &[String]) -> Result<(), Self::Error>;
}

/// Run a registry call under a caller-supplied cancellation token.
///
/// Returns `None` when the token fires first; the outstanding call is
/// dropped, which aborts it.
pub(crate) async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

pub use memory::{CallCounts, InMemoryRegistry, RegistryError};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContainerSpec;

    #[test]
    fn test_submission_substitutes_effective_tags() {
        let mut spec = DefinitionSpec::container("encoder", ContainerSpec::default());
        spec.tags.insert("declared".to_string(), "1".to_string());
        let tags_all = BTreeMap::from([("effective".to_string(), "1".to_string())]);

        let submission = Submission::from_spec(&spec, tags_all.clone());
        assert_eq!(submission.tags, tags_all);
        assert_eq!(submission.name, "encoder");
    }

    #[tokio::test]
    async fn test_cancellable_prefers_cancelled_token() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = cancellable(&cancel, async { 42 }).await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_cancellable_passes_through_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let out = cancellable(&cancel, async { 42 }).await;
        assert_eq!(out, Some(42));
    }
}
