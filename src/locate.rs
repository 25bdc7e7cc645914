//! Live snapshot lookup.
//!
//! Wraps the registry's paginated `describe` into three lookups the
//! reconciler needs, and keeps "gone" structurally distinct from "the call
//! failed": callers must be able to tell removed-upstream from a transient
//! transport problem.

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::api::{cancellable, DefinitionRegistry, DescribeFilter};
use crate::types::{DefinitionSnapshot, RevisionId, RevisionStatus};

/// Error locating a live snapshot.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LocateError {
    /// No matching live resource. Distinct from transport failure so callers
    /// can tell "removed upstream" from "transient failure".
    #[error("no matching definition found")]
    NotFound,
    /// More than one match where exactly one was expected.
    #[error("expected exactly one matching definition, found {0}")]
    Ambiguous(usize),
    /// Transport or server failure.
    #[error("registry error: {0}")]
    Remote(String),
    /// The caller-supplied cancellation fired.
    #[error("cancelled")]
    Cancelled,
}

/// Paginate through every snapshot matching the filter.
pub async fn find_all<R: DefinitionRegistry>(
    registry: &R,
    cancel: &CancellationToken,
    filter: &DescribeFilter,
) -> Result<Vec<DefinitionSnapshot>, LocateError> {
    let mut out = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = match cancellable(cancel, registry.describe(filter, token.as_deref())).await {
            None => return Err(LocateError::Cancelled),
            Some(result) => result.map_err(|e| LocateError::Remote(e.to_string()))?,
        };
        trace!(count = page.definitions.len(), "fetched definition page");
        out.extend(page.definitions);
        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    Ok(out)
}

fn single(mut found: Vec<DefinitionSnapshot>) -> Result<DefinitionSnapshot, LocateError> {
    match found.len() {
        0 => Err(LocateError::NotFound),
        1 => Ok(found.remove(0)),
        n => Err(LocateError::Ambiguous(n)),
    }
}

/// Look up one revision by its exact compound identifier.
///
/// A revision that exists but has been retired yields [`LocateError::NotFound`]:
/// for direct lookup, retired means gone.
pub async fn find_by_revision<R: DefinitionRegistry>(
    registry: &R,
    cancel: &CancellationToken,
    id: &RevisionId,
) -> Result<DefinitionSnapshot, LocateError> {
    let snapshot = single(find_all(registry, cancel, &DescribeFilter::exact(id.clone())).await?)?;
    if !snapshot.is_active() {
        return Err(LocateError::NotFound);
    }
    Ok(snapshot)
}

/// Resolve the single active revision under a base identifier.
///
/// None active yields [`LocateError::NotFound`]; several active revisions
/// violate the at-most-one-active expectation and yield
/// [`LocateError::Ambiguous`].
pub async fn find_active_by_base<R: DefinitionRegistry>(
    registry: &R,
    cancel: &CancellationToken,
    base_id: &str,
) -> Result<DefinitionSnapshot, LocateError> {
    let filter = DescribeFilter::base(base_id).with_status(RevisionStatus::Active);
    single(find_all(registry, cancel, &filter).await?)
}

/// Enumerate every revision under a base identifier, regardless of status,
/// so removal can retire all of them.
pub async fn find_all_by_base<R: DefinitionRegistry>(
    registry: &R,
    cancel: &CancellationToken,
    base_id: &str,
) -> Result<Vec<DefinitionSnapshot>, LocateError> {
    find_all(registry, cancel, &DescribeFilter::base(base_id)).await
}
