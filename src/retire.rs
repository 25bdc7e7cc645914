//! Retirement of a prior revision.
//!
//! Runs only after a successful full-update publish, and only when the
//! operator's retirement preference allows it. Tag-only updates never
//! retire anything. A retirement failure never rolls back the
//! already-published new revision.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{cancellable, DefinitionRegistry};
use crate::types::RevisionState;

/// Error retiring a revision.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetireError {
    /// Transport or server failure.
    #[error("registry error: {0}")]
    Remote(String),
    /// The caller-supplied cancellation fired.
    #[error("cancelled")]
    Cancelled,
}

/// Retire a revision, returning its new lifecycle state.
///
/// An already-retired revision issues no call at all; the transition is
/// one-directional and the state is simply passed through.
pub async fn retire_revision<R: DefinitionRegistry>(
    registry: &R,
    cancel: &CancellationToken,
    state: RevisionState,
) -> Result<RevisionState, RetireError> {
    let id = match &state {
        RevisionState::Retired(_) => return Ok(state),
        RevisionState::Active(id) => id.clone(),
    };

    debug!(%id, "retiring prior revision");
    match cancellable(cancel, registry.retire(&id)).await {
        None => Err(RetireError::Cancelled),
        Some(Err(e)) => Err(RetireError::Remote(e.to_string())),
        Some(Ok(())) => Ok(state.retire()),
    }
}
