//! Error taxonomy for reconciliation operations.
//!
//! Every reported error carries the resource kind, the operator-assigned
//! name, the operation that failed, and the underlying cause. Partial
//! mutations are always distinct variants, never absorbed into a generic
//! remote failure.

use std::fmt;

use crate::types::RevisionId;

/// The operation during which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Creating a new definition.
    Creating,
    /// Reading the live state of a definition.
    Reading,
    /// Updating an existing definition.
    Updating,
    /// Deleting a definition and its revisions.
    Deleting,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Reading => write!(f, "reading"),
            Self::Updating => write!(f, "updating"),
            Self::Deleting => write!(f, "deleting"),
        }
    }
}

/// A multi-step operation that succeeded only partway.
///
/// The remote side has been mutated; re-invoking the whole operation
/// recomputes the residual work from live state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Partial {
    /// The submission succeeded but the follow-up snapshot fetch did not.
    /// The remote revision exists; local state could not be confirmed.
    #[error("revision {id} was published but its snapshot could not be confirmed: {detail}")]
    PublishedUnconfirmed {
        /// The identifier assigned by the registry.
        id: RevisionId,
        /// The fetch failure.
        detail: String,
    },
    /// A new revision was published but retiring the prior one failed.
    /// The new revision remains active regardless.
    #[error("revision {published} is active but retiring prior revision {prior} failed: {detail}")]
    RetireFailed {
        /// The newly published revision.
        published: RevisionId,
        /// The revision that could not be retired.
        prior: RevisionId,
        /// The retirement failure.
        detail: String,
    },
    /// Tag keys were removed but the follow-up upsert failed, leaving the
    /// resource without the desired tags.
    #[error("tag keys {removed:?} were removed but upserting the desired tags failed: {detail}")]
    TagsRemovedButUpsertFailed {
        /// Keys already removed from the live resource.
        removed: Vec<String>,
        /// The upsert failure.
        detail: String,
    },
}

/// Cause taxonomy for reconciliation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Cause {
    /// The desired spec is invalid; rejected before any network call.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The resource or revision no longer exists remotely.
    #[error("not found")]
    NotFound,
    /// Network or server failure. Reported, never auto-retried at this layer.
    #[error("remote registry error: {0}")]
    Remote(String),
    /// A multi-step operation succeeded only partway.
    #[error("partial mutation: {0}")]
    Partial(#[from] Partial),
    /// The registry echoed a configuration that cannot be reconciled with
    /// the submitted one.
    #[error("inconsistent result: {0}")]
    Inconsistency(String),
    /// The caller-supplied cancellation fired while a call was outstanding.
    #[error("operation cancelled")]
    Cancelled,
}

/// An error from one reconciliation operation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{action} job definition {name:?}: {cause}")]
pub struct ReconcileError {
    /// The operation that failed.
    pub action: Action,
    /// Operator-assigned name of the resource.
    pub name: String,
    /// The underlying cause.
    pub cause: Cause,
}

impl ReconcileError {
    /// Create an error for the given operation and resource name.
    pub fn new(action: Action, name: impl AsRef<str>, cause: Cause) -> Self {
        Self {
            action,
            name: name.as_ref().to_string(),
            cause,
        }
    }

    /// The resource kind this crate reconciles.
    pub fn kind(&self) -> &'static str {
        crate::RESOURCE_KIND
    }

    /// Whether the cause is the distinct not-found signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self.cause, Cause::NotFound)
    }

    /// Whether the cause is caller-requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, Cause::Cancelled)
    }

    /// Whether the cause is a partial mutation.
    pub fn is_partial(&self) -> bool {
        matches!(self.cause, Cause::Partial(_))
    }
}
