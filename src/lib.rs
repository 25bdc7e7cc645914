//! # jobdef-reconciler
//!
//! Reconciles a declared job-definition configuration against its live
//! representation in a versioned, immutable-per-revision definition
//! registry.
//!
//! ## Core Contract
//!
//! 1. Classify every pending change: tag-only mutations update metadata in
//!    place; any other change publishes a brand-new immutable revision
//!    (optionally retiring the prior one).
//! 2. Reconcile the registry's one known echo quirk — environment entries
//!    with empty values are silently dropped — back to declared intent, so
//!    the stored record never drifts for that reason alone.
//! 3. Stay safe under partial failure: every operation re-derives its state
//!    from the live snapshot, so re-invoking a failed operation performs
//!    exactly the residual work.
//!
//! ## Architecture
//!
//! ```text
//! DefinitionSpec → Change Classifier ─┬→ Revision Publisher → Normalizer → refresh → Retirement
//!                                     └→ Tag Delta Applier → refresh
//!                                            ↓
//!                                   DefinitionRegistry (trait)
//! ```
//!
//! ## Failure Model
//!
//! No transport retry and no multi-call atomicity live at this layer.
//! Multi-step sequences that stop halfway (publish-then-retire,
//! remove-then-upsert) surface as distinct partial-mutation errors, and
//! correctness relies on idempotent re-invocation of the whole operation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod classify;
pub mod diff;
pub mod error;
pub mod locate;
pub mod normalize;
pub mod publish;
pub mod reconciler;
pub mod retire;
pub mod tagging;
pub mod types;

// Re-exports
pub use api::{
    CallCounts, DefinitionRegistry, DescribeFilter, DescribePage, InMemoryRegistry, RegistryError,
    Submission,
};
pub use classify::{classify, is_tag_path, render_declared, MutationPath};
pub use diff::{diff_values, DiffEntry, Path, PathSegment};
pub use error::{Action, Cause, Partial, ReconcileError};
pub use locate::LocateError;
pub use normalize::{env_semantically_equal, merge_echoed_properties, reconcile_env};
pub use publish::{Advisory, PublishError, PublishOutcome};
pub use reconciler::{CreateOutcome, Reconciler, UpdateOutcome};
pub use retire::RetireError;
pub use tagging::{TagApplyError, TagDelta};
pub use types::{
    ContainerSpec, DefinitionKind, DefinitionSnapshot, DefinitionSpec, EnvVar, MultinodeSpec,
    NodeRangeSpec, Properties, RevisionId, RevisionState, RevisionStatus, StateRecord, TagPolicy,
    ValidationError,
};

/// The resource kind this crate reconciles, as it appears in error reports.
pub const RESOURCE_KIND: &str = "job definition";
