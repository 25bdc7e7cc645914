//! Domain types for definition reconciliation.

pub mod revision;
pub mod snapshot;
pub mod spec;
pub mod tags;

pub use revision::{RevisionId, RevisionIdParseError, RevisionState, RevisionStatus};
pub use snapshot::{DefinitionSnapshot, StateRecord};
pub use spec::{
    ContainerSpec, DefinitionKind, DefinitionSpec, EnvVar, MultinodeSpec, NodeRangeSpec,
    Properties, ValidationError,
};
pub use tags::TagPolicy;
