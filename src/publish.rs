//! Full-definition publishing.
//!
//! A publish is submit-then-refresh: register the new immutable revision,
//! fetch its canonical snapshot back, and reconcile the echoed environment
//! lists against the submitted ones before handing the snapshot to the
//! caller.

use std::collections::BTreeMap;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{cancellable, DefinitionRegistry, Submission};
use crate::locate::{self, LocateError};
use crate::normalize::merge_echoed_properties;
use crate::types::{DefinitionSnapshot, DefinitionSpec, Properties, RevisionId};

/// Non-fatal advisory emitted before submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    /// Where in the definition body the entry sits.
    pub location: String,
    /// Name of the affected environment variable.
    pub variable: String,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "environment variable {:?} in {} has an empty value, which the registry ignores",
            self.variable, self.location
        )
    }
}

/// Error publishing a new revision.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    /// The submission itself failed; no revision exists.
    #[error("submission failed: {0}")]
    Submit(String),
    /// The submission succeeded but the snapshot fetch did not. The remote
    /// revision exists; local state could not be confirmed.
    #[error("revision {id} was published but its snapshot could not be confirmed: {detail}")]
    Unconfirmed {
        /// The identifier the registry assigned.
        id: RevisionId,
        /// The fetch failure.
        detail: String,
    },
    /// The echoed configuration differs from the submitted one beyond the
    /// known empty-value transformation.
    #[error("revision {id} echoed an environment that does not match the submitted intent")]
    Inconsistent {
        /// The identifier the registry assigned.
        id: RevisionId,
    },
    /// The caller-supplied cancellation fired.
    #[error("cancelled")]
    Cancelled,
}

/// A published revision's normalized snapshot plus the advisories raised.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    /// The canonical snapshot, with environment lists normalized back to
    /// submitted intent.
    pub snapshot: DefinitionSnapshot,
    /// Advisories for empty-valued environment entries.
    pub advisories: Vec<Advisory>,
}

/// Collect advisories for every empty-valued environment entry in a body.
pub fn empty_env_advisories(properties: &Properties) -> Vec<Advisory> {
    let mut out = Vec::new();
    match properties {
        Properties::Container(container) => {
            for var in &container.environment {
                if var.value.is_empty() {
                    out.push(Advisory {
                        location: "container".to_string(),
                        variable: var.name.clone(),
                    });
                }
            }
        }
        Properties::Multinode(multinode) => {
            for (index, range) in multinode.node_ranges.iter().enumerate() {
                for var in &range.container.environment {
                    if var.value.is_empty() {
                        out.push(Advisory {
                            location: format!("node_ranges[{index}].container"),
                            variable: var.name.clone(),
                        });
                    }
                }
            }
        }
    }
    out
}

/// Publish a new revision of the definition and return its normalized
/// snapshot.
pub async fn publish<R: DefinitionRegistry>(
    registry: &R,
    cancel: &CancellationToken,
    spec: &DefinitionSpec,
    tags_all: BTreeMap<String, String>,
) -> Result<PublishOutcome, PublishError> {
    let submission = Submission::from_spec(spec, tags_all);

    let advisories = empty_env_advisories(&submission.properties);
    for advisory in &advisories {
        warn!(name = %spec.name, %advisory, "ignoring environment variable");
    }

    let id = match cancellable(cancel, registry.submit(&submission)).await {
        None => return Err(PublishError::Cancelled),
        Some(result) => result.map_err(|e| PublishError::Submit(e.to_string()))?,
    };
    debug!(%id, "registered new revision");

    let snapshot = locate::find_by_revision(registry, cancel, &id)
        .await
        .map_err(|e| match e {
            LocateError::Cancelled => PublishError::Cancelled,
            other => PublishError::Unconfirmed {
                id: id.clone(),
                detail: other.to_string(),
            },
        })?;

    let (merged, consistent) = merge_echoed_properties(&submission.properties, &snapshot.properties);
    if !consistent {
        return Err(PublishError::Inconsistent { id });
    }
    Ok(PublishOutcome {
        snapshot: DefinitionSnapshot {
            properties: merged,
            ..snapshot
        },
        advisories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryRegistry;
    use crate::types::{ContainerSpec, EnvVar};

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    fn spec_with_env(environment: Vec<EnvVar>) -> DefinitionSpec {
        DefinitionSpec::container(
            "encoder",
            ContainerSpec {
                image: "busybox".to_string(),
                environment,
                ..ContainerSpec::default()
            },
        )
    }

    #[tokio::test]
    async fn test_publish_preserves_empty_env_and_warns() {
        let registry = InMemoryRegistry::new();
        let spec = spec_with_env(vec![EnvVar::new("KEEP", "1"), EnvVar::new("DROP", "")]);

        let outcome = publish(&registry, &token(), &spec, BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(outcome.advisories.len(), 1);
        assert_eq!(outcome.advisories[0].variable, "DROP");

        // The registry dropped the empty entry, but the normalized snapshot
        // carries the declared list, order and empties intact.
        let Properties::Container(container) = &outcome.snapshot.properties else {
            panic!("expected container properties");
        };
        assert_eq!(
            container.environment,
            vec![EnvVar::new("KEEP", "1"), EnvVar::new("DROP", "")]
        );
    }

    #[tokio::test]
    async fn test_submit_failure_is_fatal() {
        let registry = InMemoryRegistry::new();
        registry.fail_next_submit();
        let err = publish(&registry, &token(), &spec_with_env(vec![]), BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Submit(_)));
        assert!(registry.revisions("encoder").is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_after_submit_is_unconfirmed() {
        let registry = InMemoryRegistry::new();
        registry.fail_next_describe();
        let err = publish(&registry, &token(), &spec_with_env(vec![]), BTreeMap::new())
            .await
            .unwrap_err();
        match err {
            PublishError::Unconfirmed { id, .. } => assert_eq!(id.number, 1),
            other => panic!("expected unconfirmed, got {other}"),
        }
        // The remote revision does exist.
        assert_eq!(registry.revisions("encoder").len(), 1);
    }

    #[tokio::test]
    async fn test_mangled_echo_is_inconsistent() {
        let registry = InMemoryRegistry::new();
        registry.override_env_value("A", "mangled");
        let err = publish(
            &registry,
            &token(),
            &spec_with_env(vec![EnvVar::new("A", "1")]),
            BTreeMap::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PublishError::Inconsistent { .. }));
    }

    #[tokio::test]
    async fn test_multinode_advisories_name_the_range() {
        use crate::types::{MultinodeSpec, NodeRangeSpec};
        let spec = DefinitionSpec::multinode(
            "mn",
            MultinodeSpec {
                main_node: 0,
                num_nodes: 2,
                node_ranges: vec![
                    NodeRangeSpec {
                        target_nodes: "0:".to_string(),
                        container: ContainerSpec::default(),
                    },
                    NodeRangeSpec {
                        target_nodes: "1:".to_string(),
                        container: ContainerSpec {
                            environment: vec![EnvVar::new("EMPTY", "")],
                            ..ContainerSpec::default()
                        },
                    },
                ],
            },
        );
        let advisories = empty_env_advisories(&spec.properties);
        assert_eq!(advisories.len(), 1);
        assert_eq!(advisories[0].location, "node_ranges[1].container");
    }
}
