//! Live snapshots and the locally persisted record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::revision::{RevisionId, RevisionState};
use super::spec::{DefinitionSpec, Properties};

/// Canonical live representation of one revision, as echoed by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSnapshot {
    /// Revision identity and lifecycle status.
    pub state: RevisionState,
    /// Operator-facing name.
    pub name: String,
    /// Echoed definition body.
    pub properties: Properties,
    /// Echoed scheduling priority.
    pub scheduling_priority: Option<i32>,
    /// Echoed parameter defaults.
    pub parameters: BTreeMap<String, String>,
    /// Echoed tag-propagation flag.
    pub propagate_tags: bool,
    /// Echoed attempt timeout.
    pub timeout_seconds: Option<i64>,
    /// Echoed retry attempts.
    pub retry_attempts: Option<i32>,
    /// Current tag set of the resource. Tags apply across all revisions.
    pub tags: BTreeMap<String, String>,
}

impl DefinitionSnapshot {
    /// The revision identifier.
    pub fn revision_id(&self) -> &RevisionId {
        self.state.id()
    }

    /// Whether this revision is currently in effect.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

/// The locally persisted record of an applied definition.
///
/// The compound identifier, the parsed numeric revision and the base prefix
/// are stored as separate fields: the prefix is stable across full updates
/// while the other two change on every publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Compound identifier, `"{base}:{revision}"`.
    pub id: String,
    /// Base identifier prefix, stable across full updates.
    pub base_id: String,
    /// Numeric revision of the identified publication.
    pub revision: u32,
    /// The applied configuration, with the environment normalized back to
    /// declared intent where the registry's echo allows it.
    pub spec: DefinitionSpec,
    /// Effective tag set that was applied (declared merged with defaults,
    /// minus ignored keys).
    pub tags_all: BTreeMap<String, String>,
}

impl StateRecord {
    /// Reconstruct the revision identifier from the stored fields.
    pub fn revision_id(&self) -> RevisionId {
        RevisionId::new(self.base_id.clone(), self.revision)
    }

    /// Assemble a record from the declared spec and a (normalized) snapshot.
    ///
    /// Echoed fields win over declared ones, except for the declared tags and
    /// the retirement preference, which only exist operator-side.
    pub fn assemble(spec: &DefinitionSpec, snapshot: &DefinitionSnapshot) -> Self {
        let id = snapshot.revision_id().clone();
        Self {
            id: id.to_string(),
            base_id: id.base,
            revision: id.number,
            spec: DefinitionSpec {
                name: spec.name.clone(),
                properties: snapshot.properties.clone(),
                scheduling_priority: snapshot.scheduling_priority,
                parameters: snapshot.parameters.clone(),
                propagate_tags: snapshot.propagate_tags,
                timeout_seconds: snapshot.timeout_seconds,
                retry_attempts: snapshot.retry_attempts,
                tags: spec.tags.clone(),
                retire_on_update: spec.retire_on_update,
            },
            tags_all: snapshot.tags.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::spec::{ContainerSpec, EnvVar};

    fn snapshot(base: &str, number: u32) -> DefinitionSnapshot {
        DefinitionSnapshot {
            state: RevisionState::Active(RevisionId::new(base, number)),
            name: "encoder".to_string(),
            properties: Properties::Container(ContainerSpec {
                image: "busybox".to_string(),
                environment: vec![EnvVar::new("A", "1")],
                ..ContainerSpec::default()
            }),
            scheduling_priority: Some(5),
            parameters: BTreeMap::new(),
            propagate_tags: false,
            timeout_seconds: None,
            retry_attempts: None,
            tags: BTreeMap::from([("team".to_string(), "media".to_string())]),
        }
    }

    #[test]
    fn test_assemble_splits_identifier_fields() {
        let spec = DefinitionSpec::container("encoder", ContainerSpec::default());
        let record = StateRecord::assemble(&spec, &snapshot("def/encoder", 3));
        assert_eq!(record.id, "def/encoder:3");
        assert_eq!(record.base_id, "def/encoder");
        assert_eq!(record.revision, 3);
        assert_eq!(record.revision_id(), RevisionId::new("def/encoder", 3));
    }

    #[test]
    fn test_assemble_echo_wins_but_operator_fields_survive() {
        let mut spec = DefinitionSpec::container("encoder", ContainerSpec::default());
        spec.tags.insert("owner".to_string(), "ops".to_string());
        spec.retire_on_update = false;
        spec.scheduling_priority = Some(1);

        let record = StateRecord::assemble(&spec, &snapshot("def/encoder", 1));
        // Echoed values win.
        assert_eq!(record.spec.scheduling_priority, Some(5));
        assert_eq!(record.tags_all.get("team").map(String::as_str), Some("media"));
        // Operator-side fields survive untouched.
        assert_eq!(record.spec.tags.get("owner").map(String::as_str), Some("ops"));
        assert!(!record.spec.retire_on_update);
    }
}
