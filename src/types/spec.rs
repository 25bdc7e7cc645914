//! Operator-declared definition configuration.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Definition names: up to 128 letters, numbers, underscores and dashes,
/// starting with an alphanumeric.
const NAME_PATTERN: &str = "^[0-9A-Za-z][0-9A-Za-z_-]{0,127}$";

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NAME_PATTERN).expect("name pattern is valid"))
}

/// One environment entry. Order within a list is significant.
///
/// The registry silently drops entries whose value is the empty string when
/// echoing a definition back; see the normalizer for how that is reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name.
    pub name: String,
    /// Variable value. May be empty, in which case the registry ignores it.
    pub value: String,
}

impl EnvVar {
    /// Create an environment entry.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Container execution settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container image reference.
    pub image: String,
    /// Command to run, in argv form.
    pub command: Vec<String>,
    /// vCPU reservation.
    pub vcpus: Option<i32>,
    /// Memory reservation in MiB.
    pub memory: Option<i32>,
    /// Role assumed by the job at runtime.
    pub job_role: Option<String>,
    /// Role used to launch the container.
    pub execution_role: Option<String>,
    /// Whether the container runs privileged.
    pub privileged: Option<bool>,
    /// User to run as inside the container.
    pub user: Option<String>,
    /// Ordered environment entries.
    pub environment: Vec<EnvVar>,
}

/// One contiguous node range of a multinode definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRangeSpec {
    /// Node index range this entry covers, e.g. `"0:"` or `"1:4"`.
    pub target_nodes: String,
    /// Container settings for nodes in the range.
    pub container: ContainerSpec,
}

/// Multinode execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultinodeSpec {
    /// Index of the main node.
    pub main_node: i64,
    /// Total number of nodes.
    pub num_nodes: i64,
    /// Ordered node ranges.
    pub node_ranges: Vec<NodeRangeSpec>,
}

/// Definition body, discriminated by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Properties {
    /// Single-container definition.
    Container(ContainerSpec),
    /// Multinode definition.
    Multinode(MultinodeSpec),
}

impl Properties {
    /// The kind discriminant for this body.
    pub fn kind(&self) -> DefinitionKind {
        match self {
            Self::Container(_) => DefinitionKind::Container,
            Self::Multinode(_) => DefinitionKind::Multinode,
        }
    }
}

/// Resource-type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    /// Single-container definition.
    Container,
    /// Multinode definition.
    Multinode,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Multinode => write!(f, "multinode"),
        }
    }
}

/// Error rejecting an invalid declared configuration.
///
/// Raised before any network call is made.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    /// The definition name does not match the allowed pattern.
    #[error(
        "invalid name {0:?}: must be up to 128 letters, numbers, underscores and dashes, \
         starting with an alphanumeric"
    )]
    InvalidName(String),
    /// The attempt timeout is below the service minimum.
    #[error("timeout_seconds must be at least 60, got {0}")]
    TimeoutTooShort(i64),
    /// Retry attempts outside the accepted range.
    #[error("retry_attempts must be between 1 and 10, got {0}")]
    RetryAttemptsOutOfRange(i32),
    /// A multinode definition declared no node ranges.
    #[error("a multinode definition requires at least one node range")]
    NoNodeRanges,
    /// The main node index is outside the node count.
    #[error("main_node {main_node} must be less than num_nodes {num_nodes}")]
    MainNodeOutOfRange {
        /// Declared main node index.
        main_node: i64,
        /// Declared node count.
        num_nodes: i64,
    },
}

/// Operator-declared configuration of one definition.
///
/// Supplied per reconciliation call; the reconciler never caches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSpec {
    /// Operator-facing name; stable across revisions.
    pub name: String,
    /// Definition body.
    pub properties: Properties,
    /// Scheduling priority, higher runs earlier.
    pub scheduling_priority: Option<i32>,
    /// Free-form parameter defaults, substitutable at submission time.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Whether tags propagate to spawned work.
    #[serde(default)]
    pub propagate_tags: bool,
    /// Attempt timeout in seconds.
    pub timeout_seconds: Option<i64>,
    /// Retry attempts per submission.
    pub retry_attempts: Option<i32>,
    /// Declared tags, before defaults are merged in.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Retire the prior active revision after a full-update publish.
    #[serde(default = "default_retire_on_update")]
    pub retire_on_update: bool,
}

fn default_retire_on_update() -> bool {
    true
}

impl DefinitionSpec {
    /// Create a container definition with everything else defaulted.
    pub fn container(name: impl Into<String>, container: ContainerSpec) -> Self {
        Self {
            name: name.into(),
            properties: Properties::Container(container),
            scheduling_priority: None,
            parameters: BTreeMap::new(),
            propagate_tags: false,
            timeout_seconds: None,
            retry_attempts: None,
            tags: BTreeMap::new(),
            retire_on_update: true,
        }
    }

    /// Create a multinode definition with everything else defaulted.
    pub fn multinode(name: impl Into<String>, multinode: MultinodeSpec) -> Self {
        Self {
            properties: Properties::Multinode(multinode),
            ..Self::container(name, ContainerSpec::default())
        }
    }

    /// The kind discriminant.
    pub fn kind(&self) -> DefinitionKind {
        self.properties.kind()
    }

    /// Validate the declared configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !name_regex().is_match(&self.name) {
            return Err(ValidationError::InvalidName(self.name.clone()));
        }
        if let Some(seconds) = self.timeout_seconds {
            if seconds < 60 {
                return Err(ValidationError::TimeoutTooShort(seconds));
            }
        }
        if let Some(attempts) = self.retry_attempts {
            if !(1..=10).contains(&attempts) {
                return Err(ValidationError::RetryAttemptsOutOfRange(attempts));
            }
        }
        if let Properties::Multinode(multinode) = &self.properties {
            if multinode.node_ranges.is_empty() {
                return Err(ValidationError::NoNodeRanges);
            }
            if multinode.main_node >= multinode.num_nodes {
                return Err(ValidationError::MainNodeOutOfRange {
                    main_node: multinode.main_node,
                    num_nodes: multinode.num_nodes,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> DefinitionSpec {
        DefinitionSpec::container(name, ContainerSpec::default())
    }

    #[test]
    fn test_name_validation() {
        assert!(spec("encoder-1").validate().is_ok());
        assert!(spec("Encoder_A").validate().is_ok());
        assert!(spec("-starts-with-dash").validate().is_err());
        assert!(spec("").validate().is_err());
        assert!(spec("has space").validate().is_err());
        assert!(spec(&"x".repeat(129)).validate().is_err());
        assert!(spec(&"x".repeat(128)).validate().is_ok());
    }

    #[test]
    fn test_timeout_minimum() {
        let mut s = spec("a");
        s.timeout_seconds = Some(59);
        assert!(matches!(
            s.validate(),
            Err(ValidationError::TimeoutTooShort(59))
        ));
        s.timeout_seconds = Some(60);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_retry_attempts_range() {
        let mut s = spec("a");
        s.retry_attempts = Some(0);
        assert!(s.validate().is_err());
        s.retry_attempts = Some(11);
        assert!(s.validate().is_err());
        s.retry_attempts = Some(10);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_multinode_validation() {
        let mut s = DefinitionSpec::multinode(
            "mn",
            MultinodeSpec {
                main_node: 0,
                num_nodes: 2,
                node_ranges: vec![],
            },
        );
        assert!(matches!(s.validate(), Err(ValidationError::NoNodeRanges)));

        if let Properties::Multinode(m) = &mut s.properties {
            m.node_ranges.push(NodeRangeSpec {
                target_nodes: "0:".to_string(),
                container: ContainerSpec::default(),
            });
            m.main_node = 2;
        }
        assert!(matches!(
            s.validate(),
            Err(ValidationError::MainNodeOutOfRange { .. })
        ));

        if let Properties::Multinode(m) = &mut s.properties {
            m.main_node = 0;
        }
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_retire_on_update_defaults_true() {
        let parsed: DefinitionSpec = serde_json::from_value(serde_json::json!({
            "name": "encoder",
            "properties": { "container": { "image": "busybox", "command": [],
                "vcpus": null, "memory": null, "job_role": null, "execution_role": null,
                "privileged": null, "user": null, "environment": [] } },
            "scheduling_priority": null,
            "timeout_seconds": null,
            "retry_attempts": null
        }))
        .unwrap();
        assert!(parsed.retire_on_update);
    }
}
