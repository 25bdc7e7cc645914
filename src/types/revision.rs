//! Revision identity and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one immutable revision of a definition.
///
/// Rendered as the compound identifier `"{base}:{number}"`. The base
/// identifier is stable across full updates; the revision number strictly
/// increases per base and is never reused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId {
    /// Stable identifier shared by all revisions of one definition.
    pub base: String,
    /// Revision number, assigned by the registry on submission.
    pub number: u32,
}

impl RevisionId {
    /// Create a revision identifier.
    pub fn new(base: impl Into<String>, number: u32) -> Self {
        Self {
            base: base.into(),
            number,
        }
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.base, self.number)
    }
}

/// Error parsing a compound revision identifier.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RevisionIdParseError {
    /// The identifier has no `:` separator.
    #[error("missing ':' separator in revision identifier {0:?}")]
    MissingSeparator(String),
    /// The suffix after the last `:` is not a revision number.
    #[error("invalid revision number in identifier {0:?}")]
    InvalidNumber(String),
}

impl FromStr for RevisionId {
    type Err = RevisionIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, suffix) = s
            .rsplit_once(':')
            .ok_or_else(|| RevisionIdParseError::MissingSeparator(s.to_string()))?;
        let number = suffix
            .parse::<u32>()
            .map_err(|_| RevisionIdParseError::InvalidNumber(s.to_string()))?;
        Ok(Self {
            base: base.to_string(),
            number,
        })
    }
}

/// Whether a revision is the one currently in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionStatus {
    /// The revision is in effect.
    Active,
    /// The revision has been retired and only remains addressable.
    Retired,
}

impl fmt::Display for RevisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Retired => write!(f, "retired"),
        }
    }
}

/// Revision lifecycle as a tagged variant.
///
/// The only transition is `Active -> Retired`, via [`RevisionState::retire`].
/// There is deliberately no inverse: a retired revision never becomes active
/// again, and the type makes that unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "id", rename_all = "lowercase")]
pub enum RevisionState {
    /// The revision currently in effect.
    Active(RevisionId),
    /// A retired revision; its definition remains addressable but inert.
    Retired(RevisionId),
}

impl RevisionState {
    /// The revision identifier, regardless of status.
    pub fn id(&self) -> &RevisionId {
        match self {
            Self::Active(id) | Self::Retired(id) => id,
        }
    }

    /// The status discriminant.
    pub fn status(&self) -> RevisionStatus {
        match self {
            Self::Active(_) => RevisionStatus::Active,
            Self::Retired(_) => RevisionStatus::Retired,
        }
    }

    /// Whether this revision is currently in effect.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Transition to retired. Retiring an already-retired revision is a no-op.
    pub fn retire(self) -> Self {
        match self {
            Self::Active(id) | Self::Retired(id) => Self::Retired(id),
        }
    }
}
