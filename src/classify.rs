//! Change classification: tag-only update or new revision.
//!
//! The backing registry treats a full definition as immutable per revision,
//! so any non-tag field change requires publishing a new revision; tag
//! changes never do.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::diff::{diff_values, Path, PathSegment};
use crate::types::DefinitionSpec;

/// Attribute namespaces excluded from classification.
const TAG_NAMESPACES: [&str; 2] = ["tags", "tags_all"];

/// The mutation path chosen for a pending change.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationPath {
    /// At least one non-tag attribute changed; a new revision is required.
    FullUpdate {
        /// The non-tag paths that changed, in diff order.
        changed: Vec<Path>,
    },
    /// Only tag-namespace attributes changed (or nothing at all).
    TagsOnly,
}

/// Whether a diff path falls in the tag namespaces.
///
/// Compares the first typed segment, so an unrelated attribute whose name
/// merely starts with `tags` (say `tags_extra`) is never excluded.
pub fn is_tag_path(path: &Path) -> bool {
    matches!(
        path.first(),
        Some(PathSegment::Key(key)) if TAG_NAMESPACES.contains(&key.as_str())
    )
}

#[derive(Serialize)]
struct DeclaredView<'a> {
    #[serde(flatten)]
    spec: &'a DefinitionSpec,
    tags_all: &'a BTreeMap<String, String>,
}

/// Render the declared state of a definition for diffing.
///
/// Only declared attributes enter the tree: the `DefinitionSpec` fields,
/// the declared tags and the effective tag set. Computed identifier fields
/// never do.
pub fn render_declared(
    spec: &DefinitionSpec,
    tags_all: &BTreeMap<String, String>,
) -> Result<Value, serde_json::Error> {
    serde_json::to_value(DeclaredView { spec, tags_all })
}

/// Classify the pending change between two declared-state trees.
pub fn classify(prior: &Value, desired: &Value) -> MutationPath {
    let changed: Vec<Path> = diff_values(prior, desired)
        .into_iter()
        .map(|entry| entry.path)
        .filter(|path| !is_tag_path(path))
        .collect();
    if changed.is_empty() {
        MutationPath::TagsOnly
    } else {
        MutationPath::FullUpdate { changed }
    }
}
