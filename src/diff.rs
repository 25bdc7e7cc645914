//! Structural diff between two configuration trees.
//!
//! The diff walks two `serde_json::Value` trees and returns an ordered list
//! of `(path, old, new)` triples. Paths are sequences of typed segments, so
//! callers compare segments structurally instead of matching rendered
//! strings. Ordering is deterministic: object keys are visited in sorted
//! order, array elements by index.

use serde_json::Value;
use std::fmt;

/// One step into a configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// An object member.
    Key(String),
    /// An array element.
    Index(usize),
}

/// A path from the tree root to one attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<PathSegment>);

impl Path {
    /// The empty path (tree root).
    pub fn root() -> Self {
        Self::default()
    }

    /// The typed segments of this path.
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// The first segment, if any.
    pub fn first(&self) -> Option<&PathSegment> {
        self.0.first()
    }

    fn child_key(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.to_string()));
        Self(segments)
    }

    fn child_index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        Self(segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{key}")?;
                }
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// One changed attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    /// Path of the changed attribute.
    pub path: Path,
    /// Prior value, absent when the attribute was added.
    pub old: Option<Value>,
    /// New value, absent when the attribute was removed.
    pub new: Option<Value>,
}

/// Compute the ordered structural diff between two trees.
pub fn diff_values(old: &Value, new: &Value) -> Vec<DiffEntry> {
    let mut out = Vec::new();
    walk(Path::root(), old, new, &mut out);
    out
}

fn walk(path: Path, old: &Value, new: &Value, out: &mut Vec<DiffEntry>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let keys: std::collections::BTreeSet<&String> =
                old_map.keys().chain(new_map.keys()).collect();
            for key in keys {
                let child = path.child_key(key);
                match (old_map.get(key), new_map.get(key)) {
                    (Some(a), Some(b)) => walk(child, a, b, out),
                    (Some(a), None) => out.push(DiffEntry {
                        path: child,
                        old: Some(a.clone()),
                        new: None,
                    }),
                    (None, Some(b)) => out.push(DiffEntry {
                        path: child,
                        old: None,
                        new: Some(b.clone()),
                    }),
                    (None, None) => {}
                }
            }
        }
        (Value::Array(old_items), Value::Array(new_items)) => {
            let len = old_items.len().max(new_items.len());
            for index in 0..len {
                let child = path.child_index(index);
                match (old_items.get(index), new_items.get(index)) {
                    (Some(a), Some(b)) => walk(child, a, b, out),
                    (Some(a), None) => out.push(DiffEntry {
                        path: child,
                        old: Some(a.clone()),
                        new: None,
                    }),
                    (None, Some(b)) => out.push(DiffEntry {
                        path: child,
                        old: None,
                        new: Some(b.clone()),
                    }),
                    (None, None) => {}
                }
            }
        }
        _ => {
            if old != new {
                out.push(DiffEntry {
                    path,
                    old: Some(old.clone()),
                    new: Some(new.clone()),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equal_trees_have_empty_diff() {
        let value = json!({"a": 1, "b": {"c": [1, 2]}});
        assert!(diff_values(&value, &value).is_empty());
    }

    #[test]
    fn test_scalar_change_yields_full_path() {
        let old = json!({"properties": {"container": {"vcpus": 1}}});
        let new = json!({"properties": {"container": {"vcpus": 2}}});
        let diff = diff_values(&old, &new);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].path.to_string(), "properties.container.vcpus");
        assert_eq!(diff[0].old, Some(json!(1)));
        assert_eq!(diff[0].new, Some(json!(2)));
    }

    #[test]
    fn test_added_and_removed_keys() {
        let old = json!({"a": 1, "gone": true});
        let new = json!({"a": 1, "added": false});
        let diff = diff_values(&old, &new);
        assert_eq!(diff.len(), 2);
        // Sorted key order: "added" before "gone".
        assert_eq!(diff[0].path.to_string(), "added");
        assert!(diff[0].old.is_none());
        assert_eq!(diff[1].path.to_string(), "gone");
        assert!(diff[1].new.is_none());
    }

    #[test]
    fn test_array_length_change() {
        let old = json!({"env": [{"name": "A"}, {"name": "B"}]});
        let new = json!({"env": [{"name": "A"}]});
        let diff = diff_values(&old, &new);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].path.to_string(), "env[1]");
        assert!(diff[0].new.is_none());
    }

    #[test]
    fn test_type_change_is_one_entry() {
        let old = json!({"x": {"nested": 1}});
        let new = json!({"x": 3});
        let diff = diff_values(&old, &new);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].path.to_string(), "x");
    }

    #[test]
    fn test_path_display_mixes_keys_and_indices() {
        let old = json!({"ranges": [{"env": [{"value": "1"}]}]});
        let new = json!({"ranges": [{"env": [{"value": "2"}]}]});
        let diff = diff_values(&old, &new);
        assert_eq!(diff[0].path.to_string(), "ranges[0].env[0].value");
    }

    #[test]
    fn test_deterministic_ordering() {
        let old = json!({"b": 1, "a": 1, "c": 1});
        let new = json!({"b": 2, "a": 2, "c": 2});
        let paths: Vec<String> = diff_values(&old, &new)
            .into_iter()
            .map(|e| e.path.to_string())
            .collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
    }
}
