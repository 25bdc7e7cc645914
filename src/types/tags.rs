//! Default-tag and ignored-tag policy.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Process-wide tag policy, injected as a read-only configuration value.
///
/// Declared tags are merged over the defaults (declared wins on key
/// collisions), then ignored keys and key prefixes are stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPolicy {
    /// Tags applied to every resource unless overridden by declaration.
    #[serde(default)]
    pub default_tags: BTreeMap<String, String>,
    /// Exact tag keys to drop from the effective set.
    #[serde(default)]
    pub ignore_keys: BTreeSet<String>,
    /// Tag-key prefixes to drop from the effective set.
    #[serde(default)]
    pub ignore_key_prefixes: Vec<String>,
}

impl TagPolicy {
    /// Compute the effective tag set for a declared set.
    pub fn effective(&self, declared: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut all = self.default_tags.clone();
        all.extend(declared.iter().map(|(k, v)| (k.clone(), v.clone())));
        all.retain(|key, _| {
            !self.ignore_keys.contains(key)
                && !self
                    .ignore_key_prefixes
                    .iter()
                    .any(|prefix| key.starts_with(prefix))
        });
        all
    }
}
