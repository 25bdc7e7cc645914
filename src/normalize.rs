//! Semantic normalization of echoed environment lists.
//!
//! The registry silently omits environment entries whose value is the empty
//! string when echoing a definition back. That is the one deterministic,
//! known transformation this crate reconciles automatically: if the echoed
//! list differs from the submitted one in exactly that way, the submitted
//! list is the value to persist — it is true operator intent, and persisting
//! it prevents perpetual drift. Any other discrepancy is real and must
//! surface rather than be masked.

use std::collections::BTreeMap;

use crate::types::{EnvVar, Properties};

/// Whether an echoed list equals the submitted one under the known
/// empty-value-dropping transformation.
///
/// Echoed names are assumed unique (the registry guarantees this). For each
/// submitted entry in original order: an empty value must be absent from the
/// echo, a non-empty value must be echoed exactly.
pub fn env_semantically_equal(submitted: &[EnvVar], echoed: &[EnvVar]) -> bool {
    let echoed_map: BTreeMap<&str, &str> = echoed
        .iter()
        .map(|var| (var.name.as_str(), var.value.as_str()))
        .collect();

    submitted.iter().all(|var| {
        let echoed_value = echoed_map.get(var.name.as_str());
        if var.value.is_empty() {
            echoed_value.is_none()
        } else {
            echoed_value == Some(&var.value.as_str())
        }
    })
}

/// Reconcile an echoed environment list against the submitted one.
///
/// Returns the submitted list unchanged (order and empty entries preserved)
/// when the two are semantically equal, and the echoed list verbatim
/// otherwise, so the real inconsistency surfaces downstream.
pub fn reconcile_env(submitted: &[EnvVar], echoed: &[EnvVar]) -> Vec<EnvVar> {
    if env_semantically_equal(submitted, echoed) {
        submitted.to_vec()
    } else {
        echoed.to_vec()
    }
}

/// Merge normalized environment lists into an echoed definition body.
///
/// Walks every environment list the body carries (the container, or each
/// node range of a multinode body) and reconciles it against the submitted
/// counterpart. Returns the merged body and whether every list reconciled to
/// the submitted intent; `false` means the echo carries a genuine
/// discrepancy and the merged body holds the echoed values.
pub fn merge_echoed_properties(submitted: &Properties, echoed: &Properties) -> (Properties, bool) {
    match (submitted, echoed) {
        (Properties::Container(sub), Properties::Container(echo)) => {
            let consistent = env_semantically_equal(&sub.environment, &echo.environment);
            let mut merged = echo.clone();
            merged.environment = reconcile_env(&sub.environment, &echo.environment);
            (Properties::Container(merged), consistent)
        }
        (Properties::Multinode(sub), Properties::Multinode(echo)) => {
            if sub.node_ranges.len() != echo.node_ranges.len() {
                return (Properties::Multinode(echo.clone()), false);
            }
            let mut merged = echo.clone();
            let mut consistent = true;
            for (merged_range, sub_range) in merged.node_ranges.iter_mut().zip(&sub.node_ranges) {
                consistent &= env_semantically_equal(
                    &sub_range.container.environment,
                    &merged_range.container.environment,
                );
                merged_range.container.environment = reconcile_env(
                    &sub_range.container.environment,
                    &merged_range.container.environment,
                );
            }
            (Properties::Multinode(merged), consistent)
        }
        // A kind mismatch is never explainable by dropped empty values.
        (_, echo) => (echo.clone(), false),
    }
}
