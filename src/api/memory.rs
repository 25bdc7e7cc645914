//! In-memory definition registry for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::{DefinitionRegistry, DescribeFilter, DescribePage, Submission};
use crate::types::{DefinitionSnapshot, EnvVar, Properties, RevisionId, RevisionState};

/// Error type for the in-memory registry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// No resource under the given base identifier.
    #[error("no definition under base identifier {0:?}")]
    UnknownBase(String),
    /// A failure injected by a test.
    #[error("injected {0} failure")]
    Injected(&'static str),
}

/// Counters for every registry call issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `submit` calls.
    pub submits: usize,
    /// `describe` calls (pages, not logical lookups).
    pub describes: usize,
    /// `retire` calls.
    pub retires: usize,
    /// `tag_upsert` calls.
    pub tag_upserts: usize,
    /// `tag_remove` calls.
    pub tag_removes: usize,
}

impl CallCounts {
    /// Total number of mutating calls.
    pub fn mutations(&self) -> usize {
        self.submits + self.retires + self.tag_upserts + self.tag_removes
    }
}

#[derive(Debug, Default)]
struct FailNext {
    submit: bool,
    describe: bool,
    retire: bool,
    tag_upsert: bool,
    tag_remove: bool,
}

#[derive(Debug, Default)]
struct Inner {
    /// Revisions per base identifier, ascending by revision number.
    definitions: BTreeMap<String, Vec<DefinitionSnapshot>>,
    /// Next revision number per base identifier. Numbers are never reused.
    next_number: BTreeMap<String, u32>,
    /// Live tags per base identifier; tags apply across all revisions.
    tags: BTreeMap<String, BTreeMap<String, String>>,
    calls: CallCounts,
    fail_next: FailNext,
    /// Test hook: force this variable to this value in every echoed body.
    env_override: Option<(String, String)>,
    last_tag_upsert_target: Option<String>,
    last_tag_remove_target: Option<String>,
}

/// In-memory registry with the real service's echo semantics.
///
/// Uses BTreeMap containers for deterministic iteration order. Revision
/// numbers increase monotonically per base and are never reused. Echoed
/// bodies silently drop environment entries with an empty value, which is
/// what the normalizer exists to reconcile.
#[derive(Debug)]
pub struct InMemoryRegistry {
    inner: Mutex<Inner>,
    page_size: usize,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    /// Create an empty registry with a large page size.
    pub fn new() -> Self {
        Self::with_page_size(50)
    }

    /// Create an empty registry returning at most `page_size` snapshots per
    /// describe page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size: page_size.max(1),
        }
    }

    /// The base identifier the registry assigns for a definition name.
    pub fn base_id_for(name: &str) -> String {
        format!("def/{name}")
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> CallCounts {
        self.inner.lock().calls
    }

    /// All revisions under a name, ascending by revision number.
    pub fn revisions(&self, name: &str) -> Vec<DefinitionSnapshot> {
        self.inner
            .lock()
            .definitions
            .get(&Self::base_id_for(name))
            .cloned()
            .unwrap_or_default()
    }

    /// The revisions under a name that are still active.
    pub fn active_revisions(&self, name: &str) -> Vec<DefinitionSnapshot> {
        self.revisions(name)
            .into_iter()
            .filter(|s| s.is_active())
            .collect()
    }

    /// Current live tags of a resource.
    pub fn live_tags(&self, name: &str) -> BTreeMap<String, String> {
        self.inner
            .lock()
            .tags
            .get(&Self::base_id_for(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Fail the next `submit` call.
    pub fn fail_next_submit(&self) {
        self.inner.lock().fail_next.submit = true;
    }

    /// Fail the next `describe` call.
    pub fn fail_next_describe(&self) {
        self.inner.lock().fail_next.describe = true;
    }

    /// Fail the next `retire` call.
    pub fn fail_next_retire(&self) {
        self.inner.lock().fail_next.retire = true;
    }

    /// Fail the next `tag_upsert` call.
    pub fn fail_next_tag_upsert(&self) {
        self.inner.lock().fail_next.tag_upsert = true;
    }

    /// Fail the next `tag_remove` call.
    pub fn fail_next_tag_remove(&self) {
        self.inner.lock().fail_next.tag_remove = true;
    }

    /// Force `name` to echo with `value` in every stored body, simulating a
    /// registry that rewrites submitted configuration.
    pub fn override_env_value(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.lock().env_override = Some((name.into(), value.into()));
    }

    /// Base identifier the last `tag_upsert` call targeted.
    pub fn last_tag_upsert_target(&self) -> Option<String> {
        self.inner.lock().last_tag_upsert_target.clone()
    }

    /// Base identifier the last `tag_remove` call targeted.
    pub fn last_tag_remove_target(&self) -> Option<String> {
        self.inner.lock().last_tag_remove_target.clone()
    }
}

/// Drop empty-valued environment entries, as the real service does on echo.
fn strip_empty_env(environment: &[EnvVar]) -> Vec<EnvVar> {
    environment
        .iter()
        .filter(|var| !var.value.is_empty())
        .cloned()
        .collect()
}

fn apply_override(environment: &mut [EnvVar], override_var: &Option<(String, String)>) {
    if let Some((name, value)) = override_var {
        for var in environment.iter_mut() {
            if var.name == *name {
                var.value = value.clone();
            }
        }
    }
}

fn echo_properties(properties: &Properties, override_var: &Option<(String, String)>) -> Properties {
    match properties {
        Properties::Container(container) => {
            let mut echoed = container.clone();
            echoed.environment = strip_empty_env(&container.environment);
            apply_override(&mut echoed.environment, override_var);
            Properties::Container(echoed)
        }
        Properties::Multinode(multinode) => {
            let mut echoed = multinode.clone();
            for range in &mut echoed.node_ranges {
                range.container.environment = strip_empty_env(&range.container.environment);
                apply_override(&mut range.container.environment, override_var);
            }
            Properties::Multinode(echoed)
        }
    }
}

fn matches_filter(snapshot: &DefinitionSnapshot, filter: &DescribeFilter) -> bool {
    if !filter.exact_ids.is_empty() && !filter.exact_ids.contains(snapshot.revision_id()) {
        return false;
    }
    if !filter.base_ids.is_empty()
        && !filter
            .base_ids
            .iter()
            .any(|base| *base == snapshot.revision_id().base)
    {
        return false;
    }
    if let Some(status) = filter.status {
        if snapshot.state.status() != status {
            return false;
        }
    }
    true
}

#[async_trait]
impl DefinitionRegistry for InMemoryRegistry {
    type Error = RegistryError;

    async fn submit(&self, submission: &Submission) -> Result<RevisionId, Self::Error> {
        let mut inner = self.inner.lock();
        inner.calls.submits += 1;
        if std::mem::take(&mut inner.fail_next.submit) {
            return Err(RegistryError::Injected("submit"));
        }

        let base = Self::base_id_for(&submission.name);
        let counter = inner.next_number.entry(base.clone()).or_insert(0);
        *counter += 1;
        let id = RevisionId::new(base.clone(), *counter);

        let properties = echo_properties(&submission.properties, &inner.env_override);
        let snapshot = DefinitionSnapshot {
            state: RevisionState::Active(id.clone()),
            name: submission.name.clone(),
            properties,
            scheduling_priority: submission.scheduling_priority,
            parameters: submission.parameters.clone(),
            propagate_tags: submission.propagate_tags,
            timeout_seconds: submission.timeout_seconds,
            retry_attempts: submission.retry_attempts,
            tags: BTreeMap::new(),
        };
        inner.definitions.entry(base.clone()).or_default().push(snapshot);
        inner.tags.insert(base, submission.tags.clone());
        Ok(id)
    }

    async fn describe(
        &self,
        filter: &DescribeFilter,
        page_token: Option<&str>,
    ) -> Result<DescribePage, Self::Error> {
        let mut inner = self.inner.lock();
        inner.calls.describes += 1;
        if std::mem::take(&mut inner.fail_next.describe) {
            return Err(RegistryError::Injected("describe"));
        }

        let matching: Vec<DefinitionSnapshot> = inner
            .definitions
            .values()
            .flatten()
            .filter(|snapshot| matches_filter(snapshot, filter))
            .map(|snapshot| {
                let mut snapshot = snapshot.clone();
                // Tags live on the base identifier and mutate after submit.
                snapshot.tags = inner
                    .tags
                    .get(&snapshot.revision_id().base)
                    .cloned()
                    .unwrap_or_default();
                snapshot
            })
            .collect();

        let offset: usize = page_token
            .and_then(|t| t.parse().ok())
            .unwrap_or(0)
            .min(matching.len());
        let end = (offset + self.page_size).min(matching.len());
        let next_token = (end < matching.len()).then(|| end.to_string());
        Ok(DescribePage {
            definitions: matching[offset..end].to_vec(),
            next_token,
        })
    }

    async fn retire(&self, id: &RevisionId) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock();
        inner.calls.retires += 1;
        if std::mem::take(&mut inner.fail_next.retire) {
            return Err(RegistryError::Injected("retire"));
        }

        // Idempotent: unknown or already-retired revisions are fine.
        if let Some(revisions) = inner.definitions.get_mut(&id.base) {
            for snapshot in revisions.iter_mut() {
                if snapshot.revision_id() == id {
                    snapshot.state = snapshot.state.clone().retire();
                }
            }
        }
        Ok(())
    }

    async fn tag_upsert(
        &self,
        base_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock();
        inner.calls.tag_upserts += 1;
        inner.last_tag_upsert_target = Some(base_id.to_string());
        if std::mem::take(&mut inner.fail_next.tag_upsert) {
            return Err(RegistryError::Injected("tag_upsert"));
        }

        let Some(live) = inner.tags.get_mut(base_id) else {
            return Err(RegistryError::UnknownBase(base_id.to_string()));
        };
        live.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn tag_remove(&self, base_id: &str, keys: &[String]) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock();
        inner.calls.tag_removes += 1;
        inner.last_tag_remove_target = Some(base_id.to_string());
        if std::mem::take(&mut inner.fail_next.tag_remove) {
            return Err(RegistryError::Injected("tag_remove"));
        }

        let Some(live) = inner.tags.get_mut(base_id) else {
            return Err(RegistryError::UnknownBase(base_id.to_string()));
        };
        for key in keys {
            live.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContainerSpec;

    fn submission(name: &str, environment: Vec<EnvVar>) -> Submission {
        Submission {
            name: name.to_string(),
            properties: Properties::Container(ContainerSpec {
                image: "busybox".to_string(),
                environment,
                ..ContainerSpec::default()
            }),
            scheduling_priority: None,
            parameters: BTreeMap::new(),
            propagate_tags: false,
            timeout_seconds: None,
            retry_attempts: None,
            tags: BTreeMap::from([("team".to_string(), "media".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_revision_numbers_are_monotonic() {
        let registry = InMemoryRegistry::new();
        let first = registry.submit(&submission("encoder", vec![])).await.unwrap();
        let second = registry.submit(&submission("encoder", vec![])).await.unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert_eq!(first.base, second.base);
    }

    #[tokio::test]
    async fn test_echo_drops_empty_env_values() {
        let registry = InMemoryRegistry::new();
        registry
            .submit(&submission(
                "encoder",
                vec![EnvVar::new("A", "1"), EnvVar::new("B", "")],
            ))
            .await
            .unwrap();

        let revisions = registry.revisions("encoder");
        let Properties::Container(container) = &revisions[0].properties else {
            panic!("expected container properties");
        };
        assert_eq!(container.environment, vec![EnvVar::new("A", "1")]);
    }

    #[tokio::test]
    async fn test_describe_overlays_live_tags() {
        let registry = InMemoryRegistry::new();
        let id = registry.submit(&submission("encoder", vec![])).await.unwrap();
        registry
            .tag_upsert(
                &id.base,
                &BTreeMap::from([("extra".to_string(), "1".to_string())]),
            )
            .await
            .unwrap();

        let page = registry
            .describe(&DescribeFilter::exact(id), None)
            .await
            .unwrap();
        assert_eq!(
            page.definitions[0].tags.get("extra").map(String::as_str),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_retire_is_idempotent() {
        let registry = InMemoryRegistry::new();
        let id = registry.submit(&submission("encoder", vec![])).await.unwrap();
        registry.retire(&id).await.unwrap();
        registry.retire(&id).await.unwrap();
        registry
            .retire(&RevisionId::new("def/ghost", 9))
            .await
            .unwrap();
        assert!(registry.active_revisions("encoder").is_empty());
    }

    #[tokio::test]
    async fn test_pagination_walks_all_revisions() {
        let registry = InMemoryRegistry::with_page_size(2);
        for _ in 0..5 {
            registry.submit(&submission("encoder", vec![])).await.unwrap();
        }

        let filter = DescribeFilter::base(InMemoryRegistry::base_id_for("encoder"));
        let mut token: Option<String> = None;
        let mut seen = 0;
        loop {
            let page = registry.describe(&filter, token.as_deref()).await.unwrap();
            assert!(page.definitions.len() <= 2);
            seen += page.definitions.len();
            match page.next_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        assert_eq!(seen, 5);
    }

    #[tokio::test]
    async fn test_injected_failures_fire_once() {
        let registry = InMemoryRegistry::new();
        registry.fail_next_submit();
        assert!(registry.submit(&submission("encoder", vec![])).await.is_err());
        assert!(registry.submit(&submission("encoder", vec![])).await.is_ok());
    }
}
