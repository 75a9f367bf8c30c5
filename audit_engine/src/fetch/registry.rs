//! Fetcher registry: selector name -> fetcher implementation.

use crate::fetch::ResourceFetcher;
use audit_controls::ResourceSelector;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("selector '{selector}' already registered by fetcher '{fetcher_id}'")]
    DuplicateSelector {
        selector: ResourceSelector,
        fetcher_id: String,
    },

    #[error("no fetcher registered for selector '{0}'")]
    UnknownSelector(ResourceSelector),
}

/// Maps every selector a control may name to the fetcher that serves it.
/// Fetchers are `Arc`-shared because fetch calls may be handed to deadline
/// helper threads.
#[derive(Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<ResourceSelector, Arc<dyn ResourceFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fetcher under every selector it serves.
    pub fn register(&mut self, fetcher: Arc<dyn ResourceFetcher>) -> Result<(), RegistryError> {
        for selector in fetcher.selectors() {
            if let Some(existing) = self.fetchers.get(&selector) {
                return Err(RegistryError::DuplicateSelector {
                    selector,
                    fetcher_id: existing.fetcher_id().to_string(),
                });
            }
            log::debug!(
                "registering fetcher '{}' for selector '{}'",
                fetcher.fetcher_id(),
                selector
            );
            self.fetchers.insert(selector, Arc::clone(&fetcher));
        }
        Ok(())
    }

    pub fn get(&self, selector: &ResourceSelector) -> Result<Arc<dyn ResourceFetcher>, RegistryError> {
        self.fetchers
            .get(selector)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownSelector(selector.clone()))
    }

    pub fn has_selector(&self, selector: &ResourceSelector) -> bool {
        self.fetchers.contains_key(selector)
    }

    pub fn selectors(&self) -> Vec<ResourceSelector> {
        let mut selectors: Vec<_> = self.fetchers.keys().cloned().collect();
        selectors.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        selectors
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;
    use assert_matches::assert_matches;

    // Test-only: `assert_matches!` formats the matched value via `{:?}` on its
    // failure path, so the `Arc<dyn ResourceFetcher>` success arm must be
    // `Debug`. Scoped to tests; no effect on production types or the trait API.
    impl std::fmt::Debug for dyn ResourceFetcher {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "dyn ResourceFetcher({})", self.fetcher_id())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = FetcherRegistry::new();
        registry
            .register(Arc::new(
                StaticFetcher::new("static")
                    .with_instances("gke-cluster", Vec::new())
                    .with_instances("gke-node-pool", Vec::new()),
            ))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.has_selector(&ResourceSelector::new("gke-cluster")));
        assert_matches!(
            registry.get(&ResourceSelector::new("storage-bucket-iam")),
            Err(RegistryError::UnknownSelector(_))
        );
    }

    #[test]
    fn test_duplicate_selector_rejected() {
        let mut registry = FetcherRegistry::new();
        registry
            .register(Arc::new(
                StaticFetcher::new("first").with_instances("gke-cluster", Vec::new()),
            ))
            .unwrap();
        let err = registry
            .register(Arc::new(
                StaticFetcher::new("second").with_instances("gke-cluster", Vec::new()),
            ))
            .unwrap_err();
        assert_matches!(err, RegistryError::DuplicateSelector { fetcher_id, .. } if fetcher_id == "first");
    }
}
