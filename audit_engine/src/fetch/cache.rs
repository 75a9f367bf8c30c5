//! Per-run singleflight resource cache.
//!
//! Keyed by `(selector, scope)`. The first caller for a key performs the
//! fetch while concurrent callers for the same key block until that single
//! in-flight fetch completes and then share its `Arc`'d result, so one run
//! never issues duplicate calls for the same collection. Lifecycle is scoped
//! to one evaluation run; nothing survives the run.

use crate::fetch::{FetchError, ResourceInstance};
use audit_controls::{ResourceSelector, Scope};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

type CacheKey = (ResourceSelector, Scope);
type CachedResult = Result<Arc<Vec<ResourceInstance>>, FetchError>;

enum SlotState {
    InFlight,
    Ready(CachedResult),
}

struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::InFlight),
            ready: Condvar::new(),
        }
    }

    fn wait(&self) -> CachedResult {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match &*state {
                SlotState::Ready(result) => return result.clone(),
                SlotState::InFlight => {
                    state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }

    fn fill(&self, result: CachedResult) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = SlotState::Ready(result);
        self.ready.notify_all();
    }
}

/// Concurrent-safe memoizing cache with singleflight semantics.
#[derive(Default)]
pub struct ResourceCache {
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for `(selector, scope)`, fetching it with
    /// `fetch_fn` if this is the first request for the key. A cache hit
    /// returns the identical `Arc` a fresh fetch produced.
    pub fn get_or_fetch<F>(
        &self,
        selector: &ResourceSelector,
        scope: &Scope,
        fetch_fn: F,
    ) -> CachedResult
    where
        F: FnOnce() -> Result<Vec<ResourceInstance>, FetchError>,
    {
        let key = (selector.clone(), scope.clone());
        let (slot, leader) = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            match slots.get(&key) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Arc::new(Slot::new());
                    slots.insert(key, Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if !leader {
            log::debug!("cache hit for '{}' ({})", selector, scope.describe());
            return slot.wait();
        }

        log::debug!("cache miss for '{}' ({}), fetching", selector, scope.describe());
        let result = fetch_fn().map(Arc::new);
        slot.fill(result.clone());
        result
    }

    /// Number of distinct keys fetched so far.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_controls::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn instance() -> ResourceInstance {
        ResourceInstance::new("us-central1/prod", Value::Null)
    }

    #[test]
    fn test_second_lookup_hits_cache() {
        let cache = ResourceCache::new();
        let calls = AtomicUsize::new(0);
        let selector = ResourceSelector::new("gke-cluster");
        let scope = Scope::project("p");

        let first = cache
            .get_or_fetch(&selector, &scope, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![instance()])
            })
            .unwrap();
        let second = cache
            .get_or_fetch(&selector, &scope, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Byte-identical: both callers share the same allocation.
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_distinct_scopes_fetch_separately() {
        let cache = ResourceCache::new();
        let selector = ResourceSelector::new("gke-cluster");
        cache
            .get_or_fetch(&selector, &Scope::project("p"), || Ok(vec![instance()]))
            .unwrap();
        cache
            .get_or_fetch(&selector, &Scope::project("q"), || Ok(Vec::new()))
            .unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_errors_are_cached_and_shared() {
        let cache = ResourceCache::new();
        let selector = ResourceSelector::new("gke-cluster");
        let scope = Scope::project("p");

        let err = cache
            .get_or_fetch(&selector, &scope, || {
                Err(FetchError::not_found(selector.clone(), "none"))
            })
            .unwrap_err();
        assert!(err.is_not_applicable());

        // Second caller observes the cached error without refetching.
        let err = cache
            .get_or_fetch(&selector, &scope, || panic!("must not refetch"))
            .unwrap_err();
        assert!(err.is_not_applicable());
    }

    #[test]
    fn test_concurrent_callers_collapse_into_one_fetch() {
        let cache = Arc::new(ResourceCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let selector = ResourceSelector::new("gke-cluster");
        let scope = Scope::project("p");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let selector = selector.clone();
            let scope = scope.clone();
            handles.push(thread::spawn(move || {
                cache
                    .get_or_fetch(&selector, &scope, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Hold the slot open long enough for others to pile up.
                        thread::sleep(std::time::Duration::from_millis(30));
                        Ok(vec![instance()])
                    })
                    .unwrap()
                    .len()
            }));
        }

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
