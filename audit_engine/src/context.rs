//! Per-run evaluation context: resolved inputs plus the resource cache.

use crate::fetch::{
    fetch_with_timeout, FetchError, FetchOptions, FetcherRegistry, ResourceCache, ResourceInstance,
};
use audit_controls::{ResourceSelector, RunInputs, Scope};
use std::sync::Arc;
use std::thread;

/// Mutable per-run container: read-only inputs and the memoized resource
/// collections. Created once per invocation, discarded after the report is
/// generated; never shared across concurrent runs.
pub struct EvaluationContext {
    inputs: RunInputs,
    cache: ResourceCache,
}

impl EvaluationContext {
    pub fn new(inputs: RunInputs) -> Self {
        Self {
            inputs,
            cache: ResourceCache::new(),
        }
    }

    pub fn inputs(&self) -> &RunInputs {
        &self.inputs
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Fetch a resource collection through the cache.
    ///
    /// The actual fetch carries the run's timeout and retry policy: transient
    /// failures retry with exponential backoff up to `max_fetch_retries`
    /// extra attempts; every other failure kind returns immediately. Retries
    /// happen inside the singleflight slot, so concurrent callers share one
    /// retry sequence.
    pub fn fetch(
        &self,
        registry: &FetcherRegistry,
        selector: &ResourceSelector,
        scope: &Scope,
    ) -> Result<Arc<Vec<ResourceInstance>>, FetchError> {
        let fetcher = registry.get(selector).map_err(|_| {
            FetchError::not_found(selector.clone(), "no fetcher registered for selector")
        })?;

        let options = FetchOptions {
            timeout: self.inputs.fetch_timeout(),
        };
        let max_retries = self.inputs.max_fetch_retries;
        let backoff = self.inputs.retry_backoff();

        self.cache.get_or_fetch(selector, scope, || {
            let mut attempt = 0;
            loop {
                match fetch_with_timeout(Arc::clone(&fetcher), selector, scope, &options) {
                    Ok(instances) => return Ok(instances),
                    Err(err) if err.is_retryable() && attempt < max_retries => {
                        attempt += 1;
                        let delay = backoff * 2_u32.saturating_pow(attempt - 1);
                        log::warn!(
                            "transient failure fetching '{}' ({}), retry {}/{} in {:?}: {}",
                            selector,
                            scope.describe(),
                            attempt,
                            max_retries,
                            delay,
                            err
                        );
                        thread::sleep(delay);
                    }
                    Err(err) => return Err(err),
                }
            }
        })
    }
}
