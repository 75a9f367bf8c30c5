//! Resource fetching: the boundary between the engine and cloud/node state.
//!
//! Concrete fetchers live outside the engine (`audit_sdk` ships the node and
//! fixture implementations); the engine sees only this trait, the registry
//! and the per-run cache.

pub mod cache;
pub mod registry;

pub use cache::ResourceCache;
pub use registry::{FetcherRegistry, RegistryError};

use audit_controls::{ResourceSelector, Scope, Value};
use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One fetched resource, normalized into a read-only value tree. The id is
/// what verdicts report, e.g. `us-central1/prod-cluster/default-pool`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInstance {
    pub id: String,
    pub tree: Value,
}

impl ResourceInstance {
    pub fn new(id: impl Into<String>, tree: Value) -> Self {
        Self {
            id: id.into(),
            tree,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    NotFound,
    PermissionDenied,
    ServiceDisabled,
    Transient,
    MalformedResponse,
}

impl FetchErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::PermissionDenied => "permission-denied",
            Self::ServiceDisabled => "service-disabled",
            Self::Transient => "transient",
            Self::MalformedResponse => "malformed-response",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetch failure. `Clone` so a cached failure can be shared across waiters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} fetching '{selector}': {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub selector: ResourceSelector,
    pub message: String,
}

impl FetchError {
    pub fn new(
        kind: FetchErrorKind,
        selector: impl Into<ResourceSelector>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            selector: selector.into(),
            message: message.into(),
        }
    }

    pub fn not_found(selector: impl Into<ResourceSelector>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, selector, message)
    }

    pub fn transient(selector: impl Into<ResourceSelector>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transient, selector, message)
    }

    pub fn malformed(selector: impl Into<ResourceSelector>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::MalformedResponse, selector, message)
    }

    /// Expected absence of a prerequisite: degrades to not-applicable.
    pub fn is_not_applicable(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::NotFound | FetchErrorKind::ServiceDisabled
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == FetchErrorKind::Transient
    }
}

/// Caller-imposed bounds on one fetch call.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Retrieval of a named resource collection. Implementations perform network
/// or filesystem I/O; everything downstream treats the returned trees as
/// immutable.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(
        &self,
        selector: &ResourceSelector,
        scope: &Scope,
        options: &FetchOptions,
    ) -> Result<Vec<ResourceInstance>, FetchError>;

    /// Selector names this fetcher serves.
    fn selectors(&self) -> Vec<ResourceSelector>;

    fn fetcher_id(&self) -> &str;
}

/// Run one fetch with a hard deadline. The fetch runs on a helper thread; on
/// expiry the caller gets a transient error and the helper is left to finish
/// on its own, so a hung collaborator cannot wedge a worker.
pub fn fetch_with_timeout(
    fetcher: Arc<dyn ResourceFetcher>,
    selector: &ResourceSelector,
    scope: &Scope,
    options: &FetchOptions,
) -> Result<Vec<ResourceInstance>, FetchError> {
    let timeout = options.timeout;
    let (tx, rx) = mpsc::channel();
    let thread_selector = selector.clone();
    let thread_scope = scope.clone();
    let thread_options = options.clone();

    thread::spawn(move || {
        let result = fetcher.fetch(&thread_selector, &thread_scope, &thread_options);
        // Receiver may be gone after a timeout.
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => {
            log::warn!(
                "fetch of '{}' ({}) timed out after {:?}",
                selector,
                scope.describe(),
                timeout
            );
            Err(FetchError::transient(
                selector.clone(),
                format!("timed out after {:?}", timeout),
            ))
        }
    }
}

// ============================================================================
// STATIC FETCHER - deterministic in-memory source
// ============================================================================

/// In-memory fetcher keyed by selector name. Used by the engine's own tests
/// and by embedders that already hold normalized resource state.
pub struct StaticFetcher {
    id: String,
    entries: std::collections::HashMap<String, Result<Vec<ResourceInstance>, FetchError>>,
}

impl StaticFetcher {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: std::collections::HashMap::new(),
        }
    }

    pub fn with_instances(
        mut self,
        selector: impl Into<String>,
        instances: Vec<ResourceInstance>,
    ) -> Self {
        self.entries.insert(selector.into(), Ok(instances));
        self
    }

    pub fn with_error(mut self, selector: impl Into<String>, error: FetchError) -> Self {
        self.entries.insert(selector.into(), Err(error));
        self
    }
}

impl ResourceFetcher for StaticFetcher {
    fn fetch(
        &self,
        selector: &ResourceSelector,
        _scope: &Scope,
        _options: &FetchOptions,
    ) -> Result<Vec<ResourceInstance>, FetchError> {
        match self.entries.get(selector.as_str()) {
            Some(entry) => entry.clone(),
            None => Err(FetchError::not_found(
                selector.clone(),
                "no static entry for selector",
            )),
        }
    }

    fn selectors(&self) -> Vec<ResourceSelector> {
        self.entries.keys().map(ResourceSelector::new).collect()
    }

    fn fetcher_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_classification() {
        let err = FetchError::not_found("gke-cluster", "no clusters");
        assert!(err.is_not_applicable());
        assert!(!err.is_retryable());

        let err = FetchError::transient("gke-cluster", "connection reset");
        assert!(err.is_retryable());
        assert!(!err.is_not_applicable());

        let err = FetchError::new(FetchErrorKind::PermissionDenied, "storage-bucket-iam", "403");
        assert!(!err.is_retryable());
        assert!(!err.is_not_applicable());
    }

    #[test]
    fn test_fetch_with_timeout_expires() {
        struct SlowFetcher;
        impl ResourceFetcher for SlowFetcher {
            fn fetch(
                &self,
                _selector: &ResourceSelector,
                _scope: &Scope,
                _options: &FetchOptions,
            ) -> Result<Vec<ResourceInstance>, FetchError> {
                thread::sleep(Duration::from_secs(5));
                Ok(Vec::new())
            }
            fn selectors(&self) -> Vec<ResourceSelector> {
                vec![ResourceSelector::new("slow")]
            }
            fn fetcher_id(&self) -> &str {
                "slow"
            }
        }

        let result = fetch_with_timeout(
            Arc::new(SlowFetcher),
            &ResourceSelector::new("slow"),
            &Scope::default(),
            &FetchOptions {
                timeout: Duration::from_millis(20),
            },
        );
        let err = result.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Transient);
    }

    #[test]
    fn test_static_fetcher_round_trip() {
        let fetcher = StaticFetcher::new("static").with_instances(
            "gke-cluster",
            vec![ResourceInstance::new("us-central1/prod", Value::Null)],
        );
        let instances = fetcher
            .fetch(
                &ResourceSelector::new("gke-cluster"),
                &Scope::default(),
                &FetchOptions::default(),
            )
            .unwrap();
        assert_eq!(instances.len(), 1);

        let err = fetcher
            .fetch(
                &ResourceSelector::new("unknown"),
                &Scope::default(),
                &FetchOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::NotFound);
    }
}
