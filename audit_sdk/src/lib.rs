//! # Audit SDK
//!
//! Concrete resource fetchers and report sinks for the audit engine:
//! worker-node file inspection, kubelet/kube-proxy configuration discovery,
//! and a fixture-backed GCP resource source that normalizes provider-native
//! JSON into the engine's value trees.

pub mod fetchers;
pub mod gcp;
pub mod sinks;

use audit_engine::fetch::{FetcherRegistry, RegistryError};
use std::path::Path;
use std::sync::Arc;

/// Create a registry with the node-level fetchers:
///
/// - file metadata (permissions, owner, group) for worker-node files
/// - kubelet and kube-proxy configuration discovered via `/proc` and parsed
///   from YAML
pub fn create_node_registry() -> Result<FetcherRegistry, RegistryError> {
    let mut registry = FetcherRegistry::new();
    registry.register(Arc::new(fetchers::NodeFileFetcher::new()))?;
    registry.register(Arc::new(fetchers::NodeConfigFetcher::new()))?;
    Ok(registry)
}

/// Create a registry serving cloud selectors from a fixture directory in
/// addition to the node-level fetchers.
pub fn create_registry_with_fixtures(
    fixture_dir: impl AsRef<Path>,
) -> Result<FetcherRegistry, RegistryError> {
    let mut registry = create_node_registry()?;
    registry.register(Arc::new(fetchers::FixtureSource::new(fixture_dir)))?;
    Ok(registry)
}
