//! Kubelet and kube-proxy configuration fetcher.
//!
//! Serves `kubelet-config` and `kube-proxy-config`: the config file path is
//! taken from the scope when given, otherwise discovered from the running
//! process's `--config` / `--kubeconfig` flag via `/proc`. The YAML document
//! is parsed into a normalized value tree, so controls address fields like
//! `authentication.anonymous.enabled` directly.

use crate::fetchers::proc_scan;
use audit_engine::fetch::{
    FetchError, FetchErrorKind, FetchOptions, ResourceFetcher, ResourceInstance,
};
use audit_engine::{ResourceSelector, Scope, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub struct NodeConfigFetcher {
    id: String,
    proc_root: PathBuf,
}

impl NodeConfigFetcher {
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Override the proc filesystem root, for tests.
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            id: "node-config-fetcher".to_string(),
            proc_root: proc_root.into(),
        }
    }

    fn config_path(
        &self,
        selector: &ResourceSelector,
        scope: &Scope,
    ) -> Result<String, FetchError> {
        if let Some(path) = scope.resource.as_deref() {
            return Ok(path.to_string());
        }

        let (process, flag) = match selector.as_str() {
            ResourceSelector::KUBELET_CONFIG => ("kubelet", "--config"),
            ResourceSelector::KUBE_PROXY_CONFIG => ("kube-proxy", "--kubeconfig"),
            other => {
                return Err(FetchError::malformed(
                    selector.clone(),
                    format!("unsupported selector '{}'", other),
                ))
            }
        };

        let info = proc_scan::find_process(&self.proc_root, process).ok_or_else(|| {
            FetchError::not_found(selector.clone(), format!("process '{}' not running", process))
        })?;
        info.flag_value(flag)
            .map(str::to_string)
            .ok_or_else(|| {
                // Configured through a ConfigMap rather than a file; the
                // file-based controls do not apply.
                FetchError::not_found(
                    selector.clone(),
                    format!("process '{}' runs without {}", process, flag),
                )
            })
    }

    fn parse_config(
        &self,
        selector: &ResourceSelector,
        path: &str,
    ) -> Result<ResourceInstance, FetchError> {
        let contents = fs::read_to_string(Path::new(path)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                FetchError::not_found(selector.clone(), format!("config file '{}' missing", path))
            }
            io::ErrorKind::PermissionDenied => FetchError::new(
                FetchErrorKind::PermissionDenied,
                selector.clone(),
                format!("cannot read '{}'", path),
            ),
            _ => FetchError::transient(selector.clone(), format!("read '{}' failed: {}", path, e)),
        })?;

        let json: serde_json::Value = serde_yaml::from_str(&contents).map_err(|e| {
            FetchError::malformed(selector.clone(), format!("invalid YAML in '{}': {}", path, e))
        })?;

        Ok(ResourceInstance::new(path, Value::from(json)))
    }
}

impl Default for NodeConfigFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceFetcher for NodeConfigFetcher {
    fn fetch(
        &self,
        selector: &ResourceSelector,
        scope: &Scope,
        _options: &FetchOptions,
    ) -> Result<Vec<ResourceInstance>, FetchError> {
        let path = self.config_path(selector, scope)?;
        log::debug!("reading {} from '{}'", selector, path);
        Ok(vec![self.parse_config(selector, &path)?])
    }

    fn selectors(&self) -> Vec<ResourceSelector> {
        vec![
            ResourceSelector::new(ResourceSelector::KUBELET_CONFIG),
            ResourceSelector::new(ResourceSelector::KUBE_PROXY_CONFIG),
        ]
    }

    fn fetcher_id(&self) -> &str {
        &self.id
    }
}
