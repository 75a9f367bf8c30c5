//! Resource selectors and scopes.
//!
//! A selector names which fetcher produces the candidate resource set; a scope
//! narrows it. Selector/scope pairs are also the cache key for one run, so both
//! types carry `Eq + Hash`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named resource kind resolved through the fetcher registry.
///
/// Well-known names are provided as constants; custom fetchers may register
/// any name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSelector(pub String);

impl ResourceSelector {
    pub const GKE_CLUSTER: &'static str = "gke-cluster";
    pub const GKE_NODE_POOL: &'static str = "gke-node-pool";
    pub const STORAGE_BUCKET_IAM: &'static str = "storage-bucket-iam";
    pub const PROJECT_SERVICE: &'static str = "project-service";
    pub const NODE_FILE: &'static str = "node-file";
    pub const KUBELET_CONFIG: &'static str = "kubelet-config";
    pub const KUBE_PROXY_CONFIG: &'static str = "kube-proxy-config";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceSelector {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Narrows a selector to a project, set of locations, cluster or single
/// resource (bucket name, file path, service name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,

    /// Single named resource: bucket name, service name, absolute file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl Scope {
    pub fn project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            ..Self::default()
        }
    }

    pub fn with_locations(mut self, locations: Vec<String>) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Human-readable scope used in verdict resource ids.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(project) = &self.project {
            parts.push(project.clone());
        }
        if let Some(cluster) = &self.cluster {
            parts.push(cluster.clone());
        }
        if let Some(resource) = &self.resource {
            parts.push(resource.clone());
        }
        if parts.is_empty() {
            "<unscoped>".to_string()
        } else {
            parts.join("/")
        }
    }
}
