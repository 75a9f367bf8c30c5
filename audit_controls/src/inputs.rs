//! Run inputs: externally supplied, read-only settings for one evaluation run.
//!
//! The inspec profiles feed these through `inputs.yml`; here they arrive as a
//! TOML document (or are built in code) and are resolved into control
//! definitions at load time.

use crate::definition::Severity;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_fetch_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

/// Named settings supplied before a run starts. Read-only once the run begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInputs {
    pub project_id: String,

    /// Locations to audit; empty means all locations the fetcher can list.
    #[serde(default)]
    pub gke_locations: Vec<String>,

    #[serde(default)]
    pub cis_version: String,

    #[serde(default)]
    pub cis_url: String,

    /// Named allow-lists referenced by controls (IAM members per role, file
    /// permission sets, ...).
    #[serde(default)]
    pub allow_lists: BTreeMap<String, Vec<Value>>,

    /// Named numeric thresholds referenced by controls (QPS limits, ...).
    #[serde(default)]
    pub thresholds: BTreeMap<String, i64>,

    /// Worker-node file paths referenced by node-level controls.
    #[serde(default)]
    pub node_files: BTreeMap<String, String>,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_max_fetch_retries")]
    pub max_fetch_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Worker pool size; `None` lets the engine pick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Minimum severity of a failed scored control that breaks the run.
    #[serde(default)]
    pub fail_on: Severity,
}

impl RunInputs {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            gke_locations: Vec::new(),
            cis_version: String::new(),
            cis_url: String::new(),
            allow_lists: BTreeMap::new(),
            thresholds: BTreeMap::new(),
            node_files: BTreeMap::new(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_fetch_retries: default_max_fetch_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            workers: None,
            fail_on: Severity::None,
        }
    }

    pub fn allow_list(&self, name: &str) -> Option<&[Value]> {
        self.allow_lists.get(name).map(|list| list.as_slice())
    }

    pub fn threshold(&self, name: &str) -> Option<i64> {
        self.thresholds.get(name).copied()
    }

    pub fn node_file(&self, name: &str) -> Option<&str> {
        self.node_files.get(name).map(String::as_str)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Resolve a named input into a value, used by the loader for
    /// `{ input = "..." }` placeholders. Lookup order: allow-lists, then
    /// thresholds, then node files, then the scalar identity fields.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        if let Some(list) = self.allow_lists.get(name) {
            return Some(Value::Array(list.clone()));
        }
        if let Some(threshold) = self.thresholds.get(name) {
            return Some(Value::Int(*threshold));
        }
        if let Some(path) = self.node_files.get(name) {
            return Some(Value::Str(path.clone()));
        }
        match name {
            "project_id" => Some(Value::Str(self.project_id.clone())),
            "cis_version" => Some(Value::Str(self.cis_version.clone())),
            "cis_url" => Some(Value::Str(self.cis_url.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_with_defaults() {
        let inputs: RunInputs = toml::from_str(
            r#"
            project_id = "sample-project"
            gke_locations = ["us-central1"]
            cis_version = "1.1.0"

            [allow_lists]
            registry_storage_admin = ["group:gcr-admins@example.com"]

            [thresholds]
            event_record_qps = 0

            [node_files]
            kube_proxy_kubeconfig = "/var/lib/kube-proxy/kubeconfig"
            "#,
        )
        .unwrap();

        assert_eq!(inputs.project_id, "sample-project");
        assert_eq!(inputs.fetch_timeout_secs, 30);
        assert_eq!(inputs.max_fetch_retries, 2);
        assert_eq!(inputs.fail_on, Severity::None);
        assert_eq!(inputs.threshold("event_record_qps"), Some(0));
        assert_eq!(
            inputs.node_file("kube_proxy_kubeconfig"),
            Some("/var/lib/kube-proxy/kubeconfig")
        );
    }

    #[test]
    fn test_resolve_order_and_identity_fields() {
        let mut inputs = RunInputs::new("sample-project");
        inputs
            .allow_lists
            .insert("admins".to_string(), vec![Value::from("user:a@example.com")]);
        inputs.thresholds.insert("qps".to_string(), 5);

        assert_eq!(
            inputs.resolve("admins"),
            Some(Value::Array(vec![Value::from("user:a@example.com")]))
        );
        assert_eq!(inputs.resolve("qps"), Some(Value::Int(5)));
        assert_eq!(
            inputs.resolve("project_id"),
            Some(Value::from("sample-project"))
        );
        assert_eq!(inputs.resolve("missing"), None);
    }
}
