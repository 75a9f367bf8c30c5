//! Fixture-backed cloud resource source.
//!
//! Stands in for the live GCP listing calls behind the same
//! `ResourceFetcher` contract: each selector is served from a
//! `<selector>.json` file (a JSON array of provider-native objects) found
//! under the fixture directory, normalized through the `gcp` mapping layer.
//! Useful for offline audits of exported resource state and for tests.

use crate::gcp;
use audit_engine::fetch::{FetchError, FetchOptions, ResourceFetcher, ResourceInstance};
use audit_engine::{ResourceSelector, Scope};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct FixtureSource {
    id: String,
    dir: PathBuf,
}

impl FixtureSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            id: "fixture-source".to_string(),
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn find_file(&self, selector: &ResourceSelector) -> Option<PathBuf> {
        let wanted = format!("{}.json", selector.as_str());
        WalkDir::new(&self.dir)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .find(|entry| {
                entry.file_type().is_file()
                    && entry.file_name().to_str() == Some(wanted.as_str())
            })
            .map(|entry| entry.into_path())
    }

    fn load_entries(
        &self,
        selector: &ResourceSelector,
        path: &Path,
    ) -> Result<Vec<serde_json::Value>, FetchError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            FetchError::transient(
                selector.clone(),
                format!("cannot read fixture '{}': {}", path.display(), e),
            )
        })?;
        let document: serde_json::Value = serde_json::from_str(&contents).map_err(|e| {
            FetchError::malformed(
                selector.clone(),
                format!("fixture '{}' is not valid JSON: {}", path.display(), e),
            )
        })?;
        match document {
            serde_json::Value::Array(entries) => Ok(entries),
            _ => Err(FetchError::malformed(
                selector.clone(),
                format!("fixture '{}' must be a JSON array", path.display()),
            )),
        }
    }
}

impl ResourceFetcher for FixtureSource {
    fn fetch(
        &self,
        selector: &ResourceSelector,
        scope: &Scope,
        _options: &FetchOptions,
    ) -> Result<Vec<ResourceInstance>, FetchError> {
        let path = self.find_file(selector).ok_or_else(|| {
            FetchError::not_found(
                selector.clone(),
                format!("no fixture file for selector under '{}'", self.dir.display()),
            )
        })?;
        let entries = self.load_entries(selector, &path)?;
        log::debug!(
            "fixture '{}' served {} entries for '{}'",
            path.display(),
            entries.len(),
            selector
        );
        gcp::normalize(selector, scope, &entries)
    }

    fn selectors(&self) -> Vec<ResourceSelector> {
        let mut selectors: Vec<ResourceSelector> = WalkDir::new(&self.dir)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?;
                let stem = name.strip_suffix(".json")?;
                Some(ResourceSelector::new(stem))
            })
            .collect();
        selectors.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        selectors.dedup();
        selectors
    }

    fn fetcher_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_engine::FetchErrorKind;
    use std::io::Write;

    fn write_fixture(dir: &Path, name: &str, contents: &str) {
        let mut file = fs::File::create(dir.join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_selectors_come_from_file_names() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "gke-cluster.json", "[]");
        write_fixture(dir.path(), "project-service.json", "[]");
        write_fixture(dir.path(), "notes.txt", "ignored");

        let source = FixtureSource::new(dir.path());
        let selectors = source.selectors();
        assert_eq!(
            selectors,
            vec![
                ResourceSelector::new("gke-cluster"),
                ResourceSelector::new("project-service"),
            ]
        );
    }

    #[test]
    fn test_fetch_normalizes_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(
            dir.path(),
            "gke-cluster.json",
            r#"[
                { "name": "prod", "location": "us-central1", "shielded_nodes": { "enabled": true } },
                { "name": "eu", "location": "europe-west1" }
            ]"#,
        );

        let source = FixtureSource::new(dir.path());
        let scope = Scope::project("p").with_locations(vec!["us-central1".to_string()]);
        let instances = source
            .fetch(
                &ResourceSelector::new(ResourceSelector::GKE_CLUSTER),
                &scope,
                &FetchOptions::default(),
            )
            .unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id, "us-central1/prod");
    }

    #[test]
    fn test_missing_fixture_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FixtureSource::new(dir.path())
            .fetch(
                &ResourceSelector::new(ResourceSelector::GKE_CLUSTER),
                &Scope::default(),
                &FetchOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::NotFound);
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "gke-cluster.json", "{ not json");
        let err = FixtureSource::new(dir.path())
            .fetch(
                &ResourceSelector::new(ResourceSelector::GKE_CLUSTER),
                &Scope::default(),
                &FetchOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::MalformedResponse);
    }
}
