//! Worker-node file metadata fetcher.
//!
//! Serves the `node-file` selector: permission bits, owner and group for one
//! file named by the scope, as a normalized value tree. Replaces the
//! benchmark's `stat -c %a` shelling with direct metadata calls; owner and
//! group names resolve through `/etc/passwd` and `/etc/group`.

use audit_engine::fetch::{FetchError, FetchErrorKind, FetchOptions, ResourceFetcher, ResourceInstance};
use audit_engine::{ResourceSelector, Scope, Value};
use std::fs;
use std::io;
use std::path::Path;

pub struct NodeFileFetcher {
    id: String,
}

impl NodeFileFetcher {
    pub fn new() -> Self {
        Self {
            id: "node-file-fetcher".to_string(),
        }
    }

    fn collect(&self, path: &str) -> Result<ResourceInstance, FetchError> {
        let selector = ResourceSelector::new(ResourceSelector::NODE_FILE);
        let metadata = fs::symlink_metadata(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                FetchError::not_found(selector.clone(), format!("file '{}' does not exist", path))
            }
            io::ErrorKind::PermissionDenied => FetchError::new(
                FetchErrorKind::PermissionDenied,
                selector.clone(),
                format!("cannot stat '{}'", path),
            ),
            _ => FetchError::transient(selector.clone(), format!("stat '{}' failed: {}", path, e)),
        })?;

        let mut tree = vec![
            ("path".to_string(), Value::from(path)),
            ("exists".to_string(), Value::Bool(true)),
            ("size".to_string(), Value::Int(metadata.len() as i64)),
            ("is_dir".to_string(), Value::Bool(metadata.is_dir())),
        ];
        tree.extend(unix_fields(&metadata));

        Ok(ResourceInstance::new(path, Value::object(tree)))
    }
}

impl Default for NodeFileFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceFetcher for NodeFileFetcher {
    fn fetch(
        &self,
        selector: &ResourceSelector,
        scope: &Scope,
        _options: &FetchOptions,
    ) -> Result<Vec<ResourceInstance>, FetchError> {
        let path = scope.resource.as_deref().ok_or_else(|| {
            FetchError::malformed(selector.clone(), "node-file scope needs a 'resource' path")
        })?;
        Ok(vec![self.collect(path)?])
    }

    fn selectors(&self) -> Vec<ResourceSelector> {
        vec![ResourceSelector::new(ResourceSelector::NODE_FILE)]
    }

    fn fetcher_id(&self) -> &str {
        &self.id
    }
}

#[cfg(unix)]
fn unix_fields(metadata: &fs::Metadata) -> Vec<(String, Value)> {
    use std::os::unix::fs::MetadataExt;

    // Permission bits rendered the way the benchmark compares them: the
    // octal digits read as a decimal number (0o644 -> 644).
    let octal = format!("{:o}", metadata.mode() & 0o7777);
    let mode = octal.parse::<i64>().unwrap_or(0);

    vec![
        ("mode".to_string(), Value::Int(mode)),
        ("mode_octal".to_string(), Value::from(octal)),
        ("uid".to_string(), Value::Int(metadata.uid() as i64)),
        ("gid".to_string(), Value::Int(metadata.gid() as i64)),
        (
            "owner".to_string(),
            Value::from(lookup_name(Path::new("/etc/passwd"), metadata.uid())
                .unwrap_or_else(|| metadata.uid().to_string())),
        ),
        (
            "group".to_string(),
            Value::from(lookup_name(Path::new("/etc/group"), metadata.gid())
                .unwrap_or_else(|| metadata.gid().to_string())),
        ),
    ]
}

#[cfg(not(unix))]
fn unix_fields(metadata: &fs::Metadata) -> Vec<(String, Value)> {
    vec![(
        "readonly".to_string(),
        Value::Bool(metadata.permissions().readonly()),
    )]
}

/// Resolve a numeric id against a passwd/group style database
/// (`name:x:id:...` lines).
#[cfg(unix)]
fn lookup_name(database: &Path, id: u32) -> Option<String> {
    let contents = fs::read_to_string(database).ok()?;
    for line in contents.lines() {
        let mut fields = line.split(':');
        let name = fields.next()?;
        let _password = fields.next();
        let entry_id = fields.next()?.parse::<u32>().ok()?;
        if entry_id == id {
            return Some(name.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_engine::fetch::FetchOptions;

    fn fetch_one(path: &str) -> Result<Vec<ResourceInstance>, FetchError> {
        NodeFileFetcher::new().fetch(
            &ResourceSelector::new(ResourceSelector::NODE_FILE),
            &Scope::default().with_resource(path),
            &FetchOptions::default(),
        )
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = fetch_one("/definitely/not/a/real/kubeconfig").unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::NotFound);
        assert!(err.is_not_applicable());
    }

    #[test]
    fn test_missing_scope_resource_is_malformed() {
        let err = NodeFileFetcher::new()
            .fetch(
                &ResourceSelector::new(ResourceSelector::NODE_FILE),
                &Scope::default(),
                &FetchOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::MalformedResponse);
    }

    #[cfg(unix)]
    #[test]
    fn test_collects_mode_owner_group() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubeconfig");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "apiVersion: v1").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        let instances = fetch_one(path.to_str().unwrap()).unwrap();
        assert_eq!(instances.len(), 1);
        let tree = instances[0].tree.as_map().unwrap();
        assert_eq!(tree.get("mode"), Some(&Value::Int(640)));
        assert_eq!(tree.get("exists"), Some(&Value::Bool(true)));
        assert!(tree.contains_key("owner"));
        assert!(tree.contains_key("group"));
    }

    #[cfg(unix)]
    #[test]
    fn test_lookup_name_parses_database_lines() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("passwd");
        let mut file = fs::File::create(&db).unwrap();
        writeln!(file, "root:x:0:0:root:/root:/bin/bash").unwrap();
        writeln!(file, "daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin").unwrap();

        assert_eq!(lookup_name(&db, 0), Some("root".to_string()));
        assert_eq!(lookup_name(&db, 1), Some("daemon".to_string()));
        assert_eq!(lookup_name(&db, 999), None);
    }
}
