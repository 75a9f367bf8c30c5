//! Provider-native JSON -> value tree mapping layer.
//!
//! Cloud listing calls return provider-shaped objects; this module normalizes
//! them into `ResourceInstance`s with stable ids and applies scope filtering.
//! Node pool entries carry the `location` and `cluster` keys their lister
//! annotated them with, the same shape the cluster cache exposes.

use audit_engine::fetch::{FetchError, ResourceInstance};
use audit_engine::{ResourceSelector, Scope, Value};

/// Normalize one selector's worth of provider entries.
pub fn normalize(
    selector: &ResourceSelector,
    scope: &Scope,
    entries: &[serde_json::Value],
) -> Result<Vec<ResourceInstance>, FetchError> {
    let mut instances = Vec::new();
    for entry in entries {
        if let Some(instance) = normalize_entry(selector, scope, entry)? {
            instances.push(instance);
        }
    }
    Ok(instances)
}

fn normalize_entry(
    selector: &ResourceSelector,
    scope: &Scope,
    entry: &serde_json::Value,
) -> Result<Option<ResourceInstance>, FetchError> {
    match selector.as_str() {
        ResourceSelector::GKE_CLUSTER => {
            let name = require_str(selector, entry, "name")?;
            let location = require_str(selector, entry, "location")?;
            if !location_in_scope(scope, location) {
                return Ok(None);
            }
            Ok(Some(ResourceInstance::new(
                format!("{}/{}", location, name),
                Value::from(entry.clone()),
            )))
        }

        ResourceSelector::GKE_NODE_POOL => {
            let name = require_str(selector, entry, "name")?;
            let location = require_str(selector, entry, "location")?;
            let cluster = require_str(selector, entry, "cluster")?;
            if !location_in_scope(scope, location) {
                return Ok(None);
            }
            if scope.cluster.as_deref().is_some_and(|c| c != cluster) {
                return Ok(None);
            }
            Ok(Some(ResourceInstance::new(
                format!("{}/{}/{}", location, cluster, name),
                Value::from(entry.clone()),
            )))
        }

        ResourceSelector::STORAGE_BUCKET_IAM => {
            let bucket = require_str(selector, entry, "bucket")?;
            if scope.resource.as_deref().is_some_and(|r| r != bucket) {
                return Ok(None);
            }
            Ok(Some(ResourceInstance::new(
                bucket,
                Value::from(entry.clone()),
            )))
        }

        ResourceSelector::PROJECT_SERVICE => {
            let name = require_str(selector, entry, "name")?;
            if scope.resource.as_deref().is_some_and(|r| r != name) {
                return Ok(None);
            }
            Ok(Some(ResourceInstance::new(
                name,
                Value::from(entry.clone()),
            )))
        }

        // Unknown selectors normalize by name when present, index otherwise.
        _ => {
            let id = entry
                .get("name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("<unnamed>")
                .to_string();
            Ok(Some(ResourceInstance::new(id, Value::from(entry.clone()))))
        }
    }
}

fn require_str<'a>(
    selector: &ResourceSelector,
    entry: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, FetchError> {
    entry.get(key).and_then(serde_json::Value::as_str).ok_or_else(|| {
        FetchError::malformed(
            selector.clone(),
            format!("entry missing string field '{}'", key),
        )
    })
}

/// An empty location list means "everywhere"; zonal locations match their
/// region prefix (`us-central1-a` is in scope for `us-central1`).
fn location_in_scope(scope: &Scope, location: &str) -> bool {
    if scope.locations.is_empty() {
        return true;
    }
    scope
        .locations
        .iter()
        .any(|wanted| location == wanted || location.starts_with(&format!("{}-", wanted)))
}
