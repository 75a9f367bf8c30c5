//! TOML control-file loading.
//!
//! Control files are resolved against [`RunInputs`] at load time: any value
//! slot may be written as `{ input = "name" }` and is substituted before the
//! definition is handed to the engine, mirroring the inspec profiles'
//! `input()` resolution.
//!
//! ```toml
//! [[control]]
//! id = "5.5.2"
//! title = "Ensure Node Auto-Repair is enabled for GKE nodes"
//! severity = "medium"
//!
//! [control.applicability]
//! kind = "resources-present"
//! selector = "gke-cluster"
//!
//! [[control.assertion]]
//! selector = "gke-node-pool"
//! path = "management.auto_repair"
//! predicate = { kind = "equals", value = true }
//! ```

use crate::applicability::Applicability;
use crate::definition::{Assertion, ControlDefinition, ControlMetadata, Severity};
use crate::inputs::RunInputs;
use crate::predicate::{NumericOp, Predicate};
use crate::selector::{ResourceSelector, Scope};
use crate::value::Value;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("control file parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown input '{name}' referenced by control '{control_id}'")]
    UnknownInput { control_id: String, name: String },

    #[error("input '{name}' in control '{control_id}' must resolve to {expected}")]
    InputKind {
        control_id: String,
        name: String,
        expected: &'static str,
    },

    #[error("invalid control '{control_id}': {reason}")]
    Invalid { control_id: String, reason: String },
}

/// Parse a TOML control document and resolve all input placeholders.
pub fn load_controls_str(
    document: &str,
    inputs: &RunInputs,
) -> Result<Vec<ControlDefinition>, LoadError> {
    let raw: RawDocument = toml::from_str(document)?;

    let mut controls = Vec::with_capacity(raw.controls.len());
    for raw_control in raw.controls {
        let control = raw_control.resolve(inputs)?;
        control.validate().map_err(|reason| LoadError::Invalid {
            control_id: control.id.clone(),
            reason,
        })?;
        controls.push(control);
    }

    Ok(controls)
}

// ============================================================================
// RAW MODEL - definition files before input resolution
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default, rename = "control")]
    controls: Vec<RawControl>,
}

#[derive(Debug, Deserialize)]
struct RawControl {
    id: String,
    title: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default = "default_scored")]
    scored: bool,
    #[serde(default)]
    applicability: Option<RawApplicability>,
    #[serde(default, rename = "assertion")]
    assertions: Vec<RawAssertion>,
    #[serde(default)]
    metadata: ControlMetadata,
}

fn default_scored() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum RawApplicability {
    Always,
    ResourcesPresent {
        selector: String,
        #[serde(default)]
        scope: Option<RawScope>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RawScope {
    #[serde(default)]
    project: Option<SpecValue>,
    #[serde(default)]
    locations: Option<Vec<String>>,
    #[serde(default)]
    cluster: Option<String>,
    #[serde(default)]
    resource: Option<SpecValue>,
}

#[derive(Debug, Deserialize)]
struct RawAssertion {
    selector: String,
    #[serde(default)]
    scope: Option<RawScope>,
    path: String,
    predicate: RawPredicate,
    #[serde(default)]
    sensitive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum RawPredicate {
    Equals {
        value: SpecValue,
        #[serde(default)]
        case_insensitive: bool,
    },
    NotEquals {
        value: SpecValue,
    },
    MatchesPattern {
        pattern: String,
    },
    IsEmpty,
    IsNonEmpty,
    In {
        allowed: SpecList,
    },
    NotIn {
        denied: SpecList,
    },
    SubsetOf {
        allowed: SpecList,
    },
    Compare {
        op: NumericOp,
        threshold: SpecValue,
    },
    ForAll {
        predicate: Box<RawPredicate>,
    },
    ForAny {
        predicate: Box<RawPredicate>,
    },
}

/// A literal value or a reference to a named run input.
///
/// The `Input` variant must come first: a `{ input = "..." }` table would
/// otherwise deserialize as a one-entry map literal.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpecValue {
    Input { input: String },
    Literal(Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpecList {
    Input { input: String },
    Literal(Vec<Value>),
}

// ============================================================================
// RESOLUTION - raw model + inputs -> immutable definitions
// ============================================================================

impl RawControl {
    fn resolve(self, inputs: &RunInputs) -> Result<ControlDefinition, LoadError> {
        let control_id = self.id.clone();

        let applicability = match self.applicability {
            None | Some(RawApplicability::Always) => Applicability::Always,
            Some(RawApplicability::ResourcesPresent { selector, scope }) => {
                Applicability::ResourcesPresent {
                    selector: ResourceSelector::new(selector),
                    scope: resolve_scope(scope, inputs, &control_id)?,
                }
            }
        };

        let mut assertions = Vec::with_capacity(self.assertions.len());
        for raw in self.assertions {
            assertions.push(Assertion {
                selector: ResourceSelector::new(raw.selector),
                scope: resolve_scope(raw.scope, inputs, &control_id)?,
                path: raw.path,
                predicate: raw.predicate.resolve(inputs, &control_id)?,
                sensitive: raw.sensitive,
            });
        }

        Ok(ControlDefinition {
            id: self.id,
            title: self.title,
            severity: self.severity,
            scored: self.scored,
            applicability,
            assertions,
            metadata: self.metadata,
        })
    }
}

/// An omitted scope defaults to the run's project and locations, the common
/// case for cloud selectors. Node-level selectors pass explicit scopes.
fn resolve_scope(
    raw: Option<RawScope>,
    inputs: &RunInputs,
    control_id: &str,
) -> Result<Scope, LoadError> {
    let raw = match raw {
        None => {
            return Ok(Scope::project(inputs.project_id.clone())
                .with_locations(inputs.gke_locations.clone()))
        }
        Some(raw) => raw,
    };

    let project = match raw.project {
        None => Some(inputs.project_id.clone()),
        Some(spec) => Some(resolve_string(spec, inputs, control_id)?),
    };
    let resource = match raw.resource {
        None => None,
        Some(spec) => Some(resolve_string(spec, inputs, control_id)?),
    };

    Ok(Scope {
        project,
        locations: raw.locations.unwrap_or_else(|| inputs.gke_locations.clone()),
        cluster: raw.cluster,
        resource,
    })
}

fn resolve_value(spec: SpecValue, inputs: &RunInputs, control_id: &str) -> Result<Value, LoadError> {
    match spec {
        SpecValue::Literal(value) => Ok(value),
        SpecValue::Input { input } => {
            inputs
                .resolve(&input)
                .ok_or_else(|| LoadError::UnknownInput {
                    control_id: control_id.to_string(),
                    name: input,
                })
        }
    }
}

fn resolve_string(
    spec: SpecValue,
    inputs: &RunInputs,
    control_id: &str,
) -> Result<String, LoadError> {
    let name = match &spec {
        SpecValue::Input { input } => Some(input.clone()),
        SpecValue::Literal(_) => None,
    };
    match resolve_value(spec, inputs, control_id)? {
        Value::Str(s) => Ok(s),
        _ => Err(LoadError::InputKind {
            control_id: control_id.to_string(),
            name: name.unwrap_or_default(),
            expected: "a string",
        }),
    }
}

fn resolve_list(
    spec: SpecList,
    inputs: &RunInputs,
    control_id: &str,
) -> Result<Vec<Value>, LoadError> {
    match spec {
        SpecList::Literal(values) => Ok(values),
        SpecList::Input { input } => match inputs.resolve(&input) {
            Some(Value::Array(values)) => Ok(values),
            Some(_) => Err(LoadError::InputKind {
                control_id: control_id.to_string(),
                name: input,
                expected: "a list",
            }),
            None => Err(LoadError::UnknownInput {
                control_id: control_id.to_string(),
                name: input,
            }),
        },
    }
}

impl RawPredicate {
    fn resolve(self, inputs: &RunInputs, control_id: &str) -> Result<Predicate, LoadError> {
        Ok(match self {
            RawPredicate::Equals {
                value,
                case_insensitive,
            } => Predicate::Equals {
                value: resolve_value(value, inputs, control_id)?,
                case_insensitive,
            },
            RawPredicate::NotEquals { value } => Predicate::NotEquals {
                value: resolve_value(value, inputs, control_id)?,
            },
            RawPredicate::MatchesPattern { pattern } => Predicate::MatchesPattern { pattern },
            RawPredicate::IsEmpty => Predicate::IsEmpty,
            RawPredicate::IsNonEmpty => Predicate::IsNonEmpty,
            RawPredicate::In { allowed } => Predicate::In {
                allowed: resolve_list(allowed, inputs, control_id)?,
            },
            RawPredicate::NotIn { denied } => Predicate::NotIn {
                denied: resolve_list(denied, inputs, control_id)?,
            },
            RawPredicate::SubsetOf { allowed } => Predicate::SubsetOf {
                allowed: resolve_list(allowed, inputs, control_id)?,
            },
            RawPredicate::Compare { op, threshold } => Predicate::Compare {
                op,
                threshold: resolve_value(threshold, inputs, control_id)?,
            },
            RawPredicate::ForAll { predicate } => Predicate::ForAll {
                predicate: Box::new(predicate.resolve(inputs, control_id)?),
            },
            RawPredicate::ForAny { predicate } => Predicate::ForAny {
                predicate: Box::new(predicate.resolve(inputs, control_id)?),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sample_inputs() -> RunInputs {
        let mut inputs = RunInputs::new("sample-project");
        inputs.gke_locations = vec!["us-central1".to_string()];
        inputs.allow_lists.insert(
            "registry_storage_admin".to_string(),
            vec![Value::from("group:gcr-admins@example.com")],
        );
        inputs
            .node_files
            .insert("kube_proxy_kubeconfig".to_string(), "/var/lib/kube-proxy/kubeconfig".to_string());
        inputs
    }

    #[test]
    fn test_load_minimal_control() {
        let controls = load_controls_str(
            r#"
            [[control]]
            id = "5.5.2"
            title = "Ensure Node Auto-Repair is enabled for GKE nodes"
            severity = "medium"

            [control.applicability]
            kind = "resources-present"
            selector = "gke-cluster"

            [[control.assertion]]
            selector = "gke-node-pool"
            path = "management.auto_repair"
            predicate = { kind = "equals", value = true }
            "#,
            &sample_inputs(),
        )
        .unwrap();

        assert_eq!(controls.len(), 1);
        let control = &controls[0];
        assert_eq!(control.id, "5.5.2");
        assert_eq!(control.severity, Severity::Medium);
        // Omitted scopes inherit the run's project and locations.
        assert_eq!(
            control.assertions[0].scope.project.as_deref(),
            Some("sample-project")
        );
        assert_eq!(control.assertions[0].scope.locations, vec!["us-central1"]);
        assert_eq!(
            control.assertions[0].predicate,
            Predicate::equals(true)
        );
    }

    #[test]
    fn test_input_placeholder_resolution() {
        let controls = load_controls_str(
            r#"
            [[control]]
            id = "5.1.2"
            title = "Registry storage admin members restricted"
            severity = "medium"

            [[control.assertion]]
            selector = "storage-bucket-iam"
            path = "bindings[0].members"
            predicate = { kind = "subset-of", allowed = { input = "registry_storage_admin" } }
            "#,
            &sample_inputs(),
        )
        .unwrap();

        assert_eq!(
            controls[0].assertions[0].predicate,
            Predicate::subset_of(vec![Value::from("group:gcr-admins@example.com")])
        );
    }

    #[test]
    fn test_scope_resource_placeholder() {
        let controls = load_controls_str(
            r#"
            [[control]]
            id = "3.1.1"
            title = "Proxy kubeconfig permissions 644 or stricter"
            severity = "medium"

            [[control.assertion]]
            selector = "node-file"
            scope = { resource = { input = "kube_proxy_kubeconfig" } }
            path = "mode"
            predicate = { kind = "in", allowed = [644, 640, 600, 400, 444, 440] }
            "#,
            &sample_inputs(),
        )
        .unwrap();

        assert_eq!(
            controls[0].assertions[0].scope.resource.as_deref(),
            Some("/var/lib/kube-proxy/kubeconfig")
        );
    }

    #[test]
    fn test_unknown_input_is_an_error() {
        let err = load_controls_str(
            r#"
            [[control]]
            id = "x"
            title = "t"

            [[control.assertion]]
            selector = "gke-cluster"
            path = "a"
            predicate = { kind = "equals", value = { input = "nope" } }
            "#,
            &sample_inputs(),
        )
        .unwrap_err();

        assert_matches!(err, LoadError::UnknownInput { name, .. } if name == "nope");
    }

    #[test]
    fn test_control_without_assertions_is_invalid() {
        let err = load_controls_str(
            r#"
            [[control]]
            id = "x"
            title = "t"
            "#,
            &sample_inputs(),
        )
        .unwrap_err();

        assert_matches!(err, LoadError::Invalid { .. });
    }
}
