//! Built-in CIS GKE benchmark catalog.
//!
//! Every control is pure data resolved against [`RunInputs`]; the engine never
//! sees anything benchmark-specific. Severity levels, predicate choices and
//! field paths follow the CIS GKE benchmark recommendations for clusters,
//! their GCP surroundings, and worker-node configuration files.
//!
//! Allow-list controls record their predicate choice explicitly: bucket IAM
//! members are checked for containment in the configured list (`for-all` over
//! the fanned-out members), while file permissions use `in` (membership in
//! the permitted set); neither is exact-set equality.

use crate::applicability::Applicability;
use crate::definition::{Assertion, ControlDefinition, ControlMetadata, Severity};
use crate::inputs::RunInputs;
use crate::predicate::{NumericOp, Predicate};
use crate::selector::{ResourceSelector, Scope};
use crate::value::Value;

/// Assemble the full built-in catalog for one run.
pub fn cis_gke_catalog(inputs: &RunInputs) -> Vec<ControlDefinition> {
    let mut controls = Vec::new();
    controls.extend(container_registry_controls(inputs));
    controls.extend(iam_controls(inputs));
    controls.extend(node_metadata_controls(inputs));
    controls.extend(node_controls(inputs));
    controls.extend(networking_controls(inputs));
    controls.extend(logging_controls(inputs));
    controls.extend(authn_controls(inputs));
    controls.extend(other_controls(inputs));
    controls.extend(kms_controls(inputs));
    controls.extend(node_file_controls(inputs));
    controls.extend(kubelet_controls(inputs));
    controls
}

fn cloud_scope(inputs: &RunInputs) -> Scope {
    Scope::project(inputs.project_id.clone()).with_locations(inputs.gke_locations.clone())
}

fn clusters_present(inputs: &RunInputs) -> Applicability {
    Applicability::resources_present(ResourceSelector::GKE_CLUSTER, cloud_scope(inputs))
}

fn meta(inputs: &RunInputs, section: &str, cis_level: u8) -> ControlMetadata {
    ControlMetadata {
        section: section.to_string(),
        cis_level: Some(cis_level),
        cis_version: inputs.cis_version.clone(),
        refs: if inputs.cis_url.is_empty() {
            Vec::new()
        } else {
            vec![inputs.cis_url.clone()]
        },
    }
}

/// Permission sets the node-file benchmark accepts as "644 or more
/// restrictive".
fn restrictive_permissions() -> Vec<Value> {
    [644, 640, 600, 400, 444, 440]
        .into_iter()
        .map(Value::Int)
        .collect()
}

// ============================================================================
// 5.1 CONTAINER REGISTRY
// ============================================================================

fn container_registry_controls(inputs: &RunInputs) -> Vec<ControlDefinition> {
    let registry_bucket = format!("artifacts.{}.appspot.com", inputs.project_id);
    let bucket_scope = Scope::project(inputs.project_id.clone()).with_resource(registry_bucket);

    // Members of privileged bucket roles must stay within the configured
    // allow-list; explicitly containment, not exact-set equals.
    let admins = inputs
        .allow_list("registry_storage_admin")
        .map(<[Value]>::to_vec)
        .unwrap_or_default();

    vec![
        ControlDefinition::new(
            "5.1.1",
            "Ensure Container Registry image vulnerability scanning is enabled",
            Severity::Medium,
        )
        .with_applicability(Applicability::resources_present(
            ResourceSelector::PROJECT_SERVICE,
            Scope::project(inputs.project_id.clone())
                .with_resource("containerregistry.googleapis.com"),
        ))
        .with_assertion(Assertion::new(
            ResourceSelector::PROJECT_SERVICE,
            Scope::project(inputs.project_id.clone())
                .with_resource("containerscanning.googleapis.com"),
            "state",
            Predicate::equals("ENABLED"),
        ))
        .with_metadata(meta(inputs, "container-registry", 1)),
        ControlDefinition::new(
            "5.1.2",
            "Minimize user access to Container Registry storage",
            Severity::Medium,
        )
        .with_applicability(Applicability::resources_present(
            ResourceSelector::STORAGE_BUCKET_IAM,
            bucket_scope.clone(),
        ))
        .with_assertion(Assertion::new(
            ResourceSelector::STORAGE_BUCKET_IAM,
            bucket_scope.clone(),
            "bindings[*].members[*]",
            Predicate::for_all(Predicate::In { allowed: admins }),
        ))
        .with_assertion(Assertion::new(
            ResourceSelector::STORAGE_BUCKET_IAM,
            bucket_scope,
            "bindings[*].members[*]",
            Predicate::for_all(Predicate::NotIn {
                denied: vec![Value::from("allUsers"), Value::from("allAuthenticatedUsers")],
            }),
        ))
        .with_metadata(meta(inputs, "container-registry", 1)),
    ]
}

// ============================================================================
// 5.2 IDENTITY AND ACCESS MANAGEMENT
// ============================================================================

fn iam_controls(inputs: &RunInputs) -> Vec<ControlDefinition> {
    vec![ControlDefinition::new(
        "5.2.1",
        "Ensure GKE clusters are not running using the Compute Engine default service account",
        Severity::Medium,
    )
    .with_applicability(clusters_present(inputs))
    .with_assertion(Assertion::new(
        ResourceSelector::GKE_NODE_POOL,
        cloud_scope(inputs),
        "config.service_account",
        Predicate::not_equals("default"),
    ))
    .with_metadata(meta(inputs, "iam", 1))]
}

// ============================================================================
// 5.4 NODE METADATA
// ============================================================================

fn node_metadata_controls(inputs: &RunInputs) -> Vec<ControlDefinition> {
    vec![ControlDefinition::new(
        "5.4.1",
        "Ensure legacy Compute Engine instance metadata APIs are Disabled",
        Severity::Medium,
    )
    .with_applicability(clusters_present(inputs))
    .with_assertion(Assertion::new(
        ResourceSelector::GKE_NODE_POOL,
        cloud_scope(inputs),
        "config.metadata.disable-legacy-endpoints",
        // The metadata entry is a string in the provider response.
        Predicate::equals("true"),
    ))
    .with_metadata(meta(inputs, "node-metadata", 1))]
}

// ============================================================================
// 5.5 NODE CONFIGURATION AND MAINTENANCE
// ============================================================================

fn node_controls(inputs: &RunInputs) -> Vec<ControlDefinition> {
    vec![
        ControlDefinition::new(
            "5.5.1",
            "Ensure Container-Optimized OS (COS) is used for GKE node images",
            Severity::Low,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_NODE_POOL,
            cloud_scope(inputs),
            "config.image_type",
            Predicate::matches_pattern("COS"),
        ))
        .with_metadata(meta(inputs, "nodes", 1)),
        ControlDefinition::new(
            "5.5.2",
            "Ensure Node Auto-Repair is enabled for GKE nodes",
            Severity::Medium,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_NODE_POOL,
            cloud_scope(inputs),
            "management.auto_repair",
            Predicate::equals(true),
        ))
        .with_metadata(meta(inputs, "nodes", 1)),
        ControlDefinition::new(
            "5.5.3",
            "Ensure Node Auto-Upgrade is enabled for GKE nodes",
            Severity::Low,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_NODE_POOL,
            cloud_scope(inputs),
            "management.auto_upgrade",
            Predicate::equals(true),
        ))
        .with_metadata(meta(inputs, "nodes", 1)),
        ControlDefinition::new(
            "5.5.5",
            "Ensure Shielded GKE Nodes are Enabled",
            Severity::Medium,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "shielded_nodes.enabled",
            Predicate::equals(true),
        ))
        .with_metadata(meta(inputs, "nodes", 1)),
    ]
}

// ============================================================================
// 5.6 CLUSTER NETWORKING
// ============================================================================

fn networking_controls(inputs: &RunInputs) -> Vec<ControlDefinition> {
    vec![
        ControlDefinition::new(
            "5.6.1",
            "Enable VPC Flow Logs and Intranode Visibility",
            Severity::Low,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "network_config.enable_intra_node_visibility",
            Predicate::equals(true),
        ))
        .with_metadata(meta(inputs, "networking", 2)),
        ControlDefinition::new(
            "5.6.2",
            "Ensure use of VPC-native clusters",
            Severity::Low,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "ip_allocation_policy.use_ip_aliases",
            Predicate::equals(true),
        ))
        .with_metadata(meta(inputs, "networking", 1)),
        ControlDefinition::new(
            "5.6.3",
            "Ensure Master Authorized Networks is Enabled",
            Severity::Medium,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "master_authorized_networks_config.cidr_blocks",
            Predicate::IsNonEmpty,
        ))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "master_authorized_networks_config.cidr_blocks[*].cidr_block",
            Predicate::for_all(Predicate::not_equals("0.0.0.0/0")),
        ))
        .with_metadata(meta(inputs, "networking", 1)),
        ControlDefinition::new(
            "5.6.4",
            "Ensure clusters are created with Private Endpoint Enabled and Public Access Disabled",
            Severity::Medium,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "private_cluster_config.enable_private_endpoint",
            Predicate::equals(true),
        ))
        .with_metadata(meta(inputs, "networking", 2)),
        ControlDefinition::new(
            "5.6.5",
            "Ensure clusters are created with Private Nodes",
            Severity::Medium,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "private_cluster_config.enable_private_nodes",
            Predicate::equals(true),
        ))
        .with_metadata(meta(inputs, "networking", 1)),
    ]
}

// ============================================================================
// 5.7 LOGGING
// ============================================================================

fn logging_controls(inputs: &RunInputs) -> Vec<ControlDefinition> {
    vec![ControlDefinition::new(
        "5.7.1",
        "Ensure Stackdriver Kubernetes Logging and Monitoring is Enabled",
        Severity::Low,
    )
    .with_applicability(clusters_present(inputs))
    .with_assertion(Assertion::new(
        ResourceSelector::GKE_CLUSTER,
        cloud_scope(inputs),
        "logging_service",
        Predicate::matches_pattern("^logging\\.googleapis\\.com"),
    ))
    .with_assertion(Assertion::new(
        ResourceSelector::GKE_CLUSTER,
        cloud_scope(inputs),
        "monitoring_service",
        Predicate::matches_pattern("^monitoring\\.googleapis\\.com"),
    ))
    .with_metadata(meta(inputs, "logging", 1))]
}

// ============================================================================
// 5.8 AUTHENTICATION AND AUTHORIZATION
// ============================================================================

fn authn_controls(inputs: &RunInputs) -> Vec<ControlDefinition> {
    vec![
        ControlDefinition::new(
            "5.8.1",
            "Ensure Basic Authentication using static passwords is Disabled",
            Severity::Medium,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(
            Assertion::new(
                ResourceSelector::GKE_CLUSTER,
                cloud_scope(inputs),
                "master_auth.username",
                Predicate::Equals {
                    value: Value::Null,
                    case_insensitive: false,
                },
            )
            .sensitive(),
        )
        .with_metadata(meta(inputs, "authn-authz", 1)),
        ControlDefinition::new(
            "5.8.2",
            "Ensure authentication using Client Certificates is Disabled",
            Severity::Medium,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(
            Assertion::new(
                ResourceSelector::GKE_CLUSTER,
                cloud_scope(inputs),
                "master_auth.client_certificate",
                Predicate::Equals {
                    value: Value::Null,
                    case_insensitive: false,
                },
            )
            .sensitive(),
        )
        .with_metadata(meta(inputs, "authn-authz", 1)),
        ControlDefinition::new(
            "5.8.4",
            "Ensure Legacy Authorization (ABAC) is Disabled",
            Severity::Medium,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "legacy_abac.enabled",
            Predicate::not_equals(true),
        ))
        .with_metadata(meta(inputs, "authn-authz", 1)),
    ]
}

// ============================================================================
// 5.10 OTHER CLUSTER CONFIGURATIONS
// ============================================================================

fn other_controls(inputs: &RunInputs) -> Vec<ControlDefinition> {
    vec![
        ControlDefinition::new(
            "5.10.1",
            "Ensure Kubernetes Web UI is Disabled",
            Severity::Medium,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "addons_config.kubernetes_dashboard.disabled",
            Predicate::equals(true),
        ))
        .with_metadata(meta(inputs, "other", 1)),
        ControlDefinition::new(
            "5.10.2",
            "Ensure that Alpha clusters are not used for production workloads",
            Severity::Medium,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "enable_kubernetes_alpha",
            Predicate::Equals {
                value: Value::Null,
                case_insensitive: false,
            },
        ))
        .with_metadata(meta(inputs, "other", 1)),
        ControlDefinition::new(
            "5.10.3",
            "Ensure Pod Security Policy is Enabled and set as appropriate",
            Severity::Medium,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "pod_security_policy_config.enabled",
            Predicate::equals(true),
        ))
        .with_metadata(meta(inputs, "other", 2)),
        ControlDefinition::new(
            "5.10.4",
            "Ensure use of Binary Authorization",
            Severity::Medium,
        )
        .with_applicability(clusters_present(inputs))
        .with_assertion(Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "binary_authorization.enabled",
            Predicate::equals(true),
        ))
        .with_metadata(meta(inputs, "other", 2)),
    ]
}

// ============================================================================
// 6.3 KEY MANAGEMENT SERVICE
// ============================================================================

fn kms_controls(inputs: &RunInputs) -> Vec<ControlDefinition> {
    vec![ControlDefinition::new(
        "6.3.1",
        "Ensure Kubernetes Secrets are encrypted using keys managed in Cloud KMS",
        Severity::Medium,
    )
    .with_applicability(clusters_present(inputs))
    .with_assertion(Assertion::new(
        ResourceSelector::GKE_CLUSTER,
        cloud_scope(inputs),
        "database_encryption.state",
        Predicate::equals("ENCRYPTED"),
    ))
    .with_assertion(
        Assertion::new(
            ResourceSelector::GKE_CLUSTER,
            cloud_scope(inputs),
            "database_encryption.key_name",
            Predicate::matches_pattern("^projects/.+/locations/.+/keyRings/.+/cryptoKeys/.+$"),
        )
        .sensitive(),
    )
    .with_metadata(meta(inputs, "kms", 1))]
}

// ============================================================================
// 3.1 WORKER NODE CONFIGURATION FILES
// ============================================================================

fn node_file_controls(inputs: &RunInputs) -> Vec<ControlDefinition> {
    let mut controls = Vec::new();

    let files = [
        ("3.1.1", "3.1.2", "proxy kubeconfig", "kube_proxy_kubeconfig"),
        ("3.1.3", "3.1.4", "kubelet configuration", "kubelet_config"),
    ];

    for (perm_id, owner_id, label, input_name) in files {
        let path = match inputs.node_file(input_name) {
            Some(path) => path.to_string(),
            // Without a configured path the controls are omitted; the runner
            // would otherwise only report them as not-applicable.
            None => continue,
        };
        let scope = Scope::default().with_resource(path);

        controls.push(
            ControlDefinition::new(
                perm_id,
                format!(
                    "Ensure that the {} file permissions are set to 644 or more restrictive",
                    label
                ),
                Severity::Medium,
            )
            .with_applicability(Applicability::resources_present(
                ResourceSelector::NODE_FILE,
                scope.clone(),
            ))
            .with_assertion(Assertion::new(
                ResourceSelector::NODE_FILE,
                scope.clone(),
                "mode",
                Predicate::is_in(restrictive_permissions()),
            ))
            .with_metadata(meta(inputs, "worker-node-configuration-files", 1)),
        );

        controls.push(
            ControlDefinition::new(
                owner_id,
                format!("Ensure that the {} file ownership is set to root:root", label),
                Severity::Medium,
            )
            .with_applicability(Applicability::resources_present(
                ResourceSelector::NODE_FILE,
                scope.clone(),
            ))
            .with_assertion(Assertion::new(
                ResourceSelector::NODE_FILE,
                scope.clone(),
                "owner",
                Predicate::equals("root"),
            ))
            .with_assertion(Assertion::new(
                ResourceSelector::NODE_FILE,
                scope,
                "group",
                Predicate::equals("root"),
            ))
            .with_metadata(meta(inputs, "worker-node-configuration-files", 1)),
        );
    }

    controls
}

// ============================================================================
// 3.2 KUBELET
// ============================================================================

fn kubelet_controls(inputs: &RunInputs) -> Vec<ControlDefinition> {
    let scope = Scope::default();

    vec![
        ControlDefinition::new(
            "3.2.1",
            "Ensure that the --anonymous-auth argument is set to false",
            Severity::Medium,
        )
        .with_applicability(Applicability::resources_present(
            ResourceSelector::KUBELET_CONFIG,
            scope.clone(),
        ))
        .with_assertion(Assertion::new(
            ResourceSelector::KUBELET_CONFIG,
            scope.clone(),
            "authentication.anonymous.enabled",
            Predicate::equals(false),
        ))
        .with_metadata(meta(inputs, "kubelet", 1)),
        ControlDefinition::new(
            "3.2.2",
            "Ensure that the --authorization-mode argument is not set to AlwaysAllow",
            Severity::Medium,
        )
        .with_applicability(Applicability::resources_present(
            ResourceSelector::KUBELET_CONFIG,
            scope.clone(),
        ))
        .with_assertion(Assertion::new(
            ResourceSelector::KUBELET_CONFIG,
            scope.clone(),
            "authorization.mode",
            Predicate::not_equals("AlwaysAllow"),
        ))
        .with_metadata(meta(inputs, "kubelet", 1)),
        ControlDefinition::new(
            "3.2.9",
            "Ensure that the --read-only-port argument is set to 0",
            Severity::Medium,
        )
        .with_applicability(Applicability::resources_present(
            ResourceSelector::KUBELET_CONFIG,
            scope.clone(),
        ))
        .with_assertion(Assertion::new(
            ResourceSelector::KUBELET_CONFIG,
            scope.clone(),
            "readOnlyPort",
            Predicate::equals(0_i64),
        ))
        .with_metadata(meta(inputs, "kubelet", 1)),
        ControlDefinition::new(
            "3.2.10",
            "Ensure that the event record QPS is set to an appropriate level",
            Severity::Low,
        )
        .with_applicability(Applicability::resources_present(
            ResourceSelector::KUBELET_CONFIG,
            scope.clone(),
        ))
        .with_assertion(Assertion::new(
            ResourceSelector::KUBELET_CONFIG,
            scope,
            "eventRecordQPS",
            Predicate::Compare {
                op: NumericOp::Ge,
                threshold: Value::Int(inputs.threshold("event_record_qps").unwrap_or(0)),
            },
        ))
        .with_metadata(meta(inputs, "kubelet", 2)),
    ]
}
