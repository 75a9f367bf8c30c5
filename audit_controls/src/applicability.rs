//! Applicability rules: whether a control should be evaluated at all.
//!
//! A false rule short-circuits the whole control to not-applicable with its
//! impact forced to none, matching the benchmark's "project has no GKE
//! clusters" sections.

use crate::selector::{ResourceSelector, Scope};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Applicability {
    /// Always evaluate.
    Always,

    /// Evaluate only when the selector yields at least one instance in scope.
    /// A not-found or service-disabled fetch outcome counts as "no instances".
    ResourcesPresent {
        selector: ResourceSelector,
        #[serde(default)]
        scope: Scope,
    },
}

impl Default for Applicability {
    fn default() -> Self {
        Applicability::Always
    }
}

impl Applicability {
    pub fn resources_present(selector: impl Into<ResourceSelector>, scope: Scope) -> Self {
        Applicability::ResourcesPresent {
            selector: selector.into(),
            scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_always() {
        assert_eq!(Applicability::default(), Applicability::Always);
    }

    #[test]
    fn test_toml_form() {
        let rule: Applicability = toml::from_str(
            r#"
            kind = "resources-present"
            selector = "gke-cluster"
            [scope]
            project = "my-project"
            "#,
        )
        .unwrap();
        assert_eq!(
            rule,
            Applicability::resources_present("gke-cluster", Scope::project("my-project"))
        );
    }
}
