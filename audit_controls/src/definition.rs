//! Control definitions: the immutable descriptors the engine evaluates.

use crate::applicability::Applicability;
use crate::predicate::Predicate;
use crate::selector::{ResourceSelector, Scope};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Impact level of a control. Ordered so a failure-threshold policy can
/// compare severities (`None < Low < Medium < High`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Benchmark bookkeeping carried through to reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlMetadata {
    /// Benchmark section abbreviation, e.g. "nodes", "networking".
    #[serde(default)]
    pub section: String,

    /// CIS profile level (1 or 2) where the benchmark assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cis_level: Option<u8>,

    /// Benchmark version the control was written against.
    #[serde(default)]
    pub cis_version: String,

    /// Reference URLs (benchmark text, provider docs).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
}

/// One resource-selector + field-path + predicate unit within a control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub selector: ResourceSelector,

    #[serde(default)]
    pub scope: Scope,

    /// Field path into the normalized resource tree (dotted access, `[*]`
    /// fan-out, `[n]` index, trailing `?` existence probe).
    pub path: String,

    pub predicate: Predicate,

    /// Omit the expected value from verdicts (credentials, key names).
    #[serde(default)]
    pub sensitive: bool,
}

impl Assertion {
    pub fn new(
        selector: impl Into<ResourceSelector>,
        scope: Scope,
        path: impl Into<String>,
        predicate: Predicate,
    ) -> Self {
        Self {
            selector: selector.into(),
            scope,
            path: path.into(),
            predicate,
            sensitive: false,
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Immutable descriptor of one compliance check. Created at load time from
/// static definition data; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDefinition {
    /// Benchmark recommendation id, e.g. "5.5.2".
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub severity: Severity,

    /// Whether the benchmark scores this recommendation.
    #[serde(default)]
    pub scored: bool,

    #[serde(default)]
    pub applicability: Applicability,

    pub assertions: Vec<Assertion>,

    #[serde(default)]
    pub metadata: ControlMetadata,
}

impl ControlDefinition {
    pub fn new(id: impl Into<String>, title: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            severity,
            scored: true,
            applicability: Applicability::Always,
            assertions: Vec::new(),
            metadata: ControlMetadata::default(),
        }
    }

    pub fn with_applicability(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn with_metadata(mut self, metadata: ControlMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn unscored(mut self) -> Self {
        self.scored = false;
        self
    }

    /// Definitions with no assertions cannot produce verdicts; reject them at
    /// load time rather than at evaluation time.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("control id must not be empty".to_string());
        }
        if self.title.is_empty() {
            return Err(format!("control '{}' has an empty title", self.id));
        }
        if self.assertions.is_empty() {
            return Err(format!("control '{}' has no assertions", self.id));
        }
        Ok(())
    }
}
