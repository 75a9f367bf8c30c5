//! Predicate model for assertions.
//!
//! Predicates are data; evaluation lives in `audit_engine::matcher`. Each
//! variant states its edge-case policy where the model alone cannot.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Numeric comparison operator for `Predicate::Compare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl NumericOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Comparison applied to an extracted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Predicate {
    /// Structural equality. Arrays compare as sets (order-independent);
    /// strings compare exact unless `case_insensitive` is set.
    Equals {
        value: Value,
        #[serde(default)]
        case_insensitive: bool,
    },

    NotEquals { value: Value },

    /// Regex over the string rendering of the actual value. An absent (null)
    /// actual never matches.
    MatchesPattern { pattern: String },

    /// Empty string, array or map; null counts as empty.
    IsEmpty,
    IsNonEmpty,

    /// Membership in an allow-list; both sides trimmed before comparison.
    In { allowed: Vec<Value> },
    NotIn { denied: Vec<Value> },

    /// Every element of the (array) actual is a member of `allowed`. The
    /// explicit relaxation of exact-set `equals` for allow-list controls.
    SubsetOf { allowed: Vec<Value> },

    /// Numeric threshold comparison; a non-numeric actual is an evaluation
    /// error, not a failed match.
    Compare { op: NumericOp, threshold: Value },

    /// Applied after a `[*]` fan-out. `ForAll` over an empty set is
    /// vacuously true; emptiness-as-not-applicable is decided one level up.
    ForAll { predicate: Box<Predicate> },
    ForAny { predicate: Box<Predicate> },
}

impl Predicate {
    pub fn equals(value: impl Into<Value>) -> Self {
        Predicate::Equals {
            value: value.into(),
            case_insensitive: false,
        }
    }

    pub fn not_equals(value: impl Into<Value>) -> Self {
        Predicate::NotEquals {
            value: value.into(),
        }
    }

    pub fn matches_pattern(pattern: impl Into<String>) -> Self {
        Predicate::MatchesPattern {
            pattern: pattern.into(),
        }
    }

    pub fn is_in(allowed: Vec<Value>) -> Self {
        Predicate::In { allowed }
    }

    pub fn subset_of(allowed: Vec<Value>) -> Self {
        Predicate::SubsetOf { allowed }
    }

    pub fn for_all(predicate: Predicate) -> Self {
        Predicate::ForAll {
            predicate: Box::new(predicate),
        }
    }

    pub fn for_any(predicate: Predicate) -> Self {
        Predicate::ForAny {
            predicate: Box::new(predicate),
        }
    }

    /// Short operator rendering used in verdict messages.
    pub fn describe(&self) -> String {
        match self {
            Predicate::Equals { value, .. } => format!("== {}", value),
            Predicate::NotEquals { value } => format!("!= {}", value),
            Predicate::MatchesPattern { pattern } => format!("=~ /{}/", pattern),
            Predicate::IsEmpty => "is empty".to_string(),
            Predicate::IsNonEmpty => "is non-empty".to_string(),
            Predicate::In { allowed } => format!("in {}", Value::Array(allowed.clone())),
            Predicate::NotIn { denied } => format!("not in {}", Value::Array(denied.clone())),
            Predicate::SubsetOf { allowed } => {
                format!("subset of {}", Value::Array(allowed.clone()))
            }
            Predicate::Compare { op, threshold } => format!("{} {}", op.as_str(), threshold),
            Predicate::ForAll { predicate } => format!("for all: {}", predicate.describe()),
            Predicate::ForAny { predicate } => format!("for any: {}", predicate.describe()),
        }
    }
}
