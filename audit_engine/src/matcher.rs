//! Predicate evaluation.
//!
//! Pure functions: the same `(actual, predicate)` pair always yields the same
//! answer, no I/O. Faults (bad regex, numeric comparison against a
//! non-number, a collection predicate applied to a scalar) are errors, not
//! failed matches, so definition/data mismatches surface loudly instead of
//! silently failing controls.

use audit_controls::{NumericOp, Predicate, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("numeric comparison against non-numeric value {actual}")]
    NonNumeric { actual: Value },

    #[error("predicate '{predicate}' not defined for {found} value {actual}")]
    Unsupported {
        predicate: String,
        found: &'static str,
        actual: Value,
    },
}

/// Evaluate one predicate against one extracted value.
pub fn matches(actual: &Value, predicate: &Predicate) -> Result<bool, MatchError> {
    match predicate {
        Predicate::Equals {
            value,
            case_insensitive,
        } => Ok(values_equal(actual, value, *case_insensitive)),

        Predicate::NotEquals { value } => Ok(!values_equal(actual, value, false)),

        Predicate::MatchesPattern { pattern } => {
            // An absent value never matches a pattern.
            if actual.is_null() {
                return Ok(false);
            }
            match regex::Regex::new(pattern) {
                Ok(re) => Ok(re.is_match(&actual.render())),
                Err(e) => Err(MatchError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        Predicate::IsEmpty => is_empty(actual, "is-empty"),
        Predicate::IsNonEmpty => is_empty(actual, "is-non-empty").map(|empty| !empty),

        Predicate::In { allowed } => Ok(member_of(actual, allowed)),
        Predicate::NotIn { denied } => Ok(!member_of(actual, denied)),

        Predicate::SubsetOf { allowed } => match actual {
            Value::Array(items) => Ok(items.iter().all(|item| member_of(item, allowed))),
            // Absence is the empty set, a subset of everything.
            Value::Null => Ok(true),
            other => Err(unsupported("subset-of", other)),
        },

        Predicate::Compare { op, threshold } => {
            let lhs = actual
                .as_f64()
                .ok_or_else(|| MatchError::NonNumeric {
                    actual: actual.clone(),
                })?;
            let rhs = threshold
                .as_f64()
                .ok_or_else(|| MatchError::NonNumeric {
                    actual: threshold.clone(),
                })?;
            Ok(match op {
                NumericOp::Lt => lhs < rhs,
                NumericOp::Le => lhs <= rhs,
                NumericOp::Gt => lhs > rhs,
                NumericOp::Ge => lhs >= rhs,
            })
        }

        Predicate::ForAll { predicate } => {
            for item in collection_items(actual, "for-all")? {
                if !matches(item, predicate)? {
                    return Ok(false);
                }
            }
            // Vacuously true over an empty set.
            Ok(true)
        }

        Predicate::ForAny { predicate } => {
            for item in collection_items(actual, "for-any")? {
                if matches(item, predicate)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn unsupported(predicate: &str, actual: &Value) -> MatchError {
    MatchError::Unsupported {
        predicate: predicate.to_string(),
        found: kind_name(actual),
        actual: actual.clone(),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::Str(_) => "string",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
    }
}

/// Structural equality. Strings honor the case policy; integers and floats
/// compare numerically; arrays compare as sets (order-independent), matching
/// the benchmark's collection `cmp` semantics.
fn values_equal(actual: &Value, expected: &Value, case_insensitive: bool) -> bool {
    match (actual, expected) {
        (Value::Str(a), Value::Str(b)) => {
            if case_insensitive {
                a.to_lowercase() == b.to_lowercase()
            } else {
                a == b
            }
        }
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return false;
            }
            let keys_a: HashSet<String> = a.iter().map(|v| comparison_key(v, case_insensitive)).collect();
            let keys_b: HashSet<String> = b.iter().map(|v| comparison_key(v, case_insensitive)).collect();
            keys_a == keys_b
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter().all(|(key, value)| {
                    b.get(key)
                        .is_some_and(|other| values_equal(value, other, case_insensitive))
                })
        }
        (a, b) => a == b,
    }
}

/// Serialize a value into a comparable key, the approach used for
/// order-independent set comparison.
fn comparison_key(value: &Value, case_insensitive: bool) -> String {
    match value {
        Value::Str(s) => {
            let s = s.trim();
            if case_insensitive {
                format!("s:{}", s.to_lowercase())
            } else {
                format!("s:{}", s)
            }
        }
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("b:{}", b),
        Value::Int(i) => format!("n:{}", *i as f64),
        Value::Float(f) => format!("n:{}", f),
        Value::Array(items) => format!(
            "a:[{}]",
            items
                .iter()
                .map(|v| comparison_key(v, case_insensitive))
                .collect::<Vec<_>>()
                .join(",")
        ),
        Value::Map(map) => format!(
            "m:{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}={}", k, comparison_key(v, case_insensitive)))
                .collect::<Vec<_>>()
                .join(",")
        ),
    }
}

/// Membership with normalization: both sides trimmed, case-sensitive.
fn member_of(actual: &Value, list: &[Value]) -> bool {
    let key = comparison_key(actual, false);
    list.iter().any(|item| comparison_key(item, false) == key)
}

fn is_empty(actual: &Value, predicate: &str) -> Result<bool, MatchError> {
    match actual {
        Value::Null => Ok(true),
        Value::Str(s) => Ok(s.is_empty()),
        Value::Array(items) => Ok(items.is_empty()),
        Value::Map(map) => Ok(map.is_empty()),
        other => Err(unsupported(predicate, other)),
    }
}

fn collection_items<'a>(actual: &'a Value, predicate: &str) -> Result<&'a [Value], MatchError> {
    match actual {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(&[]),
        other => Err(unsupported(predicate, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use audit_controls::Predicate;

    #[test]
    fn test_equals_case_policy() {
        assert!(matches(&Value::from("ENCRYPTED"), &Predicate::equals("ENCRYPTED")).unwrap());
        assert!(!matches(&Value::from("encrypted"), &Predicate::equals("ENCRYPTED")).unwrap());
        assert!(matches(
            &Value::from("encrypted"),
            &Predicate::Equals {
                value: Value::from("ENCRYPTED"),
                case_insensitive: true
            }
        )
        .unwrap());
    }

    #[test]
    fn test_equals_null_matches_absent() {
        let predicate = Predicate::Equals {
            value: Value::Null,
            case_insensitive: false,
        };
        assert!(matches(&Value::Null, &predicate).unwrap());
        assert!(!matches(&Value::from("admin"), &predicate).unwrap());
    }

    #[test]
    fn test_pattern_never_matches_absent() {
        let predicate = Predicate::matches_pattern(".*");
        assert!(!matches(&Value::Null, &predicate).unwrap());
        assert!(matches(&Value::from("COS_CONTAINERD"), &Predicate::matches_pattern("COS")).unwrap());
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert_matches!(
            matches(&Value::from("x"), &Predicate::matches_pattern("(")),
            Err(MatchError::InvalidPattern { .. })
        );
    }

    #[test]
    fn test_is_empty_edge_cases() {
        assert!(matches(&Value::Null, &Predicate::IsEmpty).unwrap());
        assert!(matches(&Value::Array(vec![]), &Predicate::IsEmpty).unwrap());
        assert!(!matches(&Value::from(""), &Predicate::IsNonEmpty).unwrap());
        assert_matches!(
            matches(&Value::Int(3), &Predicate::IsEmpty),
            Err(MatchError::Unsupported { .. })
        );
    }

    #[test]
    fn test_membership_is_normalized() {
        let allowed = vec![Value::from("user:a@example.com"), Value::from("user:b@example.com")];
        assert!(matches(&Value::from(" user:a@example.com "), &Predicate::is_in(allowed.clone())).unwrap());
        assert!(!matches(&Value::from("user:c@example.com"), &Predicate::is_in(allowed.clone())).unwrap());
        assert!(matches(&Value::Int(644), &Predicate::is_in(vec![Value::Int(644), Value::Int(600)])).unwrap());
        assert!(matches(&Value::from("user:c@example.com"), &Predicate::NotIn { denied: allowed }).unwrap());
    }

    #[test]
    fn test_subset_of_versus_exact_set_equals() {
        let allowed = vec![Value::from("user:a@example.com"), Value::from("user:b@example.com")];
        let actual = Value::Array(vec![Value::from("user:a@example.com")]);

        // Allow-list containment holds...
        assert!(matches(&actual, &Predicate::subset_of(allowed.clone())).unwrap());
        // ...but exact-set equality does not: the predicate choice matters.
        assert!(!matches(
            &actual,
            &Predicate::Equals {
                value: Value::Array(allowed),
                case_insensitive: false
            }
        )
        .unwrap());
    }

    #[test]
    fn test_array_equals_ignores_order() {
        let a = Value::Array(vec![Value::from("a"), Value::from("b")]);
        let b = Value::Array(vec![Value::from("b"), Value::from("a")]);
        assert!(matches(&a, &Predicate::Equals { value: b, case_insensitive: false }).unwrap());
    }

    #[test]
    fn test_numeric_compare_boundaries() {
        let ge5 = Predicate::Compare {
            op: NumericOp::Ge,
            threshold: Value::Int(5),
        };
        assert!(matches(&Value::Int(5), &ge5).unwrap());
        assert!(matches(&Value::Int(6), &ge5).unwrap());
        assert!(!matches(&Value::Int(4), &ge5).unwrap());
        assert!(matches(&Value::Float(5.5), &ge5).unwrap());

        assert_matches!(
            matches(&Value::from("five"), &ge5),
            Err(MatchError::NonNumeric { .. })
        );
        assert_matches!(
            matches(&Value::Null, &ge5),
            Err(MatchError::NonNumeric { .. })
        );
    }

    #[test]
    fn test_for_all_vacuously_true_over_empty() {
        let predicate = Predicate::for_all(Predicate::equals("x"));
        assert!(matches(&Value::Array(vec![]), &predicate).unwrap());
        assert!(matches(&Value::Null, &predicate).unwrap());

        let predicate = Predicate::for_any(Predicate::equals("x"));
        assert!(!matches(&Value::Array(vec![]), &predicate).unwrap());
    }

    #[test]
    fn test_for_all_and_for_any() {
        let members = Value::Array(vec![
            Value::from("user:a@example.com"),
            Value::from("allUsers"),
        ]);
        let no_public = Predicate::for_all(Predicate::NotIn {
            denied: vec![Value::from("allUsers"), Value::from("allAuthenticatedUsers")],
        });
        assert!(!matches(&members, &no_public).unwrap());

        let any_public = Predicate::for_any(Predicate::equals("allUsers"));
        assert!(matches(&members, &any_public).unwrap());
    }

    #[test]
    fn test_for_all_on_scalar_is_an_error() {
        let predicate = Predicate::for_all(Predicate::equals("x"));
        assert_matches!(
            matches(&Value::from("x"), &predicate),
            Err(MatchError::Unsupported { .. })
        );
    }
}
