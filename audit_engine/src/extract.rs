//! Field extraction over normalized value trees.
//!
//! Path grammar: dotted field access (`master_auth.username`), `[n]` index
//! access, `[*]` fan-out over an array (each branch keeps its concrete index
//! trail for reporting), and a terminal `?` that turns the result into a
//! presence boolean.
//!
//! Absence is not an error: a missing map key, an out-of-range index or a key
//! under `null` extracts to `Null`. Traversing *into* a value of the wrong
//! shape — keying a scalar or an array, indexing a map — is an
//! [`ExtractionError`], since it means the definition disagrees with the data.

use audit_controls::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathParseError {
    #[error("empty field path")]
    Empty,

    #[error("empty segment in field path '{path}'")]
    EmptySegment { path: String },

    #[error("unmatched '[' in field path '{path}'")]
    UnmatchedBracket { path: String },

    #[error("invalid index '{token}' in field path '{path}'")]
    BadIndex { path: String, token: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("path step '{step}' at '{at}' expects {expected}, found {found}")]
    TypeMismatch {
        step: String,
        at: String,
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathComponent {
    Key(String),
    Index(usize),
    Wildcard,
}

/// Parsed field path, reusable across resource instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    components: Vec<PathComponent>,
    exists_probe: bool,
    source: String,
}

/// One extracted branch: the value plus the concrete trail it came from
/// (`bindings[0].members[2]`), used in verdict resource ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,
    pub at: String,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, PathParseError> {
        let source = path.to_string();
        let (body, exists_probe) = match path.strip_suffix('?') {
            Some(body) => (body, true),
            None => (path, false),
        };
        if body.is_empty() {
            return Err(PathParseError::Empty);
        }

        let mut components = Vec::new();
        for segment in body.split('.') {
            if segment.is_empty() {
                return Err(PathParseError::EmptySegment { path: source });
            }

            let (name, mut rest) = match segment.find('[') {
                Some(pos) => (&segment[..pos], &segment[pos..]),
                None => (segment, ""),
            };
            if !name.is_empty() {
                components.push(PathComponent::Key(name.to_string()));
            } else if rest.is_empty() {
                return Err(PathParseError::EmptySegment { path: source });
            }

            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .ok_or_else(|| PathParseError::UnmatchedBracket {
                        path: source.clone(),
                    })?;
                let token = &rest[1..close];
                if token == "*" {
                    components.push(PathComponent::Wildcard);
                } else {
                    let index =
                        token
                            .parse::<usize>()
                            .map_err(|_| PathParseError::BadIndex {
                                path: source.clone(),
                                token: token.to_string(),
                            })?;
                    components.push(PathComponent::Index(index));
                }
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(PathParseError::UnmatchedBracket { path: source });
                }
            }
        }

        Ok(Self {
            components,
            exists_probe,
            source,
        })
    }

    /// Whether the path fans out over a collection.
    pub fn fans_out(&self) -> bool {
        self.components
            .iter()
            .any(|c| matches!(c, PathComponent::Wildcard))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Extract all branches the path selects from one value tree. Pure; never
/// touches I/O.
pub fn extract(tree: &Value, path: &FieldPath) -> Result<Vec<Extracted>, ExtractionError> {
    let mut out = Vec::new();
    walk(tree, &path.components, String::new(), &mut out)?;

    if path.exists_probe {
        for branch in &mut out {
            branch.value = Value::Bool(!branch.value.is_null());
        }
    }
    Ok(out)
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

fn join_key(trail: &str, key: &str) -> String {
    if trail.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", trail, key)
    }
}

fn walk(
    value: &Value,
    components: &[PathComponent],
    trail: String,
    out: &mut Vec<Extracted>,
) -> Result<(), ExtractionError> {
    let (component, rest) = match components.split_first() {
        None => {
            out.push(Extracted {
                value: value.clone(),
                at: trail,
            });
            return Ok(());
        }
        Some(split) => split,
    };

    match component {
        PathComponent::Key(key) => {
            let next_trail = join_key(&trail, key);
            match value {
                Value::Map(map) => match map.get(key) {
                    Some(child) => walk(child, rest, next_trail, out),
                    None => absent(rest, next_trail, out),
                },
                Value::Null => absent(rest, next_trail, out),
                other => Err(ExtractionError::TypeMismatch {
                    step: key.clone(),
                    at: if trail.is_empty() {
                        "<root>".to_string()
                    } else {
                        trail
                    },
                    expected: "map",
                    found: kind_name(other),
                }),
            }
        }
        PathComponent::Index(index) => {
            let next_trail = format!("{}[{}]", trail, index);
            match value {
                Value::Array(items) => match items.get(*index) {
                    Some(child) => walk(child, rest, next_trail, out),
                    None => absent(rest, next_trail, out),
                },
                Value::Null => absent(rest, next_trail, out),
                other => Err(ExtractionError::TypeMismatch {
                    step: format!("[{}]", index),
                    at: if trail.is_empty() {
                        "<root>".to_string()
                    } else {
                        trail
                    },
                    expected: "array",
                    found: kind_name(other),
                }),
            }
        }
        PathComponent::Wildcard => match value {
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    walk(child, rest, format!("{}[{}]", trail, index), out)?;
                }
                Ok(())
            }
            // Fanning out over absence selects nothing.
            Value::Null => Ok(()),
            other => Err(ExtractionError::TypeMismatch {
                step: "[*]".to_string(),
                at: if trail.is_empty() {
                    "<root>".to_string()
                } else {
                    trail
                },
                expected: "array",
                found: kind_name(other),
            }),
        },
    }
}

/// A missing optional field: remaining key/index steps stay absent, but a
/// remaining wildcard selects nothing at all.
fn absent(
    rest: &[PathComponent],
    trail: String,
    out: &mut Vec<Extracted>,
) -> Result<(), ExtractionError> {
    if rest
        .iter()
        .any(|c| matches!(c, PathComponent::Wildcard))
    {
        return Ok(());
    }
    out.push(Extracted {
        value: Value::Null,
        at: trail,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn cluster_tree() -> Value {
        Value::from(serde_json::json!({
            "name": "prod-cluster",
            "master_auth": { "username": "admin" },
            "shielded_nodes": { "enabled": true },
            "master_authorized_networks_config": {
                "cidr_blocks": [
                    { "cidr_block": "10.0.0.0/8" },
                    { "cidr_block": "192.168.0.0/16" },
                ]
            },
            "node_pools": [],
        }))
    }

    #[test]
    fn test_dotted_access() {
        let path = FieldPath::parse("master_auth.username").unwrap();
        let branches = extract(&cluster_tree(), &path).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].value, Value::from("admin"));
        assert_eq!(branches[0].at, "master_auth.username");
    }

    #[test]
    fn test_missing_optional_field_is_null_not_error() {
        let path = FieldPath::parse("database_encryption.state").unwrap();
        let branches = extract(&cluster_tree(), &path).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].value, Value::Null);
    }

    #[test]
    fn test_wildcard_fan_out_keeps_index_trail() {
        let path = FieldPath::parse("master_authorized_networks_config.cidr_blocks[*].cidr_block")
            .unwrap();
        let branches = extract(&cluster_tree(), &path).unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(
            branches[0].at,
            "master_authorized_networks_config.cidr_blocks[0].cidr_block"
        );
        assert_eq!(branches[1].value, Value::from("192.168.0.0/16"));
    }

    #[test]
    fn test_wildcard_over_empty_or_absent_selects_nothing() {
        let path = FieldPath::parse("node_pools[*].name").unwrap();
        assert!(extract(&cluster_tree(), &path).unwrap().is_empty());

        let path = FieldPath::parse("missing_list[*].name").unwrap();
        assert!(extract(&cluster_tree(), &path).unwrap().is_empty());
    }

    #[test]
    fn test_index_access_and_out_of_range() {
        let path = FieldPath::parse("master_authorized_networks_config.cidr_blocks[1].cidr_block")
            .unwrap();
        let branches = extract(&cluster_tree(), &path).unwrap();
        assert_eq!(branches[0].value, Value::from("192.168.0.0/16"));

        let path = FieldPath::parse("master_authorized_networks_config.cidr_blocks[9].cidr_block")
            .unwrap();
        let branches = extract(&cluster_tree(), &path).unwrap();
        assert_eq!(branches[0].value, Value::Null);
    }

    #[test]
    fn test_exists_probe() {
        let path = FieldPath::parse("master_auth.username?").unwrap();
        let branches = extract(&cluster_tree(), &path).unwrap();
        assert_eq!(branches[0].value, Value::Bool(true));

        let path = FieldPath::parse("master_auth.client_certificate?").unwrap();
        let branches = extract(&cluster_tree(), &path).unwrap();
        assert_eq!(branches[0].value, Value::Bool(false));
    }

    #[test]
    fn test_wrong_shape_is_an_error() {
        // Keying into a scalar.
        let path = FieldPath::parse("name.first").unwrap();
        assert_matches!(
            extract(&cluster_tree(), &path),
            Err(ExtractionError::TypeMismatch { expected: "map", .. })
        );

        // Fanning out over a map.
        let path = FieldPath::parse("master_auth[*]").unwrap();
        assert_matches!(
            extract(&cluster_tree(), &path),
            Err(ExtractionError::TypeMismatch { expected: "array", .. })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_matches!(FieldPath::parse(""), Err(PathParseError::Empty));
        assert_matches!(FieldPath::parse("a..b"), Err(PathParseError::EmptySegment { .. }));
        assert_matches!(
            FieldPath::parse("a[1"),
            Err(PathParseError::UnmatchedBracket { .. })
        );
        assert_matches!(FieldPath::parse("a[x]"), Err(PathParseError::BadIndex { .. }));
    }

    #[test]
    fn test_key_with_dashes() {
        let tree = Value::from(serde_json::json!({
            "config": { "metadata": { "disable-legacy-endpoints": "true" } }
        }));
        let path = FieldPath::parse("config.metadata.disable-legacy-endpoints").unwrap();
        let branches = extract(&tree, &path).unwrap();
        assert_eq!(branches[0].value, Value::from("true"));
    }
}
