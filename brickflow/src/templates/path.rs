//! Variable reference path parsing and resolution.
//!
//! Paths support dot-separated keys, bracket-quoted keys containing dots
//! or spaces (`a["b.c"]`), numeric array indices (`items.0`, `items[0]`),
//! and optional chaining (`a?.b`) that short-circuits to null instead of
//! failing when the intermediate is missing.

use crate::errors::{BrickflowError, BusinessError, InvalidPathError};
use serde_json::{Map, Value};

/// One parsed path access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// What is accessed.
    pub accessor: Accessor,
    /// True when the access was written with `?.` - a missing base
    /// short-circuits to null instead of failing.
    pub optional: bool,
}

/// The accessor of a path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// An object key.
    Key(String),
    /// An array index.
    Index(usize),
}

/// Parses a path into segments.
///
/// Syntactic errors (empty segments, unterminated brackets, dangling
/// separators) fail; whether the path resolves to anything is a separate
/// question.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, InvalidPathError> {
    let chars: Vec<char> = path.chars().collect();
    let n = chars.len();
    if n == 0 {
        return Err(InvalidPathError::new(path, "path is empty"));
    }

    let mut segments = Vec::new();
    let mut i = 0;
    let mut optional = false;
    let mut need_segment = true;

    while i < n {
        match chars[i] {
            '[' => {
                i += 1;
                if i >= n {
                    return Err(InvalidPathError::new(path, "unterminated bracket"));
                }
                if chars[i] == '"' || chars[i] == '\'' {
                    let quote = chars[i];
                    i += 1;
                    let start = i;
                    while i < n && chars[i] != quote {
                        i += 1;
                    }
                    if i >= n {
                        return Err(InvalidPathError::new(path, "unterminated quoted key"));
                    }
                    let key: String = chars[start..i].iter().collect();
                    i += 1;
                    if i >= n || chars[i] != ']' {
                        return Err(InvalidPathError::new(path, "expected closing bracket"));
                    }
                    i += 1;
                    segments.push(PathSegment {
                        accessor: Accessor::Key(key),
                        optional,
                    });
                } else {
                    let start = i;
                    while i < n && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    if start == i {
                        return Err(InvalidPathError::new(
                            path,
                            "bracket must contain digits or a quoted key",
                        ));
                    }
                    if i >= n || chars[i] != ']' {
                        return Err(InvalidPathError::new(path, "expected closing bracket"));
                    }
                    let digits: String = chars[start..i].iter().collect();
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| InvalidPathError::new(path, "index out of range"))?;
                    i += 1;
                    segments.push(PathSegment {
                        accessor: Accessor::Index(index),
                        optional,
                    });
                }
                optional = false;
                need_segment = false;
            }
            '?' => {
                if need_segment {
                    return Err(InvalidPathError::new(path, "dangling '?.'"));
                }
                if i + 1 >= n || chars[i + 1] != '.' {
                    return Err(InvalidPathError::new(path, "expected '.' after '?'"));
                }
                i += 2;
                optional = true;
                need_segment = true;
            }
            '.' => {
                if need_segment {
                    return Err(InvalidPathError::new(path, "empty path segment"));
                }
                i += 1;
                need_segment = true;
            }
            _ => {
                if !need_segment {
                    return Err(InvalidPathError::new(path, "unexpected character"));
                }
                let start = i;
                while i < n && !matches!(chars[i], '.' | '[' | '?') {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                if raw.chars().any(char::is_whitespace) {
                    return Err(InvalidPathError::new(
                        path,
                        "bare segments cannot contain whitespace; use a bracket-quoted key",
                    ));
                }
                let accessor = if raw.chars().all(|c| c.is_ascii_digit()) {
                    raw.parse::<usize>()
                        .map(Accessor::Index)
                        .unwrap_or(Accessor::Key(raw))
                } else {
                    Accessor::Key(raw)
                };
                segments.push(PathSegment { accessor, optional });
                optional = false;
                need_segment = false;
            }
        }
    }

    if need_segment {
        return Err(InvalidPathError::new(path, "trailing separator"));
    }

    Ok(segments)
}

fn access<'a>(base: &'a Value, accessor: &Accessor) -> Option<&'a Value> {
    match (accessor, base) {
        (Accessor::Key(key), Value::Object(map)) => map.get(key),
        (Accessor::Key(key), Value::Array(items)) => {
            key.parse::<usize>().ok().and_then(|index| items.get(index))
        }
        (Accessor::Index(index), Value::Array(items)) => items.get(*index),
        (Accessor::Index(index), Value::Object(map)) => map.get(&index.to_string()),
        // Property access on a scalar yields "missing", not an error.
        _ => None,
    }
}

/// Resolves a path against a context object.
///
/// A missing leaf resolves to null. A missing intermediate fails unless
/// the following access uses `?.`.
pub fn resolve_path(entries: &Map<String, Value>, path: &str) -> Result<Value, BrickflowError> {
    let segments = parse_path(path)?;

    let mut current: Option<&Value> = match &segments[0].accessor {
        Accessor::Key(key) => entries.get(key),
        Accessor::Index(index) => entries.get(&index.to_string()),
    };

    for segment in &segments[1..] {
        let base = match current {
            None | Some(Value::Null) => {
                if segment.optional {
                    return Ok(Value::Null);
                }
                return Err(BusinessError::new(format!(
                    "Cannot read '{:?}' of a missing value (path '{path}')",
                    segment.accessor
                ))
                .into());
            }
            Some(value) => value,
        };
        current = access(base, &segment.accessor);
    }

    Ok(current.cloned().unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context() -> Map<String, Value> {
        let Value::Object(map) = json!({
            "@input": {
                "url": "https://example.com",
                "items": [10, 20, 30],
                "meta.data": {"a b": 1},
            },
            "@a": 1,
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn test_dot_path() {
        let value = resolve_path(&context(), "@input.url").unwrap();
        assert_eq!(value, json!("https://example.com"));
    }

    #[test]
    fn test_numeric_index_segments() {
        let ctx = context();
        assert_eq!(resolve_path(&ctx, "@input.items.1").unwrap(), json!(20));
        assert_eq!(resolve_path(&ctx, "@input.items[2]").unwrap(), json!(30));
    }

    #[test]
    fn test_bracket_quoted_keys() {
        let ctx = context();
        let value = resolve_path(&ctx, "@input[\"meta.data\"]['a b']").unwrap();
        assert_eq!(value, json!(1));
    }

    #[test]
    fn test_missing_leaf_is_null() {
        let value = resolve_path(&context(), "@input.missing").unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_missing_intermediate_fails_without_optional_chaining() {
        let err = resolve_path(&context(), "@input.missing.deep").unwrap_err();
        assert!(err.is_business());
    }

    #[test]
    fn test_optional_chaining_short_circuits() {
        let value = resolve_path(&context(), "@input.missing?.deep").unwrap();
        assert_eq!(value, Value::Null);

        // The whole chain short-circuits once a guarded hop misses.
        let value = resolve_path(&context(), "@input.missing?.a.b").unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_syntactically_invalid_paths() {
        assert!(parse_path("").is_err());
        assert!(parse_path("a..b").is_err());
        assert!(parse_path("a.").is_err());
        assert!(parse_path("?.a").is_err());
        assert!(parse_path("a[\"unterminated").is_err());
        assert!(parse_path("a b").is_err());
    }

    #[test]
    fn test_scalar_property_access_is_missing_not_error() {
        let value = resolve_path(&context(), "@a.anything").unwrap();
        assert_eq!(value, Value::Null);
    }
}
