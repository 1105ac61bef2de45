//! The tagged expression union used in brick configurations.
//!
//! Mod definitions encode deferred computations as JSON objects of the
//! shape `{ "__type__": "...", "__value__": ... }`. Everything else in a
//! config is a plain literal. This module parses that wire convention into
//! a proper sum type so the evaluator can match on it exhaustively, and
//! serializes back to the identical wire shape so existing definitions
//! keep working bit-for-bit.

use super::{BrickConfig, Pipeline};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Wire key carrying the expression tag.
pub const TYPE_FIELD: &str = "__type__";

/// Wire key carrying the expression payload.
pub const VALUE_FIELD: &str = "__value__";

/// An ordered map of configuration keys to expressions.
///
/// Key order is document order from the source JSON; traversal and
/// serialization both preserve it.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ExpressionMap(Vec<(String, Expression)>);

impl ExpressionMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an expression by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Expression> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Inserts an entry, replacing any existing value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: Expression) {
        let key = key.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// Iterates entries in document order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, Expression)> {
        self.0.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Expression)> for ExpressionMap {
    fn from_iter<T: IntoIterator<Item = (String, Expression)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

/// A config value: either a literal or a deferred computation.
///
/// Invariant: the payload of a tagged variant is opaque text (or an
/// embedded pipeline) whose interpretation depends solely on the tag.
/// Containers are parsed recursively so every leaf is independently
/// tagged or literal.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// A single variable reference path (`__type__ == "var"`).
    Var(String),
    /// A nunjucks-family template string.
    Nunjucks(String),
    /// A mustache-family template string.
    Mustache(String),
    /// An embedded sub-pipeline (`__type__ == "pipeline"`).
    Pipeline(Pipeline),
    /// An untagged scalar value, returned unchanged by the evaluator.
    Literal(Value),
    /// An array whose elements are independently checked.
    Array(Vec<Expression>),
    /// An object whose values are independently checked.
    Object(ExpressionMap),
}

impl Expression {
    /// Shorthand for a `var` expression.
    #[must_use]
    pub fn var(path: impl Into<String>) -> Self {
        Self::Var(path.into())
    }

    /// Shorthand for a literal expression.
    #[must_use]
    pub fn literal(value: Value) -> Self {
        Self::Literal(value)
    }

    /// Returns true if no node in this tree is tagged.
    #[must_use]
    pub fn is_literal_tree(&self) -> bool {
        match self {
            Self::Literal(_) => true,
            Self::Array(items) => items.iter().all(Self::is_literal_tree),
            Self::Object(map) => map.iter().all(|(_, v)| v.is_literal_tree()),
            _ => false,
        }
    }

    /// Parses a JSON value into an expression tree.
    ///
    /// An object carrying `__type__` and `__value__` becomes a tagged
    /// variant; any other object or array is recursed into; scalars are
    /// literals. An unknown tag is a configuration error, not a literal.
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(map) if map.contains_key(TYPE_FIELD) => Self::from_tagged(map),
            Value::Object(map) => {
                let mut entries = ExpressionMap::new();
                for (key, value) in map {
                    entries.insert(key, Self::from_value(value)?);
                }
                Ok(Self::Object(entries))
            }
            Value::Array(items) => {
                let items = items
                    .into_iter()
                    .map(Self::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Array(items))
            }
            scalar => Ok(Self::Literal(scalar)),
        }
    }

    fn from_tagged(map: Map<String, Value>) -> Result<Self, String> {
        if map.len() != 2 || !map.contains_key(VALUE_FIELD) {
            return Err(format!(
                "tagged expression must carry exactly '{TYPE_FIELD}' and '{VALUE_FIELD}'"
            ));
        }

        let tag = map
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("'{TYPE_FIELD}' must be a string"))?
            .to_string();
        let payload = map
            .get(VALUE_FIELD)
            .cloned()
            .unwrap_or(Value::Null);

        match tag.as_str() {
            "var" | "nunjucks" | "mustache" => {
                let text = payload
                    .as_str()
                    .ok_or_else(|| format!("'{VALUE_FIELD}' of a '{tag}' expression must be a string"))?
                    .to_string();
                Ok(match tag.as_str() {
                    "var" => Self::Var(text),
                    "nunjucks" => Self::Nunjucks(text),
                    _ => Self::Mustache(text),
                })
            }
            "pipeline" => {
                let steps: Vec<BrickConfig> = serde_json::from_value(payload)
                    .map_err(|e| format!("invalid embedded pipeline: {e}"))?;
                Ok(Self::Pipeline(Pipeline::new(steps)))
            }
            other => Err(format!("unknown expression type '{other}'")),
        }
    }

    /// Serializes the expression tree back to its wire shape.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Var(path) => tagged("var", Value::String(path.clone())),
            Self::Nunjucks(text) => tagged("nunjucks", Value::String(text.clone())),
            Self::Mustache(text) => tagged("mustache", Value::String(text.clone())),
            Self::Pipeline(pipeline) => tagged(
                "pipeline",
                serde_json::to_value(pipeline).unwrap_or(Value::Null),
            ),
            Self::Literal(value) => value.clone(),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Object(map) => {
                let mut out = Map::new();
                for (key, value) in map.iter() {
                    out.insert(key.clone(), value.to_value());
                }
                Value::Object(out)
            }
        }
    }
}

fn tagged(tag: &str, payload: Value) -> Value {
    let mut map = Map::new();
    map.insert(TYPE_FIELD.to_string(), Value::String(tag.to_string()));
    map.insert(VALUE_FIELD.to_string(), payload);
    Value::Object(map)
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

impl Serialize for ExpressionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExpressionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(map) = value else {
            return Err(D::Error::custom("brick config must be a JSON object"));
        };
        let mut entries = Self::new();
        for (key, value) in map {
            entries.insert(key, Expression::from_value(value).map_err(D::Error::custom)?);
        }
        Ok(entries)
    }
}
