//! The layered evaluation context for one pipeline run.

use serde_json::{Map, Value};

/// The mapping available to expression evaluation during a run.
///
/// Built-in keys (`@input`, `@options`, `@mod`) are overlaid with the
/// `@outputKey` bindings of strictly-earlier steps in the same branch
/// lineage. Extension is copy-on-write: a child binding never becomes
/// visible to sibling branches or to steps that already executed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvalContext {
    entries: Map<String, Value>,
}

impl EvalContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the root context for a run.
    #[must_use]
    pub fn root(input: Value, options: Value, mod_state: Value) -> Self {
        let mut entries = Map::new();
        entries.insert("@input".to_string(), input);
        entries.insert("@options".to_string(), options);
        entries.insert("@mod".to_string(), mod_state);
        Self { entries }
    }

    /// Looks up a top-level key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Inserts a top-level entry in place.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Returns a copy extended with an `@outputKey` binding.
    ///
    /// The `@` sigil is prepended here so callers pass the bare key from
    /// the step definition.
    #[must_use]
    pub fn with_output_binding(&self, output_key: &str, value: Value) -> Self {
        let mut next = self.clone();
        next.entries.insert(format!("@{output_key}"), value);
        next
    }

    /// Returns a copy extended with arbitrary extra bindings.
    #[must_use]
    pub fn with_bindings(&self, extra: Map<String, Value>) -> Self {
        let mut next = self.clone();
        for (key, value) in extra {
            next.entries.insert(key, value);
        }
        next
    }

    /// Returns the context as a JSON object map.
    #[must_use]
    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }

    /// Snapshots the context as a JSON value (for trace records).
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.clone())
    }
}
