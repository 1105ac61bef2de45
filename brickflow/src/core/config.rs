//! Pipeline and step configuration types.

use super::{BrickId, Expression, ExpressionMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One pipeline step: a brick reference plus its templated configuration.
///
/// Serde round-trips the Page Editor JSON shape exactly (`instanceId`,
/// `if`, `outputKey` field names included).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrickConfig {
    /// The referenced brick id.
    pub id: BrickId,

    /// Parameter name to expression mapping; rendered deeply before the
    /// brick runs.
    #[serde(default, skip_serializing_if = "ExpressionMap::is_empty")]
    pub config: ExpressionMap,

    /// Optional display label for the Page Editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Optional author comments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    /// Unique per step instance; correlates trace records.
    #[serde(rename = "instanceId", default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<Uuid>,

    /// Conditional gate: a nested pipeline whose final output is coerced
    /// to boolean. Falsy means the step is skipped.
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub if_condition: Option<Pipeline>,

    /// Binds the step's result into the evaluation context under
    /// `@outputKey` for subsequent sibling steps.
    #[serde(rename = "outputKey", default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
}

impl BrickConfig {
    /// Creates a bare step for the given brick id.
    #[must_use]
    pub fn new(id: impl Into<BrickId>) -> Self {
        Self {
            id: id.into(),
            config: ExpressionMap::new(),
            label: None,
            comments: None,
            instance_id: None,
            if_condition: None,
            output_key: None,
        }
    }

    /// Sets a config entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: Expression) -> Self {
        self.config.insert(key, value);
        self
    }

    /// Sets the output key.
    #[must_use]
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Sets the conditional gate.
    #[must_use]
    pub fn with_condition(mut self, condition: Pipeline) -> Self {
        self.if_condition = Some(condition);
        self
    }

    /// Sets the trace instance id.
    #[must_use]
    pub fn with_instance_id(mut self, instance_id: Uuid) -> Self {
        self.instance_id = Some(instance_id);
        self
    }
}

/// An ordered sequence of brick steps.
///
/// Pipelines nest by value (inside `if` gates, pipeline expressions, and
/// document elements), so the definition is a tree and cycles cannot be
/// expressed.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    /// The steps, in declaration order.
    pub steps: Vec<BrickConfig>,
}

impl Pipeline {
    /// Creates a pipeline from steps.
    #[must_use]
    pub fn new(steps: Vec<BrickConfig>) -> Self {
        Self { steps }
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the pipeline has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Parses a pipeline from its JSON definition.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
