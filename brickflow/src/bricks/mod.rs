//! The brick trait and built-in bricks.
//!
//! A brick is a single unit of behavior (reader/transformer/effect/
//! renderer) invocable from a pipeline. Brick business logic is supplied
//! by brick authors; the runtime only depends on the declared schemas and
//! the async `run` operation.

mod control;
mod state;

pub use control::TryCatchBrick;
pub use state::{AssignModVariableBrick, GetStateBrick, SetStateBrick};

use crate::core::{BrickId, BrickKind, EvalContext, ExpressionMap, ModComponentRef, Pipeline};
use crate::errors::BrickflowError;
use crate::state::StateController;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A brick's configuration after deep rendering.
///
/// Control-flow bricks additionally need the un-rendered expressions to
/// pull embedded pipelines out of their config, so both forms travel
/// together.
#[derive(Debug, Clone)]
pub struct RenderedArgs {
    values: Map<String, Value>,
    raw: ExpressionMap,
}

impl RenderedArgs {
    /// Creates rendered args from the rendered values and raw config.
    #[must_use]
    pub fn new(values: Map<String, Value>, raw: ExpressionMap) -> Self {
        Self { values, raw }
    }

    /// Looks up a rendered value.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns all rendered values.
    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Looks up an embedded pipeline in the un-rendered config.
    #[must_use]
    pub fn pipeline(&self, key: &str) -> Option<&Pipeline> {
        match self.raw.get(key) {
            Some(crate::core::Expression::Pipeline(pipeline)) => Some(pipeline),
            _ => None,
        }
    }

    /// Snapshots the rendered values as a JSON object (for traces).
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

/// Executes a nested pipeline on behalf of a control-flow brick.
///
/// Implemented by the executor; the handle carries the caller's context
/// and branch lineage so trace records of the sub-pipeline correlate to
/// the step that spawned it.
#[async_trait]
pub trait SubPipelineRunner: Send + Sync {
    /// Runs a pipeline with extra context bindings overlaid on the
    /// caller's context. The branch key labels the nesting level in
    /// trace lineage (`try`, `catch`, a config key).
    async fn run_pipeline(
        &self,
        branch_key: &str,
        pipeline: &Pipeline,
        bindings: Map<String, Value>,
    ) -> Result<Value, BrickflowError>;
}

/// Everything a brick can see while running.
pub struct BrickContext<'a> {
    /// The evaluation context at the time of the call.
    pub context: &'a EvalContext,
    /// The owning mod component.
    pub component: &'a ModComponentRef,
    /// The shared state controller.
    pub state: &'a Arc<StateController>,
    /// Sub-pipeline execution handle; present when invoked by the
    /// executor, absent under static analysis or direct testing.
    pub runner: Option<&'a dyn SubPipelineRunner>,
}

/// A single unit of pipeline behavior.
///
/// Bricks are registered once at startup and treated as immutable for
/// the lifetime of the session. The kind discriminant is decided here,
/// at definition time, never re-probed per use.
#[async_trait]
pub trait Brick: Send + Sync {
    /// The brick's globally unique namespaced id.
    fn id(&self) -> &BrickId;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// The brick's capability kind.
    fn kind(&self) -> BrickKind;

    /// JSON Schema describing the accepted config.
    fn input_schema(&self) -> Value;

    /// JSON Schema describing the output, when declared.
    fn output_schema(&self) -> Option<Value> {
        None
    }

    /// True for bricks that catch failures of an embedded pipeline and
    /// continue (the only sanctioned way to survive a step failure).
    fn is_error_boundary(&self) -> bool {
        false
    }

    /// Executes the brick with rendered arguments.
    async fn run(
        &self,
        args: RenderedArgs,
        ctx: BrickContext<'_>,
    ) -> Result<Value, BrickflowError>;
}

impl std::fmt::Debug for dyn Brick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brick")
            .field("id", self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

/// The default brick set registered by embedders.
#[must_use]
pub fn builtin_bricks() -> Vec<Arc<dyn Brick>> {
    vec![
        Arc::new(AssignModVariableBrick::new()),
        Arc::new(GetStateBrick::new()),
        Arc::new(SetStateBrick::new()),
        Arc::new(TryCatchBrick::new()),
    ]
}
