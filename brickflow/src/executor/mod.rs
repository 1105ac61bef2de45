//! The pipeline executor.
//!
//! Runs a pipeline definition step by step against an evaluation context:
//! resolve the brick, evaluate the `if` gate, render the config, invoke
//! the brick, bind the output. Failures abort the remainder of the run
//! unless an error-boundary brick upstream catches them.

mod branch;

#[cfg(test)]
mod integration_tests;

pub use branch::{BranchCounters, BranchStack};

use crate::bricks::{BrickContext, RenderedArgs, SubPipelineRunner};
use crate::cancellation::CancellationToken;
use crate::core::{BrickConfig, EvalContext, ModComponentRef, Pipeline, RunStatus};
use crate::errors::{BrickflowError, NotFoundError, StepError, StepLocation};
use crate::registry::RegistrySnapshot;
use crate::state::{Namespace, StateController};
use crate::templates::Renderer;
use crate::trace::{TraceOutcome, TraceRecord, TraceSink};
use crate::visitor::{VisitPath, VisitSegment};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything a run starts from besides the pipeline itself.
#[derive(Debug)]
pub struct RunInput {
    /// The `@input` value (trigger payload, previous brick output).
    pub input: Value,
    /// The `@options` value (mod option values).
    pub options: Value,
    /// The mod component this run belongs to.
    pub component: ModComponentRef,
    /// Correlates all trace records of the run.
    pub run_id: Uuid,
    /// Checked between steps; in-flight bricks are never interrupted.
    pub cancellation: Arc<CancellationToken>,
}

impl RunInput {
    /// Creates a run input with empty payloads and a fresh run id.
    #[must_use]
    pub fn new(component: ModComponentRef) -> Self {
        Self {
            input: Value::Object(Map::new()),
            options: Value::Object(Map::new()),
            component,
            run_id: Uuid::new_v4(),
            cancellation: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the `@input` payload.
    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    /// Sets the `@options` payload.
    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// Sets the run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Arc<CancellationToken>) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// The outcome of one pipeline run.
#[derive(Debug)]
pub struct RunResult {
    /// Terminal run status.
    pub status: RunStatus,
    /// The last executed step's output, on success.
    pub output: Option<Value>,
    /// The failure (or cancellation marker) otherwise.
    pub error: Option<BrickflowError>,
}

impl RunResult {
    /// Returns true when the run completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Per-run bookkeeping shared by every nesting level.
struct RunMeta {
    run_id: Uuid,
    component: ModComponentRef,
    cancellation: Arc<CancellationToken>,
    counters: BranchCounters,
}

/// Executes pipeline definitions against registered bricks.
///
/// Holds a registry snapshot for its lifetime, so re-registration during
/// a run never changes the resolved implementations mid-flight.
pub struct PipelineExecutor {
    snapshot: RegistrySnapshot,
    renderer: Renderer,
    state: Arc<StateController>,
    trace: Arc<TraceSink>,
}

impl PipelineExecutor {
    /// Creates an executor over a registry snapshot.
    #[must_use]
    pub fn new(
        snapshot: RegistrySnapshot,
        state: Arc<StateController>,
        trace: Arc<TraceSink>,
    ) -> Self {
        Self {
            snapshot,
            renderer: Renderer::new(),
            state,
            trace,
        }
    }

    /// Runs a pipeline to completion, failure, or cancellation.
    ///
    /// The `@mod` context entry is a snapshot of the mod's state taken at
    /// run start; state written during the run is visible to state reads
    /// but not through `@mod`.
    pub async fn run(&self, pipeline: &Pipeline, input: RunInput) -> RunResult {
        info!(
            run_id = %input.run_id,
            component_id = %input.component.mod_component_id,
            steps = pipeline.len(),
            "starting pipeline run",
        );

        let mod_state = match self.state.get_state(Namespace::Mod, &input.component).await {
            Ok(state) => state,
            Err(error) => {
                return RunResult {
                    status: RunStatus::Failed,
                    output: None,
                    error: Some(error),
                }
            }
        };

        let context = EvalContext::root(input.input, input.options, mod_state);
        let meta = RunMeta {
            run_id: input.run_id,
            component: input.component,
            cancellation: input.cancellation,
            counters: BranchCounters::new(),
        };

        let outcome = self
            .run_steps(
                pipeline,
                context,
                BranchStack::root(),
                VisitPath::root(),
                &meta,
            )
            .await;

        match outcome {
            Ok(output) => {
                info!(run_id = %meta.run_id, "pipeline run completed");
                RunResult {
                    status: RunStatus::Completed,
                    output: Some(output),
                    error: None,
                }
            }
            Err(error) if error.is_cancelled() => {
                info!(run_id = %meta.run_id, "pipeline run cancelled");
                RunResult {
                    status: RunStatus::Cancelled,
                    output: None,
                    error: Some(error),
                }
            }
            Err(error) => {
                warn!(run_id = %meta.run_id, error = %error, "pipeline run failed");
                RunResult {
                    status: RunStatus::Failed,
                    output: None,
                    error: Some(error),
                }
            }
        }
    }

    /// Runs a (possibly nested) pipeline. Boxed for recursion through
    /// `if` gates and sub-pipeline bricks.
    fn run_steps<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        context: EvalContext,
        branches: BranchStack,
        path: VisitPath,
        meta: &'a RunMeta,
    ) -> BoxFuture<'a, Result<Value, BrickflowError>> {
        async move {
            let mut context = context;
            let mut output = Value::Null;

            for (index, step) in pipeline.steps.iter().enumerate() {
                meta.cancellation.checkpoint()?;

                let step_path = path.push(VisitSegment::Step(index));
                if let Some(value) = self
                    .run_step(step, &mut context, &branches, &step_path, meta)
                    .await?
                {
                    output = value;
                }
            }

            Ok(output)
        }
        .boxed()
    }

    /// Runs one step. `Ok(None)` means the step was skipped by its gate;
    /// a skipped step binds nothing and does not change the pipeline
    /// output.
    async fn run_step(
        &self,
        step: &BrickConfig,
        context: &mut EvalContext,
        branches: &BranchStack,
        step_path: &VisitPath,
        meta: &RunMeta,
    ) -> Result<Option<Value>, BrickflowError> {
        let location = StepLocation {
            path: step_path.to_string(),
            brick_id: step.id.clone(),
            instance_id: step.instance_id,
        };

        // The gate decides first: a gated-off step never resolves its
        // brick, so definitions can reference unregistered bricks behind
        // a falsy condition.
        if let Some(condition) = &step.if_condition {
            let gate = self
                .run_steps(
                    condition,
                    context.clone(),
                    branches.enter("if", &meta.counters),
                    step_path.push(VisitSegment::Condition),
                    meta,
                )
                .await
                .map_err(|error| StepError::wrap(location.clone(), error))?;

            if !is_truthy(&gate) {
                debug!(brick_id = %step.id, path = %step_path, "condition falsy, skipping step");
                self.trace_step(step, meta, branches, context, None, TraceOutcome::Skipped);
                return Ok(None);
            }
        }

        let Some(brick) = self.snapshot.get(&step.id) else {
            return Err(StepError::wrap(
                location,
                NotFoundError::new(step.id.clone()).into(),
            ));
        };

        self.trace_step(step, meta, branches, context, None, TraceOutcome::InFlight);

        let args = match self.renderer.render_config(&step.config, context) {
            Ok(values) => RenderedArgs::new(values, step.config.clone()),
            Err(error) => {
                self.trace_step(
                    step,
                    meta,
                    branches,
                    context,
                    None,
                    TraceOutcome::Error {
                        message: error.to_string(),
                        is_business: error.is_business(),
                    },
                );
                return Err(StepError::wrap(location, error));
            }
        };

        debug!(brick_id = %step.id, path = %step_path, "running brick");
        let runner = ExecutorSubRunner {
            executor: self,
            context: context.clone(),
            branches: branches.clone(),
            path: step_path.clone(),
            meta,
        };
        let result = brick
            .run(
                args.clone(),
                BrickContext {
                    context,
                    component: &meta.component,
                    state: &self.state,
                    runner: Some(&runner),
                },
            )
            .await;

        match result {
            Ok(value) => {
                self.trace_step(
                    step,
                    meta,
                    branches,
                    context,
                    Some(args.to_value()),
                    TraceOutcome::Output {
                        value: value.clone(),
                    },
                );
                if let Some(key) = &step.output_key {
                    *context = context.with_output_binding(key, value.clone());
                }
                Ok(Some(value))
            }
            // The in-flight record stays in flight; cancellation results
            // are discarded, not errors.
            Err(error) if error.is_cancelled() => Err(error),
            Err(error) => {
                self.trace_step(
                    step,
                    meta,
                    branches,
                    context,
                    Some(args.to_value()),
                    TraceOutcome::Error {
                        message: error.to_string(),
                        is_business: error.is_business(),
                    },
                );
                Err(StepError::wrap(location, error))
            }
        }
    }

    /// Records a trace entry for steps carrying an instance id.
    fn trace_step(
        &self,
        step: &BrickConfig,
        meta: &RunMeta,
        branches: &BranchStack,
        context: &EvalContext,
        rendered_args: Option<Value>,
        outcome: TraceOutcome,
    ) {
        let Some(instance_id) = step.instance_id else {
            return;
        };
        self.trace.record(TraceRecord {
            run_id: meta.run_id,
            component_id: meta.component.mod_component_id,
            instance_id,
            brick_id: step.id.to_string(),
            branch_stack: branches.to_vec(),
            template_context: context.to_value(),
            rendered_args,
            timestamp: Utc::now(),
            outcome,
        });
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("brick_count", &self.snapshot.len())
            .finish()
    }
}

/// The executor-backed sub-pipeline handle passed to control-flow bricks.
///
/// Carries the calling step's context, lineage, and path so the nested
/// run's traces and error locations chain off the caller.
struct ExecutorSubRunner<'a> {
    executor: &'a PipelineExecutor,
    context: EvalContext,
    branches: BranchStack,
    path: VisitPath,
    meta: &'a RunMeta,
}

#[async_trait]
impl SubPipelineRunner for ExecutorSubRunner<'_> {
    async fn run_pipeline(
        &self,
        branch_key: &str,
        pipeline: &Pipeline,
        bindings: Map<String, Value>,
    ) -> Result<Value, BrickflowError> {
        self.executor
            .run_steps(
                pipeline,
                self.context.with_bindings(bindings),
                self.branches.enter(branch_key, &self.meta.counters),
                self.path.push(VisitSegment::ConfigKey(branch_key.to_string())),
                self.meta,
            )
            .await
    }
}

/// JavaScript-style truthiness over JSON values.
///
/// Empty arrays and objects are truthy; empty strings, zero, and null
/// are not.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(boolean) => *boolean,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(string) => !string.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness_follows_javascript() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));

        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(-1)));
        assert!(is_truthy(&json!("false")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }
}
