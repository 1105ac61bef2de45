//! Control-flow bricks.

use super::{Brick, BrickContext, RenderedArgs};
use crate::core::{BrickId, BrickKind};
use crate::errors::{BrickflowError, BusinessError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Runs a `try` pipeline and, on failure, a `catch` pipeline
/// (`brickflow/control/try-catch`).
///
/// This is the only sanctioned way to continue execution after a step
/// failure within the same run; it is ordinary pipeline control flow,
/// not a language-level exception boundary around the executor. The
/// catch pipeline sees the failure as `@error`. Cancellation is never
/// caught.
pub struct TryCatchBrick {
    id: BrickId,
}

impl TryCatchBrick {
    /// Creates the brick.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: BrickId::new("brickflow/control/try-catch"),
        }
    }
}

impl Default for TryCatchBrick {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Brick for TryCatchBrick {
    fn id(&self) -> &BrickId {
        &self.id
    }

    fn name(&self) -> &str {
        "Try / Catch"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transformer
    }

    fn is_error_boundary(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "try": {"$ref": "#/definitions/pipeline"},
                "catch": {"$ref": "#/definitions/pipeline"},
            },
            "required": ["try"],
        })
    }

    async fn run(
        &self,
        args: RenderedArgs,
        ctx: BrickContext<'_>,
    ) -> Result<Value, BrickflowError> {
        let runner = ctx
            .runner
            .ok_or_else(|| BrickflowError::Internal("try-catch requires an executor".to_string()))?;
        let try_pipeline = args
            .pipeline("try")
            .ok_or_else(|| BusinessError::new("try must be a pipeline"))?;

        match runner.run_pipeline("try", try_pipeline, Map::new()).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                debug!(error = %err, "try pipeline failed, entering catch");
                let Some(catch_pipeline) = args.pipeline("catch") else {
                    // No catch branch: swallow the failure, yield null.
                    return Ok(Value::Null);
                };

                let mut bindings = Map::new();
                bindings.insert(
                    "@error".to_string(),
                    json!({
                        // Innermost message only; the step-location
                        // framing is for logs, not the catch pipeline.
                        "message": err.user_message(),
                        "isBusinessError": err.is_business(),
                    }),
                );
                runner.run_pipeline("catch", catch_pipeline, bindings).await
            }
        }
    }
}
