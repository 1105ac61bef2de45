//! Built-in bricks over the state controller.

use super::{Brick, BrickContext, RenderedArgs};
use crate::core::{BrickId, BrickKind};
use crate::errors::{BrickflowError, BusinessError};
use crate::state::{MergeStrategy, Namespace};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

fn parse_namespace(args: &RenderedArgs) -> Result<Namespace, BrickflowError> {
    match args.value("namespace").and_then(Value::as_str) {
        None | Some("mod") => Ok(Namespace::Mod),
        Some("tab") => Ok(Namespace::Tab),
        Some("session") => Ok(Namespace::Session),
        Some(other) => Err(BusinessError::new(format!("Invalid namespace: {other}")).into()),
    }
}

/// Writes a single mod variable (`brickflow/state/assign`).
///
/// The variable is created on first write; its sync policy comes from
/// the mod's declared variables schema, not from this brick.
pub struct AssignModVariableBrick {
    id: BrickId,
}

impl AssignModVariableBrick {
    /// Creates the brick.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: BrickId::new("brickflow/state/assign"),
        }
    }
}

impl Default for AssignModVariableBrick {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Brick for AssignModVariableBrick {
    fn id(&self) -> &BrickId {
        &self.id
    }

    fn name(&self) -> &str {
        "Assign Mod Variable"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "variableName": {"type": "string"},
                "value": {},
            },
            "required": ["variableName"],
        })
    }

    async fn run(
        &self,
        args: RenderedArgs,
        ctx: BrickContext<'_>,
    ) -> Result<Value, BrickflowError> {
        let name = args
            .value("variableName")
            .and_then(Value::as_str)
            .ok_or_else(|| BusinessError::new("variableName is required"))?;
        let value = args.value("value").cloned().unwrap_or(Value::Null);

        let mut data = Map::new();
        data.insert(name.to_string(), value);
        ctx.state
            .set_state(
                Namespace::Mod,
                Value::Object(data),
                MergeStrategy::Shallow,
                ctx.component,
            )
            .await?;

        Ok(Value::Null)
    }
}

/// Reads a state namespace (`brickflow/state/get`).
pub struct GetStateBrick {
    id: BrickId,
}

impl GetStateBrick {
    /// Creates the brick.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: BrickId::new("brickflow/state/get"),
        }
    }
}

impl Default for GetStateBrick {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Brick for GetStateBrick {
    fn id(&self) -> &BrickId {
        &self.id
    }

    fn name(&self) -> &str {
        "Get Shared State"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Reader
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "namespace": {"type": "string", "enum": ["mod", "tab", "session"]},
            },
        })
    }

    async fn run(
        &self,
        args: RenderedArgs,
        ctx: BrickContext<'_>,
    ) -> Result<Value, BrickflowError> {
        let namespace = parse_namespace(&args)?;
        ctx.state.get_state(namespace, ctx.component).await
    }
}

/// Merges data into a state namespace (`brickflow/state/set`).
pub struct SetStateBrick {
    id: BrickId,
}

impl SetStateBrick {
    /// Creates the brick.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: BrickId::new("brickflow/state/set"),
        }
    }
}

impl Default for SetStateBrick {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Brick for SetStateBrick {
    fn id(&self) -> &BrickId {
        &self.id
    }

    fn name(&self) -> &str {
        "Set Shared State"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "namespace": {"type": "string", "enum": ["mod", "tab", "session"]},
                "data": {"type": "object"},
                "mergeStrategy": {"type": "string", "enum": ["replace", "shallow", "deep"]},
            },
            "required": ["data"],
        })
    }

    async fn run(
        &self,
        args: RenderedArgs,
        ctx: BrickContext<'_>,
    ) -> Result<Value, BrickflowError> {
        let namespace = parse_namespace(&args)?;
        let data = args
            .value("data")
            .cloned()
            .ok_or_else(|| BusinessError::new("data is required"))?;
        let strategy = match args.value("mergeStrategy").and_then(Value::as_str) {
            None | Some("shallow") => MergeStrategy::Shallow,
            Some("replace") => MergeStrategy::Replace,
            Some("deep") => MergeStrategy::Deep,
            Some(other) => {
                return Err(BusinessError::new(format!("Invalid merge strategy: {other}")).into())
            }
        };

        ctx.state
            .set_state(namespace, data, strategy, ctx.component)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EvalContext, ExpressionMap, ModComponentRef};
    use crate::state::StateController;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    fn args(values: Value) -> RenderedArgs {
        let Value::Object(map) = values else {
            panic!("expected object");
        };
        RenderedArgs::new(map, ExpressionMap::new())
    }

    #[tokio::test]
    async fn test_assign_creates_variable_on_first_write() {
        let state = Arc::new(StateController::in_memory());
        let component = ModComponentRef::new("m", Uuid::new_v4(), "t");
        let context = EvalContext::new();

        let brick = AssignModVariableBrick::new();
        brick
            .run(
                args(json!({"variableName": "count", "value": 3})),
                BrickContext {
                    context: &context,
                    component: &component,
                    state: &state,
                    runner: None,
                },
            )
            .await
            .unwrap();

        let stored = state.get_state(Namespace::Mod, &component).await.unwrap();
        assert_eq!(stored, json!({"count": 3}));
    }

    #[tokio::test]
    async fn test_set_then_get_roundtrip() {
        let state = Arc::new(StateController::in_memory());
        let component = ModComponentRef::new("m", Uuid::new_v4(), "t");
        let context = EvalContext::new();

        SetStateBrick::new()
            .run(
                args(json!({"data": {"x": 1}, "mergeStrategy": "deep"})),
                BrickContext {
                    context: &context,
                    component: &component,
                    state: &state,
                    runner: None,
                },
            )
            .await
            .unwrap();

        let read = GetStateBrick::new()
            .run(
                args(json!({})),
                BrickContext {
                    context: &context,
                    component: &component,
                    state: &state,
                    runner: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(read, json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_missing_variable_name_is_business_error() {
        let state = Arc::new(StateController::in_memory());
        let component = ModComponentRef::new("m", Uuid::new_v4(), "t");
        let context = EvalContext::new();

        let err = AssignModVariableBrick::new()
            .run(
                args(json!({"value": 1})),
                BrickContext {
                    context: &context,
                    component: &component,
                    state: &state,
                    runner: None,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_business());
    }
}
