//! Test fixtures: minimal bricks and builders used across the test
//! suites and benches.

#![allow(clippy::unwrap_used)]

use crate::bricks::{builtin_bricks, Brick, BrickContext, RenderedArgs};
use crate::core::{BrickId, BrickKind, ModComponentRef, Pipeline};
use crate::errors::{BrickflowError, BusinessError};
use crate::registry::BrickRegistry;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Returns its `value` config entry (`brickflow/transform/echo`).
pub struct EchoBrick {
    id: BrickId,
    name: String,
}

impl EchoBrick {
    /// Creates the echo brick.
    #[must_use]
    pub fn new() -> Self {
        Self::named("Echo")
    }

    /// Creates an echo brick with a custom display name (registry
    /// overwrite tests).
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: BrickId::new("brickflow/transform/echo"),
            name: name.into(),
        }
    }
}

impl Default for EchoBrick {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Brick for EchoBrick {
    fn id(&self) -> &BrickId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transformer
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"value": {}},
        })
    }

    async fn run(
        &self,
        args: RenderedArgs,
        _ctx: BrickContext<'_>,
    ) -> Result<Value, BrickflowError> {
        Ok(args.value("value").cloned().unwrap_or(Value::Null))
    }
}

/// Fails with its `message` config entry.
///
/// `business()` raises a [`BusinessError`]; `runtime()` raises an
/// internal error.
pub struct ThrowBrick {
    id: BrickId,
    business: bool,
}

impl ThrowBrick {
    /// A brick that raises a business error
    /// (`brickflow/test/business-error`).
    #[must_use]
    pub fn business() -> Self {
        Self {
            id: BrickId::new("brickflow/test/business-error"),
            business: true,
        }
    }

    /// A brick that raises a runtime error
    /// (`brickflow/test/runtime-error`).
    #[must_use]
    pub fn runtime() -> Self {
        Self {
            id: BrickId::new("brickflow/test/runtime-error"),
            business: false,
        }
    }
}

#[async_trait]
impl Brick for ThrowBrick {
    fn id(&self) -> &BrickId {
        &self.id
    }

    fn name(&self) -> &str {
        if self.business {
            "Raise Business Error"
        } else {
            "Raise Runtime Error"
        }
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
        })
    }

    async fn run(
        &self,
        args: RenderedArgs,
        _ctx: BrickContext<'_>,
    ) -> Result<Value, BrickflowError> {
        let message = args
            .value("message")
            .and_then(Value::as_str)
            .unwrap_or("boom")
            .to_string();
        if self.business {
            Err(BusinessError::new(message).into())
        } else {
            Err(BrickflowError::Internal(message))
        }
    }
}

/// Returns the whole evaluation context (`brickflow/test/context`).
pub struct ContextBrick {
    id: BrickId,
}

impl ContextBrick {
    /// Creates the context brick.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: BrickId::new("brickflow/test/context"),
        }
    }
}

impl Default for ContextBrick {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Brick for ContextBrick {
    fn id(&self) -> &BrickId {
        &self.id
    }

    fn name(&self) -> &str {
        "Context Snapshot"
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Reader
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn run(
        &self,
        _args: RenderedArgs,
        ctx: BrickContext<'_>,
    ) -> Result<Value, BrickflowError> {
        Ok(ctx.context.to_value())
    }
}

/// Installs a log subscriber for test runs.
///
/// Honors `RUST_LOG`; output is captured per test. Safe to call from
/// every test, later installations are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A registry with the builtin bricks plus the fixtures above.
#[must_use]
pub fn test_registry() -> BrickRegistry {
    let mut bricks = builtin_bricks();
    bricks.push(Arc::new(EchoBrick::new()));
    bricks.push(Arc::new(ThrowBrick::business()));
    bricks.push(Arc::new(ThrowBrick::runtime()));
    bricks.push(Arc::new(ContextBrick::new()));
    BrickRegistry::with_bricks(bricks)
}

/// A component reference with a fresh component id.
#[must_use]
pub fn test_component() -> ModComponentRef {
    ModComponentRef::new("test-mod", Uuid::new_v4(), "tab-1")
}

/// Parses a pipeline from its JSON definition, panicking on malformed
/// fixtures.
#[must_use]
pub fn pipeline(definition: Value) -> Pipeline {
    Pipeline::from_json(definition).unwrap()
}
