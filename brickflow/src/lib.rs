//! # Brickflow
//!
//! A declarative brick pipeline execution runtime.
//!
//! Brickflow runs pipelines: ordered sequences of configured brick calls
//! whose arguments are template expressions evaluated against a layered
//! context. It provides:
//!
//! - **Brick registry**: id-keyed catalogue of brick implementations
//! - **Expression evaluation**: tagged expressions (`var`, templates,
//!   nested pipelines) rendered deeply before each call
//! - **Pipeline traversal**: deterministic visitor shared by execution
//!   and static analysis
//! - **Shared state**: namespaced mod variables with sync policies and
//!   subscriptions
//! - **Trace capture**: per-step records for debugging tools
//! - **Cancellation handling**: cooperative between-step cancellation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brickflow::prelude::*;
//!
//! let registry = BrickRegistry::with_bricks(builtin_bricks());
//! let executor = PipelineExecutor::new(
//!     registry.snapshot(),
//!     Arc::new(StateController::in_memory()),
//!     Arc::new(TraceSink::new()),
//! );
//!
//! let pipeline = Pipeline::from_json(definition)?;
//! let result = executor.run(&pipeline, RunInput::new(component)).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bricks;
pub mod cancellation;
pub mod core;
pub mod errors;
pub mod executor;
pub mod registry;
pub mod state;
pub mod templates;
pub mod testing;
pub mod trace;
pub mod visitor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bricks::{
        builtin_bricks, Brick, BrickContext, RenderedArgs, SubPipelineRunner,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::core::{
        BrickConfig, BrickId, BrickKind, EvalContext, Expression, ExpressionMap,
        ModComponentRef, Pipeline, RunStatus,
    };
    pub use crate::errors::{
        BrickflowError, BusinessError, InvalidPathError, NotFoundError, StepError,
        StepLocation,
    };
    pub use crate::executor::{PipelineExecutor, RunInput, RunResult};
    pub use crate::registry::{BrickRegistry, RegistrySnapshot};
    pub use crate::state::{
        MergeStrategy, ModVariablesDefinition, Namespace, StateController, SyncPolicy,
    };
    pub use crate::templates::Renderer;
    pub use crate::trace::{Branch, TraceOutcome, TraceRecord, TraceSink};
    pub use crate::visitor::{PipelineVisitor, StackFrame, VisitPath, VisitSegment};
}
