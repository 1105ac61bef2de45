//! Core data model for brick pipelines.
//!
//! This module provides:
//! - Brick and run identifiers
//! - The tagged expression union matching the Page Editor wire format
//! - Pipeline and step configuration types
//! - The layered evaluation context threaded through a run

mod config;
mod context;
mod document;
mod expression;
mod refs;
mod status;

pub use config::{BrickConfig, Pipeline};
pub use context::EvalContext;
pub use document::DocumentElementView;
pub use expression::{Expression, ExpressionMap};
pub use refs::{BrickId, ModComponentRef};
pub use status::{BrickKind, RunStatus};
