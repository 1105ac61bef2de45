//! Error types for the brickflow runtime.
//!
//! The taxonomy distinguishes configuration errors (bad definitions,
//! surfaced with the offending step's location), business errors (raised
//! deliberately by brick logic and shown to end users verbatim), runtime
//! errors (everything else), and cancellation (not an error).

use crate::core::BrickId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The main error type for brickflow operations.
#[derive(Debug, Error)]
pub enum BrickflowError {
    /// No brick is registered for the referenced id.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// A variable reference path is not syntactically valid.
    #[error("{0}")]
    InvalidPath(#[from] InvalidPathError),

    /// A template failed to compile or evaluate.
    #[error("Template error: {0}")]
    Template(String),

    /// A distinguished error raised deliberately by brick logic.
    #[error("{0}")]
    Business(#[from] BusinessError),

    /// A step failure carrying its pipeline location.
    #[error("{0}")]
    Step(#[from] StepError),

    /// The run was aborted between steps.
    #[error("Pipeline cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },

    /// A state controller failure.
    #[error("State error: {0}")]
    State(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrickflowError {
    /// Creates a cancellation marker.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Returns true for errors raised deliberately by brick logic.
    ///
    /// Business errors are rendered to end users with their message
    /// verbatim and are not telemetry-worthy.
    #[must_use]
    pub fn is_business(&self) -> bool {
        match self {
            Self::Business(_) => true,
            Self::Step(step) => step.source.is_business(),
            _ => false,
        }
    }

    /// Returns true for definition-level errors (bad brick id, invalid
    /// path syntax, malformed expression).
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::InvalidPath(_) | Self::Template(_) => true,
            Self::Step(step) => step.source.is_configuration(),
            _ => false,
        }
    }

    /// Returns the message to show an end user.
    ///
    /// Step wrappers add pipeline-location framing for logs and
    /// debugging tools; user-facing surfaces (and the `@error` binding)
    /// get the innermost message only.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Step(step) => step.source.user_message(),
            other => other.to_string(),
        }
    }

    /// Returns true if this is the cancellation marker.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled { .. } => true,
            Self::Step(step) => step.source.is_cancelled(),
            _ => false,
        }
    }
}

/// Error raised when a brick lookup misses.
#[derive(Debug, Clone, Error)]
#[error("Brick not found: {id}")]
pub struct NotFoundError {
    /// The missing brick id.
    pub id: BrickId,
}

impl NotFoundError {
    /// Creates a new not-found error.
    #[must_use]
    pub fn new(id: BrickId) -> Self {
        Self { id }
    }
}

/// Error raised for a syntactically invalid variable reference path.
///
/// A missing value at a valid path is not an error; it resolves to null.
#[derive(Debug, Clone, Error)]
#[error("Invalid variable path '{path}': {reason}")]
pub struct InvalidPathError {
    /// The offending path text.
    pub path: String,
    /// What made it invalid.
    pub reason: String,
}

impl InvalidPathError {
    /// Creates a new invalid-path error.
    #[must_use]
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A deliberate, user-facing error raised by brick logic.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BusinessError {
    /// The message shown to the end user verbatim.
    pub message: String,
}

impl BusinessError {
    /// Creates a new business error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Where in the pipeline tree a failure occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLocation {
    /// The visit path (e.g., `steps[1].config.body.steps[0]`).
    pub path: String,
    /// The failing step's brick id.
    pub brick_id: BrickId,
    /// The step's trace instance id, if assigned.
    pub instance_id: Option<Uuid>,
}

impl std::fmt::Display for StepLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.brick_id, self.path)
    }
}

/// A step failure annotated with its location.
#[derive(Debug, Error)]
#[error("Step failed ({location}): {source}")]
pub struct StepError {
    /// The failing step's location.
    pub location: StepLocation,
    /// The underlying failure.
    #[source]
    pub source: Box<BrickflowError>,
}

impl StepError {
    /// Wraps an error with a step location.
    ///
    /// Already-located errors are passed through unchanged so the
    /// innermost location wins.
    #[must_use]
    pub fn wrap(location: StepLocation, source: BrickflowError) -> BrickflowError {
        match source {
            located @ BrickflowError::Step(_) => located,
            cancelled @ BrickflowError::Cancelled { .. } => cancelled,
            other => BrickflowError::Step(Self {
                location,
                source: Box::new(other),
            }),
        }
    }
}
