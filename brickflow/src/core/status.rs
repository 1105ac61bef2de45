//! Brick kind and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The capability a brick provides.
///
/// The kind is a closed discriminant decided once at registration; the
/// runtime never re-probes an instance to discover what it can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrickKind {
    /// Reads data out of the page or an external source.
    Reader,
    /// Produces an output value from its rendered arguments.
    Transformer,
    /// Performs a side effect and produces no meaningful output.
    Effect,
    /// Renders content into the page (panels, documents).
    Renderer,
}

impl fmt::Display for BrickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reader => write!(f, "reader"),
            Self::Transformer => write!(f, "transformer"),
            Self::Effect => write!(f, "effect"),
            Self::Renderer => write!(f, "renderer"),
        }
    }
}

/// The lifecycle state of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run has not started yet.
    Pending,
    /// Steps are executing in order.
    Running,
    /// Every scheduled step settled successfully.
    Completed,
    /// A step failed and the remainder was aborted.
    Failed,
    /// The run was aborted between steps; not an error.
    Cancelled,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl RunStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the run finished without failing.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brick_kind_display() {
        assert_eq!(BrickKind::Reader.to_string(), "reader");
        assert_eq!(BrickKind::Transformer.to_string(), "transformer");
        assert_eq!(BrickKind::Effect.to_string(), "effect");
        assert_eq!(BrickKind::Renderer.to_string(), "renderer");
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn test_run_status_serialize() {
        let json = serde_json::to_string(&RunStatus::Cancelled).unwrap();
        assert_eq!(json, r#""cancelled""#);
    }
}
