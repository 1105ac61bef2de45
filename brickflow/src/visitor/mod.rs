//! Pipeline traversal shared by execution and static analysis.
//!
//! The walk is deterministic document order: steps in declaration order,
//! each step's `if` pipeline before its config entries, config entries in
//! definition order, array items and element children by index. Both the
//! executor and the analyzers rely on that order being stable for a given
//! definition.

pub mod analyzers;

pub use analyzers::{BrickIdIndexVisitor, CollectingVisitor, VarLookupVisitor};

use crate::bricks::Brick;
use crate::core::{BrickConfig, DocumentElementView, Expression, Pipeline};
use crate::errors::BrickflowError;
use crate::registry::RegistrySnapshot;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// One segment of a node's position in the pipeline tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VisitSegment {
    /// `steps[i]` of the enclosing pipeline.
    Step(usize),
    /// The step's `if` gate pipeline.
    Condition,
    /// A config entry (also element props).
    ConfigKey(String),
    /// An array item.
    Index(usize),
    /// A document element child.
    Child(usize),
}

impl fmt::Display for VisitSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(index) => write!(f, "steps[{index}]"),
            Self::Condition => write!(f, "if"),
            Self::ConfigKey(key) => write!(f, "config.{key}"),
            Self::Index(index) => write!(f, "[{index}]"),
            Self::Child(index) => write!(f, "children[{index}]"),
        }
    }
}

/// The position of a visited node, usable as an error location and as a
/// stable analyzer output key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VisitPath {
    segments: Vec<VisitSegment>,
}

impl VisitPath {
    /// The root pipeline's path (empty).
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns a copy extended with one segment.
    #[must_use]
    pub fn push(&self, segment: VisitSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    /// Returns the segments.
    #[must_use]
    pub fn segments(&self) -> &[VisitSegment] {
        &self.segments
    }
}

impl fmt::Display for VisitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 && !matches!(segment, VisitSegment::Index(_)) {
                write!(f, ".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// The step currently being visited plus its resolved implementation.
///
/// Unknown brick ids are tolerated during traversal (`brick` is `None`)
/// so analyzers work on definitions whose bricks are not registered.
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// The step definition.
    pub config: BrickConfig,
    /// The registered implementation, when the snapshot has one.
    pub brick: Option<Arc<dyn Brick>>,
}

/// Walks a pipeline definition tree.
///
/// Implementors supply the registry snapshot and a frame stack; the
/// default methods do the walking. Override a `visit_*` method to
/// observe (or prune) that node class, and delegate to the matching
/// `walk_*` function to keep descending.
#[async_trait]
pub trait PipelineVisitor: Send {
    /// The registry snapshot resolved against during this traversal.
    fn snapshot(&self) -> &RegistrySnapshot;

    /// The stack of enclosing steps, innermost last.
    fn frames_mut(&mut self) -> &mut Vec<StackFrame>;

    /// Entry point.
    async fn visit_root_pipeline(&mut self, pipeline: &Pipeline) -> Result<(), BrickflowError> {
        self.visit_pipeline(pipeline, &VisitPath::root()).await
    }

    /// Visits a pipeline (root or nested).
    async fn visit_pipeline(
        &mut self,
        pipeline: &Pipeline,
        path: &VisitPath,
    ) -> Result<(), BrickflowError> {
        walk_pipeline(self, pipeline, path).await
    }

    /// Visits one step. The default pushes a stack frame, descends, and
    /// pops; overrides that still want descent must do the same (or call
    /// [`walk_brick`]).
    async fn visit_brick(
        &mut self,
        step: &BrickConfig,
        path: &VisitPath,
    ) -> Result<(), BrickflowError> {
        walk_brick(self, step, path).await
    }

    /// Visits one config entry of a step.
    async fn visit_config_value(
        &mut self,
        _key: &str,
        expression: &Expression,
        path: &VisitPath,
    ) -> Result<(), BrickflowError> {
        self.visit_expression(expression, path).await
    }

    /// Visits an expression node anywhere in the tree.
    async fn visit_expression(
        &mut self,
        expression: &Expression,
        path: &VisitPath,
    ) -> Result<(), BrickflowError> {
        walk_expression(self, expression, path).await
    }

    /// Visits a document element embedded in a renderer config.
    async fn visit_document_element(
        &mut self,
        element: &DocumentElementView<'_>,
        path: &VisitPath,
    ) -> Result<(), BrickflowError> {
        walk_document_element(self, element, path).await
    }
}

/// Descends into a pipeline's steps.
pub async fn walk_pipeline<V>(
    visitor: &mut V,
    pipeline: &Pipeline,
    path: &VisitPath,
) -> Result<(), BrickflowError>
where
    V: PipelineVisitor + ?Sized,
{
    for (index, step) in pipeline.steps.iter().enumerate() {
        visitor
            .visit_brick(step, &path.push(VisitSegment::Step(index)))
            .await?;
    }
    Ok(())
}

/// Pushes the step's frame, descends into its children, pops.
pub async fn walk_brick<V>(
    visitor: &mut V,
    step: &BrickConfig,
    path: &VisitPath,
) -> Result<(), BrickflowError>
where
    V: PipelineVisitor + ?Sized,
{
    let brick = visitor.snapshot().get(&step.id);
    visitor.frames_mut().push(StackFrame {
        config: step.clone(),
        brick,
    });

    let result = walk_brick_children(visitor, step, path).await;

    visitor.frames_mut().pop();
    result
}

/// Descends into a step's `if` pipeline and config entries.
pub async fn walk_brick_children<V>(
    visitor: &mut V,
    step: &BrickConfig,
    path: &VisitPath,
) -> Result<(), BrickflowError>
where
    V: PipelineVisitor + ?Sized,
{
    if let Some(condition) = &step.if_condition {
        visitor
            .visit_pipeline(condition, &path.push(VisitSegment::Condition))
            .await?;
    }
    for (key, expression) in step.config.iter() {
        visitor
            .visit_config_value(
                key,
                expression,
                &path.push(VisitSegment::ConfigKey(key.clone())),
            )
            .await?;
    }
    Ok(())
}

/// Descends into an expression's structure.
pub async fn walk_expression<V>(
    visitor: &mut V,
    expression: &Expression,
    path: &VisitPath,
) -> Result<(), BrickflowError>
where
    V: PipelineVisitor + ?Sized,
{
    if let Some(element) = DocumentElementView::detect(expression) {
        return visitor.visit_document_element(&element, path).await;
    }

    match expression {
        Expression::Pipeline(pipeline) => visitor.visit_pipeline(pipeline, path).await,
        Expression::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                visitor
                    .visit_expression(item, &path.push(VisitSegment::Index(index)))
                    .await?;
            }
            Ok(())
        }
        Expression::Object(map) => {
            for (key, value) in map.iter() {
                visitor
                    .visit_expression(value, &path.push(VisitSegment::ConfigKey(key.clone())))
                    .await?;
            }
            Ok(())
        }
        Expression::Literal(_)
        | Expression::Var(_)
        | Expression::Nunjucks(_)
        | Expression::Mustache(_) => Ok(()),
    }
}

/// Descends into an element's props and children.
pub async fn walk_document_element<V>(
    visitor: &mut V,
    element: &DocumentElementView<'_>,
    path: &VisitPath,
) -> Result<(), BrickflowError>
where
    V: PipelineVisitor + ?Sized,
{
    if let Some(config) = element.config {
        for (key, expression) in config.iter() {
            visitor
                .visit_expression(
                    expression,
                    &path.push(VisitSegment::ConfigKey(key.clone())),
                )
                .await?;
        }
    }
    if let Some(children) = element.children {
        for (index, child) in children.iter().enumerate() {
            visitor
                .visit_expression(child, &path.push(VisitSegment::Child(index)))
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_visit_path_display() {
        let path = VisitPath::root()
            .push(VisitSegment::Step(1))
            .push(VisitSegment::ConfigKey("body".to_string()))
            .push(VisitSegment::Index(0))
            .push(VisitSegment::Step(0));

        assert_eq!(path.to_string(), "steps[1].config.body[0].steps[0]");
    }

    #[test]
    fn test_condition_segment_reads_as_if() {
        let path = VisitPath::root()
            .push(VisitSegment::Step(0))
            .push(VisitSegment::Condition)
            .push(VisitSegment::Step(0));

        assert_eq!(path.to_string(), "steps[0].if.steps[0]");
    }
}
