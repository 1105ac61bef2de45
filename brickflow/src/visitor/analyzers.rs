//! Read-only analyzers built on the traversal.

use super::{walk_brick, walk_expression, PipelineVisitor, StackFrame, VisitPath};
use crate::core::{BrickConfig, BrickId, Expression, Pipeline};
use crate::errors::BrickflowError;
use crate::registry::RegistrySnapshot;
use async_trait::async_trait;
use std::collections::HashSet;

/// Records every visited step in traversal order.
///
/// The recorded list is a function of the definition alone, which is what
/// lets callers diff analyzer output across definition versions.
pub struct CollectingVisitor {
    snapshot: RegistrySnapshot,
    frames: Vec<StackFrame>,
    nodes: Vec<(String, BrickId)>,
}

impl CollectingVisitor {
    /// Creates a collector over a snapshot.
    #[must_use]
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self {
            snapshot,
            frames: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Collects `(path, brick id)` pairs for every step in the tree.
    pub async fn collect(
        pipeline: &Pipeline,
        snapshot: RegistrySnapshot,
    ) -> Result<Vec<(String, BrickId)>, BrickflowError> {
        let mut visitor = Self::new(snapshot);
        visitor.visit_root_pipeline(pipeline).await?;
        Ok(visitor.nodes)
    }
}

#[async_trait]
impl PipelineVisitor for CollectingVisitor {
    fn snapshot(&self) -> &RegistrySnapshot {
        &self.snapshot
    }

    fn frames_mut(&mut self) -> &mut Vec<StackFrame> {
        &mut self.frames
    }

    async fn visit_brick(
        &mut self,
        step: &BrickConfig,
        path: &VisitPath,
    ) -> Result<(), BrickflowError> {
        self.nodes.push((path.to_string(), step.id.clone()));
        walk_brick(self, step, path).await
    }
}

/// Collects the set of brick ids a definition references.
///
/// Feeds the "which mods use brick X" index; unregistered ids are
/// reported too.
pub struct BrickIdIndexVisitor {
    snapshot: RegistrySnapshot,
    frames: Vec<StackFrame>,
    ids: HashSet<BrickId>,
}

impl BrickIdIndexVisitor {
    /// Creates an index builder over a snapshot.
    #[must_use]
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self {
            snapshot,
            frames: Vec::new(),
            ids: HashSet::new(),
        }
    }

    /// Returns the referenced ids, sorted for stable output.
    pub async fn collect(
        pipeline: &Pipeline,
        snapshot: RegistrySnapshot,
    ) -> Result<Vec<BrickId>, BrickflowError> {
        let mut visitor = Self::new(snapshot);
        visitor.visit_root_pipeline(pipeline).await?;

        let mut ids: Vec<BrickId> = visitor.ids.into_iter().collect();
        ids.sort_by_key(|id| id.to_string());
        Ok(ids)
    }
}

#[async_trait]
impl PipelineVisitor for BrickIdIndexVisitor {
    fn snapshot(&self) -> &RegistrySnapshot {
        &self.snapshot
    }

    fn frames_mut(&mut self) -> &mut Vec<StackFrame> {
        &mut self.frames
    }

    async fn visit_brick(
        &mut self,
        step: &BrickConfig,
        path: &VisitPath,
    ) -> Result<(), BrickflowError> {
        self.ids.insert(step.id.clone());
        walk_brick(self, step, path).await
    }
}

/// Collects every `var` reference with its position.
///
/// Definition validation cross-checks the referenced names against the
/// declared mod variables.
pub struct VarLookupVisitor {
    snapshot: RegistrySnapshot,
    frames: Vec<StackFrame>,
    vars: Vec<(String, String)>,
}

impl VarLookupVisitor {
    /// Creates a var collector over a snapshot.
    #[must_use]
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self {
            snapshot,
            frames: Vec::new(),
            vars: Vec::new(),
        }
    }

    /// Collects `(path, var reference)` pairs in traversal order.
    pub async fn collect(
        pipeline: &Pipeline,
        snapshot: RegistrySnapshot,
    ) -> Result<Vec<(String, String)>, BrickflowError> {
        let mut visitor = Self::new(snapshot);
        visitor.visit_root_pipeline(pipeline).await?;
        Ok(visitor.vars)
    }
}

#[async_trait]
impl PipelineVisitor for VarLookupVisitor {
    fn snapshot(&self) -> &RegistrySnapshot {
        &self.snapshot
    }

    fn frames_mut(&mut self) -> &mut Vec<StackFrame> {
        &mut self.frames
    }

    async fn visit_expression(
        &mut self,
        expression: &Expression,
        path: &VisitPath,
    ) -> Result<(), BrickflowError> {
        if let Expression::Var(reference) = expression {
            self.vars.push((path.to_string(), reference.clone()));
            return Ok(());
        }
        walk_expression(self, expression, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn nested_pipeline() -> Pipeline {
        Pipeline::from_json(json!([
            {
                "id": "brickflow/transform/echo",
                "if": [
                    {"id": "brickflow/state/get"},
                ],
                "config": {
                    "value": {"__type__": "var", "__value__": "@input.url"},
                },
            },
            {
                "id": "brickflow/control/try-catch",
                "config": {
                    "try": {"__type__": "pipeline", "__value__": [
                        {"id": "brickflow/state/set", "config": {
                            "data": {"x": {"__type__": "var", "__value__": "@a"}},
                        }},
                    ]},
                },
            },
            {
                "id": "brickflow/render/document",
                "config": {
                    "body": {
                        "type": "container",
                        "children": [
                            {"type": "button", "config": {
                                "onClick": {"__type__": "pipeline", "__value__": [
                                    {"id": "brickflow/transform/echo"},
                                ]},
                            }},
                        ],
                    },
                },
            },
        ]))
        .unwrap()
    }

    #[tokio::test]
    async fn test_collects_nodes_in_document_order() {
        let nodes = CollectingVisitor::collect(&nested_pipeline(), RegistrySnapshot::empty())
            .await
            .unwrap();

        let paths: Vec<&str> = nodes.iter().map(|(path, _)| path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "steps[0]",
                "steps[0].if.steps[0]",
                "steps[1]",
                "steps[1].config.try.steps[0]",
                "steps[2]",
                "steps[2].config.body.children[0].config.onClick.steps[0]",
            ]
        );
    }

    #[tokio::test]
    async fn test_traversal_is_deterministic() {
        let pipeline = nested_pipeline();
        let first = CollectingVisitor::collect(&pipeline, RegistrySnapshot::empty())
            .await
            .unwrap();
        let second = CollectingVisitor::collect(&pipeline, RegistrySnapshot::empty())
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_id_index_reaches_every_nesting_level() {
        let ids = BrickIdIndexVisitor::collect(&nested_pipeline(), RegistrySnapshot::empty())
            .await
            .unwrap();

        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(
            ids,
            vec![
                "brickflow/control/try-catch",
                "brickflow/render/document",
                "brickflow/state/get",
                "brickflow/state/set",
                "brickflow/transform/echo",
            ]
        );
    }

    #[tokio::test]
    async fn test_var_lookup_finds_nested_references() {
        let vars = VarLookupVisitor::collect(&nested_pipeline(), RegistrySnapshot::empty())
            .await
            .unwrap();

        let refs: Vec<&str> = vars.iter().map(|(_, reference)| reference.as_str()).collect();
        assert_eq!(refs, vec!["@input.url", "@a"]);
    }
}
