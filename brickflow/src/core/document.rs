//! Document-builder element detection.
//!
//! Renderer bricks embed an element tree (`type` / `config` / `children`)
//! in their configuration. Elements are plain expression objects on the
//! wire; this module recognizes them so the visitor can give analyzers a
//! dedicated override point and still reach pipelines nested in element
//! props (e.g., a button's `onClick` pipeline).

use super::{Expression, ExpressionMap};

/// A borrowed view over an expression object shaped like a document
/// element.
#[derive(Debug)]
pub struct DocumentElementView<'a> {
    /// The element type (e.g., `button`, `block`, `pipeline`).
    pub element_type: &'a str,
    /// The element's own configuration, if present.
    pub config: Option<&'a ExpressionMap>,
    /// Child elements, if present.
    pub children: Option<&'a [Expression]>,
}

impl<'a> DocumentElementView<'a> {
    /// Tries to view an expression as a document element.
    ///
    /// An element is an untagged object with a literal string `type` key
    /// and at least one of `config` / `children`.
    #[must_use]
    pub fn detect(expression: &'a Expression) -> Option<Self> {
        let Expression::Object(map) = expression else {
            return None;
        };

        let element_type = match map.get("type") {
            Some(Expression::Literal(value)) => value.as_str()?,
            _ => return None,
        };

        let config = match map.get("config") {
            Some(Expression::Object(config)) => Some(config),
            _ => None,
        };
        let children = match map.get("children") {
            Some(Expression::Array(children)) => Some(children.as_slice()),
            _ => None,
        };

        if config.is_none() && children.is_none() {
            return None;
        }

        Some(DocumentElementView {
            element_type,
            config,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detects_element_with_children() {
        let expr = Expression::from_value(json!({
            "type": "container",
            "children": [
                {"type": "text", "config": {"text": "hello"}},
            ],
        }))
        .unwrap();

        let element = DocumentElementView::detect(&expr).unwrap();
        assert_eq!(element.element_type, "container");
        assert_eq!(element.children.unwrap().len(), 1);
    }

    #[test]
    fn test_plain_object_is_not_an_element() {
        let expr = Expression::from_value(json!({"type": "GET", "url": "x"})).unwrap();
        assert!(DocumentElementView::detect(&expr).is_none());
    }

    #[test]
    fn test_tagged_expression_is_not_an_element() {
        let expr = Expression::from_value(json!({"__type__": "var", "__value__": "@a"})).unwrap();
        assert!(DocumentElementView::detect(&expr).is_none());
    }
}
