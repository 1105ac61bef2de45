//! The expression/template evaluator.
//!
//! Renders templated config values against the evaluation context.
//! Rendering is single-pass: a rendered result that happens to look like
//! an expression is never re-evaluated.

mod path;

pub use path::{parse_path, resolve_path, Accessor, PathSegment};

use crate::core::{EvalContext, Expression, ExpressionMap};
use crate::errors::BrickflowError;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

/// Identifier prefix substituted for the `@` sigil before templates are
/// handed to the engine, which does not allow `@` in identifiers.
const AT_ALIAS: &str = "__at__";

/// Reserved words that must not be defaulted as template variables.
const TEMPLATE_KEYWORDS: &[&str] = &[
    "if", "else", "elif", "endif", "for", "endfor", "in", "and", "or", "not", "is", "as", "set",
    "endset", "with", "true", "false", "True", "False", "loop", "block", "endblock", "macro",
    "endmacro", "filter", "endfilter", "include", "import",
];

/// Evaluates expressions and template strings against a context.
pub struct Renderer {
    passthrough: Regex,
    at_ident: Regex,
    expr_block: Regex,
    dotted_ident: Regex,
}

impl Renderer {
    /// Creates a renderer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            // Exactly one substitution with no surrounding text. Pipes
            // (filters) disqualify, forcing the string path.
            passthrough: Regex::new(r"^\{\{\{?\s*([^{}|]+?)\s*\}?\}\}$")
                .unwrap_or_else(|_| unreachable!()),
            at_ident: Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)").unwrap_or_else(|_| unreachable!()),
            expr_block: Regex::new(r"\{\{([\s\S]*?)\}\}|\{%([\s\S]*?)%\}")
                .unwrap_or_else(|_| unreachable!()),
            dotted_ident: Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*")
                .unwrap_or_else(|_| unreachable!()),
        }
    }

    /// Renders one expression against the context.
    ///
    /// Untagged values are returned unchanged; containers are rendered
    /// leaf-wise; embedded pipelines render to their wire form and are
    /// executed (not rendered) by whoever receives them.
    pub fn render(
        &self,
        expression: &Expression,
        context: &EvalContext,
    ) -> Result<Value, BrickflowError> {
        match expression {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Var(path) => resolve_path(context.entries(), path),
            Expression::Nunjucks(text) | Expression::Mustache(text) => {
                self.render_template(text, context)
            }
            Expression::Pipeline(_) => Ok(expression.to_value()),
            Expression::Array(items) => {
                let rendered = items
                    .iter()
                    .map(|item| self.render(item, context))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(rendered))
            }
            Expression::Object(map) => {
                let mut rendered = Map::new();
                for (key, value) in map.iter() {
                    rendered.insert(key.clone(), self.render(value, context)?);
                }
                Ok(Value::Object(rendered))
            }
        }
    }

    /// Renders a config map deeply, keeping document order.
    pub fn render_config(
        &self,
        config: &ExpressionMap,
        context: &EvalContext,
    ) -> Result<Map<String, Value>, BrickflowError> {
        let mut rendered = Map::new();
        for (key, value) in config.iter() {
            rendered.insert(key.clone(), self.render(value, context)?);
        }
        Ok(rendered)
    }

    fn render_template(
        &self,
        text: &str,
        context: &EvalContext,
    ) -> Result<Value, BrickflowError> {
        // Whole-value passthrough: a template that is exactly one
        // substitution yields the substituted value's native type, so
        // numeric/object outputs can feed typed inputs without
        // stringification.
        if let Some(captures) = self.passthrough.captures(text) {
            let inner = &captures[1];
            let is_path_like = inner
                .chars()
                .next()
                .is_some_and(|c| c == '@' || c == '_' || c.is_ascii_alphabetic());
            if is_path_like && parse_path(inner).is_ok() {
                // Unknown references render as empty even when an
                // intermediate is missing; strict access semantics
                // belong to `var` expressions, not templates.
                return match resolve_path(context.entries(), inner) {
                    Ok(value) => Ok(value),
                    Err(error) if error.is_business() => Ok(Value::Null),
                    Err(error) => Err(error),
                };
            }
        }

        let rewritten = self.at_ident.replace_all(text, format!("{AT_ALIAS}$1"));

        let mut entries = Map::new();
        for (key, value) in context.entries() {
            let key = key
                .strip_prefix('@')
                .map_or_else(|| key.clone(), |rest| format!("{AT_ALIAS}{rest}"));
            entries.insert(key, value.clone());
        }
        self.default_unknown_references(&rewritten, &mut entries);

        let tera_context = tera::Context::from_serialize(Value::Object(entries))
            .map_err(|e| BrickflowError::Template(e.to_string()))?;
        let output = tera::Tera::one_off(&rewritten, &tera_context, false)
            .map_err(|e| BrickflowError::Template(template_error_message(&e)))?;

        trace!(template = %text, "rendered template");
        Ok(Value::String(output))
    }

    /// Defaults unknown variable references to empty strings so a
    /// partially-configured template still renders in preview mode.
    fn default_unknown_references(&self, template: &str, entries: &mut Map<String, Value>) {
        for block in self.expr_block.captures_iter(template) {
            let Some(inner) = block.get(1).or_else(|| block.get(2)) else {
                continue;
            };
            let inner_text = inner.as_str();
            for ident in self.dotted_ident.find_iter(inner_text) {
                // Skip property accesses and call expressions.
                let preceded_by_dot = inner_text[..ident.start()].ends_with('.');
                let followed_by_paren = inner_text[ident.end()..].trim_start().starts_with('(');
                if preceded_by_dot || followed_by_paren {
                    continue;
                }

                let mut segments = ident.as_str().split('.');
                let Some(root) = segments.next() else {
                    continue;
                };
                if TEMPLATE_KEYWORDS.contains(&root) {
                    continue;
                }

                ensure_defined(entries, root, segments);
            }
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Makes sure a dotted reference resolves to *something*: missing
/// non-terminal hops become empty objects, a missing leaf becomes an
/// empty string. Existing values and non-object intermediates are left
/// alone.
fn ensure_defined<'a>(
    entries: &mut Map<String, Value>,
    root: &str,
    rest: impl Iterator<Item = &'a str>,
) {
    let mut rest = rest.peekable();

    let mut current = if rest.peek().is_some() {
        entries
            .entry(root.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
    } else {
        entries
            .entry(root.to_string())
            .or_insert(Value::String(String::new()));
        return;
    };

    while let Some(segment) = rest.next() {
        let Some(map) = current.as_object_mut() else {
            return;
        };
        current = if rest.peek().is_some() {
            map.entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()))
        } else {
            map.entry(segment.to_string())
                .or_insert(Value::String(String::new()))
        };
    }
}

fn template_error_message(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
