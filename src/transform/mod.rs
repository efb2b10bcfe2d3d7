mod dependencies;
mod metadata;
mod operator_audit;

pub use dependencies::DependencyPlugin;
pub use metadata::{TransformMetadata, Violation};
pub use operator_audit::{OperatorAuditPlugin, restriction};

use crate::ast::{Chunk, ChunkKind, Expr, ExprKind, Property, Template};

/// Visitor trait for read-only passes over a template
pub trait Visitor {
    /// Called before visiting nested chunks. Return `false` to skip them.
    fn enter(&mut self, _chunk: &Chunk, _metadata: &mut TransformMetadata) -> bool {
        true
    }

    /// Called after visiting nested chunks.
    fn exit(&mut self, _chunk: &Chunk, _metadata: &mut TransformMetadata) {}
}

/// Transformer that applies a series of plugins to a template
pub struct Transformer {
    plugins: Vec<Box<dyn Visitor>>,
    pub metadata: TransformMetadata,
}

impl Transformer {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            metadata: TransformMetadata::new(),
        }
    }

    pub fn add<V: Visitor + 'static>(mut self, visitor: V) -> Self {
        self.plugins.push(Box::new(visitor));
        self
    }

    pub fn transform(&mut self, template: &Template) -> &TransformMetadata {
        for plugin in &mut self.plugins {
            Self::visit_chunks(&template.chunks, plugin.as_mut(), &mut self.metadata);
        }
        &self.metadata
    }

    fn visit_chunks(chunks: &[Chunk], visitor: &mut dyn Visitor, metadata: &mut TransformMetadata) {
        for chunk in chunks {
            if visitor.enter(chunk, metadata) {
                match &chunk.kind {
                    ChunkKind::Each { body, .. } => {
                        Self::visit_chunks(body, visitor, metadata);
                    }
                    ChunkKind::If { then_branch, elif_branches, else_branch, .. } => {
                        Self::visit_chunks(then_branch, visitor, metadata);
                        for (_, branch) in elif_branches {
                            Self::visit_chunks(branch, visitor, metadata);
                        }
                        if let Some(else_branch) = else_branch {
                            Self::visit_chunks(else_branch, visitor, metadata);
                        }
                    }
                    // Leaf chunks
                    ChunkKind::Html(_)
                    | ChunkKind::Echo(_)
                    | ChunkKind::Include { .. }
                    | ChunkKind::RawHtml(_)
                    | ChunkKind::Layout(_)
                    | ChunkKind::Var(_) => {}
                }
            }
            visitor.exit(chunk, metadata);
        }
    }
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a transformer with the standard plugins
pub fn standard_plugins() -> Transformer {
    Transformer::new().add(DependencyPlugin).add(OperatorAuditPlugin)
}

/// Expressions owned directly by a chunk, in source order
pub fn chunk_expressions(chunk: &Chunk) -> Vec<&Expr> {
    match &chunk.kind {
        ChunkKind::Html(_) => Vec::new(),
        ChunkKind::Echo(expr) | ChunkKind::RawHtml(expr) | ChunkKind::Layout(expr) => vec![expr],
        ChunkKind::Include { args, name } => {
            let mut exprs: Vec<&Expr> = args.iter().flatten().collect();
            exprs.push(name);
            exprs
        }
        ChunkKind::Each { collection, .. } => vec![collection],
        ChunkKind::If { condition, elif_branches, .. } => {
            let mut exprs = vec![condition];
            exprs.extend(elif_branches.iter().map(|(condition, _)| condition));
            exprs
        }
        ChunkKind::Var(defs) => defs.iter().filter_map(|def| def.value.as_ref()).collect(),
    }
}

/// Pre-order walk over an expression and its sub-expressions
pub fn walk_expression<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::Num(_)
        | ExprKind::String(_)
        | ExprKind::Name(_)
        | ExprKind::Atom(_)
        | ExprKind::Regexp { .. }
        | ExprKind::Function(_) => {}
        ExprKind::Array(items) => {
            for item in items {
                walk_expression(item, f);
            }
        }
        ExprKind::Object(properties) => {
            for property in properties {
                if let Property::Init { value, .. } = property {
                    walk_expression(value, f);
                }
            }
        }
        ExprKind::Dot(base, _) => walk_expression(base, f),
        ExprKind::Sub(left, right)
        | ExprKind::Binary(_, left, right)
        | ExprKind::Assign(_, left, right)
        | ExprKind::Seq(left, right) => {
            walk_expression(left, f);
            walk_expression(right, f);
        }
        ExprKind::Call(callee, args) | ExprKind::New(callee, args) => {
            walk_expression(callee, f);
            for arg in args {
                walk_expression(arg, f);
            }
        }
        ExprKind::UnaryPrefix(_, operand) | ExprKind::UnaryPostfix(_, operand) => walk_expression(operand, f),
        ExprKind::Conditional(test, yes, no) => {
            walk_expression(test, f);
            walk_expression(yes, f);
            walk_expression(no, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_template;

    #[derive(Default)]
    struct Counter {
        entered: Vec<&'static str>,
    }

    impl Visitor for Counter {
        fn enter(&mut self, chunk: &Chunk, _metadata: &mut TransformMetadata) -> bool {
            self.entered.push(chunk.kind.name());
            !matches!(chunk.kind, ChunkKind::If { .. })
        }
    }

    #[test]
    fn test_visit_order_and_skipping() {
        let template = parse_template("a{{each xs}}${x}{{/each}}{{if y}}${z}{{/if}}").unwrap();
        let mut counter = Counter::default();
        Transformer::visit_chunks(&template.chunks, &mut counter, &mut TransformMetadata::new());
        assert_eq!(counter.entered, vec!["html", "tmpl-each", "tmpl-echo", "tmpl-if"]);
    }

    #[test]
    fn test_walk_expression_order() {
        let template = parse_template("${f(a, b.c)[d]}").unwrap();
        let mut names = Vec::new();
        for expr in chunk_expressions(&template.chunks[0]) {
            walk_expression(expr, &mut |e| {
                if let ExprKind::Name(name) = &e.kind {
                    names.push(name.clone());
                }
            });
        }
        assert_eq!(names, vec!["f", "a", "b", "d"]);
    }
}
