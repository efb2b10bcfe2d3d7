use super::{TransformMetadata, Visitor};
use crate::ast::{Chunk, ChunkKind, ExprKind};

/// Collects the names of templates a template includes or wraps itself in
pub struct DependencyPlugin;

impl Visitor for DependencyPlugin {
    fn enter(&mut self, chunk: &Chunk, metadata: &mut TransformMetadata) -> bool {
        let (name, layout) = match &chunk.kind {
            ChunkKind::Include { name, .. } => (name, false),
            ChunkKind::Layout(name) => (name, true),
            _ => return true,
        };
        match &name.kind {
            ExprKind::String(name) => {
                let names = if layout { &mut metadata.layouts } else { &mut metadata.includes };
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            _ => metadata.dynamic_references += 1,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_template;
    use crate::transform::Transformer;

    #[test]
    fn test_collects_static_names() {
        let template = parse_template(
            "{{layout \"base\"}}{{tmpl \"row\"}}{{each xs}}{{tmpl(x) \"row\"}}{{tmpl name}}{{/each}}{{if a}}{{tmpl 'base'}}{{/if}}",
        )
        .unwrap();
        let mut transformer = Transformer::new().add(DependencyPlugin);
        let metadata = transformer.transform(&template);
        assert_eq!(metadata.includes, vec!["row", "base"]);
        assert_eq!(metadata.layouts, vec!["base"]);
        assert_eq!(metadata.dynamic_references, 1);
        assert_eq!(metadata.dependencies(), vec!["row", "base"]);
    }
}
