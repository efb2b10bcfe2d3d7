use crate::parser::Span;

/// A construct that templates reject when evaluated
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub message: String,
    pub span: Option<Span>,
}

/// Metadata collected by analysis plugins
#[derive(Debug, Clone, Default)]
pub struct TransformMetadata {
    /// Statically named `{{tmpl}}` targets, first use first
    pub includes: Vec<String>,
    /// Statically named `{{layout}}` targets
    pub layouts: Vec<String>,
    /// `{{tmpl}}`/`{{layout}}` whose name is only known at render time
    pub dynamic_references: usize,
    pub violations: Vec<Violation>,
}

impl TransformMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statically known template name, includes first, without duplicates
    pub fn dependencies(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.includes.iter().chain(&self.layouts) {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }
}
