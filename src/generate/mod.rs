mod output;
mod source;

pub use output::{Mapping, Output};
pub use source::SourceGenerator;

use crate::ast::Template;

/// Generator options
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Indentation unit for nested statements
    pub indent: String,
    /// Record a mapping for every chunk that carries a span
    pub include_mappings: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self { indent: "  ".to_string(), include_mappings: false }
    }
}

/// Generation result
#[derive(Debug, Clone)]
pub struct GenerateResult {
    pub code: String,
    pub mappings: Vec<Mapping>,
}

/// Generator trait - converts a template AST to text
pub trait Generator {
    fn generate(&self, template: &Template, options: &GenerateOptions) -> GenerateResult;
}
