//! Bacon templates.
//!
//! Text templates with `${expr}` output and `{{each}}`, `{{if}}`, `{{tmpl}}`,
//! `{{html}}`, `{{layout}}` and `{{var}}` commands. Expressions use a
//! restricted C-family scripting grammar. Templates are parsed to an AST and
//! rendered asynchronously against data that may itself be asynchronous.

pub mod ast;
pub mod error;
pub mod generate;
pub mod html;
pub mod loader;
pub mod parser;
pub mod render;
pub mod transform;

pub use ast::{Chunk, ChunkKind, Expr, ExprKind, Program, Template};
pub use error::{BoxError, Category, ErrorKind, ParseError, RenderError, StackFrame};
pub use generate::{GenerateOptions, GenerateResult, Generator, SourceGenerator};
pub use loader::{FsLoader, Loader, MemoryCache, MemoryLoader, TemplateCache};
pub use parser::{ParseOptions, Parser, ScriptParser, TemplateParser, parse_expression, parse_template};
pub use render::{RenderOptions, Renderer, Value};

/// Canonical source text of a template
pub fn format_template(template: &Template) -> String {
    SourceGenerator::new().generate(template, &GenerateOptions::default()).code
}
