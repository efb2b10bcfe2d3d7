pub mod chars;
mod grammar;
pub mod tokenizer;
mod tree_builder;

pub use tokenizer::{Position, Span, Token, TokenKind, tokenize};
use grammar::Grammar;

use crate::ast::{Expr, Program, Template};
use crate::error::ParseError;

/// Parser configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Attach source spans to chunks and expressions
    pub embed_positions: bool,
    /// Require semicolons and check assignment targets
    pub strict: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { embed_positions: true, strict: false }
    }
}

impl ParseOptions {
    pub fn with_positions(mut self, embed_positions: bool) -> Self {
        self.embed_positions = embed_positions;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Parser trait - converts source code to an AST
pub trait Parser {
    type Output;

    fn parse(&self, source: &str) -> Result<Self::Output, ParseError>;
}

/// Template parser: text with `${...}` and `{{...}}` markers
#[derive(Debug, Clone, Default)]
pub struct TemplateParser {
    options: ParseOptions,
}

impl TemplateParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ParseOptions) -> Self {
        Self { options }
    }
}

impl Parser for TemplateParser {
    type Output = Template;

    fn parse(&self, source: &str) -> Result<Template, ParseError> {
        Grammar::new(source, true, self.options)?.template()
    }
}

/// Parser for plain scripts using the full statement grammar
#[derive(Debug, Clone, Default)]
pub struct ScriptParser {
    options: ParseOptions,
}

impl ScriptParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ParseOptions) -> Self {
        Self { options }
    }
}

impl Parser for ScriptParser {
    type Output = Program;

    fn parse(&self, source: &str) -> Result<Program, ParseError> {
        Grammar::new(source, false, self.options)?.program()
    }
}

/// Parse a template with default options
pub fn parse_template(source: &str) -> Result<Template, ParseError> {
    TemplateParser::new().parse(source)
}

/// Parse a single expression, which must span the whole input
pub fn parse_expression(source: &str, options: ParseOptions) -> Result<Expr, ParseError> {
    let mut grammar = Grammar::new(source, false, options)?;
    let expr = grammar.expression(true, false)?;
    if !grammar.token.is_eof() {
        return Err(grammar.unexpected());
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ChunkKind, ExprKind};
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_template_embeds_positions() {
        let template = parse_template("${a}").unwrap();
        assert!(template.chunks[0].span.is_some());
        let ChunkKind::Echo(ref expr) = template.chunks[0].kind else {
            panic!("expected echo");
        };
        assert_eq!(expr.span.map(|s| s.start.col), Some(2));
    }

    #[test]
    fn test_positions_disabled() {
        let parser = TemplateParser::with_options(ParseOptions::default().with_positions(false));
        let template = parser.parse("x${a}").unwrap();
        assert!(template.chunks.iter().all(|c| c.span.is_none()));
    }

    #[test]
    fn test_parse_expression_requires_eof() {
        let options = ParseOptions::default().with_positions(false);
        assert_eq!(parse_expression("a.b", options).unwrap().kind, ExprKind::Dot(
            Box::new(Expr::new(ExprKind::Name("a".into()), None)),
            "b".into()
        ));
        let err = parse_expression("a b", options).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedToken);
        assert_eq!(err.message, "Unexpected token: name (b)");
    }

    #[test]
    fn test_script_parser() {
        let program = ScriptParser::new().parse("var a = 1; a += 2").unwrap();
        assert_eq!(program.body.len(), 2);
    }
}
