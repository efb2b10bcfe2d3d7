use super::grammar::Grammar;
use super::tokenizer::{Span, TemplatePunc, TokenKind};
use crate::ast::*;
use crate::error::{ErrorKind, ParseError};

type Result<T> = std::result::Result<T, ParseError>;

/// Builds the chunk tree of a template on top of the expression grammar
impl Grammar {
    pub fn template(&mut self) -> Result<Template> {
        let mut chunks = Vec::new();
        while !self.token.is_eof() {
            chunks.push(self.chunk()?);
        }
        Ok(Template { chunks })
    }

    fn chunk(&mut self) -> Result<Chunk> {
        let start = self.token.span.start;
        let kind = match self.token.kind.clone() {
            TokenKind::Html(text) => {
                self.next()?;
                ChunkKind::Html(text)
            }
            TokenKind::Template(TemplatePunc::VarOpen) => {
                self.next()?;
                let expr = self.expression(true, false)?;
                self.expect_template(TemplatePunc::VarClose)?;
                ChunkKind::Echo(expr)
            }
            TokenKind::Template(TemplatePunc::CommandOpen) => {
                let open = self.next()?.span;
                return self.command(open);
            }
            _ => return Err(self.unexpected()),
        };
        Ok(Chunk { kind, span: self.span_from(start) })
    }

    /// Dispatch on the command name following `{{`
    fn command(&mut self, open: Span) -> Result<Chunk> {
        let name = match &self.token.kind {
            TokenKind::Name(name) => name.clone(),
            TokenKind::Keyword(keyword) => keyword.to_string(),
            _ => return Err(self.unexpected()),
        };
        let kind = match name.as_str() {
            "each" => self.each(open)?,
            "if" => self.if_block(open)?,
            "tmpl" => self.include()?,
            "html" => ChunkKind::RawHtml(self.command_expression()?),
            "layout" => ChunkKind::Layout(self.command_expression()?),
            "var" => {
                self.next()?;
                let defs = self.vardefs(false)?;
                self.expect_template(TemplatePunc::CommandClose)?;
                ChunkKind::Var(defs)
            }
            _ => return Err(self.unexpected()),
        };
        Ok(Chunk { kind, span: self.span_from(open.start) })
    }

    /// `{{name expr}}`
    fn command_expression(&mut self) -> Result<Expr> {
        self.next()?;
        let expr = self.expression(true, false)?;
        self.expect_template(TemplatePunc::CommandClose)?;
        Ok(expr)
    }

    fn include(&mut self) -> Result<ChunkKind> {
        self.next()?;
        let args = if self.token.is_punc('(') {
            self.next()?;
            Some(self.expr_list(')', false, false)?)
        } else {
            None
        };
        let name = self.expression(true, false)?;
        self.expect_template(TemplatePunc::CommandClose)?;
        Ok(ChunkKind::Include { args, name })
    }

    fn each(&mut self, open: Span) -> Result<ChunkKind> {
        self.next()?;
        let mut bindings = None;
        let collection = if self.token.is_punc('(') {
            let list_start = self.token.span;
            self.next()?;
            let mut list = self.expr_list(')', false, false)?;
            if self.token.is_template(TemplatePunc::CommandClose) {
                // `{{each(items)}}`: the list is the collection itself
                if list.len() != 1 {
                    return Err(ParseError::new(
                        ErrorKind::InvalidSyntax,
                        "collection value expected",
                        list_start.to(self.token.span),
                    ));
                }
                list.remove(0)
            } else {
                let names = list
                    .into_iter()
                    .map(|arg| match arg.kind {
                        ExprKind::Name(name) => Ok(name),
                        _ => Err(ParseError::new(
                            ErrorKind::InvalidSyntax,
                            "{{each}} arguments must be names",
                            arg.span.unwrap_or(list_start),
                        )),
                    })
                    .collect::<Result<Vec<_>>>()?;
                if !names.is_empty() {
                    bindings = Some(names);
                }
                self.expression(true, false)?
            }
        } else {
            self.expression(true, false)?
        };
        self.expect_template(TemplatePunc::CommandClose)?;
        let body = self.block_body("each", open, false)?;
        self.close_tag("each", open)?;
        Ok(ChunkKind::Each { bindings, collection, body })
    }

    fn if_block(&mut self, open: Span) -> Result<ChunkKind> {
        self.next()?;
        let condition = self.expression(true, false)?;
        self.expect_template(TemplatePunc::CommandClose)?;
        let then_branch = self.block_body("if", open, true)?;
        let mut elif_branches = Vec::new();
        let mut else_branch: Option<Vec<Chunk>> = None;

        // block_body stops at `{{/` or at `{{else`
        while self.token.is_template(TemplatePunc::CommandOpen) {
            self.next()?;
            let else_span = self.next()?.span;
            if self.token.is_template(TemplatePunc::CommandClose) {
                if else_branch.is_some() {
                    return Err(ParseError::new(
                        ErrorKind::DuplicateElse,
                        "too many default {{else}} blocks",
                        else_span,
                    ));
                }
                self.next()?;
                else_branch = Some(self.block_body("if", open, true)?);
            } else {
                if else_branch.is_some() {
                    return Err(ParseError::new(
                        ErrorKind::ElseAfterDefault,
                        "can't have {{else (...)}} with condition after default {{else}}",
                        else_span,
                    ));
                }
                let condition = self.expression(true, false)?;
                self.expect_template(TemplatePunc::CommandClose)?;
                let body = self.block_body("if", open, true)?;
                elif_branches.push((condition, body));
            }
        }
        self.close_tag("if", open)?;
        Ok(ChunkKind::If { condition, then_branch, elif_branches, else_branch })
    }

    /// Chunks up to the closer of the block opened at `open`
    fn block_body(&mut self, name: &str, open: Span, allow_else: bool) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        loop {
            if self.token.is_eof() {
                return Err(ParseError::new(
                    ErrorKind::UnclosedBlock,
                    format!("This {{{{{}}}}} block is never closed.", name),
                    self.token.span,
                )
                .with_related(open)
                .with_help(format!("Close with {{{{/{}}}}}", name)));
            }
            if self.token.is_template(TemplatePunc::CloseOpen) {
                return Ok(chunks);
            }
            if allow_else
                && self.token.is_template(TemplatePunc::CommandOpen)
                && self.peek()?.is_keyword("else")
            {
                return Ok(chunks);
            }
            chunks.push(self.chunk()?);
        }
    }

    fn close_tag(&mut self, name: &str, open: Span) -> Result<()> {
        self.expect_template(TemplatePunc::CloseOpen)?;
        let matches = match &self.token.kind {
            TokenKind::Name(closer) => closer == name,
            TokenKind::Keyword(closer) => *closer == name,
            _ => false,
        };
        if !matches {
            return Err(ParseError::new(
                ErrorKind::MismatchedCloseTag,
                format!("Unmatched template tags. expected closing {{{{/{}}}}} here", name),
                self.token.span,
            )
            .with_related(open)
            .with_related_label("opened here"));
        }
        self.next()?;
        self.expect_template(TemplatePunc::CommandClose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParseOptions;

    fn parse(source: &str) -> Result<Template> {
        let options = ParseOptions::default().with_positions(false);
        Grammar::new(source, true, options)?.template()
    }

    fn name(n: &str) -> Expr {
        Expr::new(ExprKind::Name(n.into()), None)
    }

    fn html(text: &str) -> Chunk {
        Chunk { kind: ChunkKind::Html(text.into()), span: None }
    }

    #[test]
    fn test_text_and_echo() {
        let template = parse("Hello ${user.name}!").unwrap();
        assert_eq!(template.chunks.len(), 3);
        assert_eq!(template.chunks[0], html("Hello "));
        assert!(matches!(template.chunks[1].kind, ChunkKind::Echo(Expr { kind: ExprKind::Dot(..), .. })));
        assert_eq!(template.chunks[2], html("!"));
    }

    #[test]
    fn test_object_literal_inside_echo() {
        let template = parse("${ {a: {b: 1}}.a }").unwrap();
        let ChunkKind::Echo(ref expr) = template.chunks[0].kind else {
            panic!("expected echo");
        };
        assert!(matches!(expr.kind, ExprKind::Dot(_, ref p) if p == "a"));
    }

    #[test]
    fn test_each_forms() {
        let template = parse("{{each items}}x{{/each}}{{each(items)}}y{{/each}}{{each(i, v) items}}z{{/each}}").unwrap();
        let bindings: Vec<Option<Vec<String>>> = template
            .chunks
            .iter()
            .map(|c| match &c.kind {
                ChunkKind::Each { bindings, collection, body } => {
                    assert_eq!(*collection, name("items"));
                    assert_eq!(body.len(), 1);
                    bindings.clone()
                }
                other => panic!("unexpected chunk {:?}", other),
            })
            .collect();
        assert_eq!(bindings, vec![None, None, Some(vec!["i".to_string(), "v".to_string()])]);
    }

    #[test]
    fn test_each_argument_errors() {
        let err = parse("{{each(1, v) items}}{{/each}}").unwrap_err();
        assert_eq!(err.message, "{{each}} arguments must be names");
        let err = parse("{{each(a, b)}}{{/each}}").unwrap_err();
        assert_eq!(err.message, "collection value expected");
    }

    #[test]
    fn test_if_chain() {
        let template = parse("{{if a}}1{{else b}}2{{else c}}3{{else}}4{{/if}}").unwrap();
        let ChunkKind::If { ref condition, ref then_branch, ref elif_branches, ref else_branch } = template.chunks[0].kind else {
            panic!("expected if");
        };
        assert_eq!(*condition, name("a"));
        assert_eq!(then_branch, &vec![html("1")]);
        assert_eq!(elif_branches.len(), 2);
        assert_eq!(elif_branches[1].0, name("c"));
        assert_eq!(else_branch, &Some(vec![html("4")]));
    }

    #[test]
    fn test_empty_default_else() {
        let template = parse("{{if a}}x{{else}}{{/if}}").unwrap();
        let ChunkKind::If { ref else_branch, .. } = template.chunks[0].kind else {
            panic!("expected if");
        };
        assert_eq!(else_branch, &Some(Vec::new()));
    }

    #[test]
    fn test_else_errors() {
        let err = parse("{{if a}}{{else}}{{else}}{{/if}}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateElse);
        assert_eq!(err.message, "too many default {{else}} blocks");
        let err = parse("{{if a}}{{else}}{{else b}}{{/if}}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ElseAfterDefault);
        let err = parse("{{each a}}{{else}}{{/each}}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_mismatched_closer() {
        let err = parse("{{each items}}x{{/if}}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MismatchedCloseTag);
        assert_eq!(err.message, "Unmatched template tags. expected closing {{/each}} here");
        assert_eq!((err.line(), err.column()), (1, 19));
        assert_eq!(err.related_span.map(|s| s.start.col), Some(0));
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("{{if a}}\n{{each b}}x").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnclosedBlock);
        assert_eq!(err.message, "This {{each}} block is never closed.");
        assert_eq!(err.help.as_deref(), Some("Close with {{/each}}"));
    }

    #[test]
    fn test_other_commands() {
        let template = parse("{{tmpl(user) \"row\"}}{{tmpl 'plain'}}{{html body}}{{layout \"base\"}}{{var a = 1, b}}").unwrap();
        let kinds: Vec<&str> = template.chunks.iter().map(|c| c.kind.name()).collect();
        assert_eq!(kinds, vec!["tmpl", "tmpl", "tmpl-html", "tmpl-layout", "tmpl-var"]);
        let ChunkKind::Include { ref args, .. } = template.chunks[0].kind else {
            panic!("expected include");
        };
        assert_eq!(args.as_ref().map(Vec::len), Some(1));
        let ChunkKind::Var(ref defs) = template.chunks[4].kind else {
            panic!("expected var");
        };
        assert_eq!(defs[1], VarDef { name: "b".into(), value: None });
    }

    #[test]
    fn test_comments_and_verbatim() {
        let template = parse("a{{! note }}b{{verbatim}}${x}{{/verbatim}}").unwrap();
        assert_eq!(template.chunks, vec![html("a"), html("b"), html("${x}")]);
    }

    #[test]
    fn test_chunk_spans() {
        let template = Grammar::new("ab\n{{if x}}y{{/if}}", true, ParseOptions::default())
            .unwrap()
            .template()
            .unwrap();
        let span = template.chunks[1].span.unwrap();
        assert_eq!((span.start.line, span.start.col), (1, 0));
        assert_eq!((span.end.line, span.end.col), (1, 16));
    }
}
