use crate::parser::tokenizer::{Position, Span};
use std::fmt;

/// Boxed error returned by collaborators (loaders, `get` lookups, functions, streams).
pub type BoxError = Box<dyn std::error::Error>;

/// Broad error category, independent of the precise failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Lexical,
    Syntax,
    NameResolution,
    Type,
    ProtocolViolation,
    Load,
    External,
}

/// Kind of error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // Lexical
    InvalidNumber,
    UnterminatedString,
    UnterminatedComment,
    UnterminatedRegex,
    UnterminatedVerbatim,
    UnexpectedCharacter,
    UnexpectedEof,
    // Syntax
    UnexpectedToken,
    UnclosedBlock,
    MismatchedCloseTag,
    DuplicateElse,
    ElseAfterDefault,
    InvalidAssignment,
    InvalidSyntax,
    // Runtime
    UnresolvedName,
    NotAnObject,
    NotCallable,
    NotIterable,
    InvalidTemplateName,
    DisallowedExpression,
    ProtocolViolation,
    TemplateLoad,
    Collaborator,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidNumber => "Invalid number",
            ErrorKind::UnterminatedString => "Unterminated string",
            ErrorKind::UnterminatedComment => "Unterminated comment",
            ErrorKind::UnterminatedRegex => "Unterminated regular expression",
            ErrorKind::UnterminatedVerbatim => "Unterminated verbatim block",
            ErrorKind::UnexpectedCharacter => "Unexpected character",
            ErrorKind::UnexpectedEof => "Unexpected end of input",
            ErrorKind::UnexpectedToken => "Unexpected token",
            ErrorKind::UnclosedBlock => "Unclosed block",
            ErrorKind::MismatchedCloseTag => "Mismatched close tag",
            ErrorKind::DuplicateElse => "Duplicate default else",
            ErrorKind::ElseAfterDefault => "Else after default else",
            ErrorKind::InvalidAssignment => "Invalid assignment",
            ErrorKind::InvalidSyntax => "Invalid syntax",
            ErrorKind::UnresolvedName => "Unresolved name",
            ErrorKind::NotAnObject => "Not an object",
            ErrorKind::NotCallable => "Not callable",
            ErrorKind::NotIterable => "Not iterable",
            ErrorKind::InvalidTemplateName => "Invalid template name",
            ErrorKind::DisallowedExpression => "Disallowed expression",
            ErrorKind::ProtocolViolation => "Protocol violation",
            ErrorKind::TemplateLoad => "Template load failure",
            ErrorKind::Collaborator => "Collaborator failure",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            ErrorKind::InvalidNumber
            | ErrorKind::UnterminatedString
            | ErrorKind::UnterminatedComment
            | ErrorKind::UnterminatedRegex
            | ErrorKind::UnterminatedVerbatim
            | ErrorKind::UnexpectedCharacter
            | ErrorKind::UnexpectedEof => Category::Lexical,
            ErrorKind::UnexpectedToken
            | ErrorKind::UnclosedBlock
            | ErrorKind::MismatchedCloseTag
            | ErrorKind::DuplicateElse
            | ErrorKind::ElseAfterDefault
            | ErrorKind::InvalidAssignment
            | ErrorKind::InvalidSyntax => Category::Syntax,
            ErrorKind::UnresolvedName => Category::NameResolution,
            ErrorKind::NotAnObject
            | ErrorKind::NotCallable
            | ErrorKind::NotIterable
            | ErrorKind::InvalidTemplateName
            | ErrorKind::DisallowedExpression => Category::Type,
            ErrorKind::ProtocolViolation => Category::ProtocolViolation,
            ErrorKind::TemplateLoad => Category::Load,
            ErrorKind::Collaborator => Category::External,
        }
    }
}

/// Error during tokenizing or parsing
#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
    pub related_span: Option<Span>,
    pub related_label: Option<String>,
    pub help: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            related_span: None,
            related_label: None,
            help: None,
        }
    }

    /// Create an error at a single position
    pub fn at(kind: ErrorKind, message: impl Into<String>, position: Position) -> Self {
        Self::new(kind, message, Span { start: position, end: position })
    }

    /// Add a related span (e.g., the opening tag of an unclosed block)
    pub fn with_related(mut self, span: Span) -> Self {
        self.related_span = Some(span);
        self
    }

    /// Set the label for the related span
    pub fn with_related_label(mut self, label: impl Into<String>) -> Self {
        self.related_label = Some(label.into());
        self
    }

    /// Add help text
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// 1-based line of the error
    pub fn line(&self) -> usize {
        self.span.start.line + 1
    }

    /// 1-based column of the error
    pub fn column(&self) -> usize {
        self.span.start.col + 1
    }

    /// 1-based absolute offset of the error
    pub fn offset(&self) -> usize {
        self.span.start.byte + 1
    }

    /// Render the error with source context
    pub fn render(&self, source: &str, filename: &str) -> String {
        self.render_inner(source, filename, false)
    }

    /// Render the error with ANSI color codes
    pub fn render_color(&self, source: &str, filename: &str) -> String {
        self.render_inner(source, filename, true)
    }

    fn render_inner(&self, source: &str, filename: &str, color: bool) -> String {
        let red = if color { "\x1b[1;31m" } else { "" };
        let dim = if color { "\x1b[2m" } else { "" };
        let cyan = if color { "\x1b[1;38;5;73m" } else { "" };
        let reset = if color { "\x1b[0m" } else { "" };

        let mut output = String::new();
        output.push('\n');

        output.push_str(&format!(" {}file:{} {}:{}:{}\n", dim, reset, filename, self.line(), self.column()));

        let message = if color { highlight_inline_tags(&self.message) } else { self.message.clone() };
        output.push_str(&format!("{}error:{} {}\n", red, reset, message));

        // Related span first when it precedes the error, so the snippet reads top to bottom
        let related_first = self
            .related_span
            .is_some_and(|related| related.start.line < self.span.start.line);
        if related_first {
            self.push_related(&mut output, source, dim, reset);
        }

        let err_line = self.span.start.line + 1;
        if let Some(source_line) = source.lines().nth(self.span.start.line) {
            let width = format!("{}", err_line).len().max(2);
            output.push_str(&format!("{}{:>width$} |{}\n", dim, "", reset, width = width));
            output.push_str(&format!("{}{:>width$} |{} {}\n", dim, err_line, reset, source_line, width = width));
            let (spaces, carets) = underline(&self.span, source_line);
            output.push_str(&format!(
                "{}{:>width$} |{} {}{}{}{}\n",
                dim, "", reset, spaces, red, carets, reset,
                width = width
            ));
        }

        if !related_first {
            self.push_related(&mut output, source, dim, reset);
        }

        if let Some(ref help) = self.help {
            output.push('\n');
            for (i, help_line) in help.lines().enumerate() {
                let content = if color { highlight_inline_tags(help_line) } else { help_line.to_string() };
                if i == 0 {
                    output.push_str(&format!(" {}help:{} {}\n", cyan, reset, content));
                } else {
                    output.push_str(&format!("       {}\n", content));
                }
            }
        }

        output.push('\n');
        output
    }

    fn push_related(&self, output: &mut String, source: &str, dim: &str, reset: &str) {
        let Some(related) = self.related_span else {
            return;
        };
        let related_line = related.start.line + 1;
        if let Some(source_line) = source.lines().nth(related.start.line) {
            let width = format!("{}", related_line).len().max(2);
            output.push_str(&format!("{}{:>width$} |{} {}\n", dim, related_line, reset, source_line, width = width));
            let (spaces, carets) = underline(&related, source_line);
            let label = self.related_label.as_deref().unwrap_or("opened here");
            output.push_str(&format!(
                "{}{:>width$} |{} {}{}{} {}{}\n",
                dim, "", reset, spaces, dim, carets, label, reset,
                width = width
            ));
        }
    }
}

fn underline(span: &Span, source_line: &str) -> (String, String) {
    let start = span.start.col;
    let len = if span.end.line == span.start.line {
        span.end.col.saturating_sub(span.start.col).max(1)
    } else {
        source_line.chars().count().saturating_sub(start).max(1)
    };
    (" ".repeat(start), "^".repeat(len))
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}, column {})", self.message, self.line(), self.column())
    }
}

impl std::error::Error for ParseError {}

/// One line of a synthesized template stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub template: String,
    pub path: String,
    /// 1-based (line, column), when known
    pub position: Option<(usize, usize)>,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some((line, col)) => write!(f, "    at {} ({}:{}:{})", self.template, self.path, line, col),
            None => write!(f, "    at {} ({}:?:?)", self.template, self.path),
        }
    }
}

/// Error raised while rendering a template
#[derive(Debug)]
pub struct RenderError {
    pub kind: ErrorKind,
    pub message: String,
    /// Position of the failing construct in the innermost template
    pub span: Option<Span>,
    /// Template frames, innermost first
    pub stack: Vec<StackFrame>,
    /// Rust call site that started the render
    pub invocation: Option<String>,
    source: Option<BoxError>,
}

impl RenderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            stack: Vec::new(),
            invocation: None,
            source: None,
        }
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.stack = stack;
        self
    }

    pub fn with_invocation(mut self, invocation: impl Into<String>) -> Self {
        self.invocation = Some(invocation.into());
        self
    }

    pub fn with_source(mut self, source: BoxError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    /// Message, template frames and the invocation site, one per line
    pub fn stack_trace(&self) -> String {
        let mut out = self.to_string();
        if let Some(ref invocation) = self.invocation {
            out.push_str("\n    at ");
            out.push_str(invocation);
        }
        out
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for frame in &self.stack {
            write!(f, "\n{}", frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref()
    }
}

/// Highlight `{{tag}}` and `${...}` fragments in a message
fn highlight_inline_tags(text: &str) -> String {
    const TAG: &str = "\x1b[38;5;180m";
    const RESET: &str = "\x1b[0m";

    let mut result = String::with_capacity(text.len() * 2);
    let mut rest = text;
    while let Some(start) = [rest.find("{{"), rest.find("${")].into_iter().flatten().min() {
        let opener = if rest[start..].starts_with("{{") { "}}" } else { "}" };
        let Some(len) = rest[start..].find(opener) else {
            break;
        };
        let end = start + len + opener.len();
        result.push_str(&rest[..start]);
        result.push_str(TAG);
        result.push_str(&rest[start..end]);
        result.push_str(RESET);
        rest = &rest[end..];
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(line: usize, col: usize, len: usize) -> Span {
        Span {
            start: Position { byte: 0, line, col },
            end: Position { byte: 0, line, col: col + len },
        }
    }

    #[test]
    fn test_render_points_at_error() {
        let source = "{{each items}}\n  x\n{{/if}}";
        let err = ParseError::new(
            ErrorKind::MismatchedCloseTag,
            "Unmatched template tags. expected closing {{/each}} here",
            span(2, 3, 2),
        )
        .with_related(span(0, 0, 14));

        let rendered = err.render(source, "index.tmpl");
        assert!(rendered.contains(" file: index.tmpl:3:4"));
        assert!(rendered.contains("error: Unmatched template tags."));
        assert!(rendered.contains(" 3 | {{/if}}"));
        assert!(rendered.contains("|    ^^\n"), "caret underline missing:\n{}", rendered);
        assert!(rendered.contains("opened here"));
        // The opener line comes before the closer line
        let opener = rendered.find(" 1 | {{each items}}").unwrap();
        let closer = rendered.find(" 3 | {{/if}}").unwrap();
        assert!(opener < closer);
    }

    #[test]
    fn test_positions_are_one_based() {
        let err = ParseError::at(
            ErrorKind::InvalidNumber,
            "Invalid syntax: 12abc",
            Position { byte: 7, line: 1, col: 2 },
        );
        assert_eq!((err.line(), err.column(), err.offset()), (2, 3, 8));
        assert_eq!(err.kind.category(), Category::Lexical);
        assert_eq!(err.to_string(), "Invalid syntax: 12abc (line 2, column 3)");
    }

    #[test]
    fn test_render_error_display() {
        let err = RenderError::new(ErrorKind::UnresolvedName, "cannot resolve name 'x'")
            .with_stack(vec![
                StackFrame { template: "part".into(), path: "views/part".into(), position: Some((1, 3)) },
                StackFrame { template: "index".into(), path: "views/index".into(), position: None },
            ])
            .with_invocation("src/main.rs:10:5");
        assert_eq!(
            err.to_string(),
            "cannot resolve name 'x'\n    at part (views/part:1:3)\n    at index (views/index:?:?)"
        );
        assert!(err.stack_trace().ends_with("\n    at src/main.rs:10:5"));
        assert_eq!(err.category(), Category::NameResolution);
    }

    #[test]
    fn test_highlight_inline_tags() {
        let out = highlight_inline_tags("expected closing {{/each}} here");
        assert!(out.contains("\x1b[38;5;180m{{/each}}\x1b[0m"));

        let out = highlight_inline_tags("${a} then {{if b}}");
        assert_eq!(out, "\x1b[38;5;180m${a}\x1b[0m then \x1b[38;5;180m{{if b}}\x1b[0m");
    }
}
