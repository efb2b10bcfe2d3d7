use crate::parser::Span;
use serde::Serialize;

/// Maps a generated position back to the source position of a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mapping {
    pub gen_line: usize,
    pub gen_col: usize,
    pub src_line: usize,
    pub src_col: usize,
}

/// Output buffer that accumulates generated code with mappings
pub struct Output {
    code: String,
    line: usize,
    col: usize,
    indent: String,
    depth: usize,
    mappings: Vec<Mapping>,
    record_mappings: bool,
}

impl Output {
    pub fn new(indent: &str, record_mappings: bool) -> Self {
        Self {
            code: String::new(),
            line: 0,
            col: 0,
            indent: indent.to_string(),
            depth: 0,
            mappings: Vec::new(),
            record_mappings,
        }
    }

    /// Add text without mapping
    pub fn push(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.col = 0;
            } else {
                self.col += 1;
            }
        }
        self.code.push_str(text);
    }

    /// Record that the next pushed text comes from `span`
    pub fn map(&mut self, span: Option<Span>) {
        if let (true, Some(span)) = (self.record_mappings, span) {
            self.mappings.push(Mapping {
                gen_line: self.line,
                gen_col: self.col,
                src_line: span.start.line,
                src_col: span.start.col,
            });
        }
    }

    /// Add a newline followed by the current indentation
    pub fn newline(&mut self) {
        let indent = self.indent.repeat(self.depth);
        self.push("\n");
        self.push(&indent);
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Finish and return the generated code
    pub fn finish(self) -> (String, Vec<Mapping>) {
        (self.code, self.mappings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Position;

    #[test]
    fn test_mappings_track_columns() {
        let mut output = Output::new("  ", true);
        output.push("ab\ncd");
        let span = Span::point(Position { byte: 7, line: 3, col: 1 });
        output.map(Some(span));
        output.push("x");
        let (code, mappings) = output.finish();
        assert_eq!(code, "ab\ncdx");
        assert_eq!(mappings, vec![Mapping { gen_line: 1, gen_col: 2, src_line: 3, src_col: 1 }]);
    }

    #[test]
    fn test_indentation() {
        let mut output = Output::new("  ", false);
        output.push("{");
        output.indent();
        output.newline();
        output.push("x;");
        output.dedent();
        output.newline();
        output.push("}");
        assert_eq!(output.finish().0, "{\n  x;\n}");
    }
}
