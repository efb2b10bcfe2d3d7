use super::chars;
use crate::error::{ErrorKind, ParseError};
use serde::{Deserialize, Serialize};

/// Position in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Byte offset in (normalized) source
    pub byte: usize,
    /// Line number (0-indexed)
    pub line: usize,
    /// Column number (0-indexed, in characters)
    pub col: usize,
}

impl Position {
    pub fn new() -> Self {
        Self { byte: 0, line: 0, col: 0 }
    }
}

/// Span in source code (a range from start position to end position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn point(position: Position) -> Self {
        Span { start: position, end: position }
    }

    /// Span from the start of `self` to the end of `other`
    pub fn to(self, other: Span) -> Span {
        Span { start: self.start, end: other.end }
    }
}

/// Lexical state of the tokenizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Plain expression grammar only
    None,
    /// Template text until a marker
    Html,
    /// Inside `{{ ... }}`
    Command,
    /// Inside `${ ... }`
    Variable,
}

/// Template punctuation markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplatePunc {
    /// `${`
    VarOpen,
    /// `{{`
    CommandOpen,
    /// `{{/`
    CloseOpen,
    /// `}}`
    CommandClose,
    /// `}` closing a `${`
    VarClose,
}

impl TemplatePunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplatePunc::VarOpen => "${",
            TemplatePunc::CommandOpen => "{{",
            TemplatePunc::CloseOpen => "{{/",
            TemplatePunc::CommandClose => "}}",
            TemplatePunc::VarClose => "}",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    /// `// ...`
    Line,
    /// `/* ... */`
    Block,
    /// `{{! ... }}`
    Template,
}

/// Comment attached to the token that follows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub kind: CommentKind,
    pub text: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Num(f64),
    Str(String),
    Regex { pattern: String, flags: String },
    Name(String),
    Keyword(&'static str),
    /// `true`, `false`, `null`, `undefined`
    Atom(&'static str),
    Operator(&'static str),
    Punc(char),
    /// Verbatim template text
    Html(String),
    Template(TemplatePunc),
    Eof,
}

impl TokenKind {
    /// Human readable form used in error messages, e.g. `name (foo)`
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Num(n) => format!("num ({})", n),
            TokenKind::Str(s) => format!("string ({:?})", s),
            TokenKind::Regex { pattern, flags } => format!("regexp (/{}/{})", pattern, flags),
            TokenKind::Name(name) => format!("name ({})", name),
            TokenKind::Keyword(k) => format!("keyword ({})", k),
            TokenKind::Atom(a) => format!("atom ({})", a),
            TokenKind::Operator(op) => format!("operator ({})", op),
            TokenKind::Punc(c) => format!("punc ({})", c),
            TokenKind::Html(_) => "html".to_string(),
            TokenKind::Template(p) => format!("tpunc ({})", p.as_str()),
            TokenKind::Eof => "eof".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line break separates this token from the previous one
    pub newline_before: bool,
    pub comments_before: Vec<Comment>,
}

impl Token {
    pub fn is_punc(&self, ch: char) -> bool {
        self.kind == TokenKind::Punc(ch)
    }

    pub fn is_operator(&self, op: &str) -> bool {
        matches!(self.kind, TokenKind::Operator(o) if o == op)
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.kind, TokenKind::Keyword(k) if k == keyword)
    }

    pub fn is_name(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Name(n) if n == name)
    }

    pub fn is_template(&self, punc: TemplatePunc) -> bool {
        self.kind == TokenKind::Template(punc)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

/// Snapshot of everything the tokenizer mutates; restoring it replays input
#[derive(Debug, Clone)]
pub struct LexState {
    pos: Position,
    tok_start: Position,
    newline_before: bool,
    regex_allowed: bool,
    curly: usize,
    mode: Mode,
    comments: Vec<Comment>,
}

/// Pull-based lexer producing one token per call
pub struct Tokenizer {
    text: String,
    state: LexState,
}

/// Replace line terminators with `\n` and drop a leading byte order mark
pub fn normalize(source: &str) -> String {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            '\u{2028}' | '\u{2029}' => out.push('\n'),
            _ => out.push(ch),
        }
    }
    out
}

impl Tokenizer {
    pub fn new(source: &str, template: bool) -> Self {
        Self {
            text: normalize(source),
            state: LexState {
                pos: Position::new(),
                tok_start: Position::new(),
                newline_before: false,
                regex_allowed: !template,
                curly: 0,
                mode: if template { Mode::Html } else { Mode::None },
                comments: Vec::new(),
            },
        }
    }

    /// The normalized source being tokenized
    pub fn source(&self) -> &str {
        &self.text
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn save(&self) -> LexState {
        self.state.clone()
    }

    pub fn restore(&mut self, state: LexState) {
        self.state = state;
    }

    /// Produce the next token
    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        if self.state.mode != Mode::Html {
            self.skip_whitespace();
        }
        self.start_token();
        let Some(ch) = self.peek_char() else {
            return Ok(self.token(TokenKind::Eof));
        };
        if self.state.mode == Mode::Html {
            return self.read_template();
        }
        if matches!(self.state.mode, Mode::Command | Mode::Variable) {
            if ch == '{' {
                self.state.curly += 1;
            } else if ch == '}' {
                if self.state.curly == 0 {
                    return self.close_block();
                }
                self.state.curly -= 1;
            }
        }
        match ch {
            '"' | '\'' => self.read_string(),
            '.' => self.handle_dot(),
            '/' => self.handle_slash(),
            '\\' => self.read_word(),
            _ if chars::is_digit(ch) => self.read_num(""),
            _ if chars::is_operator_char(ch) => self.read_operator(""),
            _ if chars::is_punctuation(ch) => {
                self.next_char(false);
                Ok(self.token(TokenKind::Punc(ch)))
            }
            _ if chars::is_identifier_start(ch) => self.read_word(),
            _ => Err(self.error(ErrorKind::UnexpectedCharacter, format!("Unexpected character '{}'", ch))),
        }
    }

    /// Re-read the current token as a regular expression whose body starts with `prefix`
    pub fn force_regex(&mut self, prefix: &str) -> Result<Token, ParseError> {
        self.read_regexp(prefix)
    }

    fn rest(&self) -> &str {
        &self.text[self.state.pos.byte..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn next_char(&mut self, in_string: bool) -> Option<char> {
        let ch = self.peek_char()?;
        self.state.pos.byte += ch.len_utf8();
        if ch == '\n' {
            self.state.newline_before = self.state.newline_before || !in_string;
            self.state.pos.line += 1;
            self.state.pos.col = 0;
        } else {
            self.state.pos.col += 1;
        }
        Some(ch)
    }

    fn next_or_eof(&mut self, kind: ErrorKind, message: &str) -> Result<char, ParseError> {
        match self.next_char(true) {
            Some(ch) => Ok(ch),
            None => Err(self.error(kind, message)),
        }
    }

    /// Advance `len` bytes, keeping line and column current
    fn advance_bytes(&mut self, len: usize) {
        let target = self.state.pos.byte + len;
        while self.state.pos.byte < target && self.next_char(false).is_some() {}
    }

    fn start_token(&mut self) {
        self.state.tok_start = self.state.pos;
    }

    fn token(&mut self, kind: TokenKind) -> Token {
        self.state.regex_allowed = match &kind {
            TokenKind::Operator(op) => !matches!(*op, "++" | "--"),
            TokenKind::Keyword(k) => chars::KEYWORDS_BEFORE_EXPRESSION.contains(k),
            TokenKind::Punc(c) => "[{(,.;:".contains(*c),
            _ => false,
        };
        let token = Token {
            kind,
            span: Span { start: self.state.tok_start, end: self.state.pos },
            newline_before: self.state.newline_before,
            comments_before: std::mem::take(&mut self.state.comments),
        };
        self.state.newline_before = false;
        token
    }

    fn error(&self, kind: ErrorKind, message: impl Into<String>) -> ParseError {
        ParseError::new(kind, message, Span { start: self.state.tok_start, end: self.state.pos })
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(chars::is_whitespace) {
            self.next_char(false);
        }
    }

    fn close_block(&mut self) -> Result<Token, ParseError> {
        self.next_char(false);
        if self.state.mode == Mode::Command {
            if self.peek_char() != Some('}') {
                return Err(self.error(ErrorKind::UnexpectedCharacter, "Expected closing '}}'"));
            }
            self.next_char(false);
            self.state.mode = Mode::Html;
            return Ok(self.token(TokenKind::Template(TemplatePunc::CommandClose)));
        }
        self.state.mode = Mode::Html;
        Ok(self.token(TokenKind::Template(TemplatePunc::VarClose)))
    }

    // =========================================================================
    // Template text
    // =========================================================================

    fn read_template(&mut self) -> Result<Token, ParseError> {
        let mut text = String::new();
        while !self.rest().is_empty() {
            if chars::marker_at(self.rest()) {
                if text.is_empty() {
                    return self.read_template_punc();
                }
                break;
            }
            if let Some(ch) = self.next_char(false) {
                text.push(ch);
            }
        }
        Ok(self.token(TokenKind::Html(text)))
    }

    fn read_template_punc(&mut self) -> Result<Token, ParseError> {
        if self.rest().starts_with("${") {
            self.advance_bytes(2);
            self.state.mode = Mode::Variable;
            self.state.curly = 0;
            return Ok(self.token(TokenKind::Template(TemplatePunc::VarOpen)));
        }
        let Some(marker) = chars::command_at(self.rest()) else {
            return Err(self.error(ErrorKind::InvalidSyntax, "Error parsing template"));
        };
        match (marker.closing, marker.name) {
            (false, "verbatim") => self.read_verbatim(),
            (false, "!") => {
                self.read_template_comment()?;
                self.next_token()
            }
            (closing, _) => {
                self.advance_bytes(2);
                self.state.mode = Mode::Command;
                self.state.curly = 0;
                if closing {
                    self.advance_bytes(1);
                    Ok(self.token(TokenKind::Template(TemplatePunc::CloseOpen)))
                } else {
                    Ok(self.token(TokenKind::Template(TemplatePunc::CommandOpen)))
                }
            }
        }
    }

    fn read_verbatim(&mut self) -> Result<Token, ParseError> {
        const OPEN: &str = "{{verbatim";
        const CLOSE: &str = "{{/verbatim}}";
        self.advance_bytes(OPEN.len());
        while self.peek_char() == Some(' ') {
            self.next_char(false);
        }
        if !self.rest().starts_with("}}") {
            return Err(self.error(ErrorKind::UnterminatedVerbatim, "Malformed {{verbatim}} tag"));
        }
        self.advance_bytes(2);
        let Some(len) = self.rest().find(CLOSE) else {
            return Err(self.error(ErrorKind::UnterminatedVerbatim, "Unterminated {{verbatim}} block"));
        };
        let text = self.rest()[..len].to_string();
        self.advance_bytes(len + CLOSE.len());
        Ok(self.token(TokenKind::Html(text)))
    }

    fn read_template_comment(&mut self) -> Result<(), ParseError> {
        self.advance_bytes(3);
        let Some(len) = self.rest().find("}}") else {
            return Err(self.error(ErrorKind::UnterminatedComment, "Unterminated template comment"));
        };
        let text = self.rest()[..len].to_string();
        self.advance_bytes(len + 2);
        self.push_comment(CommentKind::Template, text);
        self.state.regex_allowed = false;
        Ok(())
    }

    fn push_comment(&mut self, kind: CommentKind, text: String) {
        let span = Span { start: self.state.tok_start, end: self.state.pos };
        self.state.comments.push(Comment { kind, text, span });
    }

    // =========================================================================
    // Literals
    // =========================================================================

    fn read_num(&mut self, prefix: &str) -> Result<Token, ParseError> {
        let mut text = prefix.to_string();
        let mut has_e = false;
        let mut after_e = false;
        let mut has_x = false;
        let mut has_dot = prefix == ".";
        let mut count = 0;
        while let Some(ch) = self.peek_char() {
            let accept = match ch {
                'x' | 'X' => !std::mem::replace(&mut has_x, true),
                'e' | 'E' if !has_x => {
                    if has_e {
                        false
                    } else {
                        has_e = true;
                        after_e = true;
                        true
                    }
                }
                '-' => after_e || (count == 0 && prefix.is_empty()),
                '+' => after_e,
                _ => {
                    after_e = false;
                    if ch == '.' {
                        if !has_dot && !has_x && !has_e {
                            has_dot = true;
                            true
                        } else {
                            false
                        }
                    } else {
                        chars::is_alphanumeric(ch)
                    }
                }
            };
            if !accept {
                break;
            }
            self.next_char(false);
            text.push(ch);
            count += 1;
        }
        match parse_number(&text) {
            Some(value) => Ok(self.token(TokenKind::Num(value))),
            None => Err(self.error(ErrorKind::InvalidNumber, format!("Invalid syntax: {}", text))),
        }
    }

    fn read_string(&mut self) -> Result<Token, ParseError> {
        let quote = self.next_char(false);
        let mut value = String::new();
        loop {
            let ch = self.next_or_eof(ErrorKind::UnterminatedString, "Unterminated string constant")?;
            if Some(ch) == quote {
                break;
            }
            if ch != '\\' {
                value.push(ch);
                continue;
            }
            let octal = self.read_octal_digits();
            if octal.is_empty() {
                if let Some(escaped) = self.read_escaped_char()? {
                    value.push(escaped);
                }
            } else {
                let code = u32::from_str_radix(&octal, 8).unwrap_or(0);
                value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
        }
        Ok(self.token(TokenKind::Str(value)))
    }

    /// Legacy octal escape digits: up to three when the first is 0-3, two otherwise
    fn read_octal_digits(&mut self) -> String {
        let mut digits = String::new();
        while let Some(ch) = self.peek_char() {
            if !('0'..='7').contains(&ch) {
                break;
            }
            let limit = match digits.chars().next() {
                None => 1,
                Some(first) if first <= '3' => 3,
                Some(_) => 2,
            };
            if !digits.is_empty() && digits.len() >= limit {
                break;
            }
            digits.push(ch);
            self.next_char(true);
        }
        digits
    }

    /// Escape after a backslash; `None` for a line continuation
    fn read_escaped_char(&mut self) -> Result<Option<char>, ParseError> {
        let ch = self.next_or_eof(ErrorKind::UnterminatedString, "Unterminated string constant")?;
        let escaped = match ch {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'b' => '\u{8}',
            'v' => '\u{b}',
            'f' => '\u{c}',
            '0' => '\0',
            'x' => {
                let code = self.read_hex(2)?;
                char::from_u32(code).unwrap_or('\u{fffd}')
            }
            'u' => self.read_unicode_escape()?,
            '\n' => return Ok(None),
            other => other,
        };
        Ok(Some(escaped))
    }

    /// Body of a `\u` escape: `XXXX`, a surrogate pair of them, or `{X...}`
    fn read_unicode_escape(&mut self) -> Result<char, ParseError> {
        if self.peek_char() == Some('{') {
            self.next_char(true);
            let Some(len) = self.rest().find('}') else {
                return Err(self.error(ErrorKind::InvalidSyntax, "Invalid Unicode escape sequence"));
            };
            let digits = self.rest()[..len].to_string();
            let code = u32::from_str_radix(&digits, 16)
                .ok()
                .filter(|_| !digits.is_empty())
                .ok_or_else(|| self.error(ErrorKind::InvalidSyntax, "Invalid Unicode escape sequence"))?;
            self.advance_bytes(len + 1);
            return Ok(char::from_u32(code).unwrap_or('\u{fffd}'));
        }
        let unit = self.read_hex(4)?;
        if (0xD800..0xDC00).contains(&unit) {
            let rest = self.rest();
            let low = rest
                .strip_prefix("\\u")
                .and_then(|r| r.get(..4))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .filter(|low| (0xDC00..0xE000).contains(low));
            if let Some(low) = low {
                self.advance_bytes(6);
                let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                return Ok(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
        }
        Ok(char::from_u32(unit).unwrap_or('\u{fffd}'))
    }

    fn read_hex(&mut self, digits: usize) -> Result<u32, ParseError> {
        let mut code = 0;
        for _ in 0..digits {
            let digit = self
                .next_or_eof(ErrorKind::UnterminatedString, "Unterminated string constant")?
                .to_digit(16)
                .ok_or_else(|| self.error(ErrorKind::InvalidSyntax, "Invalid hex-character pattern in string"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn read_name(&mut self) -> Result<String, ParseError> {
        let mut name = String::new();
        let mut escaped = false;
        while let Some(ch) = self.peek_char() {
            if ch == '\\' {
                escaped = true;
                self.next_char(false);
                if self.next_char(true) != Some('u') {
                    return Err(self.error(ErrorKind::InvalidSyntax, "Expecting UnicodeEscapeSequence -- uXXXX"));
                }
                let decoded = self.read_unicode_escape()?;
                if !chars::is_identifier_char(decoded) {
                    return Err(self.error(
                        ErrorKind::InvalidSyntax,
                        format!("Unicode char: {} is not valid in identifier", decoded as u32),
                    ));
                }
                name.push(decoded);
            } else if chars::is_identifier_char(ch) {
                self.next_char(false);
                name.push(ch);
            } else {
                break;
            }
        }
        if escaped && chars::keyword(&name).is_some() {
            let mut rest = name.chars();
            if let Some(first) = rest.next() {
                name = format!("\\u{:04X}{}", first as u32, rest.as_str());
            }
        }
        Ok(name)
    }

    fn read_word(&mut self) -> Result<Token, ParseError> {
        let word = self.read_name()?;
        let kind = if let Some(op) = chars::keyword(&word).and_then(chars::operator) {
            TokenKind::Operator(op)
        } else if let Some(keyword) = chars::keyword(&word) {
            TokenKind::Keyword(keyword)
        } else if let Some(atom) = chars::atom(&word) {
            TokenKind::Atom(atom)
        } else {
            TokenKind::Name(word)
        };
        Ok(self.token(kind))
    }

    fn read_regexp(&mut self, prefix: &str) -> Result<Token, ParseError> {
        let mut pattern = prefix.to_string();
        let mut in_class = false;
        let mut backslash = false;
        loop {
            let ch = self.next_or_eof(ErrorKind::UnterminatedRegex, "Unterminated regular expression")?;
            if backslash {
                pattern.push('\\');
                pattern.push(ch);
                backslash = false;
            } else if ch == '[' {
                in_class = true;
                pattern.push(ch);
            } else if ch == ']' && in_class {
                in_class = false;
                pattern.push(ch);
            } else if ch == '/' && !in_class {
                break;
            } else if ch == '\\' {
                backslash = true;
            } else {
                pattern.push(ch);
            }
        }
        let flags = self.read_name()?;
        Ok(self.token(TokenKind::Regex { pattern, flags }))
    }

    fn read_operator(&mut self, prefix: &str) -> Result<Token, ParseError> {
        let mut op = prefix.to_string();
        if op.is_empty() {
            if let Some(ch) = self.next_char(false) {
                op.push(ch);
            }
        }
        while let Some(ch) = self.peek_char() {
            let grown = format!("{}{}", op, ch);
            if chars::operator(&grown).is_none() {
                break;
            }
            self.next_char(false);
            op = grown;
        }
        match chars::operator(&op) {
            Some(op) => Ok(self.token(TokenKind::Operator(op))),
            None => Err(self.error(ErrorKind::UnexpectedCharacter, format!("Unexpected character '{}'", op))),
        }
    }

    fn handle_dot(&mut self) -> Result<Token, ParseError> {
        self.next_char(false);
        if self.peek_char().is_some_and(chars::is_digit) {
            return self.read_num(".");
        }
        Ok(self.token(TokenKind::Punc('.')))
    }

    fn handle_slash(&mut self) -> Result<Token, ParseError> {
        self.next_char(false);
        let regex_allowed = self.state.regex_allowed;
        match self.peek_char() {
            Some('/') => {
                self.next_char(false);
                let len = self.rest().find('\n').unwrap_or(self.rest().len());
                let text = self.rest()[..len].to_string();
                self.advance_bytes(len);
                self.push_comment(CommentKind::Line, text);
                self.state.regex_allowed = regex_allowed;
                self.next_token()
            }
            Some('*') => {
                self.next_char(false);
                let Some(len) = self.rest().find("*/") else {
                    return Err(self.error(ErrorKind::UnterminatedComment, "Unterminated multiline comment"));
                };
                let text = self.rest()[..len].to_string();
                self.advance_bytes(len + 2);
                self.push_comment(CommentKind::Block, text);
                self.state.regex_allowed = regex_allowed;
                self.next_token()
            }
            _ if regex_allowed => self.read_regexp(""),
            _ => self.read_operator("/"),
        }
    }
}

/// Parse number text read by the tokenizer: hex, legacy octal or decimal
pub fn parse_number(text: &str) -> Option<f64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        return Some(hex.chars().filter_map(|c| c.to_digit(16)).fold(0.0, |acc, d| acc * 16.0 + d as f64));
    }
    if text.len() > 1 && text.starts_with('0') && text.chars().all(|c| ('0'..='7').contains(&c)) {
        return Some(text.chars().filter_map(|c| c.to_digit(8)).fold(0.0, |acc, d| acc * 8.0 + d as f64));
    }
    let (mantissa, exponent) = match text.find(['e', 'E']) {
        Some(i) => (&text[..i], Some(&text[i + 1..])),
        None => (text, None),
    };
    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (int.is_empty() && frac.is_empty()) || !digits(int) || !digits(frac) {
        return None;
    }
    let exponent = match exponent {
        Some(exp) => {
            let unsigned = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            if unsigned.is_empty() || !digits(unsigned) {
                return None;
            }
            exp
        }
        None => "0",
    };
    let int = if int.is_empty() { "0" } else { int };
    let frac = if frac.is_empty() { "0" } else { frac };
    format!("{}.{}e{}", int, frac, exponent).parse().ok()
}

/// Tokenize a whole source, stopping after end of input
pub fn tokenize(source: &str, template: bool) -> Result<Vec<Token>, ParseError> {
    let mut tokenizer = Tokenizer::new(source, template);
    let mut tokens = Vec::new();
    loop {
        let token = tokenizer.next_token()?;
        let eof = token.is_eof();
        tokens.push(token);
        if eof {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str, template: bool) -> Vec<TokenKind> {
        tokenize(source, template).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_expression_tokens() {
        assert_eq!(
            kinds("a.b + 1", false),
            vec![
                TokenKind::Name("a".into()),
                TokenKind::Punc('.'),
                TokenKind::Name("b".into()),
                TokenKind::Operator("+"),
                TokenKind::Num(1.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_template_modes() {
        assert_eq!(
            kinds("Hi ${name}!{{if x}}y{{/if}}", true),
            vec![
                TokenKind::Html("Hi ".into()),
                TokenKind::Template(TemplatePunc::VarOpen),
                TokenKind::Name("name".into()),
                TokenKind::Template(TemplatePunc::VarClose),
                TokenKind::Html("!".into()),
                TokenKind::Template(TemplatePunc::CommandOpen),
                TokenKind::Keyword("if"),
                TokenKind::Name("x".into()),
                TokenKind::Template(TemplatePunc::CommandClose),
                TokenKind::Html("y".into()),
                TokenKind::Template(TemplatePunc::CloseOpen),
                TokenKind::Keyword("if"),
                TokenKind::Template(TemplatePunc::CommandClose),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_braces_nest_inside_blocks() {
        let tokens = kinds("${ {a: {b: 1}}.a }", true);
        assert_eq!(tokens.iter().filter(|k| **k == TokenKind::Punc('{')).count(), 2);
        assert_eq!(tokens.iter().filter(|k| **k == TokenKind::Punc('}')).count(), 2);
        assert_eq!(tokens[tokens.len() - 2], TokenKind::Template(TemplatePunc::VarClose));
    }

    #[test]
    fn test_single_brace_closing_command_is_error() {
        let err = tokenize("{{if x}x", true).unwrap_err();
        assert_eq!(err.message, "Expected closing '}}'");
    }

    #[test]
    fn test_unknown_command_is_text() {
        assert_eq!(kinds("{{foo}} {a}", true), vec![TokenKind::Html("{{foo}} {a}".into()), TokenKind::Eof]);
    }

    #[test]
    fn test_verbatim_and_comments() {
        let tokens = tokenize("a{{! note }}b{{verbatim}}${x}{{if}}{{/verbatim}}", true).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Html("a".into()));
        assert_eq!(tokens[1].kind, TokenKind::Html("b".into()));
        assert_eq!(tokens[1].comments_before.len(), 1);
        assert_eq!(tokens[1].comments_before[0].text, " note ");
        assert_eq!(tokens[2].kind, TokenKind::Html("${x}{{if}}".into()));
        assert!(tokens[3].is_eof());
    }

    #[test]
    fn test_unterminated_verbatim() {
        let err = tokenize("x{{verbatim}}abc", true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedVerbatim);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("0xff 017 08 1.5e3 .5", false)[..5], [
            TokenKind::Num(255.0),
            TokenKind::Num(15.0),
            TokenKind::Num(8.0),
            TokenKind::Num(1500.0),
            TokenKind::Num(0.5),
        ]);
        for bad in ["12abc", "0x", "1e", "1e+"] {
            let err = tokenize(bad, false).unwrap_err();
            assert_eq!(err.message, format!("Invalid syntax: {}", bad));
            assert_eq!(err.kind, ErrorKind::InvalidNumber);
        }
    }

    #[test]
    fn test_string_escapes() {
        let tokens = kinds(r#""a\n\x41B\u{1F600}\101\08\47\
b" 'it\'s'"#, false);
        assert_eq!(tokens[0], TokenKind::Str("a\nAB\u{1F600}A\08'b".into()));
        assert_eq!(tokens[1], TokenKind::Str("it's".into()));
        assert_eq!(kinds(r#""😀""#, false)[0], TokenKind::Str("\u{1F600}".into()));
    }

    #[test]
    fn test_unterminated_string_position() {
        let err = tokenize("a +\n  'abc", false).unwrap_err();
        assert_eq!(err.message, "Unterminated string constant");
        assert_eq!((err.line(), err.column(), err.offset()), (2, 3, 7));
    }

    #[test]
    fn test_keywords_atoms_and_escaped_names() {
        assert_eq!(
            kinds(r"if typeof true \u0069f café", false),
            vec![
                TokenKind::Keyword("if"),
                TokenKind::Operator("typeof"),
                TokenKind::Atom("true"),
                TokenKind::Name("\\u0069f".into()),
                TokenKind::Name("café".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_names_with_combining_marks() {
        assert_eq!(
            kinds("a\u{0dca} + \u{0d9a}\u{0dca}\u{0dc2}", false),
            vec![
                TokenKind::Name("a\u{0dca}".into()),
                TokenKind::Operator("+"),
                TokenKind::Name("\u{0d9a}\u{0dca}\u{0dc2}".into()),
                TokenKind::Eof,
            ]
        );
        let err = tokenize("\u{0dca}a", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedCharacter);
    }

    #[test]
    fn test_regex_versus_divide() {
        assert_eq!(
            kinds("a / b", false)[1],
            TokenKind::Operator("/")
        );
        assert_eq!(
            kinds("x = /[/]+/g", false)[2],
            TokenKind::Regex { pattern: "[/]+".into(), flags: "g".into() }
        );
        assert_eq!(kinds("(/a\\/b/)", false)[1], TokenKind::Regex { pattern: "a\\/b".into(), flags: String::new() });
    }

    #[test]
    fn test_greedy_operators() {
        assert_eq!(
            kinds("a !== b >>>= c", false),
            vec![
                TokenKind::Name("a".into()),
                TokenKind::Operator("!=="),
                TokenKind::Name("b".into()),
                TokenKind::Operator(">>>="),
                TokenKind::Name("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_newlines() {
        let tokens = tokenize("a // one\n/* two\n */ b", false).unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Name("b".into()));
        assert!(tokens[1].newline_before);
        assert_eq!(tokens[1].comments_before.len(), 2);
        assert_eq!(tokens[1].comments_before[0].kind, CommentKind::Line);
        assert_eq!(tokens[1].comments_before[1].kind, CommentKind::Block);
    }

    #[test]
    fn test_line_endings_are_normalized() {
        let tokens = tokenize("\u{feff}a\r\nb\rc\u{2028}d", false).unwrap();
        let lines: Vec<usize> = tokens.iter().map(|t| t.span.start.line).collect();
        assert_eq!(lines, vec![0, 1, 2, 3, 3]);
    }

    #[test]
    fn test_save_restore() {
        let mut tokenizer = Tokenizer::new("a b c", false);
        tokenizer.next_token().unwrap();
        let saved = tokenizer.save();
        assert_eq!(tokenizer.next_token().unwrap().kind, TokenKind::Name("b".into()));
        tokenizer.restore(saved);
        assert_eq!(tokenizer.next_token().unwrap().kind, TokenKind::Name("b".into()));
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("ab\n  ${x}", true).unwrap();
        assert_eq!(tokens[2].span.start, Position { byte: 7, line: 1, col: 4 });
        assert_eq!(tokens[2].span.end, Position { byte: 8, line: 1, col: 5 });
    }
}
