use super::ParseOptions;
use super::tokenizer::{LexState, Position, Span, TemplatePunc, Token, TokenKind, Tokenizer};
use crate::ast::*;
use crate::error::{ErrorKind, ParseError};

/// Recursive-descent parser over a token stream with one token of lookahead.
///
/// Expressions use precedence climbing over [`BinaryOp::precedence`]. The chunk
/// grammar lives in `tree_builder.rs` and shares this cursor.
pub struct Grammar {
    lexer: Tokenizer,
    pub(super) token: Token,
    prev_end: Position,
    /// Peeked token plus the lexer state from before it was read
    peeked: Option<(Token, LexState)>,
    pub(super) options: ParseOptions,
    in_function: usize,
    in_loop: usize,
    labels: Vec<String>,
}

type Result<T> = std::result::Result<T, ParseError>;

/// Keywords that begin a statement
const STATEMENT_KEYWORDS: &[&str] = &[
    "break", "const", "continue", "debugger", "do", "for", "function", "if", "return", "switch",
    "throw", "try", "var", "while", "with",
];

impl Grammar {
    pub fn new(source: &str, template: bool, options: ParseOptions) -> Result<Self> {
        let mut lexer = Tokenizer::new(source, template);
        let token = lexer.next_token()?;
        Ok(Self {
            lexer,
            token,
            prev_end: Position::new(),
            peeked: None,
            options,
            in_function: 0,
            in_loop: 0,
            labels: Vec::new(),
        })
    }

    // =========================================================================
    // Cursor
    // =========================================================================

    /// Advance, returning the token that was current
    pub(super) fn next(&mut self) -> Result<Token> {
        let next = match self.peeked.take() {
            Some((token, _)) => token,
            None => self.lexer.next_token()?,
        };
        let prev = std::mem::replace(&mut self.token, next);
        self.prev_end = prev.span.end;
        Ok(prev)
    }

    pub(super) fn peek(&mut self) -> Result<&Token> {
        let peeked = match self.peeked.take() {
            Some(peeked) => peeked,
            None => {
                let saved = self.lexer.save();
                (self.lexer.next_token()?, saved)
            }
        };
        Ok(&self.peeked.insert(peeked).0)
    }

    /// Span from `start` to the end of the last consumed token, when positions are embedded
    pub(super) fn span_from(&self, start: Position) -> Option<Span> {
        self.options
            .embed_positions
            .then_some(Span { start, end: self.prev_end })
    }

    pub(super) fn croak(&self, kind: ErrorKind, message: impl Into<String>) -> ParseError {
        ParseError::new(kind, message, self.token.span)
    }

    pub(super) fn unexpected(&self) -> ParseError {
        let kind = if self.token.is_eof() { ErrorKind::UnexpectedEof } else { ErrorKind::UnexpectedToken };
        self.croak(kind, format!("Unexpected token: {}", self.token.kind.describe()))
    }

    fn expected(&self, what: &str) -> ParseError {
        self.croak(
            ErrorKind::UnexpectedToken,
            format!("Unexpected token {}, expected {}", self.token.kind.describe(), what),
        )
    }

    pub(super) fn expect_punc(&mut self, ch: char) -> Result<()> {
        if !self.token.is_punc(ch) {
            return Err(self.expected(&format!("punc ({})", ch)));
        }
        self.next()?;
        Ok(())
    }

    pub(super) fn expect_template(&mut self, punc: TemplatePunc) -> Result<()> {
        if !self.token.is_template(punc) {
            return Err(self.expected(&format!("tpunc ({})", punc.as_str())));
        }
        self.next()?;
        Ok(())
    }

    fn can_insert_semicolon(&self) -> bool {
        !self.options.strict && (self.token.newline_before || self.token.is_eof() || self.token.is_punc('}'))
    }

    fn semicolon(&mut self) -> Result<()> {
        if self.token.is_punc(';') {
            self.next()?;
            Ok(())
        } else if self.can_insert_semicolon() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Re-read a leading `/` or `/=` as a regular expression
    fn force_regex(&mut self) -> Result<()> {
        let prefix = if self.token.is_operator("/=") { "=" } else { "" };
        if let Some((_, saved)) = self.peeked.take() {
            self.lexer.restore(saved);
        }
        let mut token = self.lexer.force_regex(prefix)?;
        token.newline_before = self.token.newline_before;
        token.comments_before = std::mem::take(&mut self.token.comments_before);
        self.token = token;
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub fn expression(&mut self, commas: bool, no_in: bool) -> Result<Expr> {
        let start = self.token.span.start;
        let expr = self.maybe_assign(no_in)?;
        if commas && self.token.is_punc(',') {
            self.next()?;
            let rest = self.expression(true, no_in)?;
            return Ok(Expr::new(ExprKind::Seq(Box::new(expr), Box::new(rest)), self.span_from(start)));
        }
        Ok(expr)
    }

    fn maybe_assign(&mut self, no_in: bool) -> Result<Expr> {
        let start = self.token.span.start;
        let left = self.maybe_conditional(no_in)?;
        let op = match self.token.kind {
            TokenKind::Operator("=") => Some(None),
            TokenKind::Operator(op) => BinaryOp::from_assignment(op).map(Some),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(left);
        };
        if !self.is_assignable(&left) {
            return Err(self.croak(ErrorKind::InvalidAssignment, "Invalid assignment"));
        }
        self.next()?;
        let right = self.maybe_assign(no_in)?;
        Ok(Expr::new(ExprKind::Assign(op, Box::new(left), Box::new(right)), self.span_from(start)))
    }

    fn maybe_conditional(&mut self, no_in: bool) -> Result<Expr> {
        let start = self.token.span.start;
        let expr = self.expr_ops(no_in)?;
        if !self.token.is_operator("?") {
            return Ok(expr);
        }
        self.next()?;
        let yes = self.expression(false, false)?;
        self.expect_punc(':')?;
        let no = self.expression(false, no_in)?;
        Ok(Expr::new(
            ExprKind::Conditional(Box::new(expr), Box::new(yes), Box::new(no)),
            self.span_from(start),
        ))
    }

    fn expr_ops(&mut self, no_in: bool) -> Result<Expr> {
        let start = self.token.span.start;
        let left = self.maybe_unary(true)?;
        self.expr_op(left, start, 0, no_in)
    }

    fn binary_operator(&self, no_in: bool) -> Option<BinaryOp> {
        match self.token.kind {
            TokenKind::Operator("in") if no_in => None,
            TokenKind::Operator(op) => BinaryOp::from_str(op),
            _ => None,
        }
    }

    /// Precedence climbing: fold operators binding tighter than `min_prec` into `left`
    fn expr_op(&mut self, left: Expr, start: Position, min_prec: u8, no_in: bool) -> Result<Expr> {
        let Some(op) = self.binary_operator(no_in) else {
            return Ok(left);
        };
        let prec = op.precedence();
        if prec <= min_prec {
            return Ok(left);
        }
        self.next()?;
        let right_start = self.token.span.start;
        let right = self.maybe_unary(true)?;
        let right = self.expr_op(right, right_start, prec, no_in)?;
        let combined = Expr::new(
            ExprKind::Binary(op, Box::new(left), Box::new(right)),
            self.span_from(start),
        );
        self.expr_op(combined, start, min_prec, no_in)
    }

    fn maybe_unary(&mut self, allow_calls: bool) -> Result<Expr> {
        let start = self.token.span.start;
        if let TokenKind::Operator(op) = self.token.kind {
            if let Some(unary) = UnaryOp::prefix(op) {
                self.next()?;
                let operand = self.maybe_unary(allow_calls)?;
                return self.make_unary(unary, operand, true, start);
            }
        }
        let mut value = self.expr_atom(allow_calls)?;
        while let TokenKind::Operator(op) = self.token.kind {
            let Some(unary) = UnaryOp::postfix(op) else {
                break;
            };
            if self.token.newline_before {
                break;
            }
            // The operator is current: consume it before building the node
            self.next()?;
            value = self.make_unary(unary, value, false, start)?;
        }
        Ok(value)
    }

    fn make_unary(&mut self, op: UnaryOp, operand: Expr, prefix: bool, start: Position) -> Result<Expr> {
        if op.is_update() && !self.is_assignable(&operand) {
            return Err(self.croak(
                ErrorKind::InvalidAssignment,
                format!("Invalid use of {} operator", op.as_str()),
            ));
        }
        let kind = if prefix {
            ExprKind::UnaryPrefix(op, Box::new(operand))
        } else {
            ExprKind::UnaryPostfix(op, Box::new(operand))
        };
        Ok(Expr::new(kind, self.span_from(start)))
    }

    /// Only checked in strict mode; templates reject assignment when evaluating
    fn is_assignable(&self, expr: &Expr) -> bool {
        if !self.options.strict {
            return true;
        }
        match &expr.kind {
            ExprKind::Dot(..) | ExprKind::Sub(..) | ExprKind::New(..) | ExprKind::Call(..) => true,
            ExprKind::Name(name) => name != "this",
            _ => false,
        }
    }

    fn expr_atom(&mut self, allow_calls: bool) -> Result<Expr> {
        let start = self.token.span.start;
        if self.token.is_operator("new") {
            self.next()?;
            return self.new_expr(start);
        }
        let atom = match self.token.kind.clone() {
            TokenKind::Punc('(') => {
                self.next()?;
                let inner = self.expression(true, false)?;
                self.expect_punc(')')?;
                return self.subscripts(inner, start, allow_calls);
            }
            TokenKind::Punc('[') => {
                self.next()?;
                let items = self.expr_list(']', !self.options.strict, true)?;
                ExprKind::Array(items)
            }
            TokenKind::Punc('{') => {
                self.next()?;
                ExprKind::Object(self.object()?)
            }
            TokenKind::Keyword("function") => {
                self.next()?;
                ExprKind::Function(Box::new(self.function(false)?))
            }
            TokenKind::Num(n) => {
                self.next()?;
                ExprKind::Num(n)
            }
            TokenKind::Str(s) => {
                self.next()?;
                ExprKind::String(s)
            }
            TokenKind::Name(name) => {
                self.next()?;
                ExprKind::Name(name)
            }
            TokenKind::Atom(word) => {
                self.next()?;
                match Atom::from_str(word) {
                    Some(atom) => ExprKind::Atom(atom),
                    None => ExprKind::Name(word.to_string()),
                }
            }
            TokenKind::Regex { pattern, flags } => {
                self.next()?;
                ExprKind::Regexp { pattern, flags }
            }
            _ => return Err(self.unexpected()),
        };
        let expr = Expr::new(atom, self.span_from(start));
        self.subscripts(expr, start, allow_calls)
    }

    fn new_expr(&mut self, start: Position) -> Result<Expr> {
        let constructor = self.expr_atom(false)?;
        let args = if self.token.is_punc('(') {
            self.next()?;
            self.expr_list(')', false, false)?
        } else {
            Vec::new()
        };
        let expr = Expr::new(ExprKind::New(Box::new(constructor), args), self.span_from(start));
        self.subscripts(expr, start, true)
    }

    fn subscripts(&mut self, mut expr: Expr, start: Position, allow_calls: bool) -> Result<Expr> {
        loop {
            let kind = if self.token.is_punc('.') {
                self.next()?;
                ExprKind::Dot(Box::new(expr), self.as_name()?)
            } else if self.token.is_punc('[') {
                self.next()?;
                let property = self.expression(true, false)?;
                self.expect_punc(']')?;
                ExprKind::Sub(Box::new(expr), Box::new(property))
            } else if allow_calls && self.token.is_punc('(') {
                self.next()?;
                let args = self.expr_list(')', false, false)?;
                ExprKind::Call(Box::new(expr), args)
            } else {
                return Ok(expr);
            };
            expr = Expr::new(kind, self.span_from(start));
        }
    }

    /// Comma separated expressions up to and including `closing`
    pub(super) fn expr_list(&mut self, closing: char, allow_trailing_comma: bool, allow_empty: bool) -> Result<Vec<Expr>> {
        let mut list = Vec::new();
        let mut first = true;
        while !self.token.is_punc(closing) {
            if first {
                first = false;
            } else {
                self.expect_punc(',')?;
            }
            if allow_trailing_comma && self.token.is_punc(closing) {
                break;
            }
            if allow_empty && self.token.is_punc(',') {
                list.push(Expr::new(ExprKind::Atom(Atom::Undefined), None));
            } else {
                list.push(self.expression(false, false)?);
            }
        }
        self.next()?;
        Ok(list)
    }

    fn object(&mut self) -> Result<Vec<Property>> {
        let mut properties = Vec::new();
        let mut first = true;
        while !self.token.is_punc('}') {
            if first {
                first = false;
            } else {
                self.expect_punc(',')?;
            }
            if !self.options.strict && self.token.is_punc('}') {
                break;
            }
            let accessor = matches!(&self.token.kind, TokenKind::Name(n) if n == "get" || n == "set");
            let name = self.as_property_name()?;
            if accessor && !self.token.is_punc(':') {
                let key = self.as_name()?;
                let function = self.function(false)?;
                properties.push(if name == "get" {
                    Property::Get { key, function }
                } else {
                    Property::Set { key, function }
                });
            } else {
                self.expect_punc(':')?;
                let value = self.expression(false, false)?;
                properties.push(Property::Init { key: name, value });
            }
        }
        self.next()?;
        Ok(properties)
    }

    fn as_property_name(&mut self) -> Result<String> {
        match self.token.kind.clone() {
            TokenKind::Num(n) => {
                self.next()?;
                Ok(number_to_string(n))
            }
            TokenKind::Str(s) => {
                self.next()?;
                Ok(s)
            }
            _ => self.as_name(),
        }
    }

    /// Names, keywords, atoms and word operators are all valid property names
    fn as_name(&mut self) -> Result<String> {
        let name = match &self.token.kind {
            TokenKind::Name(name) => name.clone(),
            TokenKind::Keyword(word) | TokenKind::Atom(word) => word.to_string(),
            TokenKind::Operator(word) if word.chars().all(|c| c.is_ascii_alphabetic()) => word.to_string(),
            _ => return Err(self.unexpected()),
        };
        self.next()?;
        Ok(name)
    }

    fn function(&mut self, in_statement: bool) -> Result<Function> {
        let name = match &self.token.kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                self.next()?;
                Some(name)
            }
            _ if in_statement => return Err(self.unexpected()),
            _ => None,
        };
        self.expect_punc('(')?;
        let mut params = Vec::new();
        let mut first = true;
        while !self.token.is_punc(')') {
            if first {
                first = false;
            } else {
                self.expect_punc(',')?;
            }
            match &self.token.kind {
                TokenKind::Name(param) => params.push(param.clone()),
                _ => return Err(self.unexpected()),
            }
            self.next()?;
        }
        self.next()?;

        let saved_loop = std::mem::replace(&mut self.in_loop, 0);
        let saved_labels = std::mem::take(&mut self.labels);
        self.in_function += 1;
        let body = self.block();
        self.in_function -= 1;
        self.in_loop = saved_loop;
        self.labels = saved_labels;
        Ok(Function { name, params, body: body? })
    }

    pub(super) fn vardefs(&mut self, no_in: bool) -> Result<Vec<VarDef>> {
        let mut defs = Vec::new();
        loop {
            let name = match &self.token.kind {
                TokenKind::Name(name) => name.clone(),
                _ => return Err(self.unexpected()),
            };
            self.next()?;
            let value = if self.token.is_operator("=") {
                self.next()?;
                Some(self.expression(false, no_in)?)
            } else {
                None
            };
            defs.push(VarDef { name, value });
            if !self.token.is_punc(',') {
                return Ok(defs);
            }
            self.next()?;
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub fn program(&mut self) -> Result<Program> {
        let mut body = Vec::new();
        while !self.token.is_eof() {
            body.push(self.statement()?);
        }
        Ok(Program { body })
    }

    fn statement(&mut self) -> Result<Stmt> {
        if self.token.is_operator("/") || self.token.is_operator("/=") {
            self.force_regex()?;
        }
        let start = self.token.span.start;
        let kind = match self.token.kind.clone() {
            TokenKind::Num(_)
            | TokenKind::Str(_)
            | TokenKind::Regex { .. }
            | TokenKind::Atom(_)
            | TokenKind::Operator(_)
            | TokenKind::Punc('[')
            | TokenKind::Punc('(') => self.simple_statement()?,
            TokenKind::Name(label) => {
                if self.peek()?.is_punc(':') {
                    self.next()?;
                    self.next()?;
                    self.labeled_statement(label)?
                } else {
                    self.simple_statement()?
                }
            }
            TokenKind::Punc('{') => StmtKind::Block(self.block()?),
            TokenKind::Punc(';') => {
                self.next()?;
                StmtKind::Block(Vec::new())
            }
            TokenKind::Keyword(keyword) if STATEMENT_KEYWORDS.contains(&keyword) => {
                self.next()?;
                self.keyword_statement(keyword)?
            }
            _ => return Err(self.unexpected()),
        };
        Ok(Stmt { kind, span: self.span_from(start) })
    }

    fn keyword_statement(&mut self, keyword: &str) -> Result<StmtKind> {
        Ok(match keyword {
            "break" => StmtKind::Break(self.break_continue("break")?),
            "continue" => StmtKind::Continue(self.break_continue("continue")?),
            "debugger" => {
                self.semicolon()?;
                StmtKind::Debugger
            }
            "do" => {
                let body = self.looping(|g| g.statement())?;
                if !self.token.is_keyword("while") {
                    return Err(self.expected("keyword (while)"));
                }
                self.next()?;
                let condition = self.parenthesised()?;
                self.semicolon()?;
                StmtKind::Do { body: Box::new(body), condition }
            }
            "for" => self.for_statement()?,
            "function" => StmtKind::Defun(self.function(true)?),
            "if" => {
                let condition = self.parenthesised()?;
                let then_branch = Box::new(self.statement()?);
                let else_branch = if self.token.is_keyword("else") {
                    self.next()?;
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                StmtKind::If { condition, then_branch, else_branch }
            }
            "return" => {
                if self.in_function == 0 {
                    return Err(self.croak(ErrorKind::InvalidSyntax, "'return' outside of function"));
                }
                let value = if self.token.is_punc(';') {
                    self.next()?;
                    None
                } else if self.can_insert_semicolon() {
                    None
                } else {
                    let value = self.expression(true, false)?;
                    self.semicolon()?;
                    Some(value)
                };
                StmtKind::Return(value)
            }
            "switch" => self.switch_statement()?,
            "throw" => {
                if self.token.newline_before {
                    return Err(self.croak(ErrorKind::InvalidSyntax, "Illegal newline after 'throw'"));
                }
                let value = self.expression(true, false)?;
                self.semicolon()?;
                StmtKind::Throw(value)
            }
            "try" => self.try_statement()?,
            "var" => {
                let defs = self.vardefs(false)?;
                self.semicolon()?;
                StmtKind::Var(defs)
            }
            "const" => {
                let defs = self.vardefs(false)?;
                self.semicolon()?;
                StmtKind::Const(defs)
            }
            "while" => {
                let condition = self.parenthesised()?;
                let body = self.looping(|g| g.statement())?;
                StmtKind::While { condition, body: Box::new(body) }
            }
            "with" => {
                let object = self.parenthesised()?;
                StmtKind::With(object, Box::new(self.statement()?))
            }
            _ => return Err(self.unexpected()),
        })
    }

    fn simple_statement(&mut self) -> Result<StmtKind> {
        let expr = self.expression(true, false)?;
        self.semicolon()?;
        Ok(StmtKind::Expression(expr))
    }

    fn labeled_statement(&mut self, label: String) -> Result<StmtKind> {
        if self.labels.contains(&label) {
            return Err(self.croak(ErrorKind::InvalidSyntax, format!("Label {} defined twice", label)));
        }
        self.labels.push(label.clone());
        let body = self.statement();
        self.labels.pop();
        Ok(StmtKind::Label(label, Box::new(body?)))
    }

    fn break_continue(&mut self, keyword: &str) -> Result<Option<String>> {
        let label = match &self.token.kind {
            TokenKind::Name(name) if !self.can_insert_semicolon() => Some(name.clone()),
            _ => None,
        };
        if let Some(ref name) = label {
            self.next()?;
            if !self.labels.contains(name) {
                return Err(self.croak(
                    ErrorKind::InvalidSyntax,
                    format!("Label {} without matching loop or statement", name),
                ));
            }
        } else if self.in_loop == 0 {
            return Err(self.croak(ErrorKind::InvalidSyntax, format!("{} not inside a loop or switch", keyword)));
        }
        self.semicolon()?;
        Ok(label)
    }

    fn for_statement(&mut self) -> Result<StmtKind> {
        self.expect_punc('(')?;
        let init = if self.token.is_punc(';') {
            None
        } else if self.token.is_keyword("var") {
            self.next()?;
            Some(ForInit::Var(self.vardefs(true)?))
        } else {
            Some(ForInit::Expr(self.expression(true, true)?))
        };
        if let Some(init) = init {
            if self.token.is_operator("in") {
                if matches!(&init, ForInit::Var(defs) if defs.len() > 1) {
                    return Err(self.croak(
                        ErrorKind::InvalidSyntax,
                        "Only one variable declaration allowed in for..in loop",
                    ));
                }
                self.next()?;
                let object = self.expression(true, false)?;
                self.expect_punc(')')?;
                let body = self.looping(|g| g.statement())?;
                return Ok(StmtKind::ForIn { init, object, body: Box::new(body) });
            }
            return self.regular_for(Some(init));
        }
        self.regular_for(None)
    }

    fn regular_for(&mut self, init: Option<ForInit>) -> Result<StmtKind> {
        self.expect_punc(';')?;
        let test = if self.token.is_punc(';') { None } else { Some(self.expression(true, false)?) };
        self.expect_punc(';')?;
        let step = if self.token.is_punc(')') { None } else { Some(self.expression(true, false)?) };
        self.expect_punc(')')?;
        let body = self.looping(|g| g.statement())?;
        Ok(StmtKind::For { init, test, step, body: Box::new(body) })
    }

    fn switch_statement(&mut self) -> Result<StmtKind> {
        let discriminant = self.parenthesised()?;
        self.expect_punc('{')?;
        let cases = self.looping(|g| {
            let mut cases: Vec<SwitchCase> = Vec::new();
            while !g.token.is_punc('}') {
                if g.token.is_keyword("case") {
                    g.next()?;
                    let test = g.expression(true, false)?;
                    g.expect_punc(':')?;
                    cases.push(SwitchCase { test: Some(test), body: Vec::new() });
                } else if g.token.is_keyword("default") {
                    g.next()?;
                    g.expect_punc(':')?;
                    cases.push(SwitchCase { test: None, body: Vec::new() });
                } else {
                    let statement = match cases.last_mut() {
                        Some(_) => g.statement()?,
                        None => return Err(g.unexpected()),
                    };
                    if let Some(case) = cases.last_mut() {
                        case.body.push(statement);
                    }
                }
            }
            g.next()?;
            Ok(cases)
        })?;
        Ok(StmtKind::Switch { discriminant, cases })
    }

    fn try_statement(&mut self) -> Result<StmtKind> {
        let body = self.block()?;
        let catch = if self.token.is_keyword("catch") {
            self.next()?;
            self.expect_punc('(')?;
            let name = match &self.token.kind {
                TokenKind::Name(name) => name.clone(),
                _ => return Err(self.unexpected()),
            };
            self.next()?;
            self.expect_punc(')')?;
            Some((name, self.block()?))
        } else {
            None
        };
        let finally = if self.token.is_keyword("finally") {
            self.next()?;
            Some(self.block()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            return Err(self.croak(ErrorKind::InvalidSyntax, "Missing catch/finally blocks"));
        }
        Ok(StmtKind::Try { body, catch, finally })
    }

    fn parenthesised(&mut self) -> Result<Expr> {
        self.expect_punc('(')?;
        let expr = self.expression(true, false)?;
        self.expect_punc(')')?;
        Ok(expr)
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_punc('{')?;
        let mut body = Vec::new();
        while !self.token.is_punc('}') {
            if self.token.is_eof() {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        self.next()?;
        Ok(body)
    }

    fn looping<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.in_loop += 1;
        let result = f(self);
        self.in_loop -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Expr {
        let options = ParseOptions::default().with_positions(false);
        let mut grammar = Grammar::new(source, false, options).unwrap();
        grammar.expression(true, false).unwrap()
    }

    fn name(n: &str) -> Box<Expr> {
        Box::new(Expr::new(ExprKind::Name(n.into()), None))
    }

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::new(ExprKind::Num(n), None))
    }

    fn program(source: &str) -> std::result::Result<Program, ParseError> {
        let options = ParseOptions::default().with_positions(false).strict(true);
        Grammar::new(source, false, options)?.program()
    }

    #[test]
    fn test_precedence() {
        let parsed = expr("a + 2 * 3 - b");
        let expected = ExprKind::Binary(
            BinaryOp::Sub,
            Box::new(Expr::new(
                ExprKind::Binary(
                    BinaryOp::Add,
                    name("a"),
                    Box::new(Expr::new(ExprKind::Binary(BinaryOp::Mul, num(2.0), num(3.0)), None)),
                ),
                None,
            )),
            name("b"),
        );
        assert_eq!(parsed.kind, expected);
    }

    #[test]
    fn test_logical_tiers() {
        let parsed = expr("a || b && c == d");
        let ExprKind::Binary(BinaryOp::Or, _, right) = parsed.kind else {
            panic!("expected ||, got {:?}", parsed.kind);
        };
        let ExprKind::Binary(BinaryOp::And, _, right) = right.kind else {
            panic!("expected &&");
        };
        assert!(matches!(right.kind, ExprKind::Binary(BinaryOp::Eq, _, _)));
    }

    #[test]
    fn test_member_call_chain() {
        let parsed = expr("user.friends[0].name(1, 'x')");
        let ExprKind::Call(callee, args) = parsed.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        let ExprKind::Dot(base, property) = callee.kind else {
            panic!("expected dot");
        };
        assert_eq!(property, "name");
        assert!(matches!(base.kind, ExprKind::Sub(_, _)));
    }

    #[test]
    fn test_conditional_and_unary() {
        let parsed = expr("!a ? -b : +c");
        let ExprKind::Conditional(test, yes, no) = parsed.kind else {
            panic!("expected conditional");
        };
        assert!(matches!(test.kind, ExprKind::UnaryPrefix(UnaryOp::Not, _)));
        assert!(matches!(yes.kind, ExprKind::UnaryPrefix(UnaryOp::Neg, _)));
        assert!(matches!(no.kind, ExprKind::UnaryPrefix(UnaryOp::Plus, _)));
    }

    #[test]
    fn test_literals() {
        let parsed = expr("[1, , 'a', {b: 2, 'c d': [true], 3: null}]");
        let ExprKind::Array(items) = parsed.kind else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 4);
        assert_eq!(items[1].kind, ExprKind::Atom(Atom::Undefined));
        let ExprKind::Object(props) = &items[3].kind else {
            panic!("expected object");
        };
        let keys: Vec<&str> = props
            .iter()
            .map(|p| match p {
                Property::Init { key, .. } => key.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(keys, vec!["b", "c d", "3"]);
    }

    #[test]
    fn test_sequence_and_assignment() {
        assert!(matches!(expr("a, b").kind, ExprKind::Seq(_, _)));
        assert!(matches!(expr("a += 1").kind, ExprKind::Assign(Some(BinaryOp::Add), _, _)));
        assert!(matches!(expr("a = b = 1").kind, ExprKind::Assign(None, _, ref right) if matches!(right.kind, ExprKind::Assign(..))));
    }

    #[test]
    fn test_spans_cover_expression() {
        let mut grammar = Grammar::new("  a.b + 1", false, ParseOptions::default()).unwrap();
        let parsed = grammar.expression(true, false).unwrap();
        let span = parsed.span.unwrap();
        assert_eq!((span.start.col, span.end.col), (2, 9));
        let ExprKind::Binary(_, left, _) = parsed.kind else {
            panic!("expected binary");
        };
        let left_span = left.span.unwrap();
        assert_eq!((left_span.start.col, left_span.end.col), (2, 5));
    }

    #[test]
    fn test_statements() {
        let parsed = program(
            "var x = 1;\nfor (var k in o) { if (k) continue; else break; }\nfunction f(a, b) { return a / b; }\nswitch (x) { case 1: x; default: y; }\ntry { t(); } catch (e) { } finally { }\nouter: while (1) { do { break outer; } while (0); }\n",
        )
        .unwrap();
        let kinds: Vec<&str> = parsed
            .body
            .iter()
            .map(|s| match s.kind {
                StmtKind::Var(_) => "var",
                StmtKind::ForIn { .. } => "for-in",
                StmtKind::Defun(_) => "defun",
                StmtKind::Switch { .. } => "switch",
                StmtKind::Try { .. } => "try",
                StmtKind::Label(..) => "label",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["var", "for-in", "defun", "switch", "try", "label"]);
    }

    #[test]
    fn test_regex_at_statement_start() {
        let parsed = program("/ab+c/g.test(s);").unwrap();
        let StmtKind::Expression(ref e) = parsed.body[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Call(ref callee, _) = e.kind else {
            panic!("expected call");
        };
        let ExprKind::Dot(ref base, _) = callee.kind else {
            panic!("expected dot");
        };
        assert_eq!(base.kind, ExprKind::Regexp { pattern: "ab+c".into(), flags: "g".into() });
    }

    #[test]
    fn test_statement_errors() {
        assert_eq!(program("return 1;").unwrap_err().message, "'return' outside of function");
        assert_eq!(program("break;").unwrap_err().message, "break not inside a loop or switch");
        assert_eq!(program("1 = 2;").unwrap_err().message, "Invalid assignment");
        assert_eq!(program("a++ ++;").unwrap_err().kind, ErrorKind::InvalidAssignment);
        assert_eq!(program("x = 1").unwrap_err().kind, ErrorKind::UnexpectedEof);
        assert_eq!(program("try { }").unwrap_err().message, "Missing catch/finally blocks");
    }

    #[test]
    fn test_automatic_semicolons_when_lenient() {
        let options = ParseOptions::default().with_positions(false);
        let parsed = Grammar::new("a = 1\nb = 2\n", false, options).unwrap().program().unwrap();
        assert_eq!(parsed.body.len(), 2);
    }
}
