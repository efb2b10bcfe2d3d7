use super::{GenerateOptions, GenerateResult, Generator, Output};
use crate::ast::*;
use crate::parser::chars;

// Binding strength of printed expressions; operands weaker than their
// context are parenthesized
const SEQUENCE: u8 = 0;
const ASSIGNMENT: u8 = 1;
const CONDITIONAL: u8 = 2;
const BINARY_BASE: u8 = 3;
const PREFIX: u8 = 14;
const POSTFIX: u8 = 15;
const MEMBER: u8 = 16;
const PRIMARY: u8 = 17;

/// Prints templates, expressions and scripts back to canonical source text.
///
/// Output reparses to the same AST (ignoring positions). Parentheses are only
/// added where precedence requires them, except around regex literals.
#[derive(Debug, Clone, Copy)]
pub struct SourceGenerator;

impl SourceGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate_expression(&self, expr: &Expr) -> String {
        self.expression(expr, SEQUENCE)
    }

    pub fn generate_program(&self, program: &Program, options: &GenerateOptions) -> GenerateResult {
        let mut output = Output::new(&options.indent, options.include_mappings);
        for (index, stmt) in program.body.iter().enumerate() {
            if index > 0 {
                output.newline();
            }
            self.statement(stmt, &mut output);
        }
        let (code, mappings) = output.finish();
        GenerateResult { code, mappings }
    }

    // =========================================================================
    // Chunks
    // =========================================================================

    fn chunks(&self, chunks: &[Chunk], output: &mut Output) {
        for (index, chunk) in chunks.iter().enumerate() {
            output.map(chunk.span);
            match &chunk.kind {
                ChunkKind::Html(text) => {
                    let after_text = index > 0 && matches!(chunks[index - 1].kind, ChunkKind::Html(_));
                    if after_text || needs_verbatim(text) {
                        output.push("{{verbatim}}");
                        output.push(text);
                        output.push("{{/verbatim}}");
                    } else {
                        output.push(text);
                    }
                }
                ChunkKind::Echo(expr) => {
                    output.push("${");
                    output.push(&self.expression(expr, SEQUENCE));
                    output.push("}");
                }
                ChunkKind::Include { args, name } => {
                    output.push("{{tmpl");
                    if let Some(args) = args {
                        output.push("(");
                        output.push(&self.list(args));
                        output.push(")");
                    }
                    output.push(" ");
                    output.push(&self.expression(name, SEQUENCE));
                    output.push("}}");
                }
                ChunkKind::Each { bindings, collection, body } => {
                    output.push("{{each");
                    if let Some(bindings) = bindings {
                        output.push("(");
                        output.push(&bindings.join(", "));
                        output.push(")");
                    }
                    output.push(" ");
                    output.push(&self.expression(collection, SEQUENCE));
                    output.push("}}");
                    self.chunks(body, output);
                    output.push("{{/each}}");
                }
                ChunkKind::If { condition, then_branch, elif_branches, else_branch } => {
                    output.push("{{if ");
                    output.push(&self.expression(condition, SEQUENCE));
                    output.push("}}");
                    self.chunks(then_branch, output);
                    for (condition, body) in elif_branches {
                        output.push("{{else ");
                        output.push(&self.expression(condition, SEQUENCE));
                        output.push("}}");
                        self.chunks(body, output);
                    }
                    if let Some(body) = else_branch {
                        output.push("{{else}}");
                        self.chunks(body, output);
                    }
                    output.push("{{/if}}");
                }
                ChunkKind::RawHtml(expr) => {
                    output.push("{{html ");
                    output.push(&self.expression(expr, SEQUENCE));
                    output.push("}}");
                }
                ChunkKind::Layout(expr) => {
                    output.push("{{layout ");
                    output.push(&self.expression(expr, SEQUENCE));
                    output.push("}}");
                }
                ChunkKind::Var(defs) => {
                    output.push("{{var ");
                    output.push(&self.vardefs(defs));
                    output.push("}}");
                }
            }
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expression(&self, expr: &Expr, min: u8) -> String {
        let text = match &expr.kind {
            ExprKind::Num(n) => number_literal(*n),
            ExprKind::String(s) => quote(s),
            ExprKind::Name(name) => name.clone(),
            ExprKind::Atom(atom) => atom.as_str().to_string(),
            ExprKind::Regexp { pattern, flags } => format!("(/{}/{})", pattern, flags),
            ExprKind::Array(items) => format!("[{}]", self.list(items)),
            ExprKind::Object(properties) => self.object(properties),
            ExprKind::Function(function) => {
                let mut output = Output::new("  ", false);
                self.function(function, &mut output);
                output.finish().0
            }
            ExprKind::Dot(base, property) => {
                let base_text = match base.kind {
                    ExprKind::Num(_) => format!("({})", self.expression(base, SEQUENCE)),
                    _ => self.expression(base, MEMBER),
                };
                format!("{}.{}", base_text, property)
            }
            ExprKind::Sub(base, property) => {
                format!("{}[{}]", self.expression(base, MEMBER), self.expression(property, SEQUENCE))
            }
            ExprKind::Call(callee, args) => {
                format!("{}({})", self.expression(callee, MEMBER), self.list(args))
            }
            ExprKind::New(constructor, args) => {
                let constructor_text = if has_call(constructor) {
                    format!("({})", self.expression(constructor, SEQUENCE))
                } else {
                    self.expression(constructor, MEMBER)
                };
                format!("new {}({})", constructor_text, self.list(args))
            }
            ExprKind::UnaryPrefix(op, operand) => {
                let operand_text = self.expression(operand, PREFIX);
                let word = op.as_str().chars().all(|c| c.is_ascii_alphabetic());
                let same_sign = (matches!(op, UnaryOp::Neg | UnaryOp::Decrement) && operand_text.starts_with('-'))
                    || (matches!(op, UnaryOp::Plus | UnaryOp::Increment) && operand_text.starts_with('+'));
                if word || same_sign {
                    format!("{} {}", op.as_str(), operand_text)
                } else {
                    format!("{}{}", op.as_str(), operand_text)
                }
            }
            ExprKind::UnaryPostfix(op, operand) => {
                format!("{}{}", self.expression(operand, MEMBER), op.as_str())
            }
            ExprKind::Binary(op, left, right) => {
                let prec = BINARY_BASE + op.precedence();
                format!(
                    "{} {} {}",
                    self.expression(left, prec),
                    op.as_str(),
                    self.expression(right, prec + 1)
                )
            }
            ExprKind::Conditional(test, yes, no) => format!(
                "{} ? {} : {}",
                self.expression(test, BINARY_BASE),
                self.expression(yes, ASSIGNMENT),
                self.expression(no, ASSIGNMENT)
            ),
            ExprKind::Assign(op, target, value) => {
                let op = match op {
                    Some(op) => format!("{}=", op.as_str()),
                    None => "=".to_string(),
                };
                format!(
                    "{} {} {}",
                    self.expression(target, BINARY_BASE),
                    op,
                    self.expression(value, ASSIGNMENT)
                )
            }
            ExprKind::Seq(first, rest) => {
                format!("{}, {}", self.expression(first, ASSIGNMENT), self.expression(rest, SEQUENCE))
            }
        };
        if precedence(expr) < min {
            format!("({})", text)
        } else {
            text
        }
    }

    fn list(&self, items: &[Expr]) -> String {
        items
            .iter()
            .map(|item| self.expression(item, ASSIGNMENT))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn object(&self, properties: &[Property]) -> String {
        if properties.is_empty() {
            return "{}".to_string();
        }
        let entries: Vec<String> = properties
            .iter()
            .map(|property| match property {
                Property::Init { key, value } => {
                    format!("{}: {}", property_key(key), self.expression(value, ASSIGNMENT))
                }
                Property::Get { key, function } | Property::Set { key, function } => {
                    let kind = if matches!(property, Property::Get { .. }) { "get" } else { "set" };
                    let mut output = Output::new("  ", false);
                    self.function_tail(function, &mut output);
                    format!("{} {}{}", kind, key, output.finish().0)
                }
            })
            .collect();
        format!("{{{}}}", entries.join(", "))
    }

    fn vardefs(&self, defs: &[VarDef]) -> String {
        defs.iter()
            .map(|def| match &def.value {
                Some(value) => format!("{} = {}", def.name, self.expression(value, ASSIGNMENT)),
                None => def.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn function(&self, function: &Function, output: &mut Output) {
        output.push("function");
        if let Some(name) = &function.name {
            output.push(" ");
            output.push(name);
        }
        self.function_tail(function, output);
    }

    /// Parameter list and body
    fn function_tail(&self, function: &Function, output: &mut Output) {
        output.push("(");
        output.push(&function.params.join(", "));
        output.push(") ");
        self.block(&function.body, output);
    }

    fn block(&self, body: &[Stmt], output: &mut Output) {
        if body.is_empty() {
            output.push("{}");
            return;
        }
        output.push("{");
        output.indent();
        for stmt in body {
            output.newline();
            self.statement(stmt, output);
        }
        output.dedent();
        output.newline();
        output.push("}");
    }

    fn statement(&self, stmt: &Stmt, output: &mut Output) {
        output.map(stmt.span);
        match &stmt.kind {
            StmtKind::Block(body) => self.block(body, output),
            StmtKind::Expression(expr) => {
                let text = self.expression(expr, SEQUENCE);
                if text.starts_with('{') || text.starts_with("function") {
                    output.push(&format!("({});", text));
                } else {
                    output.push(&text);
                    output.push(";");
                }
            }
            StmtKind::Var(defs) => output.push(&format!("var {};", self.no_in_vardefs(defs))),
            StmtKind::Const(defs) => output.push(&format!("const {};", self.vardefs(defs))),
            StmtKind::If { condition, then_branch, else_branch } => {
                output.push(&format!("if ({}) ", self.expression(condition, SEQUENCE)));
                self.statement(then_branch, output);
                if let Some(else_branch) = else_branch {
                    output.push(" else ");
                    self.statement(else_branch, output);
                }
            }
            StmtKind::For { init, test, step, body } => {
                output.push("for (");
                match init {
                    Some(ForInit::Var(defs)) => output.push(&format!("var {}", self.no_in_vardefs(defs))),
                    Some(ForInit::Expr(expr)) => output.push(&self.no_in(expr)),
                    None => {}
                }
                output.push(";");
                if let Some(test) = test {
                    output.push(" ");
                    output.push(&self.expression(test, SEQUENCE));
                }
                output.push(";");
                if let Some(step) = step {
                    output.push(" ");
                    output.push(&self.expression(step, SEQUENCE));
                }
                output.push(") ");
                self.statement(body, output);
            }
            StmtKind::ForIn { init, object, body } => {
                let init = match init {
                    ForInit::Var(defs) => format!("var {}", self.no_in_vardefs(defs)),
                    ForInit::Expr(expr) => self.no_in(expr),
                };
                output.push(&format!("for ({} in {}) ", init, self.expression(object, SEQUENCE)));
                self.statement(body, output);
            }
            StmtKind::While { condition, body } => {
                output.push(&format!("while ({}) ", self.expression(condition, SEQUENCE)));
                self.statement(body, output);
            }
            StmtKind::Do { body, condition } => {
                output.push("do ");
                self.statement(body, output);
                output.push(&format!(" while ({});", self.expression(condition, SEQUENCE)));
            }
            StmtKind::Switch { discriminant, cases } => {
                output.push(&format!("switch ({}) {{", self.expression(discriminant, SEQUENCE)));
                for case in cases {
                    output.newline();
                    match &case.test {
                        Some(test) => output.push(&format!("case {}:", self.expression(test, SEQUENCE))),
                        None => output.push("default:"),
                    }
                    output.indent();
                    for stmt in &case.body {
                        output.newline();
                        self.statement(stmt, output);
                    }
                    output.dedent();
                }
                output.newline();
                output.push("}");
            }
            StmtKind::Try { body, catch, finally } => {
                output.push("try ");
                self.block(body, output);
                if let Some((name, handler)) = catch {
                    output.push(&format!(" catch ({}) ", name));
                    self.block(handler, output);
                }
                if let Some(finally) = finally {
                    output.push(" finally ");
                    self.block(finally, output);
                }
            }
            StmtKind::Defun(function) => self.function(function, output),
            StmtKind::Return(value) => match value {
                Some(value) => output.push(&format!("return {};", self.expression(value, SEQUENCE))),
                None => output.push("return;"),
            },
            StmtKind::Break(label) => output.push(&jump("break", label)),
            StmtKind::Continue(label) => output.push(&jump("continue", label)),
            StmtKind::Label(label, body) => {
                output.push(&format!("{}: ", label));
                self.statement(body, output);
            }
            StmtKind::Throw(value) => output.push(&format!("throw {};", self.expression(value, SEQUENCE))),
            StmtKind::With(object, body) => {
                output.push(&format!("with ({}) ", self.expression(object, SEQUENCE)));
                self.statement(body, output);
            }
            StmtKind::Debugger => output.push("debugger;"),
        }
    }

    /// For-loop heads cannot contain a bare `in`
    fn no_in(&self, expr: &Expr) -> String {
        let text = self.expression(expr, SEQUENCE);
        if contains_in(expr) { format!("({})", text) } else { text }
    }

    fn no_in_vardefs(&self, defs: &[VarDef]) -> String {
        defs.iter()
            .map(|def| match &def.value {
                Some(value) if contains_in(value) => {
                    format!("{} = ({})", def.name, self.expression(value, SEQUENCE))
                }
                Some(value) => format!("{} = {}", def.name, self.expression(value, ASSIGNMENT)),
                None => def.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for SourceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for SourceGenerator {
    fn generate(&self, template: &Template, options: &GenerateOptions) -> GenerateResult {
        let mut output = Output::new(&options.indent, options.include_mappings);
        self.chunks(&template.chunks, &mut output);
        let (code, mappings) = output.finish();
        GenerateResult { code, mappings }
    }
}

fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Seq(..) => SEQUENCE,
        ExprKind::Assign(..) => ASSIGNMENT,
        ExprKind::Conditional(..) => CONDITIONAL,
        ExprKind::Binary(op, ..) => BINARY_BASE + op.precedence(),
        ExprKind::UnaryPrefix(..) => PREFIX,
        ExprKind::UnaryPostfix(..) => POSTFIX,
        ExprKind::Dot(..) | ExprKind::Sub(..) | ExprKind::Call(..) | ExprKind::New(..) => MEMBER,
        _ => PRIMARY,
    }
}

/// Whether a `new` target would capture a call's arguments as its own
fn has_call(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call(..) | ExprKind::New(..) => true,
        ExprKind::Dot(base, _) | ExprKind::Sub(base, _) => has_call(base),
        _ => false,
    }
}

fn contains_in(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Binary(BinaryOp::In, ..) => true,
        ExprKind::Binary(_, left, right)
        | ExprKind::Assign(_, left, right)
        | ExprKind::Seq(left, right) => contains_in(left) || contains_in(right),
        ExprKind::Conditional(test, yes, no) => contains_in(test) || contains_in(yes) || contains_in(no),
        ExprKind::UnaryPrefix(_, operand) | ExprKind::UnaryPostfix(_, operand) => contains_in(operand),
        _ => false,
    }
}

fn jump(keyword: &str, label: &Option<String>) -> String {
    match label {
        Some(label) => format!("{} {};", keyword, label),
        None => format!("{};", keyword),
    }
}

/// Text that the tokenizer would not read back as a single text chunk
fn needs_verbatim(text: &str) -> bool {
    text.is_empty()
        || text.ends_with('$')
        || text.char_indices().any(|(i, _)| chars::marker_at(&text[i..]))
}

fn number_literal(n: f64) -> String {
    if n.is_infinite() {
        return "1e999".to_string();
    }
    number_to_string(n)
}

fn property_key(key: &str) -> String {
    if chars::is_identifier(key) { key.to_string() } else { quote(key) }
}

/// Double-quoted string literal
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\u{b}' => out.push_str("\\v"),
            '\u{2028}' | '\u{2029}' | '\u{feff}' => out.push_str(&format!("\\u{:04x}", ch as u32)),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOptions, Parser, ScriptParser, TemplateParser, parse_expression};

    fn options() -> ParseOptions {
        ParseOptions::default().with_positions(false)
    }

    fn print_expr(source: &str) -> String {
        SourceGenerator::new().generate_expression(&parse_expression(source, options()).unwrap())
    }

    fn assert_template_round_trip(source: &str) -> String {
        let parser = TemplateParser::with_options(options());
        let template = parser.parse(source).unwrap();
        let printed = SourceGenerator::new().generate(&template, &GenerateOptions::default()).code;
        let reparsed = parser.parse(&printed).unwrap();
        assert_eq!(template, reparsed, "printed as {:?}", printed);
        printed
    }

    #[test]
    fn test_minimal_parentheses() {
        assert_eq!(print_expr("(a + b) * c"), "(a + b) * c");
        assert_eq!(print_expr("a + (b * c)"), "a + b * c");
        assert_eq!(print_expr("a - (b - c)"), "a - (b - c)");
        assert_eq!(print_expr("(a, b) ? c : d"), "(a, b) ? c : d");
        assert_eq!(print_expr("-(-a)"), "- -a");
        assert_eq!(print_expr("typeof (a + 1)"), "typeof (a + 1)");
        assert_eq!(print_expr("(1).toFixed(2)"), "(1).toFixed(2)");
        assert_eq!(print_expr("new (f())()"), "new (f())()");
        assert_eq!(print_expr("new a.B"), "new a.B()");
    }

    #[test]
    fn test_literals() {
        assert_eq!(print_expr("[1, 'two', {a: 1, 'b c': null}]"), "[1, \"two\", {a: 1, \"b c\": null}]");
        assert_eq!(print_expr("'\\u0000\\n\"'"), "\"\\u0000\\n\\\"\"");
        assert_eq!(print_expr("0x10 + 1e21"), "16 + 1e+21");
        assert_eq!(print_expr("/a[/]b/gi.test(s)"), "(/a[/]b/gi).test(s)");
    }

    #[test]
    fn test_template_round_trip() {
        let printed = assert_template_round_trip(
            "<ul>{{each(i, v) items}}<li class=\"${i % 2 ? 'odd' : 'even'}\">${v.name}</li>{{/each}}</ul>\
             {{if a && !b}}x{{else c}}y{{else}}z{{/if}}{{tmpl(user) \"row\"}}{{html raw}}{{layout \"base\"}}{{var q = 1, r}}",
        );
        assert!(printed.starts_with("<ul>{{each(i, v) items}}"));
    }

    #[test]
    fn test_text_needing_verbatim() {
        let printed = assert_template_round_trip("a{{verbatim}}${x}{{/verbatim}}b$");
        assert_eq!(printed, "a{{verbatim}}${x}{{/verbatim}}{{verbatim}}b${{/verbatim}}");
        assert_template_round_trip("cost: ${price}$ {{if x}}{{/if}}");
    }

    #[test]
    fn test_program_round_trip() {
        let source = "var a = 1, b;\nfor (var k = (\"x\" in o); k; k++) { if (k) continue; else break; }\n\
                      function f(x) { return {a: x}; }\n({a: 1}).a;\nswitch (a) { case 1: b; default: c; }\n\
                      try { t(); } catch (e) { } finally { f(); }\nouter: do { break outer; } while (0);";
        let parser = ScriptParser::with_options(options());
        let program = parser.parse(source).unwrap();
        let printed = SourceGenerator::new().generate_program(&program, &GenerateOptions::default()).code;
        assert_eq!(parser.parse(&printed).unwrap(), program, "printed as {:?}", printed);
        assert!(printed.contains("function f(x) {\n  return {a: x};\n}"));
    }

    #[test]
    fn test_mappings() {
        let template = TemplateParser::new().parse("a\n${b}").unwrap();
        let result = SourceGenerator::new().generate(&template, &GenerateOptions { include_mappings: true, ..Default::default() });
        assert_eq!(result.mappings.len(), 2);
        assert_eq!((result.mappings[1].src_line, result.mappings[1].gen_line), (1, 1));
    }
}
