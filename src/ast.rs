use crate::parser::tokenizer::Span;
use serde::{Deserialize, Serialize};

/// A parsed template: a sequence of chunks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "template")]
pub struct Template {
    pub chunks: Vec<Chunk>,
}

/// A parsed script: the statement grammar's top level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "toplevel")]
pub struct Program {
    pub body: Vec<Stmt>,
}

// =============================================================================
// Chunks
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub kind: ChunkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChunkKind {
    /// Literal text
    #[serde(rename = "html")]
    Html(String),
    /// `${expr}`, escaped on output
    #[serde(rename = "tmpl-echo")]
    Echo(Expr),
    /// `{{tmpl(args) name}}`
    #[serde(rename = "tmpl")]
    Include { args: Option<Vec<Expr>>, name: Expr },
    /// `{{each(index, value, key) collection}} ... {{/each}}`
    #[serde(rename = "tmpl-each")]
    Each {
        bindings: Option<Vec<String>>,
        collection: Expr,
        body: Vec<Chunk>,
    },
    /// `{{if c}} ... {{else c2}} ... {{else}} ... {{/if}}`
    #[serde(rename = "tmpl-if")]
    If {
        condition: Expr,
        then_branch: Vec<Chunk>,
        elif_branches: Vec<(Expr, Vec<Chunk>)>,
        else_branch: Option<Vec<Chunk>>,
    },
    /// `{{html expr}}`, written unescaped
    #[serde(rename = "tmpl-html")]
    RawHtml(Expr),
    /// `{{layout expr}}`
    #[serde(rename = "tmpl-layout")]
    Layout(Expr),
    /// `{{var a = e1, b = e2}}`
    #[serde(rename = "tmpl-var")]
    Var(Vec<VarDef>),
}

impl ChunkKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChunkKind::Html(_) => "html",
            ChunkKind::Echo(_) => "tmpl-echo",
            ChunkKind::Include { .. } => "tmpl",
            ChunkKind::Each { .. } => "tmpl-each",
            ChunkKind::If { .. } => "tmpl-if",
            ChunkKind::RawHtml(_) => "tmpl-html",
            ChunkKind::Layout(_) => "tmpl-layout",
            ChunkKind::Var(_) => "tmpl-var",
        }
    }
}

/// Names bound by `{{each}}` when no binding list is given
pub const DEFAULT_EACH_BINDINGS: [&str; 3] = ["$index", "$value", "$key"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDef {
    pub name: String,
    pub value: Option<Expr>,
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Option<Span>) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExprKind {
    Num(f64),
    String(String),
    Name(String),
    Atom(Atom),
    Regexp { pattern: String, flags: String },
    Array(Vec<Expr>),
    Object(Vec<Property>),
    Dot(Box<Expr>, String),
    Sub(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    New(Box<Expr>, Vec<Expr>),
    UnaryPrefix(UnaryOp, Box<Expr>),
    UnaryPostfix(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `None` is plain `=`, otherwise the compound operator
    Assign(Option<BinaryOp>, Box<Expr>, Box<Expr>),
    Seq(Box<Expr>, Box<Expr>),
    Function(Box<Function>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Atom {
    True,
    False,
    Null,
    Undefined,
}

impl Atom {
    pub fn from_str(word: &str) -> Option<Self> {
        match word {
            "true" => Some(Atom::True),
            "false" => Some(Atom::False),
            "null" => Some(Atom::Null),
            "undefined" => Some(Atom::Undefined),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Atom::True => "true",
            Atom::False => "false",
            Atom::Null => "null",
            Atom::Undefined => "undefined",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Property {
    Init { key: String, value: Expr },
    Get { key: String, function: Function },
    Set { key: String, function: Function },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "||")]
    Or,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "|")]
    BitOr,
    #[serde(rename = "^")]
    BitXor,
    #[serde(rename = "&")]
    BitAnd,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "===")]
    StrictEq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "!==")]
    StrictNe,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "instanceof")]
    InstanceOf,
    #[serde(rename = ">>")]
    Shr,
    #[serde(rename = "<<")]
    Shl,
    #[serde(rename = ">>>")]
    UShr,
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 23] = [
        BinaryOp::Or,
        BinaryOp::And,
        BinaryOp::BitOr,
        BinaryOp::BitXor,
        BinaryOp::BitAnd,
        BinaryOp::Eq,
        BinaryOp::StrictEq,
        BinaryOp::Ne,
        BinaryOp::StrictNe,
        BinaryOp::Lt,
        BinaryOp::Gt,
        BinaryOp::Le,
        BinaryOp::Ge,
        BinaryOp::In,
        BinaryOp::InstanceOf,
        BinaryOp::Shr,
        BinaryOp::Shl,
        BinaryOp::UShr,
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Mod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Eq => "==",
            BinaryOp::StrictEq => "===",
            BinaryOp::Ne => "!=",
            BinaryOp::StrictNe => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::InstanceOf => "instanceof",
            BinaryOp::Shr => ">>",
            BinaryOp::Shl => "<<",
            BinaryOp::UShr => ">>>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }

    pub fn from_str(op: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == op)
    }

    /// Binding power, 1 (`||`) through 10 (multiplicative)
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::BitOr => 3,
            BinaryOp::BitXor => 4,
            BinaryOp::BitAnd => 5,
            BinaryOp::Eq | BinaryOp::StrictEq | BinaryOp::Ne | BinaryOp::StrictNe => 6,
            BinaryOp::Lt
            | BinaryOp::Gt
            | BinaryOp::Le
            | BinaryOp::Ge
            | BinaryOp::In
            | BinaryOp::InstanceOf => 7,
            BinaryOp::Shr | BinaryOp::Shl | BinaryOp::UShr => 8,
            BinaryOp::Add | BinaryOp::Sub => 9,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 10,
        }
    }

    /// Operator for a compound assignment such as `+=`
    pub fn from_assignment(op: &str) -> Option<Self> {
        let base = op.strip_suffix('=')?;
        match base {
            "+" | "-" | "*" | "/" | "%" | ">>" | "<<" | ">>>" | "|" | "^" | "&" => Self::from_str(base),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "typeof")]
    Typeof,
    #[serde(rename = "void")]
    Void,
    #[serde(rename = "delete")]
    Delete,
    #[serde(rename = "--")]
    Decrement,
    #[serde(rename = "++")]
    Increment,
    #[serde(rename = "!")]
    Not,
    #[serde(rename = "~")]
    BitNot,
    #[serde(rename = "-")]
    Neg,
    #[serde(rename = "+")]
    Plus,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Typeof => "typeof",
            UnaryOp::Void => "void",
            UnaryOp::Delete => "delete",
            UnaryOp::Decrement => "--",
            UnaryOp::Increment => "++",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
        }
    }

    pub fn prefix(op: &str) -> Option<Self> {
        match op {
            "typeof" => Some(UnaryOp::Typeof),
            "void" => Some(UnaryOp::Void),
            "delete" => Some(UnaryOp::Delete),
            "--" => Some(UnaryOp::Decrement),
            "++" => Some(UnaryOp::Increment),
            "!" => Some(UnaryOp::Not),
            "~" => Some(UnaryOp::BitNot),
            "-" => Some(UnaryOp::Neg),
            "+" => Some(UnaryOp::Plus),
            _ => None,
        }
    }

    pub fn postfix(op: &str) -> Option<Self> {
        match op {
            "--" => Some(UnaryOp::Decrement),
            "++" => Some(UnaryOp::Increment),
            _ => None,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, UnaryOp::Increment | UnaryOp::Decrement)
    }
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StmtKind {
    Block(Vec<Stmt>),
    #[serde(rename = "stat")]
    Expression(Expr),
    Var(Vec<VarDef>),
    Const(Vec<VarDef>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        init: ForInit,
        object: Expr,
        body: Box<Stmt>,
    },
    While { condition: Expr, body: Box<Stmt> },
    Do { body: Box<Stmt>, condition: Expr },
    Switch { discriminant: Expr, cases: Vec<SwitchCase> },
    Try {
        body: Vec<Stmt>,
        catch: Option<(String, Vec<Stmt>)>,
        finally: Option<Vec<Stmt>>,
    },
    Defun(Function),
    Return(Option<Expr>),
    Break(Option<String>),
    Continue(Option<String>),
    Label(String, Box<Stmt>),
    Throw(Expr),
    With(Expr, Box<Stmt>),
    Debugger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForInit {
    Var(Vec<VarDef>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` for `default:`
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// Format a number the way the scripting language prints it
pub fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{}", value);
    }
    // Exponent form: Rust prints `1e21`, the scripting language `1e+21`
    let formatted = format!("{:e}", value);
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
        _ => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1.5e-9), "1.5e-9");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(123456789012.0), "123456789012");
    }

    #[test]
    fn test_operator_tables() {
        assert_eq!(BinaryOp::from_str(">>>"), Some(BinaryOp::UShr));
        assert_eq!(BinaryOp::from_str("="), None);
        assert_eq!(BinaryOp::from_assignment("+="), Some(BinaryOp::Add));
        assert_eq!(BinaryOp::from_assignment(">>>="), Some(BinaryOp::UShr));
        assert_eq!(BinaryOp::from_assignment("=="), None);
        assert_eq!(BinaryOp::from_assignment("<="), None);
        assert!(BinaryOp::Mul.precedence() > BinaryOp::Add.precedence());
        assert!(BinaryOp::And.precedence() > BinaryOp::Or.precedence());
    }

    #[test]
    fn test_serialized_tags() {
        let chunk = Chunk {
            kind: ChunkKind::Echo(Expr::new(
                ExprKind::Binary(
                    BinaryOp::Add,
                    Box::new(Expr::new(ExprKind::Name("a".into()), None)),
                    Box::new(Expr::new(ExprKind::Num(1.0), None)),
                ),
                None,
            )),
            span: None,
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "kind": {"tmpl-echo": {"kind": {"binary": ["+", {"kind": {"name": "a"}}, {"kind": {"num": 1.0}}]}}}
            })
        );
        let back: Chunk = serde_json::from_value(json).unwrap();
        assert_eq!(back, chunk);
    }
}
