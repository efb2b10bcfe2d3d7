use super::{TransformMetadata, Violation, Visitor, chunk_expressions, walk_expression};
use crate::ast::{BinaryOp, Chunk, ExprKind, UnaryOp};

/// Why a template may not evaluate this construct, if it may not.
///
/// Only the node itself is inspected, never its operands, so the renderer
/// can reject before evaluating anything.
pub fn restriction(kind: &ExprKind) -> Option<String> {
    let message = match kind {
        ExprKind::Binary(op, ..) => match op {
            BinaryOp::StrictEq => {
                "'===' operator not allowed in templates. Note that '==' is 'strictly equals' (non-casting).".to_string()
            }
            BinaryOp::StrictNe => {
                "'!==' operator not allowed in templates. Note that '!=' is 'strictly not equal' (non-casting).".to_string()
            }
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                format!("bitwise operator '{}' not allowed in templates", op.as_str())
            }
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => {
                format!("bit shift operator '{}' not allowed in templates", op.as_str())
            }
            BinaryOp::In | BinaryOp::InstanceOf => format!("'{}' operator not allowed in templates", op.as_str()),
            _ => return None,
        },
        ExprKind::UnaryPrefix(op, _) | ExprKind::UnaryPostfix(op, _) => match op {
            UnaryOp::Increment | UnaryOp::Decrement => "assignment is not allowed within templates".to_string(),
            UnaryOp::BitNot => "bitwise operator '~' not allowed in templates".to_string(),
            UnaryOp::Typeof | UnaryOp::Void | UnaryOp::Delete => {
                format!("'{}' operator not allowed in templates", op.as_str())
            }
            UnaryOp::Not | UnaryOp::Neg | UnaryOp::Plus => return None,
        },
        ExprKind::Assign(..) => "assignment is not allowed within templates".to_string(),
        ExprKind::Function(_) => "functions are not allowed within templates".to_string(),
        ExprKind::New(..) => "'new' is not allowed within templates".to_string(),
        ExprKind::Seq(..) => "comma expressions are not allowed within templates".to_string(),
        ExprKind::Regexp { .. } => "regular expressions are not allowed within templates".to_string(),
        _ => return None,
    };
    Some(message)
}

/// Reports every construct the renderer would reject, without rendering
pub struct OperatorAuditPlugin;

impl Visitor for OperatorAuditPlugin {
    fn enter(&mut self, chunk: &Chunk, metadata: &mut TransformMetadata) -> bool {
        for expr in chunk_expressions(chunk) {
            walk_expression(expr, &mut |e| {
                if let Some(message) = restriction(&e.kind) {
                    metadata.violations.push(Violation { message, span: e.span });
                }
            });
        }
        true
    }
}
