use super::value::Value;
use super::{Scope, Session};
use crate::ast::{Atom, BinaryOp, Expr, ExprKind, Property, UnaryOp};
use crate::error::{ErrorKind, RenderError};
use crate::generate::SourceGenerator;
use crate::transform::restriction;
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use indexmap::IndexMap;
use std::rc::Rc;

impl Session<'_> {
    /// Evaluate a template expression
    pub(super) fn evaluate<'a>(&'a self, expr: &'a Expr, scope: &'a Scope<'a>) -> LocalBoxFuture<'a, Result<Value, RenderError>> {
        async move {
            scope.frame.save_token(expr.span);
            if let Some(message) = restriction(&expr.kind) {
                return Err(self.error(scope, ErrorKind::DisallowedExpression, message));
            }
            match &expr.kind {
                ExprKind::Num(n) => Ok(Value::Number(*n)),
                ExprKind::String(s) => Ok(Value::String(s.clone())),
                ExprKind::Atom(atom) => Ok(match atom {
                    Atom::True => Value::Bool(true),
                    Atom::False => Value::Bool(false),
                    Atom::Null => Value::Null,
                    Atom::Undefined => Value::Undefined,
                }),
                ExprKind::Name(name) => self.resolve(name, scope).await,
                ExprKind::Array(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.evaluate(item, scope).await?);
                    }
                    Ok(Value::Array(Rc::new(values)))
                }
                ExprKind::Object(properties) => {
                    let mut map = IndexMap::new();
                    for property in properties {
                        match property {
                            Property::Init { key, value } => {
                                let value = self.evaluate(value, scope).await?;
                                map.insert(key.clone(), value);
                            }
                            Property::Get { .. } | Property::Set { .. } => {
                                let message = "functions are not allowed within templates";
                                return Err(self.error(scope, ErrorKind::DisallowedExpression, message));
                            }
                        }
                    }
                    Ok(Value::Object(Rc::new(map)))
                }
                ExprKind::Dot(base, property) => {
                    let base = self.evaluate(base, scope).await?;
                    self.member(base, property, scope).await
                }
                ExprKind::Sub(base, property) => {
                    let base = self.evaluate(base, scope).await?;
                    let key = self.evaluate(property, scope).await?.to_display_string();
                    self.member(base, &key, scope).await
                }
                ExprKind::Call(callee, args) => {
                    let function = self.evaluate(callee, scope).await?;
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(self.evaluate(arg, scope).await?);
                    }
                    scope.frame.save_token(expr.span);
                    match function {
                        Value::Function(function) => function.call(&values).map_err(|e| self.collaborator_error(scope, e)),
                        _ => {
                            let message = format!("{} is not a function", SourceGenerator::new().generate_expression(callee));
                            Err(self.error(scope, ErrorKind::NotCallable, message))
                        }
                    }
                }
                ExprKind::UnaryPrefix(op, operand) => {
                    let value = self.evaluate(operand, scope).await?;
                    match op {
                        UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                        UnaryOp::Neg => Ok(Value::Number(-value.to_number())),
                        UnaryOp::Plus => Ok(Value::Number(value.to_number())),
                        _ => Err(self.unsupported(scope, op.as_str())),
                    }
                }
                ExprKind::Binary(BinaryOp::And, left, right) => {
                    let left = self.evaluate(left, scope).await?;
                    if !left.truthy() {
                        return Ok(left);
                    }
                    self.evaluate(right, scope).await
                }
                ExprKind::Binary(BinaryOp::Or, left, right) => {
                    let left = self.evaluate(left, scope).await?;
                    if left.truthy() {
                        return Ok(left);
                    }
                    self.evaluate(right, scope).await
                }
                ExprKind::Binary(op, left, right) => {
                    let left = self.evaluate(left, scope).await?;
                    let right = self.evaluate(right, scope).await?;
                    binary(*op, &left, &right).ok_or_else(|| self.unsupported(scope, op.as_str()))
                }
                ExprKind::Conditional(test, yes, no) => {
                    if self.evaluate(test, scope).await?.truthy() {
                        self.evaluate(yes, scope).await
                    } else {
                        self.evaluate(no, scope).await
                    }
                }
                // Rejected by `restriction` above
                ExprKind::Regexp { .. }
                | ExprKind::New(..)
                | ExprKind::UnaryPostfix(..)
                | ExprKind::Assign(..)
                | ExprKind::Seq(..)
                | ExprKind::Function(_) => Err(self.unsupported(scope, "expression")),
            }
        }
        .boxed_local()
    }

    /// Look a name up through the scope chain: locals first, then the data
    async fn resolve(&self, name: &str, scope: &Scope<'_>) -> Result<Value, RenderError> {
        for current in scope.chain() {
            let frame = &current.frame;
            if let Some(value) = frame.local(name) {
                return Ok(value);
            }
            match &frame.data {
                Value::Dynamic(lookup) => {
                    let value = lookup.get(name).await.map_err(|e| self.collaborator_error(scope, e))?;
                    if !value.is_undefined() {
                        return Ok(value);
                    }
                }
                data => {
                    if let Some(value) = data.own_property(name) {
                        return Ok(value);
                    }
                }
            }
        }
        Err(self.error(scope, ErrorKind::UnresolvedName, format!("cannot resolve name '{}'", name)))
    }

    async fn member(&self, base: Value, key: &str, scope: &Scope<'_>) -> Result<Value, RenderError> {
        match &base {
            Value::Undefined | Value::Null => {
                let message = format!("cannot read property '{}' of {}", key, base.to_display_string());
                Err(self.error(scope, ErrorKind::NotAnObject, message))
            }
            Value::Dynamic(lookup) => lookup.get(key).await.map_err(|e| self.collaborator_error(scope, e)),
            _ => Ok(base.own_property(key).unwrap_or_default()),
        }
    }

    fn unsupported(&self, scope: &Scope<'_>, what: &str) -> RenderError {
        self.error(scope, ErrorKind::DisallowedExpression, format!("unsupported {} in template", what))
    }
}

/// Apply an allowed binary operator; `None` for operators templates reject
fn binary(op: BinaryOp, left: &Value, right: &Value) -> Option<Value> {
    let value = match op {
        BinaryOp::Eq => Value::Bool(left.strict_equals(right)),
        BinaryOp::Ne => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Add => {
            let (left, right) = (left.to_primitive(), right.to_primitive());
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                Value::String(left.to_display_string() + &right.to_display_string())
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Mod => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = match (left.to_primitive(), right.to_primitive()) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(&b)),
                (a, b) => a.to_number().partial_cmp(&b.to_number()),
            };
            Value::Bool(match ordering {
                None => false,
                Some(ordering) => match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Gt => ordering.is_gt(),
                    BinaryOp::Le => ordering.is_le(),
                    _ => ordering.is_ge(),
                },
            })
        }
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(op: BinaryOp, left: serde_json::Value, right: serde_json::Value) -> Value {
        binary(op, &Value::from(left), &Value::from(right)).unwrap()
    }

    #[test]
    fn test_addition_and_concatenation() {
        assert_eq!(eval(BinaryOp::Add, json!(1), json!(2)), Value::Number(3.0));
        assert_eq!(eval(BinaryOp::Add, json!("a"), json!(1)), Value::from("a1"));
        assert_eq!(eval(BinaryOp::Add, json!([1, 2]), json!(3)), Value::from("1,23"));
        assert_eq!(eval(BinaryOp::Add, json!(true), json!(null)), Value::Number(1.0));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval(BinaryOp::Sub, json!("5"), json!(2)), Value::Number(3.0));
        assert_eq!(eval(BinaryOp::Mod, json!(-7), json!(3)), Value::Number(-1.0));
        assert_eq!(eval(BinaryOp::Div, json!(1), json!(0)), Value::Number(f64::INFINITY));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval(BinaryOp::Lt, json!("10"), json!("9")), Value::Bool(true));
        assert_eq!(eval(BinaryOp::Lt, json!(10), json!("9")), Value::Bool(false));
        assert_eq!(eval(BinaryOp::Ge, json!(null), json!(0)), Value::Bool(true));
        assert_eq!(eval(BinaryOp::Le, json!("x"), json!(1)), Value::Bool(false));
    }

    #[test]
    fn test_equality_does_not_coerce() {
        assert_eq!(eval(BinaryOp::Eq, json!(1), json!("1")), Value::Bool(false));
        assert_eq!(eval(BinaryOp::Ne, json!(null), json!(null)), Value::Bool(false));
        assert_eq!(eval(BinaryOp::Eq, json!({}), json!({})), Value::Bool(false));
    }

    #[test]
    fn test_rejected_operators_have_no_value() {
        assert!(binary(BinaryOp::BitAnd, &Value::Number(1.0), &Value::Number(1.0)).is_none());
        assert!(binary(BinaryOp::StrictEq, &Value::Null, &Value::Null).is_none());
    }
}
