use super::value::Value;
use crate::parser::Span;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// One level of the scope chain
pub struct Frame {
    pub data: Value,
    locals: RefCell<HashMap<String, Value>>,
    /// Set on frames that render a whole template
    template: Option<String>,
    /// `{{layout}}` declared while rendering this template
    layout: RefCell<Option<(String, Option<Span>)>>,
    /// Position of the construct most recently evaluated in this frame
    last_token: Cell<Option<Span>>,
}

impl Frame {
    /// Frame for a template render, exposing its data as `$data`
    pub fn template(name: &str, data: Value) -> Self {
        Self {
            template: Some(name.to_string()),
            ..Self::item(data.clone())
        }
        .with_local("$data", data)
    }

    /// Frame for one iteration of `{{each}}`
    pub fn item(data: Value) -> Self {
        Self {
            data,
            locals: RefCell::new(HashMap::new()),
            template: None,
            layout: RefCell::new(None),
            last_token: Cell::new(None),
        }
    }

    pub fn with_local(self, name: &str, value: Value) -> Self {
        self.set_local(name, value);
        self
    }

    pub fn set_local(&self, name: &str, value: Value) {
        self.locals.borrow_mut().insert(name.to_string(), value);
    }

    pub fn local(&self, name: &str) -> Option<Value> {
        self.locals.borrow().get(name).cloned()
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn save_token(&self, span: Option<Span>) {
        if span.is_some() {
            self.last_token.set(span);
        }
    }

    pub fn last_token(&self) -> Option<Span> {
        self.last_token.get()
    }

    pub fn set_layout(&self, name: String, origin: Option<Span>) {
        *self.layout.borrow_mut() = Some((name, origin));
    }

    pub fn take_layout(&self) -> Option<(String, Option<Span>)> {
        self.layout.borrow_mut().take()
    }
}

/// Immutable scope chain. A child lives on the stack of whoever renders
/// with it, so it is gone as soon as that returns, error or not.
pub struct Scope<'p> {
    pub frame: Frame,
    parent: Option<&'p Scope<'p>>,
    /// Construct in the parent that opened this scope
    origin: Option<Span>,
}

impl<'p> Scope<'p> {
    pub fn root(frame: Frame) -> Self {
        Self { frame, parent: None, origin: None }
    }

    pub fn child<'a>(&'a self, frame: Frame, origin: Option<Span>) -> Scope<'a> {
        Scope { frame, parent: Some(self), origin }
    }

    pub fn origin(&self) -> Option<Span> {
        self.origin
    }

    /// This scope and its ancestors, innermost first
    pub fn chain(&self) -> impl Iterator<Item = &Scope<'p>> {
        std::iter::successors(Some(self), |scope| scope.parent)
    }

    /// Nearest frame that renders a template
    pub fn template_frame(&self) -> Option<&Frame> {
        self.chain().map(|scope| &scope.frame).find(|frame| frame.template.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Position;

    #[test]
    fn test_chain_order_and_template_frame() {
        let root = Scope::root(Frame::template("index", Value::Null));
        let item = root.child(Frame::item(Value::Number(1.0)).with_local("$index", Value::Number(0.0)), None);
        let names: Vec<Option<&str>> = item.chain().map(|s| s.frame.template_name()).collect();
        assert_eq!(names, vec![None, Some("index")]);
        assert_eq!(item.template_frame().and_then(|f| f.template_name()), Some("index"));
        assert_eq!(root.frame.local("$data"), Some(Value::Null));
        assert_eq!(item.frame.local("$data"), None);
    }

    #[test]
    fn test_save_token_keeps_last_known_position() {
        let frame = Frame::item(Value::Undefined);
        let span = Span::point(Position { byte: 3, line: 0, col: 3 });
        frame.save_token(Some(span));
        frame.save_token(None);
        assert_eq!(frame.last_token(), Some(span));
    }
}
