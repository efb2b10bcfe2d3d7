use super::stream::ItemStream;
use crate::ast::number_to_string;
use crate::error::BoxError;
use crate::parser::tokenizer::parse_number;
use futures_util::future::LocalBoxFuture;
use std::cell::RefCell;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// A function exposed to templates through the data value
pub trait Callable {
    fn call(&self, args: &[Value]) -> Result<Value, BoxError>;
}

impl<F> Callable for F
where
    F: Fn(&[Value]) -> Result<Value, BoxError>,
{
    fn call(&self, args: &[Value]) -> Result<Value, BoxError> {
        self(args)
    }
}

/// Asynchronous get-by-name, for lazily computed or remotely backed values.
///
/// Returning `Value::Undefined` means "not here": name resolution then
/// continues with the next enclosing frame.
pub trait Lookup {
    fn get<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, Result<Value, BoxError>>;
}

/// Something that can be iterated any number of times
pub trait Iterable {
    fn iterator(&self) -> Box<dyn ItemStream>;
}

/// A stream that may be consumed by a single `{{each}}`
pub struct StreamSlot(RefCell<Option<Box<dyn ItemStream>>>);

impl StreamSlot {
    pub fn take(&self) -> Option<Box<dyn ItemStream>> {
        self.0.borrow_mut().take()
    }
}

/// Runtime value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Rc<Vec<Value>>),
    Object(Rc<IndexMap<String, Value>>),
    Function(Rc<dyn Callable>),
    Dynamic(Rc<dyn Lookup>),
    Iterable(Rc<dyn Iterable>),
    Stream(Rc<StreamSlot>),
}

impl Value {
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Rc::new(items.into_iter().collect()))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(Rc::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()))
    }

    pub fn function(f: impl Fn(&[Value]) -> Result<Value, BoxError> + 'static) -> Self {
        Value::Function(Rc::new(f))
    }

    pub fn dynamic(lookup: impl Lookup + 'static) -> Self {
        Value::Dynamic(Rc::new(lookup))
    }

    pub fn iterable(iterable: impl Iterable + 'static) -> Self {
        Value::Iterable(Rc::new(iterable))
    }

    pub fn stream(stream: impl ItemStream + 'static) -> Self {
        Value::Stream(Rc::new(StreamSlot(RefCell::new(Some(Box::new(stream))))))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
        )
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Dynamic(_) | Value::Iterable(_) | Value::Stream(_) => {
                "object"
            }
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [only] => string_to_number(&only.to_display_string()),
                _ => f64::NAN,
            },
            _ => f64::NAN,
        }
    }

    /// Text written by `${...}` before escaping
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_display_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Function(_) => "function () { [native code] }".to_string(),
            Value::Object(_) | Value::Dynamic(_) | Value::Iterable(_) | Value::Stream(_) => "[object Object]".to_string(),
        }
    }

    /// Non-coercing equality; compound values compare by identity
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            (Value::Dynamic(a), Value::Dynamic(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            (Value::Iterable(a), Value::Iterable(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            (Value::Stream(a), Value::Stream(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Own property of a plain value; `None` when absent
    pub fn own_property(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.get(key).cloned(),
            Value::Array(items) => {
                if key == "length" {
                    return Some(Value::Number(items.len() as f64));
                }
                array_index(key).and_then(|i| items.get(i).cloned())
            }
            Value::String(s) => {
                if key == "length" {
                    return Some(Value::Number(s.chars().count() as f64));
                }
                array_index(key).and_then(|i| s.chars().nth(i)).map(|c| Value::String(c.to_string()))
            }
            _ => None,
        }
    }

    /// Convert to a primitive the way `+` and relational operators do
    pub(crate) fn to_primitive(&self) -> Value {
        if self.is_primitive() { self.clone() } else { Value::String(self.to_display_string()) }
    }
}

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

fn string_to_number(text: &str) -> f64 {
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    if text.is_empty() {
        return 0.0;
    }
    let (sign, digits) = match text.as_bytes()[0] {
        b'-' => (-1.0, &text[1..]),
        b'+' => (1.0, &text[1..]),
        _ => (1.0, text),
    };
    if digits == "Infinity" {
        return sign * f64::INFINITY;
    }
    if digits.starts_with("0x") || digits.starts_with("0X") {
        // Signed hex is not a number
        if sign < 0.0 || digits.len() != text.len() {
            return f64::NAN;
        }
        return parse_number(digits).unwrap_or(f64::NAN);
    }
    let valid = digits.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid || !digits.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return f64::NAN;
    }
    match digits.parse::<f64>() {
        Ok(n) => sign * n,
        Err(_) => f64::NAN,
    }
}

impl PartialEq for Value {
    /// Structural equality, convenient for comparing data in tests
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Function(_) => write!(f, "[function]"),
            Value::Dynamic(_) => write!(f, "[dynamic]"),
            Value::Iterable(_) => write!(f, "[iterable]"),
            Value::Stream(_) => write!(f, "[stream]"),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::array(items.into_iter().map(Value::from)),
            serde_json::Value::Object(map) => Value::object(map.into_iter().map(|(k, v)| (k, Value::from(v)))),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        for falsy in [Value::Undefined, Value::Null, false.into(), 0.0.into(), f64::NAN.into(), "".into()] {
            assert!(!falsy.truthy(), "{:?} should be falsy", falsy);
        }
        for truthy in [Value::array([]), Value::from(json!({})), true.into(), 1.0.into(), "0".into()] {
            assert!(truthy.truthy(), "{:?} should be truthy", truthy);
        }
    }

    #[test]
    fn test_display_strings() {
        let value = Value::from(json!([1, 1.5, null, "x", [2, 3], {"a": 1}, true]));
        assert_eq!(value.to_display_string(), "1,1.5,,x,2,3,[object Object],true");
        assert_eq!(Value::Number(1e21).to_display_string(), "1e+21");
        assert_eq!(Value::Number(f64::NEG_INFINITY).to_display_string(), "-Infinity");
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::from(" 12 ").to_number(), 12.0);
        assert_eq!(Value::from("0x1f").to_number(), 31.0);
        assert_eq!(Value::from("-Infinity").to_number(), f64::NEG_INFINITY);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert!(Value::from("inf").to_number().is_nan());
        assert!(Value::from("12px").to_number().is_nan());
        assert_eq!(Value::Null.to_number(), 0.0);
        assert!(Value::Undefined.to_number().is_nan());
        assert_eq!(Value::from(json!(["7"])).to_number(), 7.0);
    }

    #[test]
    fn test_strict_equality_is_by_identity_for_compounds() {
        let a = Value::from(json!([1]));
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&Value::from(json!([1]))));
        assert_eq!(a, Value::from(json!([1])));
        assert!(!Value::Number(1.0).strict_equals(&Value::from("1")));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
    }

    #[test]
    fn test_own_properties() {
        let items = Value::from(json!(["a", "b"]));
        assert_eq!(items.own_property("length"), Some(Value::Number(2.0)));
        assert_eq!(items.own_property("1"), Some(Value::from("b")));
        assert_eq!(items.own_property("01"), None);
        assert_eq!(Value::from("héllo").own_property("length"), Some(Value::Number(5.0)));
        assert_eq!(Value::from(json!({"a": null})).own_property("a"), Some(Value::Null));
        assert_eq!(Value::Number(1.0).own_property("a"), None);
    }

    #[test]
    fn test_object_keys_keep_insertion_order() {
        let keys = |value: Value| match value {
            Value::Object(map) => map.keys().cloned().collect::<Vec<_>>(),
            other => panic!("expected object, got {:?}", other),
        };
        assert_eq!(keys(Value::from(json!({"zeta": 1, "alpha": 2, "mid": 3}))), ["zeta", "alpha", "mid"]);
        assert_eq!(keys(Value::object([("b", Value::Null), ("a", Value::Null)])), ["b", "a"]);
    }

    #[test]
    fn test_type_of() {
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::function(|_| Ok(Value::Undefined)).type_of(), "function");
        assert_eq!(Value::from(json!({})).type_of(), "object");
    }
}
