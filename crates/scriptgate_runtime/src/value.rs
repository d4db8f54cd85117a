//! Restricted value algebra.
//!
//! Scripts only ever see these values. There is no host object model behind
//! them: attribute access, item access, iteration, and calls are all
//! dispatched by the interpreter over this closed set of variants.

use crate::builtins::Builtin;
use crate::host::HostFunction;
use crate::interpreter::Closure;
use crate::modules::NativeFunction;
use indexmap::IndexMap;
use scriptgate_core::{GateResult, ScriptError};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

/// Nesting depth beyond which containers are treated as cyclic
pub const MAX_NESTING: usize = 200;

/// Largest sequence a single operation may create
pub const MAX_SEQUENCE_LEN: usize = 10_000_000;

/// `TypeError` with a message
#[must_use]
pub fn type_error(message: impl Into<String>) -> ScriptError {
    ScriptError::runtime("TypeError", message)
}

/// `ValueError` with a message
#[must_use]
pub fn value_error(message: impl Into<String>) -> ScriptError {
    ScriptError::runtime("ValueError", message)
}

/// Dictionary map type
pub type DictMap = IndexMap<Key, Value>;

/// Hashable dictionary key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// `None`
    None,
    /// Boolean
    Bool(bool),
    /// Integer (also integral floats)
    Int(i64),
    /// Non-integral float, by bit pattern
    Float(u64),
    /// String
    Str(Rc<str>),
    /// Tuple of keys
    Tuple(Rc<[Key]>),
}

impl Key {
    /// Key for a value
    ///
    /// # Errors
    ///
    /// Returns `TypeError` for mutable or opaque values
    pub fn from_value(value: &Value) -> GateResult<Self> {
        Ok(match value {
            Value::None => Self::None,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::Int(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.0e18 {
                    Self::Int(*f as i64)
                } else {
                    Self::Float(f.to_bits())
                }
            }
            Value::Str(s) => Self::Str(s.clone()),
            Value::Tuple(items) => Self::Tuple(
                items
                    .iter()
                    .map(Self::from_value)
                    .collect::<GateResult<Vec<_>>>()?
                    .into(),
            ),
            other => {
                return Err(type_error(format!("unhashable type: '{}'", other.type_name())));
            }
        })
    }

    /// String key
    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    /// Value of the key
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::None => Value::None,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Self::Str(s) => Value::Str(s.clone()),
            Self::Tuple(items) => Value::Tuple(items.iter().map(Self::to_value).collect()),
        }
    }
}

/// Method bound to its receiver
pub struct BoundMethod {
    /// Receiver
    pub receiver: Value,
    /// Method name from the receiver type's dispatch table
    pub name: &'static str,
}

/// Instantiated module namespace
pub struct ModuleValue {
    /// Module name
    pub name: String,
    /// Public members
    pub members: IndexMap<String, Value>,
}

/// Script value
#[derive(Clone)]
pub enum Value {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// Float
    Float(f64),
    /// Immutable string
    Str(Rc<str>),
    /// Mutable list
    List(Rc<RefCell<Vec<Value>>>),
    /// Immutable tuple
    Tuple(Rc<[Value]>),
    /// Mutable insertion-ordered dict
    Dict(Rc<RefCell<DictMap>>),
    /// Script function or lambda
    Function(Rc<Closure>),
    /// Safe builtin
    Builtin(Builtin),
    /// Host capability
    Host(HostFunction),
    /// Function of a native module
    Native(NativeFunction),
    /// Method bound to a receiver
    Method(Rc<BoundMethod>),
    /// Imported module
    Module(Rc<ModuleValue>),
    /// Exception class, e.g. `ValueError`
    ExceptionType(Rc<str>),
    /// Exception instance
    Exception(Rc<ScriptError>),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.repr())
    }
}

impl Value {
    /// String value
    #[must_use]
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(s.as_ref()))
    }

    /// List value
    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    /// Tuple value
    #[must_use]
    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(items.into())
    }

    /// Dict value
    #[must_use]
    pub fn dict(map: DictMap) -> Self {
        Self::Dict(Rc::new(RefCell::new(map)))
    }

    /// Type name as scripts see it
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Function(_) => "function",
            Self::Builtin(_) | Self::Host(_) | Self::Native(_) => "builtin_function_or_method",
            Self::Method(_) => "method",
            Self::Module(_) => "module",
            Self::ExceptionType(_) => "type",
            Self::Exception(_) => "Exception",
        }
    }

    /// Truth value
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Dict(map) => !map.borrow().is_empty(),
            _ => true,
        }
    }

    /// Integer view of `bool` and `int`
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float view of any number
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            other => other.as_int().map(|i| i as f64),
        }
    }

    /// String view
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value is a number (including `bool`)
    #[must_use]
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Bool(_) | Self::Int(_) | Self::Float(_))
    }

    /// Equality as `==` sees it
    #[must_use]
    pub fn py_eq(&self, other: &Value) -> bool {
        self.eq_at(other, 0)
    }

    fn eq_at(&self, other: &Value, depth: usize) -> bool {
        if depth > MAX_NESTING {
            return false;
        }
        match (self, other) {
            (Self::None, Self::None) => true,
            (a, b) if a.is_number() && b.is_number() => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_float() == b.as_float(),
            },
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow(), depth)
            }
            (Self::Tuple(a), Self::Tuple(b)) => seq_eq(a, b, depth),
            (Self::Dict(a), Self::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.eq_at(w, depth + 1)))
            }
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a.name == b.name,
            (Self::Host(a), Self::Host(b)) => a.name == b.name,
            (Self::Native(a), Self::Native(b)) => a.module == b.module && a.name == b.name,
            (Self::Module(a), Self::Module(b)) => Rc::ptr_eq(a, b),
            (Self::ExceptionType(a), Self::ExceptionType(b)) => a == b,
            (Self::Exception(a), Self::Exception(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Identity as `is` sees it
    #[must_use]
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Bool(_) | Self::Int(_), _) | (_, Self::Bool(_) | Self::Int(_)) => false,
            _ => self.py_eq(other),
        }
    }

    /// Ordering for `<`, `sorted`, `min`, `max`; `None` when unordered (NaN)
    ///
    /// # Errors
    ///
    /// Returns `TypeError` when the types cannot be ordered
    pub fn compare(&self, other: &Value) -> GateResult<Option<Ordering>> {
        self.compare_at(other, 0)
    }

    fn compare_at(&self, other: &Value, depth: usize) -> GateResult<Option<Ordering>> {
        if depth > MAX_NESTING {
            return Err(ScriptError::runtime("RecursionError", "maximum recursion depth exceeded in comparison"));
        }
        match (self, other) {
            (a, b) if a.is_number() && b.is_number() => Ok(match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => a.as_float().partial_cmp(&b.as_float()),
            }),
            (Self::Str(a), Self::Str(b)) => Ok(Some(a.cmp(b))),
            (Self::List(a), Self::List(b)) => seq_compare(&a.borrow(), &b.borrow(), depth),
            (Self::Tuple(a), Self::Tuple(b)) => seq_compare(a, b, depth),
            (a, b) => Err(type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    /// `str(value)`
    #[must_use]
    pub fn to_display(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            Self::Exception(e) => e.message(),
            other => other.repr(),
        }
    }

    /// `repr(value)`
    #[must_use]
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        if depth > MAX_NESTING {
            out.push_str("...");
            return;
        }
        match self {
            Self::None => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(i) => out.push_str(&i.to_string()),
            Self::Float(f) => out.push_str(&format_float(*f)),
            Self::Str(s) => out.push_str(&quote_str(s)),
            Self::List(items) => {
                out.push('[');
                write_items(out, &items.borrow(), depth);
                out.push(']');
            }
            Self::Tuple(items) => {
                out.push('(');
                write_items(out, items, depth);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Self::Dict(map) => {
                out.push('{');
                for (i, (k, v)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.to_value().write_repr(out, depth + 1);
                    out.push_str(": ");
                    v.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Self::Function(c) => out.push_str(&format!("<function {}>", c.def.name)),
            Self::Builtin(b) => out.push_str(&format!("<built-in function {}>", b.name)),
            Self::Host(h) => out.push_str(&format!("<built-in function {}>", h.name)),
            Self::Native(n) => out.push_str(&format!("<built-in function {}.{}>", n.module, n.name)),
            Self::Method(m) => out.push_str(&format!(
                "<built-in method {} of {} object>",
                m.name,
                m.receiver.type_name()
            )),
            Self::Module(m) => out.push_str(&format!("<module '{}'>", m.name)),
            Self::ExceptionType(kind) => out.push_str(&format!("<class '{kind}'>")),
            Self::Exception(e) => out.push_str(&format!("{}({})", e.kind(), quote_str(&e.message()))),
        }
    }

    /// Convert parsed JSON into a script value
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::None,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::string(s),
            serde_json::Value::Array(items) => Self::list(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(map) => Self::dict(
                map.iter()
                    .map(|(k, v)| (Key::str(k), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into JSON
    ///
    /// # Errors
    ///
    /// Returns `TypeError` for values with no JSON form and `ValueError`
    /// for cyclic containers
    pub fn to_json(&self) -> GateResult<serde_json::Value> {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> GateResult<serde_json::Value> {
        use serde_json::Value as Json;
        if depth > MAX_NESTING {
            return Err(value_error("Circular reference detected"));
        }
        Ok(match self {
            Self::None => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::Str(s) => Json::String(s.to_string()),
            Self::List(items) => Json::Array(
                items
                    .borrow()
                    .iter()
                    .map(|v| v.to_json_at(depth + 1))
                    .collect::<GateResult<_>>()?,
            ),
            Self::Tuple(items) => Json::Array(
                items
                    .iter()
                    .map(|v| v.to_json_at(depth + 1))
                    .collect::<GateResult<_>>()?,
            ),
            Self::Dict(map) => {
                let mut object = serde_json::Map::new();
                for (k, v) in map.borrow().iter() {
                    object.insert(json_key(k)?, v.to_json_at(depth + 1)?);
                }
                Json::Object(object)
            }
            other => {
                return Err(type_error(format!(
                    "Object of type {} is not JSON serializable",
                    other.type_name()
                )));
            }
        })
    }
}

fn json_key(key: &Key) -> GateResult<String> {
    Ok(match key {
        Key::None => "null".to_string(),
        Key::Bool(b) => b.to_string(),
        Key::Int(i) => i.to_string(),
        Key::Float(bits) => format_float(f64::from_bits(*bits)),
        Key::Str(s) => s.to_string(),
        Key::Tuple(_) => return Err(type_error("keys must be str, int, float, bool or None, not tuple")),
    })
}

fn seq_eq(a: &[Value], b: &[Value], depth: usize) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_at(y, depth + 1))
}

fn seq_compare(a: &[Value], b: &[Value], depth: usize) -> GateResult<Option<Ordering>> {
    for (x, y) in a.iter().zip(b) {
        if !x.eq_at(y, depth + 1) {
            return x.compare_at(y, depth + 1);
        }
    }
    Ok(Some(a.len().cmp(&b.len())))
}

fn write_items(out: &mut String, items: &[Value], depth: usize) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, depth + 1);
    }
}

/// Float formatting compatible with script expectations (`1.0`, `0.1`, `1e+20`)
#[must_use]
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f != 0.0 && (f.abs() >= 1e16 || f.abs() < 1e-4) {
        let s = format!("{f:e}");
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp:0>2}"),
            Some((mantissa, exp)) => format!("{mantissa}e-{:0>2}", &exp[1..]),
            None => s,
        };
    }
    if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Quote a string the way `repr` does
#[must_use]
pub fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repr_and_display() {
        let v = Value::list(vec![
            Value::Int(1),
            Value::Float(2.0),
            Value::string("it's"),
            Value::None,
            Value::tuple(vec![Value::Bool(true)]),
        ]);
        assert_eq!(v.repr(), "[1, 2.0, \"it's\", None, (True,)]");
        assert_eq!(Value::string("x").to_display(), "x");
        assert_eq!(Value::string("x").repr(), "'x'");
    }

    #[test]
    fn test_float_format() {
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(3.0), "3.0");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn test_numeric_equality_and_keys() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert_eq!(Key::from_value(&Value::Float(2.0)).unwrap(), Key::Int(2));
        let err = Key::from_value(&Value::list(vec![])).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: unhashable type: 'list'");
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)).unwrap(), Some(Ordering::Less));
        assert_eq!(
            Value::tuple(vec![Value::Int(1), Value::Int(2)])
                .compare(&Value::tuple(vec![Value::Int(1), Value::Int(3)]))
                .unwrap(),
            Some(Ordering::Less)
        );
        assert!(Value::Int(1).compare(&Value::string("a")).is_err());
        assert_eq!(Value::Float(f64::NAN).compare(&Value::Int(1)).unwrap(), None);
    }

    #[test]
    fn test_json_conversion() {
        let json = json!({"a": [1, 2.5, "x", null, true], "b": {"c": 1}});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json().unwrap(), json);

        let cyclic = Value::list(vec![]);
        if let Value::List(items) = &cyclic {
            items.borrow_mut().push(cyclic.clone());
        }
        assert_eq!(cyclic.to_json().unwrap_err().kind(), "ValueError");
        if let Value::List(items) = &cyclic {
            items.borrow_mut().clear();
        }
    }
}
