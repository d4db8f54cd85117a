//! Operators, item access, and iteration over script values.

use crate::value::{type_error, value_error, Key, Value, MAX_SEQUENCE_LEN};
use scriptgate_core::{GateResult, ScriptError};
use scriptgate_script::ast::{BinOp, UnaryOp};
use std::rc::Rc;

/// Largest number of digits a float format may request after the point
pub const MAX_PRECISION: usize = 100;

fn zero_division(message: &str) -> ScriptError {
    ScriptError::runtime("ZeroDivisionError", message)
}

fn overflow() -> ScriptError {
    ScriptError::runtime("OverflowError", "integer overflow")
}

fn unsupported(op: BinOp, a: &Value, b: &Value) -> ScriptError {
    type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

/// Apply a unary operator
///
/// # Errors
///
/// Returns `TypeError` for non-numeric operands of `-` and `+`
pub fn unary(op: UnaryOp, operand: &Value) -> GateResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Neg => match operand {
            Value::Float(f) => Ok(Value::Float(-f)),
            v => match v.as_int() {
                Some(i) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
                None => Err(type_error(format!("bad operand type for unary -: '{}'", v.type_name()))),
            },
        },
        UnaryOp::Pos => match operand {
            Value::Float(f) => Ok(Value::Float(*f)),
            v => v
                .as_int()
                .map(Value::Int)
                .ok_or_else(|| type_error(format!("bad operand type for unary +: '{}'", v.type_name()))),
        },
    }
}

/// Apply a binary operator
///
/// # Errors
///
/// Returns `TypeError` for unsupported operand types, `ZeroDivisionError`,
/// `OverflowError` when an integer result leaves the 64-bit range, and
/// `MemoryError` when a concatenation would exceed the sequence limit
pub fn binary(op: BinOp, a: &Value, b: &Value) -> GateResult<Value> {
    if a.is_number() && b.is_number() {
        return numeric(op, a, b);
    }
    if op == BinOp::Add && concat_len(a, b) > MAX_SEQUENCE_LEN {
        return Err(ScriptError::runtime("MemoryError", "concatenated sequence is too large"));
    }
    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Ok(Value::string(s))
        }
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            Ok(Value::tuple(x.iter().chain(y.iter()).cloned().collect()))
        }
        (BinOp::Mul, seq, Value::Bool(_) | Value::Int(_)) if is_sequence(seq) => repeat(seq, b),
        (BinOp::Mul, Value::Bool(_) | Value::Int(_), seq) if is_sequence(seq) => repeat(seq, a),
        (BinOp::Mod, Value::Str(fmt), args) => Ok(Value::string(percent_format(fmt, args)?)),
        _ => Err(unsupported(op, a, b)),
    }
}

fn is_sequence(v: &Value) -> bool {
    matches!(v, Value::Str(_) | Value::List(_) | Value::Tuple(_))
}

/// Length of `a + b` for two sequences of the same type, 0 otherwise
fn concat_len(a: &Value, b: &Value) -> usize {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.len().saturating_add(y.len()),
        (Value::List(x), Value::List(y)) => x.borrow().len().saturating_add(y.borrow().len()),
        (Value::Tuple(x), Value::Tuple(y)) => x.len().saturating_add(y.len()),
        _ => 0,
    }
}

fn repeat(seq: &Value, count: &Value) -> GateResult<Value> {
    let n = usize::try_from(count.as_int().unwrap_or(0).max(0)).unwrap_or(0);
    let len = len_of(seq)?;
    if len.saturating_mul(n) > MAX_SEQUENCE_LEN {
        return Err(ScriptError::runtime("MemoryError", "sequence repetition is too large"));
    }
    Ok(match seq {
        Value::Str(s) => Value::string(s.repeat(n)),
        Value::List(items) => {
            let items = items.borrow();
            Value::list((0..n).flat_map(|_| items.iter().cloned()).collect())
        }
        Value::Tuple(items) => Value::tuple((0..n).flat_map(|_| items.iter().cloned()).collect()),
        other => return Err(type_error(format!("can't multiply '{}'", other.type_name()))),
    })
}

fn numeric(op: BinOp, a: &Value, b: &Value) -> GateResult<Value> {
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return int_op(op, x, y);
    }
    let (x, y) = (a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0));
    let value = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }
        }
        BinOp::Pow => x.powf(y),
    };
    Ok(Value::Float(value))
}

fn int_op(op: BinOp, x: i64, y: i64) -> GateResult<Value> {
    let value = match op {
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mul => x.checked_mul(y),
        BinOp::Div => {
            if y == 0 {
                return Err(zero_division("division by zero"));
            }
            return Ok(Value::Float(x as f64 / y as f64));
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            x.checked_div(y).map(|q| if x % y != 0 && ((x < 0) != (y < 0)) { q - 1 } else { q })
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            x.checked_rem(y).map(|r| if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r })
        }
        BinOp::Pow => {
            if y < 0 {
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            u32::try_from(y).ok().and_then(|e| x.checked_pow(e))
        }
    };
    value.map(Value::Int).ok_or_else(overflow)
}

/// `item in container`
///
/// # Errors
///
/// Returns `TypeError` when the container does not support membership
pub fn contains(container: &Value, item: &Value) -> GateResult<bool> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(&**needle)),
            other => Err(type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| v.py_eq(item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| v.py_eq(item))),
        Value::Dict(map) => Ok(map.borrow().contains_key(&Key::from_value(item)?)),
        other => Err(type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// `len(value)`
///
/// # Errors
///
/// Returns `TypeError` for values without a length
pub fn len_of(value: &Value) -> GateResult<usize> {
    match value {
        Value::Str(s) => Ok(s.chars().count()),
        Value::List(items) => Ok(items.borrow().len()),
        Value::Tuple(items) => Ok(items.len()),
        Value::Dict(map) => Ok(map.borrow().len()),
        other => Err(type_error(format!("object of type '{}' has no len()", other.type_name()))),
    }
}

/// Materialise the items of an iterable
///
/// Lists are snapshotted, so mutating a list while looping over it never
/// invalidates the loop.
///
/// # Errors
///
/// Returns `TypeError` for non-iterable values
pub fn iterate(value: &Value) -> GateResult<Vec<Value>> {
    match value {
        Value::Str(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Tuple(items) => Ok(items.to_vec()),
        Value::Dict(map) => Ok(map.borrow().keys().map(Key::to_value).collect()),
        other => Err(type_error(format!("'{}' object is not iterable", other.type_name()))),
    }
}

fn normalize_index(index: &Value, len: usize, kind: &str) -> GateResult<usize> {
    let i = index.as_int().ok_or_else(|| {
        type_error(format!(
            "{kind} indices must be integers or slices, not {}",
            index.type_name()
        ))
    })?;
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if i < 0 { i + len_i } else { i };
    if resolved < 0 || resolved >= len_i {
        return Err(ScriptError::runtime("IndexError", format!("{kind} index out of range")));
    }
    usize::try_from(resolved).map_err(|_| ScriptError::runtime("IndexError", format!("{kind} index out of range")))
}

/// `container[index]`
///
/// # Errors
///
/// Returns `IndexError`, `KeyError`, or `TypeError`
pub fn get_item(container: &Value, index: &Value) -> GateResult<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            Ok(items[normalize_index(index, items.len(), "list")?].clone())
        }
        Value::Tuple(items) => Ok(items[normalize_index(index, items.len(), "tuple")?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(index, chars.len(), "string")?;
            Ok(Value::string(chars[i].to_string()))
        }
        Value::Dict(map) => map
            .borrow()
            .get(&Key::from_value(index)?)
            .cloned()
            .ok_or_else(|| ScriptError::runtime("KeyError", index.repr())),
        other => Err(type_error(format!("'{}' object is not subscriptable", other.type_name()))),
    }
}

/// `container[index] = value`
///
/// # Errors
///
/// Returns `IndexError` or `TypeError`
pub fn set_item(container: &Value, index: &Value, value: Value) -> GateResult<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index, items.len(), "list assignment")?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(map) => {
            let key = Key::from_value(index)?;
            map.borrow_mut().insert(key, value);
            Ok(())
        }
        other => Err(type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `del container[index]`
///
/// # Errors
///
/// Returns `IndexError`, `KeyError`, or `TypeError`
pub fn del_item(container: &Value, index: &Value) -> GateResult<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index, items.len(), "list assignment")?;
            items.remove(i);
            Ok(())
        }
        Value::Dict(map) => map
            .borrow_mut()
            .shift_remove(&Key::from_value(index)?)
            .map(|_| ())
            .ok_or_else(|| ScriptError::runtime("KeyError", index.repr())),
        other => Err(type_error(format!(
            "'{}' object doesn't support item deletion",
            other.type_name()
        ))),
    }
}

fn slice_bound(value: Option<&Value>) -> GateResult<Option<i64>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(v) => v
            .as_int()
            .map(Some)
            .ok_or_else(|| type_error("slice indices must be integers or None")),
    }
}

/// Indices selected by `lower:upper:step` over a sequence of `len`
///
/// # Errors
///
/// Returns `ValueError` for a zero step and `TypeError` for non-integer bounds
pub fn slice_indices(
    len: usize,
    lower: Option<&Value>,
    upper: Option<&Value>,
    step: Option<&Value>,
) -> GateResult<Vec<usize>> {
    let step = slice_bound(step)?.unwrap_or(1);
    if step == 0 {
        return Err(value_error("slice step cannot be zero"));
    }
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |bound: Option<i64>, default: i64, low: i64, high: i64| match bound {
        None => default,
        Some(b) if b < 0 => (b + len).max(low),
        Some(b) => b.min(high),
    };
    let mut out = Vec::new();
    if step > 0 {
        let start = clamp(slice_bound(lower)?, 0, 0, len);
        let stop = clamp(slice_bound(upper)?, len, 0, len);
        let mut i = start;
        while i < stop {
            out.push(usize::try_from(i).unwrap_or(0));
            i += step;
        }
    } else {
        let start = clamp(slice_bound(lower)?, len - 1, -1, len - 1);
        let stop = clamp(slice_bound(upper)?, -1, -1, len - 1);
        let mut i = start;
        while i > stop {
            out.push(usize::try_from(i).unwrap_or(0));
            i += step;
        }
    }
    Ok(out)
}

/// `container[lower:upper:step]`
///
/// # Errors
///
/// Returns `TypeError` for containers that cannot be sliced
pub fn get_slice(
    container: &Value,
    lower: Option<&Value>,
    upper: Option<&Value>,
    step: Option<&Value>,
) -> GateResult<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let picked = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let picked = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_indices(chars.len(), lower, upper, step)?;
            Ok(Value::string(picked.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        other => Err(type_error(format!("'{}' object is not subscriptable", other.type_name()))),
    }
}

/// `fmt % args` with `%s`, `%r`, `%d`, `%i`, `%f`, `%.Nf`, and `%%`
///
/// # Errors
///
/// Returns `TypeError` when the argument count or types do not match
pub fn percent_format(fmt: &str, args: &Value) -> GateResult<String> {
    let args: Vec<Value> = match args {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mut next = args.iter();
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(d);
                chars.next();
            }
            let requested = if digits.is_empty() { 0 } else { digits.parse::<usize>().unwrap_or(usize::MAX) };
            precision = Some(requested.min(MAX_PRECISION));
        }
        let spec = chars
            .next()
            .ok_or_else(|| value_error("incomplete format"))?;
        if spec == '%' {
            out.push('%');
            continue;
        }
        let arg = next
            .next()
            .ok_or_else(|| type_error("not enough arguments for format string"))?;
        match spec {
            's' => out.push_str(&arg.to_display()),
            'r' => out.push_str(&arg.repr()),
            'd' | 'i' => {
                let n = match arg {
                    Value::Float(f) => f.trunc() as i64,
                    v => v.as_int().ok_or_else(|| {
                        type_error(format!("%d format: a number is required, not {}", v.type_name()))
                    })?,
                };
                out.push_str(&n.to_string());
            }
            'f' => {
                let f = arg.as_float().ok_or_else(|| {
                    type_error(format!("must be real number, not {}", arg.type_name()))
                })?;
                out.push_str(&format!("{:.*}", precision.unwrap_or(6), f));
            }
            other => {
                return Err(value_error(format!("unsupported format character '{other}'")));
            }
        }
    }
    if next.next().is_some() {
        return Err(type_error("not all arguments converted during string formatting"));
    }
    Ok(out)
}

/// Identity-free shallow copy of a container
#[must_use]
pub fn shallow_copy(value: &Value) -> Value {
    match value {
        Value::List(items) => Value::list(items.borrow().clone()),
        Value::Dict(map) => Value::dict(map.borrow().clone()),
        Value::Tuple(items) => Value::Tuple(Rc::clone(items)),
        other => other.clone(),
    }
}
