//! Safe builtins available to every script.

use crate::args::Args;
use crate::interpreter::{kind_matches, Interpreter};
use crate::ops;
use crate::value::{type_error, value_error, DictMap, Key, Value, MAX_SEQUENCE_LEN};
use scriptgate_core::{GateResult, ScriptError};
use scriptgate_script::ast::BinOp;
use std::cmp::Ordering;

/// Builtin function signature
pub type BuiltinFn = fn(&mut Interpreter<'_>, Args) -> GateResult<Value>;

/// Named builtin
#[derive(Clone, Copy)]
pub struct Builtin {
    /// Name scripts call it by
    pub name: &'static str,
    func: BuiltinFn,
}

impl Builtin {
    /// Call the builtin
    ///
    /// # Errors
    ///
    /// Returns whatever the builtin raises
    pub fn call(&self, interp: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
        (self.func)(interp, args)
    }
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Exception classes scripts can raise and catch by name
pub const EXCEPTION_TYPES: [&str; 17] = [
    "Exception",
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "ImportError",
    "IndexError",
    "KeyError",
    "LookupError",
    "NameError",
    "NotImplementedError",
    "OverflowError",
    "RecursionError",
    "RuntimeError",
    "StopIteration",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

const BUILTINS: [(&str, BuiltinFn); 35] = [
    ("abs", abs),
    ("all", all),
    ("any", any),
    ("bool", bool_),
    ("chr", chr),
    ("dict", dict),
    ("divmod", divmod),
    ("enumerate", enumerate),
    ("filter", filter),
    ("float", float),
    ("int", int),
    ("isinstance", isinstance),
    ("len", len),
    ("list", list),
    ("map", map),
    ("max", max),
    ("min", min),
    ("next", next),
    ("ord", ord),
    ("print", print),
    ("range", range),
    ("reduce", reduce),
    ("repr", repr),
    ("reversed", reversed),
    ("round", round),
    ("set", set),
    ("sorted", sorted),
    ("str", str_),
    ("sum", sum),
    ("tuple", tuple),
    ("zip", zip),
    ("hash", hash),
    ("callable", callable),
    ("format", format),
    ("pow", pow),
];

/// Namespace value of a builtin name
#[must_use]
pub fn lookup(name: &str) -> Option<Value> {
    if let Some((name, func)) = BUILTINS.iter().find(|(n, _)| *n == name) {
        return Some(Value::Builtin(Builtin { name, func: *func }));
    }
    EXCEPTION_TYPES
        .iter()
        .find(|n| **n == name)
        .map(|n| Value::ExceptionType((*n).into()))
}

/// Names of every builtin function
pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(n, _)| *n)
}

fn one_iterable(args: &Args, name: &str) -> GateResult<Vec<Value>> {
    args.expect(name, 1, 1)?;
    ops::iterate(&args.positional[0])
}

fn call_one(interp: &mut Interpreter<'_>, func: &Value, arg: Value) -> GateResult<Value> {
    interp.call(func, Args::positional(vec![arg]))
}

fn strictly_less(a: &Value, b: &Value) -> GateResult<bool> {
    Ok(a.compare(b)? == Some(Ordering::Less))
}

fn merge_sort(order: &mut Vec<usize>, less: &dyn Fn(usize, usize) -> GateResult<bool>) -> GateResult<()> {
    if order.len() <= 1 {
        return Ok(());
    }
    let mut right = order.split_off(order.len() / 2);
    merge_sort(order, less)?;
    merge_sort(&mut right, less)?;
    let left = std::mem::take(order);
    order.reserve(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if less(right[j], left[i])? {
            order.push(right[j]);
            j += 1;
        } else {
            order.push(left[i]);
            i += 1;
        }
    }
    order.extend_from_slice(&left[i..]);
    order.extend_from_slice(&right[j..]);
    Ok(())
}

/// Stable sort with an optional key function
///
/// # Errors
///
/// Returns `TypeError` for unorderable items and whatever the key raises
pub fn sort_values(
    interp: &mut Interpreter<'_>,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> GateResult<Vec<Value>> {
    let keys = match key {
        Some(func) if !matches!(func, Value::None) => items
            .iter()
            .map(|item| call_one(interp, func, item.clone()))
            .collect::<GateResult<Vec<_>>>()?,
        _ => items.clone(),
    };
    let mut order: Vec<usize> = (0..items.len()).collect();
    merge_sort(&mut order, &|a, b| {
        if reverse {
            strictly_less(&keys[b], &keys[a])
        } else {
            strictly_less(&keys[a], &keys[b])
        }
    })?;
    Ok(order.into_iter().map(|i| items[i].clone()).collect())
}

fn print(interp: &mut Interpreter<'_>, mut args: Args) -> GateResult<Value> {
    let sep = match args.take_keyword("sep") {
        None | Some(Value::None) => " ".to_string(),
        Some(v) => v.to_display(),
    };
    args.take_keyword("end");
    args.no_keywords("print")?;
    let text = args
        .positional
        .iter()
        .map(Value::to_display)
        .collect::<Vec<_>>()
        .join(&sep);
    interp.host.output.write(&text);
    Ok(Value::None)
}

fn len(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("len", 1, 1)?;
    let n = ops::len_of(&args.positional[0])?;
    Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
}

fn range(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.no_keywords("range")?;
    args.expect("range", 1, 3)?;
    let (start, stop) = if args.len() == 1 {
        (0, args.int_at("range", 0)?)
    } else {
        (args.int_at("range", 0)?, args.int_at("range", 1)?)
    };
    let step = if args.len() == 3 { args.int_at("range", 2)? } else { 1 };
    if step == 0 {
        return Err(value_error("range() arg 3 must not be zero"));
    }
    let span = if step > 0 {
        i128::from(stop) - i128::from(start)
    } else {
        i128::from(start) - i128::from(stop)
    };
    let count = if span <= 0 {
        0
    } else {
        (span + i128::from(step.unsigned_abs()) - 1) / i128::from(step.unsigned_abs())
    };
    if count > MAX_SEQUENCE_LEN as i128 {
        return Err(ScriptError::runtime("MemoryError", "range is too large"));
    }
    let mut items = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
    let mut current = i128::from(start);
    for _ in 0..count {
        items.push(Value::Int(i64::try_from(current).unwrap_or(i64::MAX)));
        current += i128::from(step);
    }
    Ok(Value::list(items))
}

fn sorted(interp: &mut Interpreter<'_>, mut args: Args) -> GateResult<Value> {
    let key = args.take_keyword("key");
    let reverse = args.take_keyword("reverse").is_some_and(|v| v.is_truthy());
    args.no_keywords("sorted")?;
    let items = one_iterable(&args, "sorted")?;
    Ok(Value::list(sort_values(interp, items, key.as_ref(), reverse)?))
}

fn reversed(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    let mut items = one_iterable(&args, "reversed")?;
    items.reverse();
    Ok(Value::list(items))
}

fn map(interp: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.no_keywords("map")?;
    if args.len() < 2 {
        return Err(type_error("map() must have at least two arguments."));
    }
    let func = args.positional[0].clone();
    let columns = args.positional[1..]
        .iter()
        .map(ops::iterate)
        .collect::<GateResult<Vec<_>>>()?;
    let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(shortest);
    for i in 0..shortest {
        let call_args = columns.iter().map(|c| c[i].clone()).collect();
        out.push(interp.call(&func, Args::positional(call_args))?);
    }
    Ok(Value::list(out))
}

fn filter(interp: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.no_keywords("filter")?;
    args.expect("filter", 2, 2)?;
    let func = args.positional[0].clone();
    let mut out = Vec::new();
    for item in ops::iterate(&args.positional[1])? {
        let keep = match &func {
            Value::None => item.is_truthy(),
            f => call_one(interp, f, item.clone())?.is_truthy(),
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

fn reduce(interp: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.no_keywords("reduce")?;
    args.expect("reduce", 2, 3)?;
    let func = args.positional[0].clone();
    let mut items = ops::iterate(&args.positional[1])?.into_iter();
    let mut acc = match args.get(2) {
        Some(initial) => initial.clone(),
        None => items
            .next()
            .ok_or_else(|| type_error("reduce() of empty iterable with no initial value"))?,
    };
    for item in items {
        acc = interp.call(&func, Args::positional(vec![acc, item]))?;
    }
    Ok(acc)
}

fn any(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    Ok(Value::Bool(one_iterable(&args, "any")?.iter().any(Value::is_truthy)))
}

fn all(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    Ok(Value::Bool(one_iterable(&args, "all")?.iter().all(Value::is_truthy)))
}

fn enumerate(_: &mut Interpreter<'_>, mut args: Args) -> GateResult<Value> {
    let start_kw = args.take_keyword("start");
    args.no_keywords("enumerate")?;
    args.expect("enumerate", 1, 2)?;
    let start = match args.get(1).or(start_kw.as_ref()) {
        Some(v) => v.as_int().ok_or_else(|| type_error("enumerate() start must be an integer"))?,
        None => 0,
    };
    let items = ops::iterate(&args.positional[0])?;
    Ok(Value::list(
        items
            .into_iter()
            .zip(start..)
            .map(|(item, i)| Value::tuple(vec![Value::Int(i), item]))
            .collect(),
    ))
}

fn zip(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.no_keywords("zip")?;
    let columns = args
        .positional
        .iter()
        .map(ops::iterate)
        .collect::<GateResult<Vec<_>>>()?;
    let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::list(
        (0..shortest)
            .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
            .collect(),
    ))
}

fn sum(_: &mut Interpreter<'_>, mut args: Args) -> GateResult<Value> {
    let start_kw = args.take_keyword("start");
    args.no_keywords("sum")?;
    args.expect("sum", 1, 2)?;
    let mut acc = args.get(1).cloned().or(start_kw).unwrap_or(Value::Int(0));
    if matches!(acc, Value::Str(_)) {
        return Err(type_error("sum() can't sum strings [use ''.join(seq) instead]"));
    }
    for item in ops::iterate(&args.positional[0])? {
        acc = ops::binary(BinOp::Add, &acc, &item)?;
    }
    Ok(acc)
}

fn abs(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("abs", 1, 1)?;
    match &args.positional[0] {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        v => match v.as_int() {
            Some(i) => i
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| ScriptError::runtime("OverflowError", "integer overflow")),
            None => Err(type_error(format!("bad operand type for abs(): '{}'", v.type_name()))),
        },
    }
}

fn extremum(interp: &mut Interpreter<'_>, mut args: Args, name: &str, want: Ordering) -> GateResult<Value> {
    let key = args.take_keyword("key");
    let default = args.take_keyword("default");
    args.no_keywords(name)?;
    let items = match args.len() {
        0 => return Err(type_error(format!("{name} expected at least 1 argument, got 0"))),
        1 => ops::iterate(&args.positional[0])?,
        _ => args.positional,
    };
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let k = match &key {
            Some(func) if !matches!(func, Value::None) => call_one(interp, func, item.clone())?,
            _ => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_key, _)) => k.compare(best_key)? == Some(want),
        };
        if replace {
            best = Some((k, item));
        }
    }
    match (best, default) {
        (Some((_, item)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(value_error(format!("{name}() arg is an empty sequence"))),
    }
}

fn min(interp: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    extremum(interp, args, "min", Ordering::Less)
}

fn max(interp: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    extremum(interp, args, "max", Ordering::Greater)
}

fn round(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.no_keywords("round")?;
    args.expect("round", 1, 2)?;
    let digits = match args.get(1) {
        None | Some(Value::None) => None,
        Some(v) => Some(v.as_int().ok_or_else(|| type_error("round() ndigits must be an integer"))?),
    };
    match (&args.positional[0], digits) {
        (Value::Float(f), None) => float_to_int(f.round_ties_even()),
        (Value::Float(f), Some(n)) => {
            let factor = 10f64.powi(i32::try_from(n).unwrap_or(0));
            Ok(Value::Float((f * factor).round_ties_even() / factor))
        }
        (v, _) => v
            .as_int()
            .map(Value::Int)
            .ok_or_else(|| type_error(format!("type {} doesn't define __round__ method", v.type_name()))),
    }
}

/// Convert an integral float into an int
///
/// # Errors
///
/// Returns `OverflowError` for infinities and out-of-range values and
/// `ValueError` for NaN
pub fn float_to_int(f: f64) -> GateResult<Value> {
    if f.is_nan() {
        return Err(value_error("cannot convert float NaN to integer"));
    }
    if !f.is_finite() || f.abs() >= 9.223_372_036_854_776e18 {
        return Err(ScriptError::runtime("OverflowError", "cannot convert float infinity to integer"));
    }
    Ok(Value::Int(f as i64))
}

fn divmod(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("divmod", 2, 2)?;
    let (a, b) = (&args.positional[0], &args.positional[1]);
    Ok(Value::tuple(vec![
        ops::binary(BinOp::FloorDiv, a, b)?,
        ops::binary(BinOp::Mod, a, b)?,
    ]))
}

fn str_(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("str", 0, 1)?;
    Ok(Value::string(args.get(0).map(Value::to_display).unwrap_or_default()))
}

fn repr(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("repr", 1, 1)?;
    Ok(Value::string(args.positional[0].repr()))
}

fn int(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.no_keywords("int")?;
    args.expect("int", 0, 2)?;
    let base = match args.get(1) {
        Some(b) => b.as_int().ok_or_else(|| type_error("int() base must be an integer"))?,
        None => 10,
    };
    match args.get(0) {
        None => Ok(Value::Int(0)),
        Some(Value::Float(f)) => float_to_int(f.trunc()),
        Some(Value::Str(s)) => {
            let text = s.trim();
            let radix = u32::try_from(base).ok().filter(|r| (2..=36).contains(r));
            radix
                .and_then(|r| i64::from_str_radix(text, r).ok())
                .map(Value::Int)
                .ok_or_else(|| {
                    value_error(format!(
                        "invalid literal for int() with base {base}: {}",
                        crate::value::quote_str(s)
                    ))
                })
        }
        Some(v) => v
            .as_int()
            .map(Value::Int)
            .ok_or_else(|| type_error(format!("int() argument must be a string or a number, not '{}'", v.type_name()))),
    }
}

fn float(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("float", 0, 1)?;
    match args.get(0) {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(s)) => {
            let text = s.trim().to_ascii_lowercase();
            let parsed = match text.as_str() {
                "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                "nan" => Some(f64::NAN),
                other => other.parse::<f64>().ok(),
            };
            parsed.map(Value::Float).ok_or_else(|| {
                value_error(format!(
                    "could not convert string to float: {}",
                    crate::value::quote_str(s)
                ))
            })
        }
        Some(v) => v
            .as_float()
            .map(Value::Float)
            .ok_or_else(|| type_error(format!("float() argument must be a string or a number, not '{}'", v.type_name()))),
    }
}

fn bool_(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("bool", 0, 1)?;
    Ok(Value::Bool(args.get(0).is_some_and(Value::is_truthy)))
}

fn list(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("list", 0, 1)?;
    Ok(Value::list(match args.get(0) {
        Some(v) => ops::iterate(v)?,
        None => Vec::new(),
    }))
}

fn tuple(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("tuple", 0, 1)?;
    Ok(Value::tuple(match args.get(0) {
        Some(v) => ops::iterate(v)?,
        None => Vec::new(),
    }))
}

fn set(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("set", 0, 1)?;
    let mut seen = indexmap::IndexSet::new();
    let mut out = Vec::new();
    if let Some(v) = args.get(0) {
        for item in ops::iterate(v)? {
            if seen.insert(Key::from_value(&item)?) {
                out.push(item);
            }
        }
    }
    Ok(Value::list(out))
}

/// Insert `(key, value)` pairs from an iterable into `map`
///
/// # Errors
///
/// Returns `ValueError` when an element is not a pair
pub fn extend_dict(map: &mut DictMap, source: &Value) -> GateResult<()> {
    if let Value::Dict(other) = source {
        let entries: Vec<(Key, Value)> = other.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        map.extend(entries);
        return Ok(());
    }
    for (index, pair) in ops::iterate(source)?.into_iter().enumerate() {
        let items = ops::iterate(&pair)?;
        let [key, value]: [Value; 2] = items.try_into().map_err(|items: Vec<Value>| {
            value_error(format!(
                "dictionary update sequence element #{index} has length {}; 2 is required",
                items.len()
            ))
        })?;
        map.insert(Key::from_value(&key)?, value);
    }
    Ok(())
}

fn dict(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("dict", 0, 1)?;
    let mut map = DictMap::new();
    if let Some(source) = args.get(0) {
        extend_dict(&mut map, source)?;
    }
    for (name, value) in args.keywords {
        map.insert(Key::str(&name), value);
    }
    Ok(Value::dict(map))
}

fn type_matches(value: &Value, class: &Value) -> GateResult<bool> {
    match class {
        Value::Builtin(b) => Ok(match b.name {
            "str" => matches!(value, Value::Str(_)),
            "int" => matches!(value, Value::Int(_) | Value::Bool(_)),
            "float" => matches!(value, Value::Float(_)),
            "bool" => matches!(value, Value::Bool(_)),
            "list" | "set" => matches!(value, Value::List(_)),
            "tuple" => matches!(value, Value::Tuple(_)),
            "dict" => matches!(value, Value::Dict(_)),
            other => return Err(type_error(format!("isinstance() arg 2 must be a type, not {other}"))),
        }),
        Value::ExceptionType(kind) => Ok(match value {
            Value::Exception(err) => kind_matches(kind, err.kind()),
            _ => false,
        }),
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if type_matches(value, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(type_error(format!(
            "isinstance() arg 2 must be a type or tuple of types, not {}",
            other.type_name()
        ))),
    }
}

fn isinstance(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("isinstance", 2, 2)?;
    Ok(Value::Bool(type_matches(&args.positional[0], &args.positional[1])?))
}

fn next(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("next", 1, 2)?;
    match (ops::iterate(&args.positional[0])?.into_iter().next(), args.get(1)) {
        (Some(item), _) => Ok(item),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(ScriptError::runtime("StopIteration", "")),
    }
}

fn chr(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("chr", 1, 1)?;
    let code = args.int_at("chr", 0)?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::string(c.to_string()))
        .ok_or_else(|| value_error("chr() arg not in range(0x110000)"))
}

fn ord(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("ord", 1, 1)?;
    let s = args.str_at("ord", 0)?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
        _ => Err(type_error(format!(
            "ord() expected a character, but string of length {} found",
            s.chars().count()
        ))),
    }
}

fn hash(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    use std::hash::{Hash, Hasher};
    args.expect("hash", 1, 1)?;
    let key = Key::from_value(&args.positional[0])?;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    Ok(Value::Int(hasher.finish() as i64))
}

fn callable(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("callable", 1, 1)?;
    Ok(Value::Bool(matches!(
        args.positional[0],
        Value::Function(_)
            | Value::Builtin(_)
            | Value::Host(_)
            | Value::Native(_)
            | Value::Method(_)
            | Value::ExceptionType(_)
    )))
}

fn format(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("format", 1, 2)?;
    let spec = match args.get(1) {
        Some(_) => args.str_at("format", 1)?,
        None => "",
    };
    Ok(Value::string(crate::methods::apply_format_spec(&args.positional[0], spec)?))
}

fn pow(_: &mut Interpreter<'_>, args: Args) -> GateResult<Value> {
    args.expect("pow", 2, 2)?;
    ops::binary(BinOp::Pow, &args.positional[0], &args.positional[1])
}

#[cfg(test)]
mod tests {
    use crate::testkit::{error, repr};

    #[test]
    fn test_sorted_with_key_and_reverse() {
        assert_eq!(repr("r = sorted([3, 1, 2])"), "[1, 2, 3]");
        assert_eq!(repr("r = sorted(['bb', 'a', 'ccc'], key=len, reverse=True)"), "['ccc', 'bb', 'a']");
        assert_eq!(
            repr("r = sorted([(1, 'b'), (0, 'z'), (1, 'a')], key=lambda p: p[0])"),
            "[(0, 'z'), (1, 'b'), (1, 'a')]"
        );
    }

    #[test]
    fn test_sorted_unorderable_is_type_error() {
        let err = error("r = sorted([1, 'a'])");
        assert_eq!(err.kind(), "TypeError");
    }

    #[test]
    fn test_functional_helpers() {
        assert_eq!(repr("r = list(map(lambda x: x * 2, [1, 2]))"), "[2, 4]");
        assert_eq!(repr("r = list(filter(None, [0, 1, '', 'x']))"), "[1, 'x']");
        assert_eq!(repr("r = reduce(lambda a, b: a + b, [1, 2, 3], 10)"), "16");
        assert_eq!(repr("r = list(zip([1, 2, 3], 'ab'))"), "[(1, 'a'), (2, 'b')]");
        assert_eq!(repr("r = list(enumerate(['x', 'y'], 1))"), "[(1, 'x'), (2, 'y')]");
        assert_eq!(error("r = reduce(lambda a, b: a, [])").kind(), "TypeError");
    }

    #[test]
    fn test_range_and_sum() {
        assert_eq!(repr("r = list(range(5))"), "[0, 1, 2, 3, 4]");
        assert_eq!(repr("r = list(range(10, 0, -3))"), "[10, 7, 4, 1]");
        assert_eq!(repr("r = sum(range(101))"), "5050");
        assert_eq!(repr("r = sum([0.5, 0.25])"), "0.75");
        assert_eq!(error("r = range(1, 2, 0)").kind(), "ValueError");
        assert_eq!(error("r = sum(['a'], '')").kind(), "TypeError");
    }

    #[test]
    fn test_min_max() {
        assert_eq!(repr("r = (min(3, 1, 2), max([3, 1, 2]))"), "(1, 3)");
        assert_eq!(repr("r = max(['a', 'ccc', 'bb'], key=len)"), "'ccc'");
        assert_eq!(repr("r = min([], default=7)"), "7");
        assert_eq!(error("r = max([])").message(), "max() arg is an empty sequence");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(repr("r = (int('42'), int(' -7 '), int(3.9), int('ff', 16))"), "(42, -7, 3, 255)");
        assert_eq!(repr("r = (float('1.5'), float(2), str(1.0), bool([]))"), "(1.5, 2.0, '1.0', False)");
        assert_eq!(repr("r = (round(2.5), round(3.5), round(1.25, 1), abs(-3))"), "(2, 4, 1.2, 3)");
        assert_eq!(repr("r = divmod(-7, 2)"), "(-4, 1)");
        assert_eq!(
            error("r = int('x')").to_string(),
            "ValueError: invalid literal for int() with base 10: 'x'"
        );
    }

    #[test]
    fn test_containers() {
        assert_eq!(repr("r = dict([('a', 1)], b=2)"), "{'a': 1, 'b': 2}");
        assert_eq!(repr("r = set([3, 1, 3, 2, 1])"), "[3, 1, 2]");
        assert_eq!(repr("r = tuple('ab')"), "('a', 'b')");
        assert_eq!(repr("r = list(reversed([1, 2, 3]))"), "[3, 2, 1]");
        assert_eq!(repr("r = (len({'a': 1}), next([9, 8]), next([], 0))"), "(1, 9, 0)");
    }

    #[test]
    fn test_isinstance() {
        assert_eq!(
            repr("r = (isinstance(1, int), isinstance(True, int), isinstance('s', (int, str)), isinstance(1.0, int))"),
            "(True, True, True, False)"
        );
        assert_eq!(repr("r = isinstance(KeyError('k'), LookupError)"), "True");
    }

    #[test]
    fn test_chr_ord_callable() {
        assert_eq!(repr("r = (chr(97), ord('a'), callable(len), callable(1))"), "('a', 97, True, False)");
    }
}
