//! Guarded method tables for `str`, `list` and `dict`.
//!
//! Attribute access on a value only resolves names listed here; everything
//! else is an `AttributeError`.

use crate::args::Args;
use crate::builtins::{extend_dict, sort_values};
use crate::interpreter::Interpreter;
use crate::ops;
use crate::value::{type_error, value_error, DictMap, Key, Value, MAX_SEQUENCE_LEN};
use scriptgate_core::{GateResult, ScriptError};
use std::cell::RefCell;
use std::rc::Rc;

const STR_METHODS: [&str; 23] = [
    "capitalize",
    "count",
    "endswith",
    "find",
    "format",
    "index",
    "isalnum",
    "isalpha",
    "isdigit",
    "isspace",
    "join",
    "lower",
    "lstrip",
    "replace",
    "rstrip",
    "split",
    "splitlines",
    "startswith",
    "strip",
    "title",
    "upper",
    "zfill",
    "rsplit",
];

const LIST_METHODS: [&str; 11] = [
    "append", "clear", "copy", "count", "extend", "index", "insert", "pop", "remove", "reverse",
    "sort",
];

const DICT_METHODS: [&str; 9] = [
    "clear",
    "copy",
    "get",
    "items",
    "keys",
    "pop",
    "setdefault",
    "update",
    "values",
];

/// Method name in the receiver type's table
#[must_use]
pub fn lookup(receiver: &Value, name: &str) -> Option<&'static str> {
    let table: &[&'static str] = match receiver {
        Value::Str(_) => &STR_METHODS,
        Value::List(_) => &LIST_METHODS,
        Value::Dict(_) => &DICT_METHODS,
        _ => return None,
    };
    table.iter().copied().find(|m| *m == name)
}

/// Call a bound method
///
/// # Errors
///
/// Returns whatever the method raises
pub fn call(interp: &mut Interpreter<'_>, receiver: &Value, name: &'static str, args: Args) -> GateResult<Value> {
    match receiver {
        Value::Str(s) => str_method(s, name, args),
        Value::List(items) => list_method(interp, items, name, args),
        Value::Dict(map) => dict_method(map, name, args),
        other => Err(ScriptError::runtime(
            "AttributeError",
            format!("'{}' object has no attribute '{name}'", other.type_name()),
        )),
    }
}

fn char_index(s: &str, byte: usize) -> i64 {
    i64::try_from(s[..byte].chars().count()).unwrap_or(i64::MAX)
}

fn strip_set<'s>(s: &'s str, args: &Args, name: &str, left: bool, right: bool) -> GateResult<&'s str> {
    args.expect(name, 0, 1)?;
    let chars: Option<Vec<char>> = match args.get(0) {
        None | Some(Value::None) => None,
        Some(_) => Some(args.str_at(name, 0)?.chars().collect()),
    };
    let matches = |c: char| match &chars {
        Some(set) => set.contains(&c),
        None => c.is_whitespace(),
    };
    let mut out = s;
    if left {
        out = out.trim_start_matches(matches);
    }
    if right {
        out = out.trim_end_matches(matches);
    }
    Ok(out)
}

fn affix_matches(s: &str, args: &Args, name: &str, test: fn(&str, &str) -> bool) -> GateResult<bool> {
    args.expect(name, 1, 1)?;
    match &args.positional[0] {
        Value::Str(p) => Ok(test(s, p)),
        Value::Tuple(options) => {
            for option in options.iter() {
                let p = option
                    .as_str()
                    .ok_or_else(|| type_error(format!("tuple for {name} must only contain str")))?;
                if test(s, p) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(type_error(format!(
            "{name} first arg must be str or a tuple of str, not {}",
            other.type_name()
        ))),
    }
}

fn split_whitespace_n(s: &str, maxsplit: Option<usize>) -> Vec<Value> {
    let mut out = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if maxsplit.is_some_and(|n| out.len() >= n) {
            out.push(Value::string(rest.trim_end()));
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        out.push(Value::string(&rest[..end]));
        rest = rest[end..].trim_start();
    }
    out
}

fn rsplit_whitespace_n(s: &str, maxsplit: usize) -> Vec<Value> {
    let mut out = Vec::new();
    let mut rest = s.trim_end();
    while !rest.is_empty() {
        if out.len() >= maxsplit {
            out.push(Value::string(rest.trim_start()));
            break;
        }
        let start = rest
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map_or(0, |(i, c)| i + c.len_utf8());
        out.push(Value::string(&rest[start..]));
        rest = rest[..start].trim_end();
    }
    out.reverse();
    out
}

fn split(s: &str, mut args: Args, name: &str) -> GateResult<Value> {
    let sep_kw = args.take_keyword("sep");
    let max_kw = args.take_keyword("maxsplit");
    args.no_keywords(name)?;
    args.expect(name, 0, 2)?;
    let sep = args.get(0).cloned().or(sep_kw).unwrap_or(Value::None);
    let maxsplit = match args.get(1).cloned().or(max_kw) {
        None => None,
        Some(v) => {
            let n = v.as_int().ok_or_else(|| type_error("maxsplit must be an integer"))?;
            usize::try_from(n).ok()
        }
    };
    let reverse = name == "rsplit";
    let parts: Vec<Value> = match &sep {
        Value::None => match maxsplit {
            Some(n) if reverse => rsplit_whitespace_n(s, n),
            _ => split_whitespace_n(s, maxsplit),
        },
        Value::Str(sep) if sep.is_empty() => return Err(value_error("empty separator")),
        Value::Str(sep) => match (maxsplit, reverse) {
            (None, _) => s.split(&**sep).map(Value::string).collect(),
            (Some(n), false) => s.splitn(n.saturating_add(1), &**sep).map(Value::string).collect(),
            (Some(n), true) => {
                let mut out: Vec<Value> = s.rsplitn(n.saturating_add(1), &**sep).map(Value::string).collect();
                out.reverse();
                out
            }
        },
        other => {
            return Err(type_error(format!(
                "must be str or None, not {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::list(parts))
}

fn join(s: &str, args: &Args) -> GateResult<Value> {
    args.expect("join", 1, 1)?;
    let items = ops::iterate(&args.positional[0])?;
    let mut parts = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match item {
            Value::Str(part) => parts.push(part.to_string()),
            other => {
                return Err(type_error(format!(
                    "sequence item {index}: expected str instance, {} found",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::string(parts.join(s)))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut boundary = true;
    for c in s.chars() {
        if boundary {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        boundary = !c.is_alphabetic();
    }
    out
}

pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn all_chars(s: &str, test: fn(char) -> bool) -> Value {
    Value::Bool(!s.is_empty() && s.chars().all(test))
}

fn str_method(s: &Rc<str>, name: &'static str, args: Args) -> GateResult<Value> {
    if name != "format" && name != "split" && name != "rsplit" {
        args.no_keywords(name)?;
    }
    match name {
        "upper" => {
            args.expect(name, 0, 0)?;
            Ok(Value::string(s.to_uppercase()))
        }
        "lower" => {
            args.expect(name, 0, 0)?;
            Ok(Value::string(s.to_lowercase()))
        }
        "strip" => Ok(Value::string(strip_set(s, &args, name, true, true)?)),
        "lstrip" => Ok(Value::string(strip_set(s, &args, name, true, false)?)),
        "rstrip" => Ok(Value::string(strip_set(s, &args, name, false, true)?)),
        "split" | "rsplit" => split(s, args, name),
        "splitlines" => {
            args.expect(name, 0, 0)?;
            Ok(Value::list(s.lines().map(Value::string).collect()))
        }
        "join" => join(s, &args),
        "replace" => {
            args.expect(name, 2, 3)?;
            let old = args.str_at(name, 0)?;
            let new = args.str_at(name, 1)?;
            let replaced = match args.get(2) {
                Some(count) => match count.as_int() {
                    Some(n) if n >= 0 => s.replacen(old, new, usize::try_from(n).unwrap_or(usize::MAX)),
                    Some(_) => s.replace(old, new),
                    None => return Err(type_error("replace() count must be an integer")),
                },
                None => s.replace(old, new),
            };
            if replaced.len() > MAX_SEQUENCE_LEN {
                return Err(ScriptError::runtime("MemoryError", "string is too large"));
            }
            Ok(Value::string(replaced))
        }
        "startswith" => Ok(Value::Bool(affix_matches(s, &args, name, |s, p| s.starts_with(p))?)),
        "endswith" => Ok(Value::Bool(affix_matches(s, &args, name, |s, p| s.ends_with(p))?)),
        "find" | "index" => {
            args.expect(name, 1, 1)?;
            match s.find(args.str_at(name, 0)?) {
                Some(byte) => Ok(Value::Int(char_index(s, byte))),
                None if name == "find" => Ok(Value::Int(-1)),
                None => Err(value_error("substring not found")),
            }
        }
        "count" => {
            args.expect(name, 1, 1)?;
            let sub = args.str_at(name, 0)?;
            let n = if sub.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(sub).count()
            };
            Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
        }
        "format" => Ok(Value::string(format_str(s, &args)?)),
        "isdigit" => Ok(all_chars(s, |c| c.is_ascii_digit())),
        "isalpha" => Ok(all_chars(s, char::is_alphabetic)),
        "isalnum" => Ok(all_chars(s, char::is_alphanumeric)),
        "isspace" => Ok(all_chars(s, char::is_whitespace)),
        "title" => Ok(Value::string(title_case(s))),
        "capitalize" => Ok(Value::string(capitalize(s))),
        "zfill" => {
            args.expect(name, 1, 1)?;
            let width = usize::try_from(args.int_at(name, 0)?).unwrap_or(0).min(MAX_SEQUENCE_LEN);
            let len = s.chars().count();
            if len >= width {
                return Ok(Value::Str(s.clone()));
            }
            let (sign, digits) = match s.strip_prefix(['-', '+']) {
                Some(rest) => (&s[..1], rest),
                None => ("", &**s),
            };
            Ok(Value::string(format!("{sign}{}{digits}", "0".repeat(width - len))))
        }
        _ => Err(ScriptError::runtime("AttributeError", format!("'str' object has no attribute '{name}'"))),
    }
}

/// `str.format` over positional and keyword arguments
///
/// # Errors
///
/// Returns `ValueError` for malformed templates, `IndexError` and `KeyError`
/// for missing fields
pub fn format_str(template: &str, args: &Args) -> GateResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut next_auto = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => return Err(value_error("Single '{' encountered in format string")),
                    }
                }
                let (name, spec) = field.split_once(':').unwrap_or((&field, ""));
                let value = if name.is_empty() {
                    next_auto += 1;
                    positional_field(args, next_auto - 1)?
                } else if let Ok(index) = name.parse::<usize>() {
                    positional_field(args, index)?
                } else {
                    args.keywords
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| ScriptError::runtime("KeyError", format!("'{name}'")))?
                };
                out.push_str(&apply_format_spec(value, spec)?);
            }
            '}' => return Err(value_error("Single '}' encountered in format string")),
            other => out.push(other),
        }
    }
    Ok(out)
}

fn positional_field(args: &Args, index: usize) -> GateResult<&Value> {
    args.get(index).ok_or_else(|| {
        ScriptError::runtime(
            "IndexError",
            format!("Replacement index {index} out of range for positional args tuple"),
        )
    })
}

fn group_thousands(digits: &str) -> String {
    let (int_part, frac) = match digits.find('.') {
        Some(dot) => digits.split_at(dot),
        None => (digits, ""),
    };
    let (sign, int_part) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}{frac}")
}

/// Apply a format spec: `[<>^][width][,][.precision][type]`
///
/// # Errors
///
/// Returns `ValueError` for specs outside that grammar or that do not fit
/// the value's type
pub fn apply_format_spec(value: &Value, spec: &str) -> GateResult<String> {
    if spec.is_empty() {
        return Ok(value.to_display());
    }
    let invalid = || value_error(format!("Invalid format specifier '{spec}' for object of type '{}'", value.type_name()));
    let mut rest = spec;
    let align = match rest.chars().next() {
        Some(c @ ('<' | '>' | '^')) => {
            rest = &rest[1..];
            Some(c)
        }
        _ => None,
    };
    let width_len = rest.chars().take_while(char::is_ascii_digit).count();
    let width: usize = if width_len == 0 { 0 } else { rest[..width_len].parse().map_err(|_| invalid())? };
    if width > MAX_SEQUENCE_LEN {
        return Err(ScriptError::runtime("MemoryError", "format width is too large"));
    }
    rest = &rest[width_len..];
    let grouping = rest.starts_with(',');
    if grouping {
        rest = &rest[1..];
    }
    let precision = match rest.strip_prefix('.') {
        Some(tail) => {
            let len = tail.chars().take_while(char::is_ascii_digit).count();
            let p: usize = tail[..len].parse().map_err(|_| invalid())?;
            rest = &tail[len..];
            Some(p.min(ops::MAX_PRECISION))
        }
        None => None,
    };
    let body = match rest {
        "f" | "F" if value.is_number() => {
            format!("{:.*}", precision.unwrap_or(6), value.as_float().ok_or_else(invalid)?)
        }
        "" if precision.is_some() && matches!(value, Value::Float(_)) => {
            format!("{:.*}", precision.unwrap_or(6), value.as_float().ok_or_else(invalid)?)
        }
        "%" if value.is_number() => {
            let f = value.as_float().ok_or_else(invalid)? * 100.0;
            format!("{f:.*}%", precision.unwrap_or(6))
        }
        "d" => match value {
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => i64::from(*b).to_string(),
            _ => return Err(invalid()),
        },
        "s" | "" => match value {
            Value::Str(s) => match precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.to_string(),
            },
            _ if rest == "s" => return Err(invalid()),
            other => other.to_display(),
        },
        _ => return Err(invalid()),
    };
    let body = if grouping && value.is_number() { group_thousands(&body) } else { body };
    let len = body.chars().count();
    if len >= width {
        return Ok(body);
    }
    let pad = width - len;
    let align = align.unwrap_or(if value.is_number() { '>' } else { '<' });
    Ok(match align {
        '>' => format!("{}{body}", " ".repeat(pad)),
        '^' => format!("{}{body}{}", " ".repeat(pad / 2), " ".repeat(pad - pad / 2)),
        _ => format!("{body}{}", " ".repeat(pad)),
    })
}

fn list_method(
    interp: &mut Interpreter<'_>,
    items: &Rc<RefCell<Vec<Value>>>,
    name: &'static str,
    mut args: Args,
) -> GateResult<Value> {
    if name == "sort" {
        let key = args.take_keyword("key");
        let reverse = args.take_keyword("reverse").is_some_and(|v| v.is_truthy());
        args.no_keywords(name)?;
        args.expect(name, 0, 0)?;
        let snapshot = items.borrow().clone();
        let sorted = sort_values(interp, snapshot, key.as_ref(), reverse)?;
        *items.borrow_mut() = sorted;
        return Ok(Value::None);
    }
    args.no_keywords(name)?;
    match name {
        "append" => {
            args.expect(name, 1, 1)?;
            let mut list = items.borrow_mut();
            if list.len() >= MAX_SEQUENCE_LEN {
                return Err(ScriptError::runtime("MemoryError", "list is too large"));
            }
            list.extend(args.positional);
            Ok(Value::None)
        }
        "extend" => {
            args.expect(name, 1, 1)?;
            let extra = ops::iterate(&args.positional[0])?;
            let mut list = items.borrow_mut();
            if list.len() + extra.len() > MAX_SEQUENCE_LEN {
                return Err(ScriptError::runtime("MemoryError", "list is too large"));
            }
            list.extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            args.expect(name, 2, 2)?;
            let index = args.int_at(name, 0)?;
            let mut list = items.borrow_mut();
            let len = i64::try_from(list.len()).unwrap_or(i64::MAX);
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            list.insert(usize::try_from(at).unwrap_or(0), args.positional[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            args.expect(name, 0, 1)?;
            let mut list = items.borrow_mut();
            if list.is_empty() {
                return Err(ScriptError::runtime("IndexError", "pop from empty list"));
            }
            let len = i64::try_from(list.len()).unwrap_or(i64::MAX);
            let index = match args.get(0) {
                Some(_) => args.int_at(name, 0)?,
                None => len - 1,
            };
            let resolved = if index < 0 { index + len } else { index };
            if !(0..len).contains(&resolved) {
                return Err(ScriptError::runtime("IndexError", "pop index out of range"));
            }
            Ok(list.remove(usize::try_from(resolved).unwrap_or(0)))
        }
        "remove" => {
            args.expect(name, 1, 1)?;
            let position = items.borrow().iter().position(|v| v.py_eq(&args.positional[0]));
            match position {
                Some(i) => {
                    items.borrow_mut().remove(i);
                    Ok(Value::None)
                }
                None => Err(value_error("list.remove(x): x not in list")),
            }
        }
        "index" => {
            args.expect(name, 1, 1)?;
            let needle = &args.positional[0];
            items
                .borrow()
                .iter()
                .position(|v| v.py_eq(needle))
                .map(|i| Value::Int(i64::try_from(i).unwrap_or(i64::MAX)))
                .ok_or_else(|| value_error(format!("{} is not in list", needle.repr())))
        }
        "count" => {
            args.expect(name, 1, 1)?;
            let n = items.borrow().iter().filter(|v| v.py_eq(&args.positional[0])).count();
            Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
        }
        "reverse" => {
            args.expect(name, 0, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "copy" => {
            args.expect(name, 0, 0)?;
            Ok(Value::list(items.borrow().clone()))
        }
        "clear" => {
            args.expect(name, 0, 0)?;
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(ScriptError::runtime("AttributeError", format!("'list' object has no attribute '{name}'"))),
    }
}

fn dict_method(map: &Rc<RefCell<DictMap>>, name: &'static str, args: Args) -> GateResult<Value> {
    if name != "update" {
        args.no_keywords(name)?;
    }
    match name {
        "get" => {
            args.expect(name, 1, 2)?;
            let key = Key::from_value(&args.positional[0])?;
            Ok(map
                .borrow()
                .get(&key)
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            args.expect(name, 0, 0)?;
            Ok(Value::list(map.borrow().keys().map(Key::to_value).collect()))
        }
        "values" => {
            args.expect(name, 0, 0)?;
            Ok(Value::list(map.borrow().values().cloned().collect()))
        }
        "items" => {
            args.expect(name, 0, 0)?;
            Ok(Value::list(
                map.borrow()
                    .iter()
                    .map(|(k, v)| Value::tuple(vec![k.to_value(), v.clone()]))
                    .collect(),
            ))
        }
        "pop" => {
            args.expect(name, 1, 2)?;
            let key = Key::from_value(&args.positional[0])?;
            let removed = map.borrow_mut().shift_remove(&key);
            match (removed, args.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(ScriptError::runtime("KeyError", args.positional[0].repr())),
            }
        }
        "setdefault" => {
            args.expect(name, 1, 2)?;
            let key = Key::from_value(&args.positional[0])?;
            let default = args.get(1).cloned().unwrap_or(Value::None);
            Ok(map.borrow_mut().entry(key).or_insert(default).clone())
        }
        "update" => {
            args.expect(name, 0, 1)?;
            let mut incoming = DictMap::new();
            if let Some(source) = args.get(0) {
                extend_dict(&mut incoming, source)?;
            }
            for (k, v) in args.keywords {
                incoming.insert(Key::str(&k), v);
            }
            map.borrow_mut().extend(incoming);
            Ok(Value::None)
        }
        "copy" => {
            args.expect(name, 0, 0)?;
            Ok(Value::dict(map.borrow().clone()))
        }
        "clear" => {
            args.expect(name, 0, 0)?;
            map.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(ScriptError::runtime("AttributeError", format!("'dict' object has no attribute '{name}'"))),
    }
}

#[cfg(test)]
mod tests {
    use crate::testkit::{error, repr};

    #[test]
    fn test_str_methods() {
        assert_eq!(repr("r = ' Hi There '.strip().lower()"), "'hi there'");
        assert_eq!(repr("r = 'xxhixx'.strip('x')"), "'hi'");
        assert_eq!(repr("r = 'a,b,,c'.split(',')"), "['a', 'b', '', 'c']");
        assert_eq!(repr("r = '  a  b c '.split()"), "['a', 'b', 'c']");
        assert_eq!(repr("r = 'a b c'.split(None, 1)"), "['a', 'b c']");
        assert_eq!(repr("r = 'a-b-c'.rsplit('-', 1)"), "['a-b', 'c']");
        assert_eq!(repr("r = '-'.join(['a', 'b'])"), "'a-b'");
        assert_eq!(repr("r = 'hello'.find('l')"), "2");
        assert_eq!(repr("r = 'hello'.replace('l', 'L', 1)"), "'heLlo'");
        assert_eq!(repr("r = 'hello world'.title()"), "'Hello World'");
        assert_eq!(repr("r = 'x.csv'.endswith(('.tsv', '.csv'))"), "True");
        assert_eq!(repr("r = '42'.zfill(5)"), "'00042'");
        assert_eq!(error("r = '-'.join([1])").message(), "sequence item 0: expected str instance, int found");
        assert_eq!(error("r = 'abc'.nope").kind(), "AttributeError");
    }

    #[test]
    fn test_str_format() {
        assert_eq!(repr("r = '{} + {} = {total}'.format(1, 2, total=3)"), "'1 + 2 = 3'");
        assert_eq!(repr("r = '{0}{1}{0}'.format('a', 'b')"), "'aba'");
        assert_eq!(repr("r = '{:.2f}|{:>5}|{:<3}|'.format(3.14159, 'ab', 'x')"), "'3.14|   ab|x  |'");
        assert_eq!(repr("r = '{:,}'.format(1234567)"), "'1,234,567'");
        assert_eq!(repr("r = '{:.1%}'.format(0.25)"), "'25.0%'");
        assert_eq!(repr("r = '{{}}'.format()"), "'{}'");
        assert_eq!(error("r = '{}'.format()").kind(), "IndexError");
        assert_eq!(error("r = '{x}'.format()").kind(), "KeyError");
    }

    #[test]
    fn test_format_sizes_are_bounded() {
        let err = error("r = '{:>99999999999999999}'.format(1)");
        assert_eq!(err.to_string(), "MemoryError: format width is too large");
        assert_eq!(error("r = format(1, '99999999999')").kind(), "MemoryError");
        assert_eq!(repr("r = len('{:.99999999999f}'.format(1.5))"), "102");
        assert_eq!(repr("r = len('%.99999999999f' % 1.5)"), "102");
        assert_eq!(repr("r = len('{:>8}'.format(1))"), "8");
        let err = error("s = 'a' * 4000000\nwhile True:\n    s = s + s");
        assert_eq!(err.to_string(), "MemoryError: concatenated sequence is too large");
        let err = error("l = [0] * 9999999\nl += [1, 2]");
        assert_eq!(err.to_string(), "MemoryError: list is too large");
    }

    #[test]
    fn test_list_methods() {
        assert_eq!(
            repr("r = [3, 1]\nr.append(2)\nr.extend((5, 4))\nr.sort()\nr.insert(0, 9)\nr.remove(5)"),
            "[9, 1, 2, 3, 4]"
        );
        assert_eq!(repr("l = [1, 2, 3]\nr = (l.pop(), l.pop(0), l)"), "(3, 1, [2])");
        assert_eq!(repr("l = ['b', 'A', 'c']\nl.sort(key=lambda s: s.lower(), reverse=True)\nr = l"), "['c', 'b', 'A']");
        assert_eq!(repr("l = [1, 2, 1]\nr = (l.count(1), l.index(2))"), "(2, 1)");
        assert_eq!(error("r = [].pop()").message(), "pop from empty list");
    }

    #[test]
    fn test_extend_with_self_snapshots() {
        assert_eq!(repr("r = [1, 2]\nr.extend(r)"), "[1, 2, 1, 2]");
    }

    #[test]
    fn test_dict_methods() {
        assert_eq!(repr("d = {'a': 1}\nr = (d.get('a'), d.get('z'), d.get('z', 0))"), "(1, None, 0)");
        assert_eq!(
            repr("d = {'a': 1}\nd.update({'b': 2}, c=3)\nd.setdefault('a', 9)\nr = d.items()"),
            "[('a', 1), ('b', 2), ('c', 3)]"
        );
        assert_eq!(repr("d = {'a': 1, 'b': 2}\nx = d.pop('a')\nr = (x, d.keys(), d.values())"), "(1, ['b'], [2])");
        assert_eq!(error("r = {}.pop('k')").to_string(), "KeyError: 'k'");
    }
}
