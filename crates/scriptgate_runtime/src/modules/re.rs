//! `re`
//!
//! Backed by the `regex` crate, so matching is linear-time and patterns
//! using backreferences or lookaround are rejected at compile time.

use super::{NativeFn, NativeModule};
use crate::args::Args;
use crate::value::{value_error, Value};
use regex::{Captures, Regex, RegexBuilder};
use scriptgate_core::GateResult;

pub(super) static MODULE: NativeModule = NativeModule {
    name: "re",
    functions: &FUNCTIONS,
    constants: &[],
};

const FUNCTIONS: [(&str, NativeFn); 7] = [
    ("escape", escape),
    ("findall", findall),
    ("fullmatch", fullmatch),
    ("match", match_),
    ("search", search),
    ("split", split),
    ("sub", sub),
];

/// Compiled program size ceiling for script patterns
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

#[derive(Clone, Copy)]
enum Anchor {
    None,
    Start,
    Full,
}

fn compile(pattern: &str, anchor: Anchor) -> GateResult<Regex> {
    let source = match anchor {
        Anchor::None => pattern.to_string(),
        Anchor::Start => format!(r"\A(?:{pattern})"),
        Anchor::Full => format!(r"\A(?:{pattern})\z"),
    };
    RegexBuilder::new(&source)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map_err(|err| value_error(format!("invalid regular expression: {err}")))
}

fn group_value(caps: &Captures<'_>, index: usize) -> Value {
    caps.get(index).map_or(Value::None, |m| Value::string(m.as_str()))
}

/// Match as a list: the whole match followed by each group
fn match_value(caps: &Captures<'_>) -> Value {
    Value::list((0..caps.len()).map(|i| group_value(caps, i)).collect())
}

fn find(args: &Args, name: &str, anchor: Anchor) -> GateResult<Value> {
    args.no_keywords(name)?;
    args.expect(name, 2, 2)?;
    let re = compile(args.str_at(name, 0)?, anchor)?;
    Ok(re
        .captures(args.str_at(name, 1)?)
        .map_or(Value::None, |caps| match_value(&caps)))
}

fn search(args: Args) -> GateResult<Value> {
    find(&args, "search", Anchor::None)
}

fn match_(args: Args) -> GateResult<Value> {
    find(&args, "match", Anchor::Start)
}

fn fullmatch(args: Args) -> GateResult<Value> {
    find(&args, "fullmatch", Anchor::Full)
}

fn findall(args: Args) -> GateResult<Value> {
    args.no_keywords("findall")?;
    args.expect("findall", 2, 2)?;
    let re = compile(args.str_at("findall", 0)?, Anchor::None)?;
    let groups = re.captures_len() - 1;
    let found = re
        .captures_iter(args.str_at("findall", 1)?)
        .map(|caps| match groups {
            0 => group_value(&caps, 0),
            1 => caps.get(1).map_or_else(|| Value::string(""), |m| Value::string(m.as_str())),
            _ => Value::tuple(
                (1..=groups)
                    .map(|i| caps.get(i).map_or_else(|| Value::string(""), |m| Value::string(m.as_str())))
                    .collect(),
            ),
        })
        .collect();
    Ok(Value::list(found))
}

/// Rewrite `\1` and `\g<name>` references into `${1}` and `${name}`
fn translate_replacement(repl: &str) -> String {
    let mut out = String::with_capacity(repl.len());
    let mut chars = repl.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(&d) = chars.peek() {
                        if !d.is_ascii_digit() {
                            break;
                        }
                        group.push(d);
                        chars.next();
                    }
                    out.push_str(&format!("${{{group}}}"));
                }
                Some('g') => {
                    chars.next();
                    let mut group = String::new();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        for d in chars.by_ref() {
                            if d == '>' {
                                break;
                            }
                            group.push(d);
                        }
                    }
                    out.push_str(&format!("${{{group}}}"));
                }
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                _ => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

fn sub(mut args: Args) -> GateResult<Value> {
    let count_kw = args.take_keyword("count");
    args.no_keywords("sub")?;
    args.expect("sub", 3, 4)?;
    let re = compile(args.str_at("sub", 0)?, Anchor::None)?;
    let repl = translate_replacement(args.str_at("sub", 1)?);
    let text = args.str_at("sub", 2)?;
    let count = match args.get(3).cloned().or(count_kw) {
        Some(v) => v.as_int().ok_or_else(|| value_error("count must be an integer"))?,
        None => 0,
    };
    let limit = usize::try_from(count).unwrap_or(0);
    Ok(Value::string(re.replacen(text, limit, repl.as_str())))
}

fn split(mut args: Args) -> GateResult<Value> {
    let max_kw = args.take_keyword("maxsplit");
    args.no_keywords("split")?;
    args.expect("split", 2, 3)?;
    let re = compile(args.str_at("split", 0)?, Anchor::None)?;
    let text = args.str_at("split", 1)?;
    let maxsplit = match args.get(2).cloned().or(max_kw) {
        Some(v) => v.as_int().ok_or_else(|| value_error("maxsplit must be an integer"))?,
        None => 0,
    };
    let parts: Vec<Value> = match usize::try_from(maxsplit) {
        Ok(n) if n > 0 => re.splitn(text, n + 1).map(Value::string).collect(),
        _ => re.split(text).map(Value::string).collect(),
    };
    Ok(Value::list(parts))
}

fn escape(args: Args) -> GateResult<Value> {
    args.expect("escape", 1, 1)?;
    Ok(Value::string(regex::escape(args.str_at("escape", 0)?)))
}
