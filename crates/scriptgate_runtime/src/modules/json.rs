//! `json`

use super::{NativeFn, NativeModule};
use crate::args::Args;
use crate::value::{value_error, Value};
use scriptgate_core::GateResult;
use serde_json::Value as Json;

pub(super) static MODULE: NativeModule = NativeModule {
    name: "json",
    functions: &FUNCTIONS,
    constants: &[],
};

const FUNCTIONS: [(&str, NativeFn); 2] = [("dumps", dumps), ("loads", loads)];

/// Layout of a dumped document
#[derive(Debug, Clone, Copy)]
struct Layout {
    indent: Option<usize>,
    sort_keys: bool,
}

fn write_string(out: &mut String, s: &str) -> GateResult<()> {
    out.push_str(&serde_json::to_string(s)?);
    Ok(())
}

fn newline(out: &mut String, layout: Layout, level: usize) {
    if let Some(width) = layout.indent {
        out.push('\n');
        out.push_str(&" ".repeat(width * level));
    }
}

fn write_value(out: &mut String, value: &Json, layout: Layout, level: usize) -> GateResult<()> {
    let item_sep = if layout.indent.is_some() { "," } else { ", " };
    match value {
        Json::Array(items) if !items.is_empty() => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(item_sep);
                }
                newline(out, layout, level + 1);
                write_value(out, item, layout, level + 1)?;
            }
            newline(out, layout, level);
            out.push(']');
        }
        Json::Object(map) if !map.is_empty() => {
            let mut entries: Vec<(&String, &Json)> = map.iter().collect();
            if layout.sort_keys {
                entries.sort_by(|a, b| a.0.cmp(b.0));
            }
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(item_sep);
                }
                newline(out, layout, level + 1);
                write_string(out, key)?;
                out.push_str(": ");
                write_value(out, item, layout, level + 1)?;
            }
            newline(out, layout, level);
            out.push('}');
        }
        Json::String(s) => write_string(out, s)?,
        other => out.push_str(&serde_json::to_string(other)?),
    }
    Ok(())
}

/// Serialize with the separators scripts expect: `", "` and `": "`
///
/// # Errors
///
/// Returns `TypeError` for values with no JSON form
pub fn to_script_json(value: &Value, indent: Option<usize>, sort_keys: bool) -> GateResult<String> {
    let json = value.to_json()?;
    let mut out = String::new();
    write_value(&mut out, &json, Layout { indent, sort_keys }, 0)?;
    Ok(out)
}

fn dumps(mut args: Args) -> GateResult<Value> {
    let indent = match args.take_keyword("indent") {
        None | Some(Value::None) => None,
        Some(v) => Some(
            v.as_int()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| value_error("indent must be a non-negative integer"))?
                .min(32),
        ),
    };
    let sort_keys = args.take_keyword("sort_keys").is_some_and(|v| v.is_truthy());
    args.take_keyword("default");
    args.no_keywords("dumps")?;
    args.expect("dumps", 1, 1)?;
    Ok(Value::string(to_script_json(&args.positional[0], indent, sort_keys)?))
}

fn loads(args: Args) -> GateResult<Value> {
    args.no_keywords("loads")?;
    args.expect("loads", 1, 1)?;
    let json: Json = serde_json::from_str(args.str_at("loads", 0)?)?;
    Ok(Value::from_json(&json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{error, repr};

    #[test]
    fn test_dumps_uses_spaced_separators() {
        assert_eq!(repr("import json\nr = json.dumps({'a': [1, 2.5, None, True]})"), r#"'{"a": [1, 2.5, null, true]}'"#);
        assert_eq!(repr("import json\nr = json.dumps([])"), "'[]'");
    }

    #[test]
    fn test_dumps_indent_and_sort_keys() {
        let out = to_script_json(&crate::testkit::eval("r = {'b': 1, 'a': [1]}"), Some(2), true).unwrap();
        assert_eq!(out, "{\n  \"a\": [\n    1\n  ],\n  \"b\": 1\n}");
    }

    #[test]
    fn test_loads() {
        assert_eq!(repr("import json\nr = json.loads('{\"x\": [1, \"y\", null]}')"), "{'x': [1, 'y', None]}");
        assert_eq!(error("import json\njson.loads('{')").kind(), "ValueError");
    }

    #[test]
    fn test_dumps_rejects_functions() {
        assert_eq!(error("import json\njson.dumps(len)").kind(), "TypeError");
    }
}
