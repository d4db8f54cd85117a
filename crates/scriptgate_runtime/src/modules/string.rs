//! `string`

use super::{Constant, NativeFn, NativeModule};
use crate::args::Args;
use crate::methods::capitalize;
use crate::value::{value_error, Value};
use scriptgate_core::GateResult;

pub(super) static MODULE: NativeModule = NativeModule {
    name: "string",
    functions: &FUNCTIONS,
    constants: &[
        ("ascii_letters", Constant::Str("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ")),
        ("ascii_lowercase", Constant::Str("abcdefghijklmnopqrstuvwxyz")),
        ("ascii_uppercase", Constant::Str("ABCDEFGHIJKLMNOPQRSTUVWXYZ")),
        ("digits", Constant::Str("0123456789")),
        ("hexdigits", Constant::Str("0123456789abcdefABCDEF")),
        ("octdigits", Constant::Str("01234567")),
        ("punctuation", Constant::Str("!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~")),
        ("whitespace", Constant::Str(" \t\n\r\x0b\x0c")),
    ],
};

const FUNCTIONS: [(&str, NativeFn); 1] = [("capwords", capwords)];

fn capwords(args: Args) -> GateResult<Value> {
    args.no_keywords("capwords")?;
    args.expect("capwords", 1, 2)?;
    let text = args.str_at("capwords", 0)?;
    let joined = match args.get(1) {
        None | Some(Value::None) => text
            .split_whitespace()
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" "),
        Some(_) => {
            let sep = args.str_at("capwords", 1)?;
            if sep.is_empty() {
                return Err(value_error("empty separator"));
            }
            text.split(sep).map(capitalize).collect::<Vec<_>>().join(sep)
        }
    };
    Ok(Value::string(joined))
}

#[cfg(test)]
mod tests {
    use crate::testkit::repr;

    #[test]
    fn test_constants_and_capwords() {
        assert_eq!(repr("import string\nr = string.digits"), "'0123456789'");
        assert_eq!(repr("from string import capwords\nr = capwords('  hello   wORLD ')"), "'Hello World'");
        assert_eq!(repr("import string\nr = string.capwords('a-b', '-')"), "'A-B'");
    }
}
