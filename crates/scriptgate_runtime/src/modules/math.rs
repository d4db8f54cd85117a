//! `math`

use super::{Constant, NativeFn, NativeModule};
use crate::args::Args;
use crate::builtins::float_to_int;
use crate::value::{value_error, Value};
use scriptgate_core::GateResult;

pub(super) static MODULE: NativeModule = NativeModule {
    name: "math",
    functions: &FUNCTIONS,
    constants: &[
        ("pi", Constant::Float(std::f64::consts::PI)),
        ("e", Constant::Float(std::f64::consts::E)),
        ("tau", Constant::Float(std::f64::consts::TAU)),
        ("inf", Constant::Float(f64::INFINITY)),
        ("nan", Constant::Float(f64::NAN)),
    ],
};

const FUNCTIONS: [(&str, NativeFn); 18] = [
    ("ceil", ceil),
    ("cos", cos),
    ("exp", exp),
    ("fabs", fabs),
    ("floor", floor),
    ("isclose", isclose),
    ("isfinite", isfinite),
    ("isinf", isinf),
    ("isnan", isnan),
    ("log", log),
    ("log10", log10),
    ("log2", log2),
    ("pow", pow),
    ("sin", sin),
    ("sqrt", sqrt),
    ("tan", tan),
    ("trunc", trunc),
    ("atan", atan),
];

fn unary(args: &Args, name: &str) -> GateResult<f64> {
    args.no_keywords(name)?;
    args.expect(name, 1, 1)?;
    args.float_at(name, 0)
}

fn domain(result: f64) -> GateResult<Value> {
    if result.is_nan() {
        Err(value_error("math domain error"))
    } else {
        Ok(Value::Float(result))
    }
}

fn integral(args: &Args, name: &str, round: fn(f64) -> f64) -> GateResult<Value> {
    args.expect(name, 1, 1)?;
    match &args.positional[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        _ => float_to_int(round(args.float_at(name, 0)?)),
    }
}

fn floor(args: Args) -> GateResult<Value> {
    integral(&args, "floor", f64::floor)
}

fn ceil(args: Args) -> GateResult<Value> {
    integral(&args, "ceil", f64::ceil)
}

fn trunc(args: Args) -> GateResult<Value> {
    integral(&args, "trunc", f64::trunc)
}

fn sqrt(args: Args) -> GateResult<Value> {
    let x = unary(&args, "sqrt")?;
    if x < 0.0 {
        return Err(value_error("math domain error"));
    }
    Ok(Value::Float(x.sqrt()))
}

fn exp(args: Args) -> GateResult<Value> {
    let x = unary(&args, "exp")?;
    let result = x.exp();
    if result.is_infinite() && x.is_finite() {
        return Err(scriptgate_core::ScriptError::runtime("OverflowError", "math range error"));
    }
    Ok(Value::Float(result))
}

fn checked_log(x: f64) -> GateResult<f64> {
    if x <= 0.0 {
        Err(value_error("math domain error"))
    } else {
        Ok(x.ln())
    }
}

fn log(args: Args) -> GateResult<Value> {
    args.no_keywords("log")?;
    args.expect("log", 1, 2)?;
    let x = checked_log(args.float_at("log", 0)?)?;
    match args.get(1) {
        Some(_) => {
            let base = checked_log(args.float_at("log", 1)?)?;
            if base == 0.0 {
                return Err(scriptgate_core::ScriptError::runtime("ZeroDivisionError", "float division by zero"));
            }
            Ok(Value::Float(x / base))
        }
        None => Ok(Value::Float(x)),
    }
}

fn log10(args: Args) -> GateResult<Value> {
    let x = unary(&args, "log10")?;
    Ok(Value::Float(checked_log(x)? / std::f64::consts::LN_10))
}

fn log2(args: Args) -> GateResult<Value> {
    let x = unary(&args, "log2")?;
    Ok(Value::Float(checked_log(x)? / std::f64::consts::LN_2))
}

fn pow(args: Args) -> GateResult<Value> {
    args.expect("pow", 2, 2)?;
    domain(args.float_at("pow", 0)?.powf(args.float_at("pow", 1)?))
}

fn fabs(args: Args) -> GateResult<Value> {
    Ok(Value::Float(unary(&args, "fabs")?.abs()))
}

fn sin(args: Args) -> GateResult<Value> {
    domain(unary(&args, "sin")?.sin())
}

fn cos(args: Args) -> GateResult<Value> {
    domain(unary(&args, "cos")?.cos())
}

fn tan(args: Args) -> GateResult<Value> {
    domain(unary(&args, "tan")?.tan())
}

fn atan(args: Args) -> GateResult<Value> {
    Ok(Value::Float(unary(&args, "atan")?.atan()))
}

fn isnan(args: Args) -> GateResult<Value> {
    Ok(Value::Bool(unary(&args, "isnan")?.is_nan()))
}

fn isinf(args: Args) -> GateResult<Value> {
    Ok(Value::Bool(unary(&args, "isinf")?.is_infinite()))
}

fn isfinite(args: Args) -> GateResult<Value> {
    Ok(Value::Bool(unary(&args, "isfinite")?.is_finite()))
}

fn isclose(mut args: Args) -> GateResult<Value> {
    let rel = args.take_keyword("rel_tol").and_then(|v| v.as_float()).unwrap_or(1e-9);
    let abs = args.take_keyword("abs_tol").and_then(|v| v.as_float()).unwrap_or(0.0);
    args.no_keywords("isclose")?;
    args.expect("isclose", 2, 2)?;
    let (a, b) = (args.float_at("isclose", 0)?, args.float_at("isclose", 1)?);
    if a == b {
        return Ok(Value::Bool(true));
    }
    let diff = (a - b).abs();
    Ok(Value::Bool(diff <= (rel * b.abs()).max(rel * a.abs()) || diff <= abs))
}

#[cfg(test)]
mod tests {
    use crate::testkit::{error, repr};

    #[test]
    fn test_rounding_returns_ints() {
        assert_eq!(repr("import math\nr = (math.floor(-2.5), math.ceil(2.1), math.trunc(-2.7), math.floor(3))"), "(-3, 3, -2, 3)");
    }

    #[test]
    fn test_functions_and_constants() {
        assert_eq!(repr("import math\nr = math.sqrt(16)"), "4.0");
        assert_eq!(repr("import math\nr = math.log(8, 2)"), "3.0");
        assert_eq!(repr("import math\nr = round(math.pi, 2)"), "3.14");
        assert_eq!(repr("from math import isinf, inf\nr = isinf(inf)"), "True");
        assert_eq!(repr("import math\nr = math.isclose(0.1 + 0.2, 0.3)"), "True");
    }

    #[test]
    fn test_domain_errors() {
        assert_eq!(error("import math\nmath.sqrt(-1)").to_string(), "ValueError: math domain error");
        assert_eq!(error("import math\nmath.log(0)").kind(), "ValueError");
        assert_eq!(error("import math\nmath.floor(math.inf)").kind(), "OverflowError");
    }
}
