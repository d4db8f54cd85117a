//! `datetime`
//!
//! Dates travel through scripts as ISO-8601 strings: `YYYY-MM-DD` for dates
//! and `YYYY-MM-DDTHH:MM:SS[.ffffff]` for naive UTC timestamps. Offsets on
//! input are normalized to UTC.

use super::{NativeFn, NativeModule};
use crate::args::Args;
use crate::value::{value_error, Value};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use scriptgate_core::{GateResult, ScriptError};
use std::fmt::Write as _;

pub(super) static MODULE: NativeModule = NativeModule {
    name: "datetime",
    functions: &FUNCTIONS,
    constants: &[],
};

const FUNCTIONS: [(&str, NativeFn); 9] = [
    ("add_days", add_days),
    ("add_seconds", add_seconds),
    ("date", date),
    ("fromtimestamp", fromtimestamp),
    ("now", now),
    ("parse", parse),
    ("strftime", strftime),
    ("timestamp", timestamp),
    ("today", today),
];

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Moment {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Moment {
    fn parse(text: &str) -> GateResult<Self> {
        let text = text.trim();
        if let Ok(date) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
            return Ok(Self::Date(date));
        }
        for format in [DATETIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
                return Ok(Self::DateTime(dt));
            }
        }
        DateTime::parse_from_rfc3339(text)
            .map(|dt| Self::DateTime(dt.with_timezone(&Utc).naive_utc()))
            .map_err(|_| value_error(format!("Invalid isoformat string: '{text}'")))
    }

    fn naive(self) -> NaiveDateTime {
        match self {
            Self::Date(d) => d.and_time(chrono::NaiveTime::MIN),
            Self::DateTime(dt) => dt,
        }
    }

    fn shift(self, delta: Duration) -> GateResult<Self> {
        let overflow = || ScriptError::runtime("OverflowError", "date value out of range");
        Ok(match self {
            Self::Date(d) => Self::Date(d.checked_add_signed(delta).ok_or_else(overflow)?),
            Self::DateTime(dt) => Self::DateTime(dt.checked_add_signed(delta).ok_or_else(overflow)?),
        })
    }

    fn to_value(self) -> Value {
        Value::string(match self {
            Self::Date(d) => d.format(DATE_FORMAT).to_string(),
            Self::DateTime(dt) => iso_datetime(dt),
        })
    }
}

fn iso_datetime(dt: NaiveDateTime) -> String {
    if dt.and_utc().timestamp_subsec_micros() == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

fn moment_at(args: &Args, name: &str) -> GateResult<Moment> {
    Moment::parse(args.str_at(name, 0)?)
}

fn now(args: Args) -> GateResult<Value> {
    args.expect("now", 0, 0)?;
    Ok(Value::string(Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()))
}

fn today(args: Args) -> GateResult<Value> {
    args.expect("today", 0, 0)?;
    Ok(Moment::Date(Utc::now().date_naive()).to_value())
}

fn date(args: Args) -> GateResult<Value> {
    args.no_keywords("date")?;
    args.expect("date", 3, 3)?;
    let part = |i: usize| -> GateResult<u32> {
        u32::try_from(args.int_at("date", i)?).map_err(|_| value_error("date component out of range"))
    };
    let year = i32::try_from(args.int_at("date", 0)?).map_err(|_| value_error("year is out of range"))?;
    NaiveDate::from_ymd_opt(year, part(1)?, part(2)?)
        .map(|d| Moment::Date(d).to_value())
        .ok_or_else(|| value_error("day is out of range for month"))
}

fn parse(args: Args) -> GateResult<Value> {
    args.expect("parse", 1, 1)?;
    Ok(moment_at(&args, "parse")?.to_value())
}

fn add_days(args: Args) -> GateResult<Value> {
    args.expect("add_days", 2, 2)?;
    let days = args.int_at("add_days", 1)?;
    let delta = Duration::try_days(days).ok_or_else(|| ScriptError::runtime("OverflowError", "days out of range"))?;
    Ok(moment_at(&args, "add_days")?.shift(delta)?.to_value())
}

fn add_seconds(args: Args) -> GateResult<Value> {
    args.expect("add_seconds", 2, 2)?;
    let seconds = args.float_at("add_seconds", 1)?;
    if !seconds.is_finite() || seconds.abs() > 1e15 {
        return Err(ScriptError::runtime("OverflowError", "seconds out of range"));
    }
    let delta = Duration::microseconds((seconds * 1e6).round() as i64);
    let moment = Moment::DateTime(moment_at(&args, "add_seconds")?.naive());
    Ok(moment.shift(delta)?.to_value())
}

fn timestamp(args: Args) -> GateResult<Value> {
    args.expect("timestamp", 1, 1)?;
    let dt = moment_at(&args, "timestamp")?.naive().and_utc();
    Ok(Value::Float(dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) / 1e6))
}

fn fromtimestamp(args: Args) -> GateResult<Value> {
    args.expect("fromtimestamp", 1, 1)?;
    let seconds = args.float_at("fromtimestamp", 0)?;
    let out_of_range = || value_error("timestamp out of range for platform");
    if !seconds.is_finite() || seconds.abs() > 1e14 {
        return Err(out_of_range());
    }
    let micros = (seconds * 1e6).round() as i64;
    let dt = DateTime::from_timestamp_micros(micros).ok_or_else(out_of_range)?;
    Ok(Moment::DateTime(dt.naive_utc()).to_value())
}

fn strftime(args: Args) -> GateResult<Value> {
    args.expect("strftime", 2, 2)?;
    let moment = moment_at(&args, "strftime")?;
    let format = args.str_at("strftime", 1)?;
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(value_error(format!("invalid format string: '{format}'")));
    }
    let mut out = String::new();
    write!(out, "{}", moment.naive().format_with_items(StrftimeItems::new(format)))
        .map_err(|_| value_error(format!("format string does not apply to a date: '{format}'")))?;
    Ok(Value::string(out))
}

#[cfg(test)]
mod tests {
    use crate::testkit::{error, repr};

    #[test]
    fn test_parse_normalizes() {
        assert_eq!(repr("import datetime\nr = datetime.parse('2024-03-01')"), "'2024-03-01'");
        assert_eq!(repr("import datetime\nr = datetime.parse('2024-03-01 10:20:30')"), "'2024-03-01T10:20:30'");
        assert_eq!(repr("import datetime\nr = datetime.parse('2024-03-01T12:00:00+02:00')"), "'2024-03-01T10:00:00'");
        assert_eq!(error("import datetime\ndatetime.parse('yesterday')").kind(), "ValueError");
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(repr("import datetime\nr = datetime.add_days('2024-02-28', 2)"), "'2024-03-01'");
        assert_eq!(repr("import datetime\nr = datetime.add_seconds('2024-01-01', 90)"), "'2024-01-01T00:01:30'");
        assert_eq!(repr("import datetime\nr = datetime.timestamp('1970-01-02')"), "86400.0");
        assert_eq!(repr("import datetime\nr = datetime.fromtimestamp(0)"), "'1970-01-01T00:00:00'");
    }

    #[test]
    fn test_date_and_strftime() {
        assert_eq!(repr("import datetime\nr = datetime.strftime(datetime.date(2024, 7, 4), '%d/%m/%Y')"), "'04/07/2024'");
        assert_eq!(error("import datetime\ndatetime.date(2023, 2, 30)").kind(), "ValueError");
        assert_eq!(error("import datetime\ndatetime.strftime('2024-01-01', '%Q')").kind(), "ValueError");
    }

    #[test]
    fn test_now_is_iso() {
        let value = crate::testkit::eval("import datetime\nr = datetime.now()");
        let text = value.as_str().unwrap().to_string();
        assert!(chrono::NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
    }
}
