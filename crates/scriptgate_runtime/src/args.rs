//! Call arguments.

use crate::value::{type_error, Value};
use scriptgate_core::GateResult;

/// Positional and keyword arguments of one call
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Positional arguments
    pub positional: Vec<Value>,
    /// Keyword arguments in call order
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    /// Positional-only arguments
    #[must_use]
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            keywords: Vec::new(),
        }
    }

    /// Number of positional arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    /// Whether there are no arguments at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    /// Positional argument `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Check the positional count is within `min..=max`
    ///
    /// # Errors
    ///
    /// Returns `TypeError` naming the function
    pub fn expect(&self, name: &str, min: usize, max: usize) -> GateResult<()> {
        let n = self.positional.len();
        if n < min || n > max {
            let expected = if min == max {
                format!("exactly {min}")
            } else if n < min {
                format!("at least {min}")
            } else {
                format!("at most {max}")
            };
            let plural = if expected.ends_with(" 1") { "" } else { "s" };
            return Err(type_error(format!(
                "{name}() takes {expected} argument{plural} ({n} given)"
            )));
        }
        Ok(())
    }

    /// Reject keyword arguments
    ///
    /// # Errors
    ///
    /// Returns `TypeError` naming the function
    pub fn no_keywords(&self, name: &str) -> GateResult<()> {
        match self.keywords.first() {
            Some((kw, _)) => Err(type_error(format!(
                "{name}() got an unexpected keyword argument '{kw}'"
            ))),
            None => Ok(()),
        }
    }

    /// Remove and return keyword `name`
    pub fn take_keyword(&mut self, name: &str) -> Option<Value> {
        let index = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(index).1)
    }

    /// Positional argument `index` as a string
    ///
    /// # Errors
    ///
    /// Returns `TypeError` when missing or not a string
    pub fn str_at(&self, func: &str, index: usize) -> GateResult<&str> {
        self.positional
            .get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| type_error(format!("{func}() argument {} must be str", index + 1)))
    }

    /// Positional argument `index` as a float
    ///
    /// # Errors
    ///
    /// Returns `TypeError` when missing or not a number
    pub fn float_at(&self, func: &str, index: usize) -> GateResult<f64> {
        self.positional
            .get(index)
            .and_then(Value::as_float)
            .ok_or_else(|| type_error(format!("{func}() argument {} must be a number", index + 1)))
    }

    /// Positional argument `index` as an integer
    ///
    /// # Errors
    ///
    /// Returns `TypeError` when missing or not an integer
    pub fn int_at(&self, func: &str, index: usize) -> GateResult<i64> {
        self.positional
            .get(index)
            .and_then(Value::as_int)
            .ok_or_else(|| type_error(format!("{func}() argument {} must be int", index + 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_messages() {
        let args = Args::positional(vec![Value::Int(1), Value::Int(2)]);
        assert!(args.expect("f", 1, 2).is_ok());
        assert_eq!(
            args.expect("f", 1, 1).unwrap_err().to_string(),
            "TypeError: f() takes exactly 1 argument (2 given)"
        );
        assert_eq!(
            args.expect("g", 3, 4).unwrap_err().to_string(),
            "TypeError: g() takes at least 3 arguments (2 given)"
        );
    }

    #[test]
    fn test_keywords() {
        let mut args = Args {
            positional: vec![],
            keywords: vec![("key".to_string(), Value::None)],
        };
        assert!(args.no_keywords("f").is_err());
        assert!(args.take_keyword("key").is_some());
        assert!(args.no_keywords("f").is_ok());
    }
}
