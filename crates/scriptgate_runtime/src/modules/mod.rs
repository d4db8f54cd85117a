//! Native modules scripts may import.
//!
//! Each module is a static table of functions and constants. Importing one
//! builds a fresh [`ModuleValue`] per execution, so nothing a script does to
//! its namespace leaks into another run.

mod datetime;
mod json;
mod math;
mod re;
mod string;

use crate::args::Args;
use crate::value::{ModuleValue, Value};
use indexmap::IndexMap;
use scriptgate_core::GateResult;
use std::rc::Rc;

/// Native function signature
pub type NativeFn = fn(Args) -> GateResult<Value>;

/// Module constant
#[derive(Debug, Clone, Copy)]
pub enum Constant {
    /// Float constant
    Float(f64),
    /// String constant
    Str(&'static str),
}

/// Function exported by a native module
#[derive(Clone, Copy)]
pub struct NativeFunction {
    /// Owning module
    pub module: &'static str,
    /// Function name
    pub name: &'static str,
    func: NativeFn,
}

impl NativeFunction {
    /// Call the function
    ///
    /// # Errors
    ///
    /// Returns whatever the function raises
    pub fn call(&self, args: Args) -> GateResult<Value> {
        (self.func)(args)
    }
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("module", &self.module)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Static description of a native module
#[derive(Debug)]
pub struct NativeModule {
    /// Import name
    pub name: &'static str,
    /// Exported functions
    pub functions: &'static [(&'static str, NativeFn)],
    /// Exported constants
    pub constants: &'static [(&'static str, Constant)],
}

impl NativeModule {
    /// Fresh namespace for one execution
    #[must_use]
    pub fn instantiate(&'static self) -> Value {
        let mut members = IndexMap::with_capacity(self.functions.len() + self.constants.len());
        for (name, constant) in self.constants {
            let value = match constant {
                Constant::Float(f) => Value::Float(*f),
                Constant::Str(s) => Value::string(s),
            };
            members.insert((*name).to_string(), value);
        }
        for (name, func) in self.functions {
            members.insert(
                (*name).to_string(),
                Value::Native(NativeFunction {
                    module: self.name,
                    name: *name,
                    func: *func,
                }),
            );
        }
        Value::Module(Rc::new(ModuleValue {
            name: self.name.to_string(),
            members,
        }))
    }
}

static NATIVE_MODULES: [&NativeModule; 5] = [
    &datetime::MODULE,
    &json::MODULE,
    &math::MODULE,
    &re::MODULE,
    &string::MODULE,
];

/// Native module by import name
#[must_use]
pub fn lookup(name: &str) -> Option<&'static NativeModule> {
    NATIVE_MODULES.iter().copied().find(|m| m.name == name)
}

/// Names of every native module
pub fn names() -> impl Iterator<Item = &'static str> {
    NATIVE_MODULES.iter().map(|m| m.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert!(lookup("math").is_some());
        assert!(lookup("os").is_none());
        assert_eq!(names().count(), 5);
    }

    #[test]
    fn test_instantiate_is_fresh_per_call() {
        let (Value::Module(a), Value::Module(b)) = (math::MODULE.instantiate(), math::MODULE.instantiate()) else {
            panic!("not a module");
        };
        assert!(!Rc::ptr_eq(&a, &b));
        assert!(a.members.contains_key("pi"));
        assert!(matches!(a.members.get("sqrt"), Some(Value::Native(f)) if f.module == "math"));
    }
}
