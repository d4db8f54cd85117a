//! Script-level helpers shared by unit tests.

use crate::capability::CapabilityRegistry;
use crate::context::on_execution_stack;
use crate::host::{HostContext, Mode};
use crate::import::ImportGate;
use crate::interpreter::{Env, Interpreter};
use crate::meter::StepMeter;
use crate::value::Value;
use scriptgate_core::ScriptError;
use scriptgate_gateway::CallerContext;
use scriptgate_script::ScriptCompiler;
use std::rc::Rc;

pub(crate) const TEST_MODULES: &str = "math, json, string, re, datetime";

/// Run `source` in a fresh standard-mode interpreter
pub(crate) fn execute(source: &str) -> (Rc<Env>, Result<(), ScriptError>) {
    let compiled = ScriptCompiler::new().compile(source).unwrap();
    let caller = CallerContext::new(None);
    let registry = CapabilityRegistry::standard();
    let imports = ImportGate::new(TEST_MODULES, "");
    let host = HostContext::new(&caller, Mode::Standard);
    let mut interp = Interpreter::new(host, &registry, &imports, StepMeter::unlimited());
    let globals = Env::global();
    let outcome = interp.run(compiled.program(), &globals);
    (globals, outcome)
}

/// Value of `r` after running `source`
pub(crate) fn eval(source: &str) -> Value {
    let (globals, outcome) = execute(source);
    if let Err(err) = outcome {
        panic!("script failed: {err}");
    }
    globals.get("r").unwrap_or_else(|| panic!("r is not bound"))
}

/// `repr` of `r` after running `source`
pub(crate) fn repr(source: &str) -> String {
    on_execution_stack(|| eval(source).repr()).unwrap()
}

/// Error raised by `source`
pub(crate) fn error(source: &str) -> ScriptError {
    match on_execution_stack(|| execute(source).1).unwrap() {
        Err(err) => err,
        Ok(()) => panic!("script succeeded: {source}"),
    }
}
