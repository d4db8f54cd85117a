//! Host functions callable from scripts.

use crate::args::Args;
use crate::output::OutputCollector;
use crate::value::Value;
use scriptgate_core::{GateResult, ScriptError};
use scriptgate_gateway::{CallerContext, CrossSourceQueryGateway};
use scriptgate_script::ParameterTable;
use serde::{Deserialize, Serialize};

/// Execution mode of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Script text run as written
    Standard,
    /// Placeholder-rendered script run on behalf of a delegating caller
    Secure,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::Secure => f.write_str("secure"),
        }
    }
}

/// Host function signature
pub type HostFn = fn(&mut HostContext<'_>, Args) -> GateResult<Value>;

/// Per-execution state host functions may touch
pub struct HostContext<'a> {
    /// Output log
    pub output: OutputCollector,
    caller: &'a CallerContext,
    gateway: Option<&'a CrossSourceQueryGateway>,
    parameters: Option<&'a ParameterTable>,
    mode: Mode,
}

impl<'a> HostContext<'a> {
    /// Context for a caller in a mode
    #[must_use]
    pub fn new(caller: &'a CallerContext, mode: Mode) -> Self {
        Self {
            output: OutputCollector::new(),
            caller,
            gateway: None,
            parameters: None,
            mode,
        }
    }

    /// Attach the query gateway
    #[must_use]
    pub fn with_gateway(mut self, gateway: Option<&'a CrossSourceQueryGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    /// Attach the secure-mode parameter table
    #[must_use]
    pub fn with_parameters(mut self, parameters: Option<&'a ParameterTable>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Calling context
    #[must_use]
    pub fn caller(&self) -> &CallerContext {
        self.caller
    }

    /// Execution mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Secure-mode parameter table
    #[must_use]
    pub fn parameters(&self) -> Option<&ParameterTable> {
        self.parameters
    }

    /// Query gateway
    ///
    /// # Errors
    ///
    /// Returns `QueryError` when the runner was built without one
    pub fn gateway(&self) -> GateResult<&'a CrossSourceQueryGateway> {
        self.gateway
            .ok_or_else(|| ScriptError::runtime("QueryError", "no query gateway is configured"))
    }

    /// Fail if the execution was cancelled
    ///
    /// # Errors
    ///
    /// Returns `CancelledByUser`
    pub fn check_cancelled(&self) -> GateResult<()> {
        self.caller.cancel.check()
    }
}

impl std::fmt::Debug for HostContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("mode", &self.mode)
            .field("caller", &self.caller)
            .field("lines", &self.output.lines().len())
            .finish_non_exhaustive()
    }
}

/// Named host function
#[derive(Clone, Copy)]
pub struct HostFunction {
    /// Name scripts call it by
    pub name: &'static str,
    implementation: HostFn,
}

impl HostFunction {
    /// Wrap an implementation
    #[must_use]
    pub const fn new(name: &'static str, implementation: HostFn) -> Self {
        Self {
            name,
            implementation,
        }
    }

    /// Call the function
    ///
    /// # Errors
    ///
    /// Returns `CancelledByUser` if the execution was cancelled, otherwise
    /// whatever the implementation returns
    pub fn call(&self, ctx: &mut HostContext<'_>, args: Args) -> GateResult<Value> {
        ctx.check_cancelled()?;
        (self.implementation)(ctx, args)
    }
}

impl std::fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(ctx: &mut HostContext<'_>, args: Args) -> GateResult<Value> {
        ctx.output.write("called");
        Ok(args.get(0).cloned().unwrap_or(Value::None))
    }

    #[test]
    fn test_host_function_call() {
        let caller = CallerContext::new(None);
        let mut ctx = HostContext::new(&caller, Mode::Standard);
        let f = HostFunction::new("echo", echo);
        let out = f.call(&mut ctx, Args::positional(vec![Value::Int(3)])).unwrap();
        assert!(out.py_eq(&Value::Int(3)));
        assert_eq!(ctx.output.lines().len(), 1);
    }

    #[test]
    fn test_cancelled_before_call() {
        let caller = CallerContext::new(None);
        caller.cancel.cancel();
        let mut ctx = HostContext::new(&caller, Mode::Standard);
        let err = HostFunction::new("echo", echo).call(&mut ctx, Args::default()).unwrap_err();
        assert_eq!(err, ScriptError::CancelledByUser);
        assert!(ctx.output.lines().is_empty());
    }

    #[test]
    fn test_missing_gateway() {
        let caller = CallerContext::new(None);
        let ctx = HostContext::new(&caller, Mode::Secure);
        assert_eq!(ctx.gateway().unwrap_err().kind(), "QueryError");
        assert_eq!(ctx.mode().to_string(), "secure");
    }
}
