//! scriptgate runtime
//!
//! Executes compiled scripts inside a sandbox. Scripts only ever see the
//! restricted [`Value`] algebra; attribute reads, item access, iteration,
//! imports, and output all go through the interpreter's guarded dispatch.
//! Host functionality reaches a script solely through the
//! [`CapabilityRegistry`], and every query it issues goes through the
//! access-checked gateway.
//!
//! A [`ScriptRunner`] holds the runner-lifetime state (capabilities, import
//! gate and module cache, gateway handle) and implements the gateway's
//! runner traits, so script data sources can be queried, including as
//! delegated shared queries from other tenants.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod args;
pub mod builtins;
pub mod capability;
pub mod config;
pub mod context;
pub mod host;
pub mod import;
pub mod interpreter;
pub mod meter;
pub mod methods;
pub mod modules;
pub mod ops;
pub mod output;
pub mod runner;
pub mod value;

#[cfg(test)]
mod testkit;

// Re-exports
pub use args::Args;
pub use capability::{Availability, Capability, CapabilityError, CapabilityKind, CapabilityRegistry, TYPE_CONSTANTS};
pub use config::RunnerConfig;
pub use context::{on_execution_stack, ExecutionContext, EXECUTION_STACK_SIZE};
pub use host::{HostContext, HostFunction, Mode};
pub use import::{ImportGate, ModuleHandle};
pub use interpreter::{Env, Interpreter, MAX_CALL_DEPTH};
pub use meter::{StepError, StepMeter, STEP_LIMIT_KIND};
pub use output::OutputCollector;
pub use runner::{ScriptOutcome, ScriptRunner, SCRIPT_RUNNER_KIND};
pub use value::Value;
