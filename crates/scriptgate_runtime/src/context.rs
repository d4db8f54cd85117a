//! One script execution, from fresh namespace to harvested result.

use crate::capability::CapabilityRegistry;
use crate::host::{HostContext, Mode};
use crate::import::ImportGate;
use crate::interpreter::{Env, Interpreter};
use crate::meter::StepMeter;
use crate::output::OutputCollector;
use crate::value::{type_error, value_error, DictMap, Key, Value};
use scriptgate_core::{Column, ColumnType, GateResult, Row, ScriptError, ScriptResult};
use scriptgate_gateway::{CallerContext, CrossSourceQueryGateway};
use scriptgate_script::{CompiledScript, ParameterTable};
use tracing::{info, info_span, warn};

/// Stack reserved for the thread a script runs on
pub const EXECUTION_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Everything one execution borrows from its runner
pub struct ExecutionContext<'a> {
    registry: &'a CapabilityRegistry,
    imports: &'a ImportGate,
    caller: &'a CallerContext,
    gateway: Option<&'a CrossSourceQueryGateway>,
    max_steps: Option<u64>,
}

impl<'a> ExecutionContext<'a> {
    /// Context over a runner's registry and import gate
    #[must_use]
    pub fn new(registry: &'a CapabilityRegistry, imports: &'a ImportGate, caller: &'a CallerContext) -> Self {
        Self {
            registry,
            imports,
            caller,
            gateway: None,
            max_steps: None,
        }
    }

    /// Route query capabilities through `gateway`
    #[must_use]
    pub fn with_gateway(mut self, gateway: Option<&'a CrossSourceQueryGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    /// Bound the number of interpreter steps
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: Option<u64>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Run `script` and harvest its `result`
    ///
    /// A secure script needs the parameter table its slots index into.
    ///
    /// # Errors
    ///
    /// Returns the first uncaught script error, `CancelledByUser` after a
    /// cancel, or a `ValueError` when `result` was left malformed
    pub fn execute(&self, script: &CompiledScript, parameters: Option<&ParameterTable>) -> GateResult<ScriptResult> {
        let mode = if script.is_secure() { Mode::Secure } else { Mode::Standard };
        let span = info_span!(
            "execution",
            execution = %self.caller.execution,
            mode = %mode,
            depth = self.caller.depth
        );
        on_execution_stack(|| span.in_scope(|| self.execute_here(script, parameters, mode)))?
    }

    fn execute_here(
        &self,
        script: &CompiledScript,
        parameters: Option<&ParameterTable>,
        mode: Mode,
    ) -> GateResult<ScriptResult> {
        let host = HostContext::new(self.caller, mode)
            .with_gateway(self.gateway)
            .with_parameters(parameters);
        let meter = StepMeter::new(self.max_steps);
        let mut interp = Interpreter::new(host, self.registry, self.imports, meter);

        let globals = Env::global();
        globals.set("result", fresh_result());
        let outcome = interp.run(script.program(), &globals);
        let steps = interp.steps();
        let output = interp.take_output();
        let result = globals.get("result");
        globals.clear();
        drop(interp);

        let harvested = outcome.and_then(|()| harvest(result.as_ref(), output));
        match &harvested {
            Ok(result) => info!(steps, columns = result.columns.len(), rows = result.rows.len(), "execution finished"),
            Err(ScriptError::CancelledByUser) => warn!(steps, "execution cancelled"),
            Err(err) => info!(steps, kind = err.kind(), "execution failed"),
        }
        harvested
    }
}

/// Run `work` on a scoped thread with an [`EXECUTION_STACK_SIZE`] stack
///
/// The interpreter recurses once per script call and per expression level,
/// which outgrows the default stack of runtime and test threads long before
/// [`MAX_CALL_DEPTH`](crate::interpreter::MAX_CALL_DEPTH) is reached.
///
/// # Errors
///
/// Returns a `MemoryError` if the thread cannot be spawned
pub fn on_execution_stack<T, F>(work: F) -> GateResult<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    std::thread::scope(|scope| {
        let handle = std::thread::Builder::new()
            .name("scriptgate-exec".to_string())
            .stack_size(EXECUTION_STACK_SIZE)
            .spawn_scoped(scope, work)
            .map_err(|err| ScriptError::runtime("MemoryError", format!("cannot start execution thread: {err}")))?;
        Ok(handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
    })
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("caller", &self.caller)
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

/// `{columns: [], rows: [], log: []}`
fn fresh_result() -> Value {
    let mut map = DictMap::new();
    for key in ["columns", "rows", "log"] {
        map.insert(Key::str(key), Value::list(Vec::new()));
    }
    Value::dict(map)
}

fn field(map: &DictMap, name: &str) -> Option<Value> {
    map.get(&Key::str(name)).cloned()
}

fn harvest(result: Option<&Value>, output: OutputCollector) -> GateResult<ScriptResult> {
    let Some(Value::Dict(map)) = result else {
        return Err(type_error("result must remain a dict"));
    };
    let map = map.borrow();
    let columns = match field(&map, "columns") {
        Some(value) => crate::ops::iterate(&value)?
            .iter()
            .map(harvest_column)
            .collect::<GateResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    let rows = match field(&map, "rows") {
        Some(value) => crate::ops::iterate(&value)?
            .iter()
            .map(harvest_row)
            .collect::<GateResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    let harvested = ScriptResult {
        columns,
        rows,
        log: output.into_lines(),
    };
    harvested.validate()?;
    Ok(harvested)
}

fn harvest_column(value: &Value) -> GateResult<Column> {
    let Value::Dict(column) = value else {
        return Err(value_error(format!("result column must be a dict, not {}", value.type_name())));
    };
    let column = column.borrow();
    let text = |key: &str| -> GateResult<Option<String>> {
        match field(&column, key) {
            None | Some(Value::None) => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.to_string())),
            Some(other) => Err(value_error(format!(
                "result column '{key}' must be a str, not {}",
                other.type_name()
            ))),
        }
    };
    let name = text("name")?.ok_or_else(|| value_error("result column is missing its name"))?;
    let friendly_name = text("friendly_name")?.unwrap_or_else(|| name.clone());
    let column_type: ColumnType = text("type")?
        .ok_or_else(|| value_error(format!("result column '{name}' is missing its type")))?
        .parse()?;
    Ok(Column::new(name, friendly_name, column_type))
}

fn harvest_row(value: &Value) -> GateResult<Row> {
    let Value::Dict(row) = value else {
        return Err(value_error(format!("result row must be a dict, not {}", value.type_name())));
    };
    row.borrow()
        .iter()
        .map(|(key, cell)| Ok::<_, ScriptError>((key.to_value().to_display(), cell.to_json()?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::TEST_MODULES;
    use proptest::prelude::*;
    use scriptgate_core::{CancelFlag, Parameters};
    use scriptgate_script::{ScriptCompiler, TemplateRenderer};
    use serde_json::json;

    fn run(source: &str) -> GateResult<ScriptResult> {
        run_as(source, &CallerContext::new(None), None)
    }

    fn run_as(source: &str, caller: &CallerContext, max_steps: Option<u64>) -> GateResult<ScriptResult> {
        let registry = CapabilityRegistry::standard();
        let imports = ImportGate::new(TEST_MODULES, "");
        let compiled = ScriptCompiler::new().compile(source)?;
        ExecutionContext::new(&registry, &imports, caller)
            .with_max_steps(max_steps)
            .execute(&compiled, None)
    }

    fn texts(result: &ScriptResult) -> Vec<String> {
        result
            .log
            .iter()
            .map(|l| l.split_once("] ").map(|(_, t)| t.to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_single_column_result_json() {
        let result = run("add_result_column(result,'a','A','integer'); add_result_row(result,{'a':1})").unwrap();
        assert_eq!(
            result.to_json().unwrap(),
            r#"{"columns":[{"name":"a","friendly_name":"A","type":"integer"}],"rows":[{"a":1}],"log":[]}"#
        );
    }

    #[test]
    fn test_log_is_ordered_and_skips_blank() {
        let result = run("print('one')\nprint('   ')\nprint('two', 2)").unwrap();
        assert_eq!(texts(&result), vec!["one", "two 2"]);
        assert!(result.log[0].starts_with('['));
    }

    #[test]
    fn test_disable_print_log_only_affects_later_writes() {
        let result = run("print('a')\ndisable_print_log()\nprint('b')\nenable_print_log()\nprint('c')").unwrap();
        assert_eq!(texts(&result), vec!["a", "c"]);
    }

    #[test]
    fn test_bad_column_type_fails_whole_run() {
        let err = run("add_result_column(result, 'a', 'A', 'decimal')").unwrap_err();
        assert_eq!(err.kind(), "ValueError");
    }

    #[test]
    fn test_type_constants_are_accepted() {
        let result = run("add_result_column(result, 'd', 'D', TYPE_DATETIME)").unwrap();
        assert_eq!(result.columns[0].column_type, ColumnType::Datetime);
    }

    #[test]
    fn test_manual_result_edits_are_validated() {
        let err = run("result['rows'].append({'ghost': 1})").unwrap_err();
        assert_eq!(err.kind(), "ValueError");
        let err = run("result = 5").unwrap_err();
        assert_eq!(err.kind(), "TypeError");
    }

    #[test]
    fn test_uncaught_error_is_kind_and_message() {
        let err = run("x = {}\nx['missing']").unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'missing'");
    }

    #[test]
    fn test_cancel_is_not_catchable() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let caller = CallerContext::new(None).with_cancel(cancel);
        let err = run_as("try:\n    x = 1\nexcept Exception:\n    pass", &caller, None).unwrap_err();
        assert_eq!(err, ScriptError::CancelledByUser);
        assert_eq!(err.to_string(), "CancelledByUser: Query cancelled by user.");
    }

    #[test]
    fn test_step_budget() {
        let err = run_as("while True:\n    pass", &CallerContext::new(None), Some(500)).unwrap_err();
        assert_eq!(err.kind(), "StepLimitExceeded");
        assert!(run_as("x = 1", &CallerContext::new(None), Some(500)).is_ok());
    }

    #[test]
    fn test_secure_script_reads_slots() {
        let mut params = Parameters::new();
        params.insert("n".to_string(), json!(3));
        let rendered = TemplateRenderer::new().render(
            "add_result_column(result, 'n', 'N', 'integer')\nadd_result_row(result, {'n': $[[n]] * 2})",
            &params,
        );
        let compiled = ScriptCompiler::new().compile_rendered(&rendered).unwrap();
        let registry = CapabilityRegistry::standard();
        let imports = ImportGate::new("", "");
        let caller = CallerContext::new(None);
        let result = ExecutionContext::new(&registry, &imports, &caller)
            .execute(&compiled, Some(rendered.table()))
            .unwrap();
        assert_eq!(result.rows[0].get("n"), Some(&json!(6)));
    }

    #[test]
    fn test_get_current_user_hidden_in_secure_mode() {
        let rendered = TemplateRenderer::new().render("get_current_user()", &Parameters::new());
        let compiled = ScriptCompiler::new().compile_rendered(&rendered).unwrap();
        let registry = CapabilityRegistry::standard();
        let imports = ImportGate::new("", "");
        let caller = CallerContext::new(None);
        let err = ExecutionContext::new(&registry, &imports, &caller)
            .execute(&compiled, Some(rendered.table()))
            .unwrap_err();
        assert_eq!(err.kind(), "NameError");
    }

    #[test]
    fn test_recursion_limit_on_default_stack() {
        let err = run("def f(n):\n    return f(n + 1)\nf(0)").unwrap_err();
        assert_eq!(err.to_string(), "RecursionError: maximum recursion depth exceeded");

        let source = format!(
            "def f(n):\n    if n == 0:\n        return 0\n    return {}1{} + f(n - 1)\nprint(f(90))",
            "(".repeat(40),
            ")".repeat(40)
        );
        let result = run(&source).unwrap();
        assert_eq!(texts(&result), vec!["90"]);
    }

    #[test]
    fn test_execution_stack_thread() {
        let name = on_execution_stack(|| std::thread::current().name().map(str::to_string)).unwrap();
        assert_eq!(name.as_deref(), Some("scriptgate-exec"));
        let borrowed = vec![1, 2, 3];
        assert_eq!(on_execution_stack(|| borrowed.iter().sum::<i32>()).unwrap(), 6);
    }

    proptest! {
        #[test]
        fn prop_declared_types_round_trip(index in 0usize..6) {
            let ty = ColumnType::ALL[index];
            let source = format!("add_result_column(result, 'c', 'C', '{}')", ty.as_str());
            let result = run(&source).unwrap();
            prop_assert_eq!(result.columns[0].column_type, ty);
        }

        #[test]
        fn prop_unknown_types_rejected(name in "[a-z]{1,10}") {
            prop_assume!(name.parse::<ColumnType>().is_err());
            let source = format!("add_result_column(result, 'c', 'C', '{name}')");
            let err = run(&source).unwrap_err();
            prop_assert_eq!(err.kind(), "ValueError");
        }
    }
}
