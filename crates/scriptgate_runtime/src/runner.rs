//! Script data source runner.
//!
//! A [`ScriptRunner`] owns everything that lives for the runner's lifetime:
//! the capability registry, the import gate and its module cache, and a
//! handle to the query gateway. Each call builds a fresh
//! [`ExecutionContext`] on top of that shared state.

use crate::capability::CapabilityRegistry;
use crate::config::RunnerConfig;
use crate::context::ExecutionContext;
use crate::import::ImportGate;
use scriptgate_core::{ExecutionId, GateResult, Parameters, ScriptError, ScriptResult};
use scriptgate_gateway::{
    CallerContext, CrossSourceQueryGateway, DataSourceRunner, DelegatedCall, RunnerError, SharedQueryRunner,
};
use scriptgate_script::{CompiledScript, RenderedScript, ScriptCompiler, TemplateRenderer};
use serde_json::Value;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, info};

/// Data source kind reported by [`ScriptRunner`]
pub const SCRIPT_RUNNER_KIND: &str = "script";

/// What one invocation produced
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutcome {
    /// Execution id, also carried by the execution's log span
    pub execution: ExecutionId,
    /// Result, or the error that ended the run
    pub result: GateResult<ScriptResult>,
}

impl ScriptOutcome {
    /// `(result_json, None)` on success, `(None, error)` on failure
    #[must_use]
    pub fn into_pair(self) -> (Option<String>, Option<String>) {
        match self.result.and_then(|result| result.to_json()) {
            Ok(json) => (Some(json), None),
            Err(err) => (None, Some(err.to_string())),
        }
    }

    /// Whether the run produced a result
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs scripts as a data source
pub struct ScriptRunner {
    config: RunnerConfig,
    registry: Arc<CapabilityRegistry>,
    imports: Arc<ImportGate>,
    gateway: OnceLock<Weak<CrossSourceQueryGateway>>,
    compiler: ScriptCompiler,
    renderer: TemplateRenderer,
}

impl ScriptRunner {
    /// Runner with the standard capabilities
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        let imports = Arc::new(ImportGate::from_config(&config));
        Self {
            config,
            registry: Arc::new(CapabilityRegistry::standard()),
            imports,
            gateway: OnceLock::new(),
            compiler: ScriptCompiler::new(),
            renderer: TemplateRenderer::new(),
        }
    }

    /// Use a custom capability registry
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<CapabilityRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Connect the gateway query capabilities go through
    ///
    /// The runner keeps a weak handle, since the gateway's catalog usually
    /// owns the runner. Only the first call takes effect.
    pub fn attach_gateway(&self, gateway: &Arc<CrossSourceQueryGateway>) {
        if self.gateway.set(Arc::downgrade(gateway)).is_err() {
            debug!("gateway already attached");
        }
    }

    /// Attached gateway, if it is still alive
    #[must_use]
    pub fn gateway(&self) -> Option<Arc<CrossSourceQueryGateway>> {
        self.gateway.get().and_then(Weak::upgrade)
    }

    /// Configuration the runner was built from
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Capability registry
    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Import gate
    #[must_use]
    pub fn imports(&self) -> &ImportGate {
        &self.imports
    }

    /// Compile without running
    ///
    /// # Errors
    ///
    /// Returns `CompileError` for rejected scripts
    pub fn check(&self, source: &str) -> GateResult<CompiledScript> {
        self.compiler.compile(source)
    }

    /// Render secure-mode placeholders
    #[must_use]
    pub fn render(&self, source: &str, parameters: &Parameters) -> RenderedScript {
        self.renderer.render(source, parameters)
    }

    /// Run a script in standard mode
    #[must_use]
    pub fn run_script(&self, source: &str, caller: &CallerContext) -> ScriptOutcome {
        let result = self
            .compiler
            .compile(source)
            .and_then(|compiled| self.context(caller).execute(&compiled, None));
        self.finish(caller, result)
    }

    /// Render `source` against `parameters`, then run it in secure mode
    #[must_use]
    pub fn run_secure_script(&self, source: &str, parameters: &Parameters, caller: &CallerContext) -> ScriptOutcome {
        let rendered = self.renderer.render(source, parameters);
        let result = self
            .compiler
            .compile_rendered(&rendered)
            .and_then(|compiled| self.context(caller).execute(&compiled, Some(rendered.table())));
        self.finish(caller, result)
    }

    fn context<'a>(&'a self, caller: &'a CallerContext) -> ContextScope<'a> {
        ContextScope {
            runner: self,
            caller,
            gateway: self.gateway(),
        }
    }

    fn finish(&self, caller: &CallerContext, result: GateResult<ScriptResult>) -> ScriptOutcome {
        if let Err(err) = &result {
            info!(execution = %caller.execution, kind = err.kind(), "script run failed");
        }
        ScriptOutcome {
            execution: caller.execution,
            result,
        }
    }
}

/// Execution context plus the upgraded gateway it borrows from
struct ContextScope<'a> {
    runner: &'a ScriptRunner,
    caller: &'a CallerContext,
    gateway: Option<Arc<CrossSourceQueryGateway>>,
}

impl ContextScope<'_> {
    fn execute(
        &self,
        script: &CompiledScript,
        parameters: Option<&scriptgate_script::ParameterTable>,
    ) -> GateResult<ScriptResult> {
        ExecutionContext::new(&self.runner.registry, &self.runner.imports, self.caller)
            .with_gateway(self.gateway.as_deref())
            .with_max_steps(self.runner.config.max_steps)
            .execute(script, parameters)
    }
}

impl std::fmt::Debug for ScriptRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRunner")
            .field("config", &self.config)
            .field("imports", &self.imports)
            .field("gateway_attached", &self.gateway.get().is_some())
            .finish_non_exhaustive()
    }
}

fn result_value(outcome: ScriptOutcome) -> Result<Value, RunnerError> {
    let result = outcome.result.map_err(RunnerError::Script)?;
    serde_json::to_value(result).map_err(|err| RunnerError::Script(ScriptError::from(err)))
}

impl DataSourceRunner for ScriptRunner {
    fn kind(&self) -> &str {
        SCRIPT_RUNNER_KIND
    }

    fn run_query(&self, query: &str, user: Option<scriptgate_core::UserId>) -> Result<Value, RunnerError> {
        result_value(self.run_script(query, &CallerContext::new(user)))
    }

    fn shared_query(&self) -> Option<&dyn SharedQueryRunner> {
        Some(self)
    }
}

impl SharedQueryRunner for ScriptRunner {
    fn run_shared_query(&self, call: &DelegatedCall) -> Result<Value, RunnerError> {
        let caller = CallerContext::new(Some(call.caller))
            .with_depth(call.depth)
            .with_cancel(call.cancel.clone())
            .with_execution(ExecutionId::new());
        debug!(
            parent = %call.parent,
            execution = %caller.execution,
            tenant = %call.tenant,
            "running delegated script"
        );
        result_value(self.run_secure_script(&call.query, &call.parameters, &caller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptgate_core::{CancelFlag, DataSourceId, GroupId, OrgId, QueryId, UserId};
    use scriptgate_gateway::{DataSource, InMemoryCatalog, InMemoryQueryCache, StaticRunner};
    use scriptgate_policy::{AccessPolicy, Directory, Group, Organisation, User, SUPER_ADMIN_PERMISSION};
    use serde_json::json;

    const ANALYST: UserId = UserId(1);
    const ROOT: UserId = UserId(2);

    struct Deployment {
        gateway: Arc<CrossSourceQueryGateway>,
        runner: Arc<ScriptRunner>,
        tenant: Arc<ScriptRunner>,
    }

    /// Source 7 is a plain static source; tenant 8 runs scripts and shares
    /// group 10 with the analyst; tenant 9 belongs to group 20 only
    fn deployment(config: RunnerConfig) -> Deployment {
        let directory = Directory::from_parts(
            vec![Organisation::new(OrgId(1), "acme")],
            vec![
                Group::new(GroupId(1), OrgId(1), "admins").with_permission(SUPER_ADMIN_PERMISSION),
                Group::new(GroupId(10), OrgId(1), "analysts"),
                Group::new(GroupId(20), OrgId(1), "finance"),
            ],
            vec![
                User::new(ANALYST, OrgId(1), "ana").with_group(GroupId(10)),
                User::new(ROOT, OrgId(1), "root").with_group(GroupId(1)),
            ],
        )
        .unwrap();
        let runner = Arc::new(ScriptRunner::new(config.clone()));
        let tenant = Arc::new(ScriptRunner::new(config));
        let catalog = InMemoryCatalog::new();
        catalog.insert(
            DataSource::new(DataSourceId(7), "datasource_7", Arc::new(StaticRunner::new(json!([]))))
                .with_groups(vec![GroupId(10)]),
        );
        catalog.insert(DataSource::new(DataSourceId(8), "datasource_8", tenant.clone()).with_groups(vec![GroupId(10)]));
        catalog.insert(DataSource::new(DataSourceId(9), "datasource_9", tenant.clone()).with_groups(vec![GroupId(20)]));
        let cache = InMemoryQueryCache::new();
        cache.store_result(QueryId(3), json!({"rows": [{"x": 1}]}));
        let gateway = Arc::new(CrossSourceQueryGateway::new(
            Arc::new(catalog),
            Arc::new(cache),
            AccessPolicy::new(Arc::new(directory)),
        ));
        runner.attach_gateway(&gateway);
        tenant.attach_gateway(&gateway);
        Deployment { gateway, runner, tenant }
    }

    #[test]
    fn test_single_column_run_pair() {
        let runner = ScriptRunner::new(RunnerConfig::default());
        let outcome = runner.run_secure_script(
            "add_result_column(result,'a','A','integer'); add_result_row(result,{'a':1})",
            &Parameters::new(),
            &CallerContext::new(None),
        );
        assert_eq!(
            outcome.into_pair(),
            (
                Some(r#"{"columns":[{"name":"a","friendly_name":"A","type":"integer"}],"rows":[{"a":1}],"log":[]}"#.to_string()),
                None
            )
        );
    }

    #[test]
    fn test_shared_query_against_insecure_source() {
        let d = deployment(RunnerConfig::default());
        for user in [ANALYST, ROOT] {
            let outcome = d
                .runner
                .run_script(r#"execute_shared_query(7, "select 1", {})"#, &CallerContext::new(Some(user)));
            let (json, error) = outcome.into_pair();
            assert!(json.is_none());
            assert_eq!(error.as_deref(), Some("NotSecure: data source is not secure: datasource_7"));
        }
    }

    #[test]
    fn test_shared_query_runs_tenant_script_with_parameters() {
        let d = deployment(RunnerConfig::default());
        let script = r#"
data = execute_shared_query(8, "add_result_column(result, 'v', 'V', 'integer')\nadd_result_row(result, {'v': $[[v]] + 1})", {'v': 41})
add_result_column(result, 'v', 'V', 'integer')
for row in data['rows']:
    add_result_row(result, row)
"#;
        let outcome = d.runner.run_script(script, &CallerContext::new(Some(ANALYST)));
        let result = outcome.result.unwrap();
        assert_eq!(result.rows[0].get("v"), Some(&json!(42)));
    }

    #[test]
    fn test_shared_query_access_denied_without_overlap() {
        let d = deployment(RunnerConfig::default());
        let outcome = d
            .runner
            .run_script("execute_shared_query(9, 'x = 1')", &CallerContext::new(Some(ANALYST)));
        assert_eq!(outcome.result.unwrap_err().kind(), "AccessDenied");
        let outcome = d
            .runner
            .run_script("execute_shared_query(9, 'x = 1')", &CallerContext::new(Some(ROOT)));
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_nested_delegation_is_bounded() {
        let d = deployment(RunnerConfig::default());
        let script = r#"execute_shared_query(8, "execute_shared_query(8, 'x = 1')")"#;
        let err = d.runner.run_script(script, &CallerContext::new(Some(ROOT))).result.unwrap_err();
        assert_eq!(err.kind(), "QueryError");
        assert!(err.to_string().contains("DelegationDepthExceeded"));
        assert_eq!(d.gateway.max_depth(), 1);
    }

    #[test]
    fn test_errors_are_catchable_in_script() {
        let d = deployment(RunnerConfig::default());
        let script = "try:\n    execute_shared_query(7, 'q')\n    status = 'ok'\nexcept NotSecure:\n    status = 'refused'\nprint(status)";
        let result = d.runner.run_script(script, &CallerContext::new(Some(ANALYST))).result.unwrap();
        assert!(result.log[0].ends_with("refused"));
    }

    #[test]
    fn test_import_denied_regardless_of_availability() {
        let runner = ScriptRunner::new(RunnerConfig::new().with_allowed_import_modules("json"));
        let err = runner
            .run_script("import math", &CallerContext::new(None))
            .result
            .unwrap_err();
        assert_eq!(err.kind(), "ImportDenied");
        assert!(runner.run_script("import json", &CallerContext::new(None)).is_ok());
    }

    #[test]
    fn test_data_source_runner_contract() {
        let d = deployment(RunnerConfig::default());
        assert_eq!(d.tenant.kind(), SCRIPT_RUNNER_KIND);
        assert!(d.tenant.shared_query().is_some());
        let value = d
            .tenant
            .run_query("add_result_column(result, 'a', 'A', 'string')", Some(ANALYST))
            .unwrap();
        assert_eq!(value["columns"][0]["type"], json!("string"));
        let err = d.tenant.run_query("1 / 0", None).unwrap_err();
        assert_eq!(ScriptError::from(err).kind(), "QueryError");
    }

    #[test]
    fn test_cancel_reaches_delegated_call() {
        let d = deployment(RunnerConfig::default());
        let cancel = CancelFlag::new();
        cancel.cancel();
        let call = DelegatedCall {
            tenant: scriptgate_core::TenantRef(8),
            data_source: "datasource_8".to_string(),
            query: "x = 1".to_string(),
            parameters: Parameters::new(),
            caller: ANALYST,
            depth: 1,
            cancel,
            parent: ExecutionId::new(),
        };
        let err = d.tenant.run_shared_query(&call).unwrap_err();
        assert_eq!(ScriptError::from(err), ScriptError::CancelledByUser);
    }

    #[test]
    fn test_step_budget_from_config() {
        let runner = ScriptRunner::new(RunnerConfig::new().with_max_steps(100));
        let err = runner
            .run_script("while True:\n    pass", &CallerContext::new(None))
            .result
            .unwrap_err();
        assert_eq!(err.kind(), "StepLimitExceeded");
    }

    #[test]
    fn test_get_query_result_and_current_user() {
        let d = deployment(RunnerConfig::default());
        let result = d
            .runner
            .run_script(
                "print(get_query_result(3)['rows'][0]['x'])\nprint(get_current_user()['id'])",
                &CallerContext::new(Some(ANALYST)),
            )
            .result
            .unwrap();
        assert!(result.log[0].ends_with(" 1"));
        assert!(result.log[1].ends_with(" 1"));
    }
}
