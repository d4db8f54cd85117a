//! Cross-source query gateway.
//!
//! Host functions for delegated queries all go through here. Checks run in a
//! fixed order for shared queries: resolve the tenant's data source, require
//! a secure-query entry point, decide access, then bound the delegation
//! depth. Access is decided on every call.

use crate::cache::QueryCache;
use crate::call::{CallerContext, DelegatedCall};
use crate::source::{DataSource, DataSourceCatalog};
use scriptgate_core::{DataSourceRef, GateResult, Parameters, QueryId, ScriptError, TenantRef};
use scriptgate_policy::{AccessPolicy, Principal};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Delegation depth allowed when not configured
pub const DEFAULT_MAX_DELEGATION_DEPTH: u32 = 1;

/// Gateway between a running script and other data sources
#[derive(Clone)]
pub struct CrossSourceQueryGateway {
    catalog: Arc<dyn DataSourceCatalog>,
    cache: Arc<dyn QueryCache>,
    policy: AccessPolicy,
    max_depth: u32,
}

impl std::fmt::Debug for CrossSourceQueryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossSourceQueryGateway")
            .field("policy", &self.policy)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl CrossSourceQueryGateway {
    /// Create a gateway
    #[must_use]
    pub fn new(
        catalog: Arc<dyn DataSourceCatalog>,
        cache: Arc<dyn QueryCache>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            catalog,
            cache,
            policy,
            max_depth: DEFAULT_MAX_DELEGATION_DEPTH,
        }
    }

    /// Set maximum delegation depth
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Maximum delegation depth
    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Access policy in use
    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Run a query under the service's own identity
    ///
    /// # Errors
    ///
    /// Returns `UnknownDataSource` or the runner's `QueryError`
    pub fn execute_query(&self, reference: &DataSourceRef, query: &str) -> GateResult<Value> {
        let source = self.catalog.resolve(reference)?;
        debug!(data_source = %source.name, "execute_query");
        Ok(source.runner().run_query(query, None)?)
    }

    /// Run a query on a named source the caller must have access to
    ///
    /// # Errors
    ///
    /// Returns `UnknownDataSource`, `AccessDenied`, or the runner's
    /// `QueryError`
    pub fn execute_restricted_query(
        &self,
        caller: &CallerContext,
        name: &str,
        query: &str,
    ) -> GateResult<Value> {
        let source = self.catalog.resolve(&DataSourceRef::Name(name.to_string()))?;
        self.require_access(caller, &source)?;
        debug!(data_source = %source.name, "execute_restricted_query");
        Ok(source.runner().run_query(query, None)?)
    }

    /// Delegate a query to a tenant's secure-query runner
    ///
    /// # Errors
    ///
    /// Returns `UnknownDataSource`, `NotSecure`, `AccessDenied`,
    /// `DelegationDepthExceeded`, or the callee's error as `QueryError`
    pub fn execute_shared_query(
        &self,
        caller: &CallerContext,
        tenant: TenantRef,
        query: &str,
        parameters: Parameters,
    ) -> GateResult<Value> {
        let name = tenant.data_source_name();
        let source = self.catalog.resolve(&DataSourceRef::Name(name.clone()))?;

        let Some(shared) = source.runner().shared_query() else {
            warn!(data_source = %name, "shared query against source without secure support");
            return Err(ScriptError::NotSecure { data_source: name });
        };

        let caller_id = self.require_access(caller, &source)?;

        if caller.depth >= self.max_depth {
            warn!(data_source = %name, depth = caller.depth, limit = self.max_depth, "delegation depth exceeded");
            return Err(ScriptError::DelegationDepthExceeded {
                limit: self.max_depth,
            });
        }

        let call = DelegatedCall {
            tenant,
            data_source: name,
            query: query.to_string(),
            parameters,
            caller: caller_id,
            depth: caller.depth + 1,
            cancel: caller.cancel.clone(),
            parent: caller.execution,
        };
        info!(
            tenant = %call.tenant,
            data_source = %call.data_source,
            depth = call.depth,
            parent = %call.parent,
            "dispatching delegated call"
        );
        Ok(shared.run_shared_query(&call)?)
    }

    /// Schema of a data source
    ///
    /// # Errors
    ///
    /// Returns `UnknownDataSource` or the runner's `QueryError`
    pub fn get_source_schema(&self, reference: &DataSourceRef) -> GateResult<Value> {
        let source = self.catalog.resolve(reference)?;
        let schema = source.runner().get_schema()?;
        Ok(serde_json::to_value(schema)?)
    }

    /// Latest cached data of a saved query
    ///
    /// # Errors
    ///
    /// Returns `NoCachedResult` when the query does not exist or has no data
    pub fn get_query_result(&self, query_id: QueryId) -> GateResult<Value> {
        let cached = self
            .cache
            .get_cached_result(query_id)
            .ok_or_else(|| ScriptError::NoCachedResult {
                query_id: query_id.as_i64(),
                reason: "query does not exist".to_string(),
            })?;
        cached.data.ok_or_else(|| ScriptError::NoCachedResult {
            query_id: query_id.as_i64(),
            reason: "query does not have results yet".to_string(),
        })
    }

    /// Resolve the caller's principal
    ///
    /// # Errors
    ///
    /// Returns a `PolicyError` without a user or when the user cannot be
    /// resolved
    pub fn current_principal(&self, caller: &CallerContext) -> GateResult<Principal> {
        let user = caller.user.ok_or_else(|| ScriptError::runtime("PolicyError", "no current user"))?;
        Ok(self.policy.principal(user)?)
    }

    fn require_access(
        &self,
        caller: &CallerContext,
        source: &DataSource,
    ) -> GateResult<scriptgate_core::UserId> {
        let Some(user) = caller.user else {
            warn!(data_source = %source.name, "delegated query without a user");
            return Err(ScriptError::AccessDenied {
                data_source: source.name.clone(),
            });
        };
        self.policy.check(user, &source.name, &source.groups)?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryQueryCache;
    use crate::fixture::StaticRunner;
    use crate::source::InMemoryCatalog;
    use proptest::prelude::*;
    use scriptgate_core::{CancelFlag, DataSourceId, GroupId, OrgId, UserId};
    use scriptgate_policy::{Directory, Group, Organisation, User, SUPER_ADMIN_PERMISSION};
    use serde_json::json;

    struct Harness {
        gateway: CrossSourceQueryGateway,
        tenant_runner: Arc<StaticRunner>,
    }

    /// Users: 1 analyst in group 10, 2 super admin (group 1), 3 no groups
    fn harness() -> Harness {
        let directory = Directory::from_parts(
            vec![Organisation::new(OrgId(1), "acme")],
            vec![
                Group::new(GroupId(1), OrgId(1), "admins").with_permission(SUPER_ADMIN_PERMISSION),
                Group::new(GroupId(10), OrgId(1), "analysts"),
                Group::new(GroupId(20), OrgId(1), "finance"),
            ],
            vec![
                User::new(UserId(1), OrgId(1), "ana").with_group(GroupId(10)),
                User::new(UserId(2), OrgId(1), "root").with_group(GroupId(1)),
                User::new(UserId(3), OrgId(1), "nobody"),
            ],
        )
        .unwrap();

        let tenant_runner = Arc::new(
            StaticRunner::new(json!({"rows": [{"n": 1}]}))
                .secure()
                .with_error("bad", "syntax error"),
        );
        let catalog = InMemoryCatalog::new();
        catalog.insert(
            DataSource::new(
                DataSourceId(1),
                "warehouse",
                Arc::new(StaticRunner::new(json!({"rows": []})).with_schema(vec![
                    crate::runner::TableSchema::new("events", &["id", "kind"]),
                ])),
            )
            .with_groups(vec![GroupId(10)]),
        );
        catalog.insert(
            DataSource::new(DataSourceId(5), "datasource_5", tenant_runner.clone())
                .with_groups(vec![GroupId(10)]),
        );
        catalog.insert(
            DataSource::new(DataSourceId(6), "datasource_6", tenant_runner.clone())
                .with_groups(vec![GroupId(20)]),
        );
        catalog.insert(
            DataSource::new(DataSourceId(7), "datasource_7", Arc::new(StaticRunner::new(json!([]))))
                .with_groups(vec![GroupId(10)]),
        );

        let cache = InMemoryQueryCache::new();
        cache.insert_query(QueryId(1));
        cache.store_result(QueryId(2), json!({"rows": [{"a": 1}]}));

        let gateway = CrossSourceQueryGateway::new(
            Arc::new(catalog),
            Arc::new(cache),
            AccessPolicy::new(Arc::new(directory)),
        );
        Harness {
            gateway,
            tenant_runner,
        }
    }

    fn caller(user: i64) -> CallerContext {
        CallerContext::new(Some(UserId(user)))
    }

    #[test]
    fn test_execute_query_ignores_user_checks() {
        let h = harness();
        let value = h
            .gateway
            .execute_query(&DataSourceRef::Id(DataSourceId(1)), "select 1")
            .unwrap();
        assert_eq!(value, json!({"rows": []}));
    }

    #[test]
    fn test_execute_query_unknown_source() {
        let err = harness()
            .gateway
            .execute_query(&DataSourceRef::Id(DataSourceId(99)), "select 1")
            .unwrap_err();
        assert_eq!(err.kind(), "UnknownDataSource");
    }

    #[test]
    fn test_restricted_query_checks_groups() {
        let h = harness();
        assert!(h.gateway.execute_restricted_query(&caller(1), "warehouse", "q").is_ok());
        assert!(h.gateway.execute_restricted_query(&caller(2), "warehouse", "q").is_ok());
        let err = h
            .gateway
            .execute_restricted_query(&caller(3), "warehouse", "q")
            .unwrap_err();
        assert_eq!(err.to_string(), "AccessDenied: can't access data source: warehouse");
        let anonymous = h
            .gateway
            .execute_restricted_query(&CallerContext::new(None), "warehouse", "q")
            .unwrap_err();
        assert_eq!(anonymous.kind(), "AccessDenied");
    }

    #[test]
    fn test_shared_query_not_secure_even_for_super_admin() {
        let h = harness();
        for user in [1, 2, 3] {
            let err = h
                .gateway
                .execute_shared_query(&caller(user), TenantRef(7), "select 1", Parameters::new())
                .unwrap_err();
            assert_eq!(err.to_string(), "NotSecure: data source is not secure: datasource_7");
        }
    }

    #[test]
    fn test_shared_query_dispatches_call() {
        let h = harness();
        let mut params = Parameters::new();
        params.insert("day".to_string(), json!("2024-01-01"));
        let value = h
            .gateway
            .execute_shared_query(&caller(1), TenantRef(5), "select 1", params.clone())
            .unwrap();
        assert_eq!(value["rows"][0]["n"], 1);

        let seen = h.tenant_runner.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].user, Some(UserId(1)));
        assert_eq!(seen[0].parameters, Some(params));
    }

    #[test]
    fn test_shared_query_access_denied() {
        let h = harness();
        let err = h
            .gateway
            .execute_shared_query(&caller(1), TenantRef(6), "select 1", Parameters::new())
            .unwrap_err();
        assert_eq!(err.kind(), "AccessDenied");
        assert!(h.tenant_runner.seen().is_empty());
    }

    #[test]
    fn test_shared_query_unknown_tenant() {
        let err = harness()
            .gateway
            .execute_shared_query(&caller(2), TenantRef(42), "select 1", Parameters::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "UnknownDataSource: wrong data source name/id: datasource_42");
    }

    #[test]
    fn test_shared_query_depth_limit() {
        let h = harness();
        let nested = caller(1).with_depth(1);
        let err = h
            .gateway
            .execute_shared_query(&nested, TenantRef(5), "select 1", Parameters::new())
            .unwrap_err();
        assert_eq!(err, ScriptError::DelegationDepthExceeded { limit: 1 });

        let deeper = h.gateway.clone().with_max_depth(2);
        assert!(deeper
            .execute_shared_query(&nested, TenantRef(5), "select 1", Parameters::new())
            .is_ok());
    }

    #[test]
    fn test_shared_query_runner_error_is_query_error() {
        let err = harness()
            .gateway
            .execute_shared_query(&caller(1), TenantRef(5), "bad", Parameters::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "QueryError: syntax error");
    }

    #[test]
    fn test_shared_query_observes_cancellation() {
        let h = harness();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = h
            .gateway
            .execute_shared_query(&caller(1).with_cancel(cancel), TenantRef(5), "q", Parameters::new())
            .unwrap_err();
        assert_eq!(err, ScriptError::CancelledByUser);
    }

    #[test]
    fn test_query_result_cache() {
        let h = harness();
        assert_eq!(h.gateway.get_query_result(QueryId(2)).unwrap()["rows"][0]["a"], 1);
        let missing = h.gateway.get_query_result(QueryId(1)).unwrap_err();
        assert_eq!(missing.to_string(), "NoCachedResult: query 1: query does not have results yet");
        let unknown = h.gateway.get_query_result(QueryId(9)).unwrap_err();
        assert_eq!(unknown.kind(), "NoCachedResult");
    }

    #[test]
    fn test_source_schema() {
        let schema = harness()
            .gateway
            .get_source_schema(&DataSourceRef::Name("warehouse".into()))
            .unwrap();
        assert_eq!(schema, json!([{"name": "events", "columns": ["id", "kind"]}]));
    }

    #[test]
    fn test_current_principal() {
        let h = harness();
        assert_eq!(h.gateway.current_principal(&caller(2)).unwrap().user.name, "root");
        assert!(h.gateway.current_principal(&CallerContext::new(None)).is_err());
    }

    proptest! {
        #[test]
        fn prop_super_admin_never_access_denied(tenant in prop_oneof![Just(5i64), Just(6i64), Just(7i64)]) {
            let h = harness();
            let result = h.gateway.execute_shared_query(&caller(2), TenantRef(tenant), "q", Parameters::new());
            if let Err(err) = result {
                prop_assert_ne!(err.kind(), "AccessDenied");
            }
        }

        #[test]
        fn prop_no_overlap_always_denied(tenant in prop_oneof![Just(5i64), Just(6i64)]) {
            let h = harness();
            let err = h
                .gateway
                .execute_shared_query(&caller(3), TenantRef(tenant), "q", Parameters::new())
                .unwrap_err();
            prop_assert_eq!(err.kind(), "AccessDenied");
        }
    }
}
