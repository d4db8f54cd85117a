//! Fixture deployments for local runs.
//!
//! A fixture file stands in for the platform around a script: the user
//! directory, the data source catalog and the cached query results. Static
//! sources answer with canned JSON; script sources get their own
//! [`ScriptRunner`] wired to the shared gateway.

use color_eyre::eyre::{Result, WrapErr};
use indexmap::IndexMap;
use scriptgate_core::{DataSourceId, GroupId, QueryId};
use scriptgate_gateway::{
    CrossSourceQueryGateway, DataSource, DataSourceRunner, InMemoryCatalog, InMemoryQueryCache, StaticRunner,
};
use scriptgate_policy::{AccessPolicy, Directory, Group, Organisation, User};
use scriptgate_runtime::{RunnerConfig, ScriptRunner};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Deployment description read from JSON
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fixture {
    /// Organisations
    pub organisations: Vec<Organisation>,
    /// Groups and their permissions
    pub groups: Vec<Group>,
    /// Users and their group memberships
    pub users: Vec<User>,
    /// Catalog entries
    pub data_sources: Vec<SourceFixture>,
    /// Saved queries, with or without a cached result
    pub cached_queries: Vec<CachedFixture>,
}

/// One catalog entry
#[derive(Debug, Deserialize)]
pub struct SourceFixture {
    /// Id
    pub id: DataSourceId,
    /// Unique name
    pub name: String,
    /// Groups that may read the source
    #[serde(default)]
    pub groups: Vec<GroupId>,
    /// What answers queries
    #[serde(flatten)]
    pub backend: BackendFixture,
}

/// Backend of a catalog entry, tagged by `kind`
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendFixture {
    /// Canned JSON
    Static {
        /// Answer for queries without an entry in `results`
        #[serde(default)]
        result: Value,
        /// Answers per query text
        #[serde(default)]
        results: IndexMap<String, Value>,
        /// Accept delegated shared queries
        #[serde(default)]
        secure: bool,
    },
    /// Script data source
    Script {
        /// Runner configuration
        #[serde(default)]
        config: RunnerConfig,
    },
}

/// Saved query
#[derive(Debug, Deserialize)]
pub struct CachedFixture {
    /// Query id
    pub id: QueryId,
    /// Cached result; absent for a query that never ran
    #[serde(default)]
    pub data: Option<Value>,
}

/// Gateway built from a fixture, plus the script runners it owns
pub struct Deployment {
    /// Gateway every query goes through
    pub gateway: Arc<CrossSourceQueryGateway>,
    /// Script runners of the catalog, already attached to `gateway`
    pub scripts: Vec<Arc<ScriptRunner>>,
}

impl Fixture {
    /// Read a fixture file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a fixture
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).wrap_err_with(|| format!("reading fixture {}", path.display()))?;
        serde_json::from_str(&text).wrap_err_with(|| format!("parsing fixture {}", path.display()))
    }

    /// Build the gateway
    ///
    /// # Errors
    ///
    /// Returns error if the directory is inconsistent
    pub fn build(self, max_depth: u32) -> Result<Deployment> {
        let directory = Directory::from_parts(self.organisations, self.groups, self.users)
            .wrap_err("building user directory")?;

        let catalog = InMemoryCatalog::new();
        let mut scripts = Vec::new();
        for source in self.data_sources {
            let runner: Arc<dyn DataSourceRunner> = match source.backend {
                BackendFixture::Static {
                    result,
                    results,
                    secure,
                } => {
                    let mut runner = StaticRunner::new(result);
                    for (query, answer) in results {
                        runner = runner.with_result(query, answer);
                    }
                    if secure {
                        runner = runner.secure();
                    }
                    Arc::new(runner)
                }
                BackendFixture::Script { config } => {
                    let runner = Arc::new(ScriptRunner::new(config));
                    scripts.push(Arc::clone(&runner));
                    runner
                }
            };
            debug!(source = %source.name, kind = runner.kind(), "fixture data source");
            catalog.insert(DataSource::new(source.id, source.name, runner).with_groups(source.groups));
        }

        let cache = InMemoryQueryCache::new();
        for cached in self.cached_queries {
            match cached.data {
                Some(data) => cache.store_result(cached.id, data),
                None => cache.insert_query(cached.id),
            }
        }

        let gateway = Arc::new(
            CrossSourceQueryGateway::new(Arc::new(catalog), Arc::new(cache), AccessPolicy::new(Arc::new(directory)))
                .with_max_depth(max_depth),
        );
        for runner in &scripts {
            runner.attach_gateway(&gateway);
        }
        Ok(Deployment { gateway, scripts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptgate_core::UserId;
    use scriptgate_gateway::CallerContext;
    use serde_json::json;
    use std::io::Write;

    const FIXTURE: &str = r#"{
        "organisations": [{"id": 1, "name": "acme"}],
        "groups": [
            {"id": 1, "org": 1, "name": "admins", "permissions": ["super_admin"]},
            {"id": 10, "org": 1, "name": "analysts"}
        ],
        "users": [
            {"id": 1, "org": 1, "name": "ana", "groups": [10]},
            {"id": 2, "org": 1, "name": "root", "groups": [1]}
        ],
        "dataSources": [
            {"id": 7, "name": "warehouse", "groups": [10], "kind": "static",
             "result": [], "results": {"select 1": [{"one": 1}]}},
            {"id": 8, "name": "datasource_8", "groups": [10], "kind": "script"},
            {"id": 9, "name": "datasource_9", "groups": [1], "kind": "static", "secure": true}
        ],
        "cachedQueries": [
            {"id": 3, "data": {"rows": [{"x": 1}]}},
            {"id": 4}
        ]
    }"#;

    fn deployment() -> Deployment {
        let fixture: Fixture = serde_json::from_str(FIXTURE).unwrap();
        fixture.build(1).unwrap()
    }

    fn run(deployment: &Deployment, user: i64, source: &str) -> (Option<String>, Option<String>) {
        let runner = ScriptRunner::new(RunnerConfig::default());
        runner.attach_gateway(&deployment.gateway);
        runner
            .run_script(source, &CallerContext::new(Some(UserId(user))))
            .into_pair()
    }

    #[test]
    fn test_parse_fixture() {
        let fixture: Fixture = serde_json::from_str(FIXTURE).unwrap();
        assert_eq!(fixture.users.len(), 2);
        assert_eq!(fixture.data_sources.len(), 3);
        assert!(matches!(
            fixture.data_sources[2].backend,
            BackendFixture::Static { secure: true, .. }
        ));
        assert!(matches!(fixture.data_sources[1].backend, BackendFixture::Script { .. }));
        assert!(fixture.cached_queries[1].data.is_none());
    }

    #[test]
    fn test_empty_fixture_is_valid() {
        let fixture: Fixture = serde_json::from_str("{}").unwrap();
        let deployment = fixture.build(1).unwrap();
        assert!(deployment.scripts.is_empty());
        assert_eq!(deployment.gateway.max_depth(), 1);
    }

    #[test]
    fn test_unknown_backend_kind_rejected() {
        let text = r#"{"dataSources": [{"id": 1, "name": "x", "kind": "oracle"}]}"#;
        assert!(serde_json::from_str::<Fixture>(text).is_err());
    }

    #[test]
    fn test_build_attaches_script_runners() {
        let deployment = deployment();
        assert_eq!(deployment.scripts.len(), 1);
        assert!(deployment.scripts[0].gateway().is_some());
    }

    #[test]
    fn test_static_source_answers_query() {
        let deployment = deployment();
        let script = r#"
rows = execute_query('warehouse', 'select 1')
add_result_column(result, 'one', 'One', TYPE_INTEGER)
for row in rows:
    add_result_row(result, row)
"#;
        let (json, error) = run(&deployment, 1, script);
        assert_eq!(error, None);
        let parsed: Value = serde_json::from_str(&json.unwrap()).unwrap();
        assert_eq!(parsed["rows"], json!([{"one": 1}]));
    }

    #[test]
    fn test_cached_queries() {
        let deployment = deployment();
        let (json, error) = run(&deployment, 1, "r = get_query_result(3)\nprint(r['rows'][0]['x'])");
        assert_eq!(error, None);
        let parsed: Value = serde_json::from_str(&json.unwrap()).unwrap();
        let line = parsed["log"][0].as_str().unwrap();
        assert!(line.starts_with('[') && line.ends_with("] 1"), "{line}");

        let (_, error) = run(&deployment, 1, "get_query_result(4)");
        assert!(error.unwrap().starts_with("NoCachedResult"));
    }

    #[test]
    fn test_script_source_takes_shared_queries() {
        let deployment = deployment();
        let script = r#"
data = execute_shared_query(8, "add_result_column(result, 'n', 'N', 'integer')\nadd_result_row(result, {'n': $[[n]]})", {'n': 5})
print(data['rows'][0]['n'])
"#;
        let (json, error) = run(&deployment, 1, script);
        assert_eq!(error, None);
        let parsed: Value = serde_json::from_str(&json.unwrap()).unwrap();
        assert!(parsed["log"][0].as_str().unwrap().ends_with("] 5"));
    }

    #[test]
    fn test_group_overlap_enforced() {
        let deployment = deployment();
        let (_, error) = run(&deployment, 1, "execute_shared_query(9, 'x')");
        assert!(error.unwrap().starts_with("AccessDenied"));
        let (_, error) = run(&deployment, 2, "execute_shared_query(9, 'x')");
        assert_eq!(error, None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();
        let fixture = Fixture::from_file(file.path()).unwrap();
        assert_eq!(fixture.organisations[0].name, "acme");

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        bad.write_all(b"{\"users\": 3}").unwrap();
        assert!(Fixture::from_file(bad.path()).is_err());
    }
}
