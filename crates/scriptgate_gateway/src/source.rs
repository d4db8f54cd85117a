//! Data sources and the catalog that resolves script references to them.

use crate::runner::DataSourceRunner;
use indexmap::IndexMap;
use scriptgate_core::{DataSourceId, DataSourceRef, GateResult, GroupId, ScriptError};
use std::sync::{Arc, PoisonError, RwLock};

/// A queryable data source
#[derive(Clone)]
pub struct DataSource {
    /// Id
    pub id: DataSourceId,
    /// Unique name
    pub name: String,
    /// Groups that may read this source
    pub groups: Vec<GroupId>,
    runner: Arc<dyn DataSourceRunner>,
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("groups", &self.groups)
            .field("runner", &self.runner.kind())
            .finish()
    }
}

impl DataSource {
    /// Create a data source with no group associations
    #[must_use]
    pub fn new(id: DataSourceId, name: impl Into<String>, runner: Arc<dyn DataSourceRunner>) -> Self {
        Self {
            id,
            name: name.into(),
            groups: Vec::new(),
            runner,
        }
    }

    /// Set group associations
    #[must_use]
    pub fn with_groups(mut self, groups: Vec<GroupId>) -> Self {
        self.groups = groups;
        self
    }

    /// Backend runner
    #[must_use]
    pub fn runner(&self) -> &dyn DataSourceRunner {
        self.runner.as_ref()
    }

    /// Whether the runner exposes a secure-query entry point
    #[must_use]
    pub fn supports_secure_query(&self) -> bool {
        self.runner.shared_query().is_some()
    }
}

/// Lookup of data sources by id or name
pub trait DataSourceCatalog: Send + Sync {
    /// Find by id
    fn get_by_id(&self, id: DataSourceId) -> Option<Arc<DataSource>>;

    /// Find by name
    fn get_by_name(&self, name: &str) -> Option<Arc<DataSource>>;

    /// Resolve a script reference
    ///
    /// # Errors
    ///
    /// Returns `UnknownDataSource` when nothing matches
    fn resolve(&self, reference: &DataSourceRef) -> GateResult<Arc<DataSource>> {
        let found = match reference {
            DataSourceRef::Id(id) => self.get_by_id(*id),
            DataSourceRef::Name(name) => self.get_by_name(name),
        };
        found.ok_or_else(|| ScriptError::UnknownDataSource {
            reference: reference.to_string(),
        })
    }
}

/// In-memory catalog
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    sources: RwLock<IndexMap<DataSourceId, Arc<DataSource>>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a data source
    pub fn insert(&self, source: DataSource) {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.insert(source.id, Arc::new(source));
    }

    /// Remove a data source
    pub fn remove(&self, id: DataSourceId) -> Option<Arc<DataSource>> {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.shift_remove(&id)
    }

    /// Names of all data sources
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|s| s.name.clone())
            .collect()
    }
}

impl DataSourceCatalog for InMemoryCatalog {
    fn get_by_id(&self, id: DataSourceId) -> Option<Arc<DataSource>> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn get_by_name(&self, name: &str) -> Option<Arc<DataSource>> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|s| s.name == name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::StaticRunner;
    use serde_json::json;

    fn catalog() -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        catalog.insert(
            DataSource::new(DataSourceId(1), "warehouse", Arc::new(StaticRunner::new(json!([]))))
                .with_groups(vec![GroupId(2)]),
        );
        catalog.insert(DataSource::new(
            DataSourceId(7),
            "datasource_7",
            Arc::new(StaticRunner::new(json!([])).secure()),
        ));
        catalog
    }

    #[test]
    fn test_resolve_by_id_and_name() {
        let catalog = catalog();
        let by_id = catalog.resolve(&DataSourceRef::Id(DataSourceId(1))).unwrap();
        let by_name = catalog.resolve(&DataSourceRef::Name("warehouse".into())).unwrap();
        assert_eq!(by_id.id, by_name.id);
        assert_eq!(by_id.groups, vec![GroupId(2)]);
        assert!(!by_id.supports_secure_query());
        assert!(catalog.get_by_name("datasource_7").unwrap().supports_secure_query());
    }

    #[test]
    fn test_unknown_reference() {
        let err = catalog().resolve(&DataSourceRef::Name("nope".into())).unwrap_err();
        assert_eq!(err.to_string(), "UnknownDataSource: wrong data source name/id: nope");
    }

    #[test]
    fn test_remove() {
        let catalog = catalog();
        assert!(catalog.remove(DataSourceId(1)).is_some());
        assert_eq!(catalog.names(), vec!["datasource_7".to_string()]);
    }
}
