//! Cached results of saved queries.

use indexmap::IndexMap;
use scriptgate_core::{QueryId, Timestamp};
use serde_json::Value;
use std::sync::{PoisonError, RwLock};

/// Saved query with its latest cached data
#[derive(Debug, Clone, PartialEq)]
pub struct CachedQuery {
    /// Query id
    pub query_id: QueryId,
    /// Latest result data; `None` when the query never produced data
    pub data: Option<Value>,
    /// When `data` was retrieved
    pub retrieved_at: Option<Timestamp>,
}

/// Read access to cached query results
pub trait QueryCache: Send + Sync {
    /// Look up a saved query; `None` when the query does not exist
    fn get_cached_result(&self, query_id: QueryId) -> Option<CachedQuery>;
}

/// In-memory query cache
#[derive(Debug, Default)]
pub struct InMemoryQueryCache {
    entries: RwLock<IndexMap<QueryId, CachedQuery>>,
}

impl InMemoryQueryCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a saved query that has no results yet
    pub fn insert_query(&self, query_id: QueryId) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(query_id).or_insert(CachedQuery {
            query_id,
            data: None,
            retrieved_at: None,
        });
    }

    /// Store the latest result of a query
    pub fn store_result(&self, query_id: QueryId, data: Value) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            query_id,
            CachedQuery {
                query_id,
                data: Some(data),
                retrieved_at: Some(Timestamp::now()),
            },
        );
    }

    /// Number of saved queries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no query is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueryCache for InMemoryQueryCache {
    fn get_cached_result(&self, query_id: QueryId) -> Option<CachedQuery> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&query_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_then_store() {
        let cache = InMemoryQueryCache::new();
        cache.insert_query(QueryId(1));
        assert_eq!(cache.get_cached_result(QueryId(1)).unwrap().data, None);

        cache.store_result(QueryId(1), json!({"rows": []}));
        let cached = cache.get_cached_result(QueryId(1)).unwrap();
        assert_eq!(cached.data, Some(json!({"rows": []})));
        assert!(cached.retrieved_at.is_some());

        cache.insert_query(QueryId(1));
        assert!(cache.get_cached_result(QueryId(1)).unwrap().data.is_some());
        assert!(cache.get_cached_result(QueryId(2)).is_none());
        assert_eq!(cache.len(), 1);
    }
}
