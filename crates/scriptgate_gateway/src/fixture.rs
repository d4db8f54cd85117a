//! Static fixture runner.
//!
//! Returns canned JSON for queries, optionally per query text. Used by tests
//! and by the CLI's fixture files in place of a real backend adapter.

use crate::call::DelegatedCall;
use crate::runner::{DataSourceRunner, RunnerError, SharedQueryRunner, TableSchema};
use indexmap::IndexMap;
use scriptgate_core::UserId;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};

/// Query seen by a [`StaticRunner`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    /// Query text
    pub query: String,
    /// User passed to `run_query`, or the caller of a delegated call
    pub user: Option<UserId>,
    /// Parameters of a delegated call
    pub parameters: Option<scriptgate_core::Parameters>,
}

/// Runner with canned results
#[derive(Debug)]
pub struct StaticRunner {
    default: Value,
    results: IndexMap<String, Result<Value, String>>,
    schema: Vec<TableSchema>,
    secure: bool,
    seen: Mutex<Vec<RecordedQuery>>,
}

impl StaticRunner {
    /// Runner answering every query with `default`
    #[must_use]
    pub fn new(default: Value) -> Self {
        Self {
            default,
            results: IndexMap::new(),
            schema: Vec::new(),
            secure: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Answer `query` with `result`
    #[must_use]
    pub fn with_result(mut self, query: impl Into<String>, result: Value) -> Self {
        self.results.insert(query.into(), Ok(result));
        self
    }

    /// Fail `query` with `message`
    #[must_use]
    pub fn with_error(mut self, query: impl Into<String>, message: impl Into<String>) -> Self {
        self.results.insert(query.into(), Err(message.into()));
        self
    }

    /// Set the reported schema
    #[must_use]
    pub fn with_schema(mut self, schema: Vec<TableSchema>) -> Self {
        self.schema = schema;
        self
    }

    /// Expose a secure-query entry point
    #[must_use]
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Queries received so far
    #[must_use]
    pub fn seen(&self) -> Vec<RecordedQuery> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn answer(&self, record: RecordedQuery) -> Result<Value, RunnerError> {
        let answer = match self.results.get(&record.query) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(message)) => Err(RunnerError::Query(message.clone())),
            None => Ok(self.default.clone()),
        };
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).push(record);
        answer
    }
}

impl DataSourceRunner for StaticRunner {
    fn kind(&self) -> &str {
        "static"
    }

    fn run_query(&self, query: &str, user: Option<UserId>) -> Result<Value, RunnerError> {
        self.answer(RecordedQuery {
            query: query.to_string(),
            user,
            parameters: None,
        })
    }

    fn shared_query(&self) -> Option<&dyn SharedQueryRunner> {
        if self.secure {
            Some(self)
        } else {
            None
        }
    }

    fn get_schema(&self) -> Result<Vec<TableSchema>, RunnerError> {
        Ok(self.schema.clone())
    }
}

impl SharedQueryRunner for StaticRunner {
    fn run_shared_query(&self, call: &DelegatedCall) -> Result<Value, RunnerError> {
        call.cancel.check().map_err(RunnerError::Script)?;
        self.answer(RecordedQuery {
            query: call.query.clone(),
            user: Some(call.caller),
            parameters: Some(call.parameters.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canned_answers() {
        let runner = StaticRunner::new(json!({"rows": []}))
            .with_result("select 1", json!({"rows": [{"x": 1}]}))
            .with_error("boom", "relation does not exist");

        assert_eq!(runner.run_query("select 1", None).unwrap()["rows"][0]["x"], 1);
        assert_eq!(runner.run_query("other", None).unwrap(), json!({"rows": []}));
        assert_eq!(
            runner.run_query("boom", None).unwrap_err(),
            RunnerError::Query("relation does not exist".to_string())
        );
        assert_eq!(runner.seen().len(), 3);
        assert!(runner.shared_query().is_none());
    }
}
