//! Backend runner contracts.
//!
//! Every concrete backend adapter implements [`DataSourceRunner`]. A runner
//! that can also execute parameterised queries on behalf of another tenant
//! exposes a [`SharedQueryRunner`]; its presence is what makes a data source
//! "support secure query".

use crate::call::DelegatedCall;
use scriptgate_core::{ScriptError, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error returned by a backend runner
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    /// The backend rejected or failed the query
    #[error("{0}")]
    Query(String),

    /// A nested script execution failed
    #[error(transparent)]
    Script(ScriptError),

    /// The runner cannot serve this request
    #[error("not supported: {0}")]
    Unsupported(String),
}

impl From<RunnerError> for ScriptError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Script(ScriptError::CancelledByUser) => ScriptError::CancelledByUser,
            other => ScriptError::runtime("QueryError", other.to_string()),
        }
    }
}

/// One table of a data source schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Column names
    pub columns: Vec<String>,
}

impl TableSchema {
    /// Create a table schema
    #[must_use]
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

/// Backend adapter for one data source
pub trait DataSourceRunner: Send + Sync {
    /// Runner type name, e.g. `static` or `script`
    fn kind(&self) -> &str;

    /// Run a query and return its parsed result
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails the query
    fn run_query(&self, query: &str, user: Option<UserId>) -> Result<Value, RunnerError>;

    /// Secure-query entry point, if the runner has one
    fn shared_query(&self) -> Option<&dyn SharedQueryRunner> {
        None
    }

    /// Schema of the data source
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot describe itself
    fn get_schema(&self) -> Result<Vec<TableSchema>, RunnerError> {
        Ok(Vec::new())
    }
}

/// Tenant-scoped executor for delegated queries
pub trait SharedQueryRunner: Send + Sync {
    /// Execute a delegated call with its own parameters
    ///
    /// # Errors
    ///
    /// Returns error if the query fails
    fn run_shared_query(&self, call: &DelegatedCall) -> Result<Value, RunnerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_error_conversion() {
        let err: ScriptError = RunnerError::Query("syntax error at 'selec'".to_string()).into();
        assert_eq!(err.to_string(), "QueryError: syntax error at 'selec'");

        let nested: ScriptError =
            RunnerError::Script(ScriptError::runtime("KeyError", "'a'")).into();
        assert_eq!(nested.to_string(), "QueryError: KeyError: 'a'");

        let cancelled: ScriptError = RunnerError::Script(ScriptError::CancelledByUser).into();
        assert_eq!(cancelled, ScriptError::CancelledByUser);
    }
}
