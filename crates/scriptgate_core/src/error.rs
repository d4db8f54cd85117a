//! Error taxonomy for scriptgate.
//!
//! Every failure that can leave a script invocation is one of these variants.
//! The `Display` form is always `<kind>: <message>`, which is the error string
//! handed back to the caller in place of a result.

/// Result type used across the sandbox boundary
pub type GateResult<T> = Result<T, ScriptError>;

/// Message used for host-delivered cancellation
pub const CANCELLED_MESSAGE: &str = "Query cancelled by user.";

/// Script error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    /// Script text could not be compiled under the restricted grammar
    #[error("CompileError: line {line}, column {column}: {message}")]
    Compile {
        /// What was rejected
        message: String,
        /// 1-based line
        line: usize,
        /// 1-based column
        column: usize,
    },

    /// Import of a module outside the allow-list (or not resolvable)
    #[error("ImportDenied: '{module}' {reason}")]
    ImportDenied {
        /// Requested module name
        module: String,
        /// Why the import failed
        reason: String,
    },

    /// The invoking user may not read the target data source
    #[error("AccessDenied: can't access data source: {data_source}")]
    AccessDenied {
        /// Canonical data source name
        data_source: String,
    },

    /// The target data source cannot run shared (secure) queries
    #[error("NotSecure: data source is not secure: {data_source}")]
    NotSecure {
        /// Canonical data source name
        data_source: String,
    },

    /// No data source matches the reference
    #[error("UnknownDataSource: wrong data source name/id: {reference}")]
    UnknownDataSource {
        /// Reference as given by the script
        reference: String,
    },

    /// The referenced query has no cached data
    #[error("NoCachedResult: query {query_id}: {reason}")]
    NoCachedResult {
        /// Query id
        query_id: i64,
        /// Detail
        reason: String,
    },

    /// Execution was interrupted by the host
    #[error("CancelledByUser: {}", CANCELLED_MESSAGE)]
    CancelledByUser,

    /// A delegated call would exceed the configured delegation depth
    #[error("DelegationDepthExceeded: delegated query depth limit of {limit} reached")]
    DelegationDepthExceeded {
        /// Configured maximum depth
        limit: u32,
    },

    /// Catch-all for exceptions raised while the script runs
    #[error("{kind}: {message}")]
    Runtime {
        /// Exception kind, e.g. `KeyError`
        kind: String,
        /// Exception message
        message: String,
    },
}

impl ScriptError {
    /// Create a runtime error of the given kind
    #[must_use]
    pub fn runtime(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a compile error at a position
    #[must_use]
    pub fn compile(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::Compile {
            message: message.into(),
            line,
            column,
        }
    }

    /// Exception kind as seen by scripts and callers
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Compile { .. } => "CompileError",
            Self::ImportDenied { .. } => "ImportDenied",
            Self::AccessDenied { .. } => "AccessDenied",
            Self::NotSecure { .. } => "NotSecure",
            Self::UnknownDataSource { .. } => "UnknownDataSource",
            Self::NoCachedResult { .. } => "NoCachedResult",
            Self::CancelledByUser => "CancelledByUser",
            Self::DelegationDepthExceeded { .. } => "DelegationDepthExceeded",
            Self::Runtime { kind, .. } => kind,
        }
    }

    /// Message without the kind prefix
    #[must_use]
    pub fn message(&self) -> String {
        let rendered = self.to_string();
        let prefix_len = self.kind().len() + 2;
        rendered
            .get(prefix_len..)
            .map(str::to_string)
            .unwrap_or(rendered)
    }

    /// Whether scripts are allowed to catch this error
    #[must_use]
    pub fn is_catchable(&self) -> bool {
        !matches!(self, Self::CancelledByUser)
    }
}

impl From<serde_json::Error> for ScriptError {
    fn from(err: serde_json::Error) -> Self {
        Self::runtime("ValueError", format!("invalid JSON: {err}"))
    }
}
