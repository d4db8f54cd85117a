//! Call descriptors passed across the delegation boundary.

use scriptgate_core::{CancelFlag, ExecutionId, Parameters, TenantRef, UserId};

/// Who is calling the gateway, and from how deep in a delegation chain
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    /// Invoking user, if the execution runs on behalf of one
    pub user: Option<UserId>,
    /// Delegation depth of the calling execution (0 for a top-level run)
    pub depth: u32,
    /// Cancellation flag of the calling execution
    pub cancel: CancelFlag,
    /// Calling execution
    pub execution: ExecutionId,
}

impl CallerContext {
    /// Top-level caller
    #[must_use]
    pub fn new(user: Option<UserId>) -> Self {
        Self {
            user,
            ..Self::default()
        }
    }

    /// Set delegation depth
    #[must_use]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Share a cancellation flag
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set execution id
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionId) -> Self {
        self.execution = execution;
        self
    }
}

/// Delegated query dispatched to a tenant's secure-query runner
///
/// This is the only thing that crosses into the tenant: the callee compiles
/// and runs `query` under its own import gate and capabilities.
#[derive(Debug, Clone)]
pub struct DelegatedCall {
    /// Target tenant
    pub tenant: TenantRef,
    /// Canonical data source name of the tenant
    pub data_source: String,
    /// Query or script text
    pub query: String,
    /// Bindings for the callee's placeholders
    pub parameters: Parameters,
    /// Identity of the original caller
    pub caller: UserId,
    /// Depth of the callee (1 for a call from a top-level run)
    pub depth: u32,
    /// Cancellation shared with the caller
    pub cancel: CancelFlag,
    /// Calling execution, for log correlation
    pub parent: ExecutionId,
}
