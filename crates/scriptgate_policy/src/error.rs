//! Policy errors.

use scriptgate_core::{GroupId, OrgId, ScriptError, UserId};

/// Errors raised while resolving principals
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// The user is not known to the directory
    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    /// The user's organisation is not known to the directory
    #[error("unknown organisation: {0}")]
    UnknownOrganisation(OrgId),

    /// A group id is already registered
    #[error("duplicate group: {0}")]
    DuplicateGroup(GroupId),

    /// The backing store failed
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

impl From<PolicyError> for ScriptError {
    fn from(err: PolicyError) -> Self {
        ScriptError::runtime("PolicyError", err.to_string())
    }
}
