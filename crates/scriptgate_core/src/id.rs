//! Identifiers for scriptgate entities.
//!
//! Persistent entities (users, groups, organisations, data sources, queries)
//! use the integer ids of the surrounding platform. Executions get a UUID so
//! log lines of nested delegated runs can be told apart.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get raw value
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

integer_id!(
    /// User identifier
    UserId,
    "user_"
);
integer_id!(
    /// Group identifier
    GroupId,
    "group_"
);
integer_id!(
    /// Organisation identifier
    OrgId,
    "org_"
);
integer_id!(
    /// Data source identifier
    DataSourceId,
    "ds_"
);
integer_id!(
    /// Saved query identifier
    QueryId,
    "query_"
);

/// Reference to a data source as written in a script: by id or by name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataSourceRef {
    /// Numeric id
    Id(DataSourceId),
    /// Data source name
    Name(String),
}

impl std::fmt::Display for DataSourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id.0),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Tenant identifier; maps deterministically onto the tenant's data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantRef(pub i64);

impl TenantRef {
    /// Canonical data source name of this tenant
    #[must_use]
    pub fn data_source_name(&self) -> String {
        format!("datasource_{}", self.0)
    }

    /// Table name holding this tenant's rows
    #[must_use]
    pub fn table_name(&self) -> String {
        format!("tenant_{}", self.0)
    }
}

impl std::fmt::Display for TenantRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantRef {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

/// Execution identifier - one per script invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Create a new random ExecutionId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exec_{}", self.0)
    }
}
