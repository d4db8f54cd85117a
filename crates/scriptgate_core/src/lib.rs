//! scriptgate core types
//!
//! Pure types shared by every scriptgate crate: the error taxonomy surfaced
//! across the sandbox boundary, identifiers, the structured script result,
//! and UTC timestamps used by the output log.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod error;
pub mod id;
pub mod result;
pub mod time;

// Re-exports
pub use cancel::CancelFlag;
pub use error::{GateResult, ScriptError};
pub use id::{DataSourceId, DataSourceRef, ExecutionId, GroupId, OrgId, QueryId, TenantRef, UserId};
pub use result::{Column, ColumnType, Parameters, Row, ScriptResult};
pub use time::Timestamp;
