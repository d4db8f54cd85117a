//! scriptgate query gateway
//!
//! Contracts for the backends a script may query, and the gateway that
//! mediates every delegated query: resolve the data source, check secure
//! support, decide access, bound delegation depth, then dispatch.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod call;
pub mod fixture;
pub mod gateway;
pub mod runner;
pub mod source;

pub use cache::{CachedQuery, InMemoryQueryCache, QueryCache};
pub use call::{CallerContext, DelegatedCall};
pub use fixture::{RecordedQuery, StaticRunner};
pub use gateway::{CrossSourceQueryGateway, DEFAULT_MAX_DELEGATION_DEPTH};
pub use runner::{DataSourceRunner, RunnerError, SharedQueryRunner, TableSchema};
pub use source::{DataSource, DataSourceCatalog, InMemoryCatalog};
