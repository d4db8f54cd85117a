//! scriptgate access policy
//!
//! Resolves the invoking user into a principal (organisation, groups,
//! permissions) and decides whether that principal may read a data source.
//! Decisions are computed on every call and each one produces a proof that
//! is logged.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decision;
pub mod directory;
pub mod error;
pub mod principal;
pub mod proof;

pub use decision::{AccessDecision, AccessPolicy, DecisionReason, SUPER_ADMIN_PERMISSION};
pub use directory::{AccessControl, Directory};
pub use error::PolicyError;
pub use principal::{Group, Organisation, Principal, User};
pub use proof::{DecisionProof, ProofField, ProofKind};
