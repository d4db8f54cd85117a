//! Access decisions for delegated queries.
//!
//! A user may read a data source when a group of the user's organisation
//! carries the super-admin permission, or when the user's groups intersect
//! the data source's groups. The principal is resolved again for every
//! decision; nothing is cached between calls.

use crate::directory::AccessControl;
use crate::error::PolicyError;
use crate::principal::Principal;
use crate::proof::{DecisionProof, ProofField};
use scriptgate_core::{GateResult, GroupId, ScriptError, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Permission that grants access to every data source
pub const SUPER_ADMIN_PERMISSION: &str = "super_admin";

/// Why a decision came out the way it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionReason {
    /// A group of the user's organisation carries the super-admin permission
    SuperAdmin,
    /// The user shares these groups with the data source
    GroupOverlap(Vec<GroupId>),
    /// Neither condition holds
    NoOverlap,
}

/// Outcome of one access check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    /// Whether access is granted
    pub granted: bool,
    /// Basis for the outcome
    pub reason: DecisionReason,
}

impl AccessDecision {
    /// Evaluate a principal against a data source's groups
    #[must_use]
    pub fn evaluate(principal: &Principal, permission: &str, source_groups: &[GroupId]) -> Self {
        if principal.has_permission(permission) {
            return Self {
                granted: true,
                reason: DecisionReason::SuperAdmin,
            };
        }

        let overlap: Vec<GroupId> = source_groups
            .iter()
            .filter(|g| principal.group_ids().contains(g))
            .copied()
            .collect();
        if overlap.is_empty() {
            Self {
                granted: false,
                reason: DecisionReason::NoOverlap,
            }
        } else {
            Self {
                granted: true,
                reason: DecisionReason::GroupOverlap(overlap),
            }
        }
    }
}

/// Access checks against a user store
#[derive(Clone)]
pub struct AccessPolicy {
    control: Arc<dyn AccessControl>,
    permission: String,
}

impl std::fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("permission", &self.permission)
            .finish_non_exhaustive()
    }
}

impl AccessPolicy {
    /// Create a policy over a user store
    #[must_use]
    pub fn new(control: Arc<dyn AccessControl>) -> Self {
        Self {
            control,
            permission: SUPER_ADMIN_PERMISSION.to_string(),
        }
    }

    /// Use a different full-access permission name
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = permission.into();
        self
    }

    /// Resolve the current principal for `user`
    ///
    /// # Errors
    ///
    /// Returns error if the user store cannot resolve the user
    pub fn principal(&self, user: UserId) -> Result<Principal, PolicyError> {
        self.control.resolve(user)
    }

    /// Decide and record the proof
    ///
    /// # Errors
    ///
    /// Returns error if the user store cannot resolve the user
    pub fn decide(
        &self,
        user: UserId,
        data_source: &str,
        source_groups: &[GroupId],
    ) -> Result<(AccessDecision, DecisionProof), PolicyError> {
        let principal = self.control.resolve(user)?;
        let decision = AccessDecision::evaluate(&principal, &self.permission, source_groups);

        let mut proof = DecisionProof::new(decision.granted)
            .with_subject(user)
            .with_resource(data_source)
            .with_field(ProofField::new("organisation", principal.organisation.id))
            .with_field(ProofField::boolean(
                &self.permission,
                matches!(decision.reason, DecisionReason::SuperAdmin),
            ));
        if let DecisionReason::GroupOverlap(groups) = &decision.reason {
            let names: Vec<String> = groups.iter().map(ToString::to_string).collect();
            proof = proof.with_field(ProofField::new("overlap", names.join(",")));
        }

        info!(
            user = %user,
            data_source,
            granted = decision.granted,
            reason = ?decision.reason,
            proof = %proof.id,
            "access decision"
        );
        Ok((decision, proof))
    }

    /// Require access, failing with `AccessDenied`
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` when the decision is negative, or the policy
    /// error when the user cannot be resolved
    pub fn check(
        &self,
        user: UserId,
        data_source: &str,
        source_groups: &[GroupId],
    ) -> GateResult<DecisionProof> {
        let (decision, proof) = self.decide(user, data_source, source_groups)?;
        if decision.granted {
            Ok(proof)
        } else {
            warn!(user = %user, data_source, proof = %proof.id, "access denied");
            Err(ScriptError::AccessDenied {
                data_source: data_source.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Directory;
    use crate::principal::{Group, Organisation, User};
    use proptest::prelude::*;
    use scriptgate_core::OrgId;

    fn policy_with(groups: Vec<Group>, user_groups: Vec<GroupId>) -> (Arc<Directory>, AccessPolicy) {
        let mut user = User::new(UserId(1), OrgId(1), "ana");
        user.groups = user_groups;
        let dir = Arc::new(
            Directory::from_parts(vec![Organisation::new(OrgId(1), "acme")], groups, vec![user])
                .unwrap(),
        );
        let policy = AccessPolicy::new(dir.clone());
        (dir, policy)
    }

    #[test]
    fn test_group_overlap_grants() {
        let (_, policy) = policy_with(
            vec![Group::new(GroupId(1), OrgId(1), "a"), Group::new(GroupId(2), OrgId(1), "b")],
            vec![GroupId(1), GroupId(2)],
        );
        let (decision, proof) = policy.decide(UserId(1), "ds", &[GroupId(2), GroupId(3)]).unwrap();
        assert!(decision.granted);
        assert_eq!(decision.reason, DecisionReason::GroupOverlap(vec![GroupId(2)]));
        assert_eq!(proof.get_field("overlap").map(|f| f.value.as_str()), Some("group_2"));
    }

    #[test]
    fn test_no_overlap_denies() {
        let (_, policy) = policy_with(vec![Group::new(GroupId(1), OrgId(1), "a")], vec![GroupId(1)]);
        let err = policy.check(UserId(1), "datasource_7", &[GroupId(5)]).unwrap_err();
        assert_eq!(err.kind(), "AccessDenied");
        assert_eq!(err.to_string(), "AccessDenied: can't access data source: datasource_7");
    }

    #[test]
    fn test_super_admin_grants_without_overlap() {
        let (_, policy) = policy_with(
            vec![Group::new(GroupId(1), OrgId(1), "admins").with_permission(SUPER_ADMIN_PERMISSION)],
            vec![GroupId(1)],
        );
        let proof = policy.check(UserId(1), "ds", &[]).unwrap();
        assert!(proof.decision);
        assert_eq!(proof.get_field("super_admin").map(|f| f.value.as_str()), Some("true"));
    }

    #[test]
    fn test_admin_is_not_super_admin() {
        let (_, policy) = policy_with(
            vec![Group::new(GroupId(1), OrgId(1), "admins").with_permission("admin")],
            vec![GroupId(1)],
        );
        assert!(policy.check(UserId(1), "ds", &[GroupId(9)]).is_err());
    }

    #[test]
    fn test_decision_not_cached() {
        let (dir, policy) = policy_with(vec![Group::new(GroupId(1), OrgId(1), "a")], vec![GroupId(1)]);
        assert!(policy.check(UserId(1), "ds", &[GroupId(1)]).is_ok());
        dir.set_user_groups(UserId(1), Vec::new()).unwrap();
        assert!(policy.check(UserId(1), "ds", &[GroupId(1)]).is_err());
    }

    #[test]
    fn test_unknown_user_is_policy_error() {
        let (_, policy) = policy_with(Vec::new(), Vec::new());
        let err = policy.check(UserId(42), "ds", &[]).unwrap_err();
        assert_eq!(err.kind(), "PolicyError");
    }

    proptest! {
        #[test]
        fn prop_super_admin_never_denied(
            user_groups in proptest::collection::vec(2i64..50, 0..6),
            source_groups in proptest::collection::vec(1i64..50, 0..6),
        ) {
            let mut groups: Vec<Group> = (2..50)
                .map(|id| Group::new(GroupId(id), OrgId(1), format!("g{id}")))
                .collect();
            groups.push(Group::new(GroupId(1), OrgId(1), "admins").with_permission(SUPER_ADMIN_PERMISSION));
            let mut memberships: Vec<GroupId> = user_groups.into_iter().map(GroupId).collect();
            memberships.push(GroupId(1));
            let (_, policy) = policy_with(groups, memberships);
            let sources: Vec<GroupId> = source_groups.into_iter().map(GroupId).collect();
            prop_assert!(policy.check(UserId(1), "ds", &sources).is_ok());
        }

        #[test]
        fn prop_disjoint_groups_always_denied(
            user_groups in proptest::collection::vec(1i64..25, 0..6),
            source_groups in proptest::collection::vec(25i64..50, 0..6),
        ) {
            let groups: Vec<Group> = (1..50)
                .map(|id| Group::new(GroupId(id), OrgId(1), format!("g{id}")))
                .collect();
            let memberships: Vec<GroupId> = user_groups.into_iter().map(GroupId).collect();
            let (_, policy) = policy_with(groups, memberships);
            let sources: Vec<GroupId> = source_groups.into_iter().map(GroupId).collect();
            let err = policy.check(UserId(1), "ds", &sources).unwrap_err();
            prop_assert_eq!(err.kind(), "AccessDenied");
        }
    }
}
