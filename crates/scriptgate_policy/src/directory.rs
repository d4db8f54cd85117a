//! Principal resolution.
//!
//! [`AccessControl`] is the seam to the platform's user store. [`Directory`]
//! is the in-memory implementation used by tests and the CLI; it can be
//! mutated while runners hold it, so permission changes are visible to the
//! very next decision.

use crate::error::PolicyError;
use crate::principal::{Group, Organisation, Principal, User};
use indexmap::IndexMap;
use scriptgate_core::{GroupId, OrgId, UserId};
use std::sync::{PoisonError, RwLock};

/// Resolves users into principals
pub trait AccessControl: Send + Sync {
    /// Load the user with its organisation and in-organisation groups
    ///
    /// # Errors
    ///
    /// Returns error if the user or organisation is unknown or the store
    /// is unavailable
    fn resolve(&self, user: UserId) -> Result<Principal, PolicyError>;
}

#[derive(Debug, Default)]
struct DirectoryState {
    organisations: IndexMap<OrgId, Organisation>,
    groups: IndexMap<GroupId, Group>,
    users: IndexMap<UserId, User>,
}

/// In-memory user directory
#[derive(Debug, Default)]
pub struct Directory {
    inner: RwLock<DirectoryState>,
}

impl Directory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from lists of entities
    ///
    /// # Errors
    ///
    /// Returns error if a group id appears twice
    pub fn from_parts(
        organisations: Vec<Organisation>,
        groups: Vec<Group>,
        users: Vec<User>,
    ) -> Result<Self, PolicyError> {
        let directory = Self::new();
        for org in organisations {
            directory.add_organisation(org);
        }
        for group in groups {
            directory.add_group(group)?;
        }
        for user in users {
            directory.add_user(user);
        }
        Ok(directory)
    }

    /// Add or replace an organisation
    pub fn add_organisation(&self, org: Organisation) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.organisations.insert(org.id, org);
    }

    /// Add a group
    ///
    /// # Errors
    ///
    /// Returns error if the group id is already registered
    pub fn add_group(&self, group: Group) -> Result<(), PolicyError> {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if state.groups.contains_key(&group.id) {
            return Err(PolicyError::DuplicateGroup(group.id));
        }
        state.groups.insert(group.id, group);
        Ok(())
    }

    /// Add or replace a user
    pub fn add_user(&self, user: User) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.users.insert(user.id, user);
    }

    /// Grant a permission to a group; returns false if the group is unknown
    pub fn grant_permission(&self, group: GroupId, permission: &str) -> bool {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match state.groups.get_mut(&group) {
            Some(g) => {
                if !g.has_permission(permission) {
                    g.permissions.push(permission.to_string());
                }
                true
            }
            None => false,
        }
    }

    /// Revoke a permission from a group; returns false if the group is unknown
    pub fn revoke_permission(&self, group: GroupId, permission: &str) -> bool {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match state.groups.get_mut(&group) {
            Some(g) => {
                g.permissions.retain(|p| p != permission);
                true
            }
            None => false,
        }
    }

    /// Replace a user's group memberships
    ///
    /// # Errors
    ///
    /// Returns error if the user is unknown
    pub fn set_user_groups(&self, user: UserId, groups: Vec<GroupId>) -> Result<(), PolicyError> {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = state.users.get_mut(&user).ok_or(PolicyError::UnknownUser(user))?;
        entry.groups = groups;
        Ok(())
    }

    /// Number of users
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).users.len()
    }
}

impl AccessControl for Directory {
    fn resolve(&self, user: UserId) -> Result<Principal, PolicyError> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let user = state.users.get(&user).cloned().ok_or(PolicyError::UnknownUser(user))?;
        let organisation = state
            .organisations
            .get(&user.org)
            .cloned()
            .ok_or(PolicyError::UnknownOrganisation(user.org))?;
        let groups = user
            .groups
            .iter()
            .filter_map(|gid| state.groups.get(gid))
            .filter(|g| g.org == organisation.id)
            .cloned()
            .collect();
        Ok(Principal {
            user,
            organisation,
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> Directory {
        Directory::from_parts(
            vec![Organisation::new(OrgId(1), "acme"), Organisation::new(OrgId(2), "other")],
            vec![
                Group::new(GroupId(10), OrgId(1), "analysts"),
                Group::new(GroupId(20), OrgId(2), "foreign").with_permission("super_admin"),
            ],
            vec![User::new(UserId(1), OrgId(1), "ana")
                .with_group(GroupId(10))
                .with_group(GroupId(20))],
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_filters_foreign_groups() {
        let principal = directory().resolve(UserId(1)).unwrap();
        assert_eq!(principal.organisation.id, OrgId(1));
        assert_eq!(principal.groups.len(), 1);
        assert_eq!(principal.groups[0].id, GroupId(10));
        assert!(!principal.has_permission("super_admin"));
        assert_eq!(principal.group_ids(), &[GroupId(10), GroupId(20)]);
    }

    #[test]
    fn test_unknown_user() {
        assert_eq!(
            directory().resolve(UserId(99)).unwrap_err(),
            PolicyError::UnknownUser(UserId(99))
        );
    }

    #[test]
    fn test_unknown_organisation() {
        let dir = Directory::new();
        dir.add_user(User::new(UserId(5), OrgId(9), "lost"));
        assert_eq!(
            dir.resolve(UserId(5)).unwrap_err(),
            PolicyError::UnknownOrganisation(OrgId(9))
        );
    }

    #[test]
    fn test_permission_changes_visible() {
        let dir = directory();
        assert!(dir.grant_permission(GroupId(10), "super_admin"));
        assert!(dir.resolve(UserId(1)).unwrap().has_permission("super_admin"));
        assert!(dir.revoke_permission(GroupId(10), "super_admin"));
        assert!(!dir.resolve(UserId(1)).unwrap().has_permission("super_admin"));
        assert!(!dir.grant_permission(GroupId(77), "super_admin"));
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let dir = directory();
        assert_eq!(
            dir.add_group(Group::new(GroupId(10), OrgId(1), "again")),
            Err(PolicyError::DuplicateGroup(GroupId(10)))
        );
    }
}
