//! Users, organisations, groups, and the resolved principal.

use scriptgate_core::{GroupId, OrgId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Organisation (the tenant boundary for users and groups)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    /// Id
    pub id: OrgId,
    /// Display name
    pub name: String,
    /// URL slug
    #[serde(default)]
    pub slug: String,
}

impl Organisation {
    /// Create an organisation
    #[must_use]
    pub fn new(id: OrgId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            slug: name.to_lowercase().replace(' ', "-"),
            name,
        }
    }
}

/// Group with its permission names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Id
    pub id: GroupId,
    /// Owning organisation
    pub org: OrgId,
    /// Display name
    pub name: String,
    /// Permission names, e.g. `super_admin`
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Group {
    /// Create a group without permissions
    #[must_use]
    pub fn new(id: GroupId, org: OrgId, name: impl Into<String>) -> Self {
        Self {
            id,
            org,
            name: name.into(),
            permissions: Vec::new(),
        }
    }

    /// Add a permission
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Whether the group carries `permission`
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// User account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Id
    pub id: UserId,
    /// Owning organisation
    pub org: OrgId,
    /// Display name
    pub name: String,
    /// Email address
    #[serde(default)]
    pub email: String,
    /// Group memberships
    #[serde(default)]
    pub groups: Vec<GroupId>,
}

impl User {
    /// Create a user without group memberships
    #[must_use]
    pub fn new(id: UserId, org: OrgId, name: impl Into<String>) -> Self {
        Self {
            id,
            org,
            name: name.into(),
            email: String::new(),
            groups: Vec::new(),
        }
    }

    /// Set email
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Add a group membership
    #[must_use]
    pub fn with_group(mut self, group: GroupId) -> Self {
        self.groups.push(group);
        self
    }
}

/// A user resolved against the directory at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// The user
    pub user: User,
    /// The user's organisation
    pub organisation: Organisation,
    /// Groups of the user that belong to the user's organisation
    pub groups: Vec<Group>,
}

impl Principal {
    /// User id
    #[must_use]
    pub fn id(&self) -> UserId {
        self.user.id
    }

    /// All group memberships as recorded on the user
    #[must_use]
    pub fn group_ids(&self) -> &[GroupId] {
        &self.user.groups
    }

    /// Whether a group of the organisation grants `permission`
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.groups.iter().any(|g| g.has_permission(permission))
    }

    /// Profile shape exposed to scripts by `get_current_user`
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.user.id.as_i64(),
            "name": self.user.name,
            "email": self.user.email,
            "org_id": self.organisation.id.as_i64(),
            "groups": self.user.groups.iter().map(|g| g.as_i64()).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_permissions() {
        let group = Group::new(GroupId(1), OrgId(1), "admins").with_permission("super_admin");
        assert!(group.has_permission("super_admin"));
        assert!(!group.has_permission("admin"));
    }

    #[test]
    fn test_principal_json() {
        let principal = Principal {
            user: User::new(UserId(3), OrgId(1), "Ana")
                .with_email("ana@example.com")
                .with_group(GroupId(2)),
            organisation: Organisation::new(OrgId(1), "Default Org"),
            groups: vec![Group::new(GroupId(2), OrgId(1), "default")],
        };
        let value = principal.to_json();
        assert_eq!(value["id"], 3);
        assert_eq!(value["groups"], json!([2]));
        assert_eq!(principal.organisation.slug, "default-org");
    }
}
