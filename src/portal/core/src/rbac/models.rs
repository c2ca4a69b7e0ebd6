//! RBAC data models: identifiers, Role, OrganizationMembership and RoleSet.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::roles::PortalRole;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of an authenticated principal, as issued by the gateway.
    PrincipalId
);
string_id!(
    /// Identifier of an organization.
    OrganizationId
);
string_id!(
    /// Identifier of the membership row binding a principal to an organization.
    MembershipId
);
string_id!(
    /// Identifier of a role assignment.
    RoleId
);

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A role assigned to a membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    /// Free-form permission document attached by the store, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<serde_json::Value>,
}

impl Role {
    pub fn new(id: impl Into<RoleId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            permissions: None,
        }
    }

    pub fn with_permissions(mut self, permissions: serde_json::Value) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// The portal role this name designates, if it is recognized.
    pub fn portal_role(&self) -> Option<PortalRole> {
        PortalRole::from_name(&self.name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Organization Membership
// ═══════════════════════════════════════════════════════════════════════════════

/// A principal's membership in its (single) organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMembership {
    pub membership_id: MembershipId,
    pub organization_id: OrganizationId,
    pub organization_name: String,
}

impl OrganizationMembership {
    pub fn new(
        membership_id: impl Into<MembershipId>,
        organization_id: impl Into<OrganizationId>,
        organization_name: impl Into<String>,
    ) -> Self {
        Self {
            membership_id: membership_id.into(),
            organization_id: organization_id.into(),
            organization_name: organization_name.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Set
// ═══════════════════════════════════════════════════════════════════════════════

/// Set of role names held by a principal.
///
/// Names are stored trimmed and lowercased, so every comparison is
/// case-insensitive. Iteration order is sorted and therefore stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_roles(roles: &[Role]) -> Self {
        roles.iter().map(|r| r.name.as_str()).collect()
    }

    fn normalize(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// Insert a role name. Blank names are ignored.
    pub fn insert(&mut self, name: &str) -> bool {
        let normalized = Self::normalize(name);
        if normalized.is_empty() {
            return false;
        }
        self.0.insert(normalized)
    }

    /// Case-insensitive membership test. Always `false` on an empty set.
    pub fn contains(&self, name: &str) -> bool {
        if self.0.is_empty() {
            return false;
        }
        self.0.contains(&Self::normalize(name))
    }

    pub fn contains_any<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names.iter().any(|name| self.contains(name.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Recognized portal roles in this set, aliases folded together.
    pub fn portal_roles(&self) -> BTreeSet<PortalRole> {
        self.0
            .iter()
            .filter_map(|name| PortalRole::from_name(name))
            .collect()
    }

    /// `true` if any held name designates `role`.
    pub fn holds(&self, role: PortalRole) -> bool {
        self.0
            .iter()
            .any(|name| PortalRole::from_name(name) == Some(role))
    }
}

impl<'a> FromIterator<&'a str> for RoleSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = RoleSet::new();
        for name in iter {
            set.insert(name);
        }
        set
    }
}

impl FromIterator<String> for RoleSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = RoleSet::new();
        for name in iter {
            set.insert(&name);
        }
        set
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_set_is_case_insensitive() {
        let set: RoleSet = ["Supervisor", " MARKER "].into_iter().collect();
        assert!(set.contains("supervisor"));
        assert!(set.contains("SUPERVISOR"));
        assert!(set.contains("marker"));
        assert!(!set.contains("student"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_empty_role_set_contains_nothing() {
        let set = RoleSet::new();
        for name in ["", " ", "administrator", "💥", "admin\0"] {
            assert!(!set.contains(name));
        }
        assert!(!set.contains_any(&["student", "supervisor"]));
    }

    #[test]
    fn test_blank_names_are_ignored() {
        let mut set = RoleSet::new();
        assert!(!set.insert("   "));
        assert!(set.is_empty());
    }

    #[test]
    fn test_portal_roles_fold_aliases() {
        let set: RoleSet = ["admin", "Administrator", "committee", "Committee Member", "janitor"]
            .into_iter()
            .collect();
        let roles = set.portal_roles();
        assert_eq!(roles.len(), 2);
        assert!(roles.contains(&PortalRole::Administrator));
        assert!(roles.contains(&PortalRole::CommitteeMember));
        assert!(set.holds(PortalRole::Administrator));
        assert!(!set.holds(PortalRole::Student));
    }

    #[test]
    fn test_from_roles() {
        let roles = vec![
            Role::new("r1", "Student"),
            Role::new("r2", "marker").with_permissions(serde_json::json!({"grade": true})),
        ];
        let set = RoleSet::from_roles(&roles);
        assert!(set.contains("student"));
        assert!(set.contains("marker"));
        assert_eq!(roles[0].portal_role(), Some(PortalRole::Student));
    }

    #[test]
    fn test_id_display_and_serde() {
        let id = PrincipalId::new("user-1");
        assert_eq!(id.to_string(), "user-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"user-1\"");
        let back: PrincipalId = serde_json::from_str("\"user-1\"").unwrap();
        assert_eq!(back, id);
    }
}
