//! In-memory role store for development and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::RoleStore;
use crate::error::StoreError;
use crate::rbac::{MembershipId, OrganizationMembership, PrincipalId, Role};

/// Membership and role rows held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    memberships: DashMap<PrincipalId, OrganizationMembership>,
    roles: DashMap<MembershipId, Vec<Role>>,
    membership_failure: RwLock<Option<String>>,
    role_failure: RwLock<Option<String>>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the single membership of `principal`.
    pub fn add_membership(&self, principal: &PrincipalId, membership: OrganizationMembership) {
        self.memberships.insert(principal.clone(), membership);
    }

    pub fn remove_membership(&self, principal: &PrincipalId) {
        self.memberships.remove(principal);
    }

    pub fn add_role(&self, membership: &MembershipId, role: Role) {
        self.roles.entry(membership.clone()).or_default().push(role);
    }

    pub fn clear_roles(&self, membership: &MembershipId) {
        self.roles.remove(membership);
    }

    /// Make membership lookups fail with `message` (`None` to heal).
    pub fn fail_membership_lookups(&self, message: Option<&str>) {
        *self.membership_failure.write() = message.map(str::to_string);
    }

    /// Make role lookups fail with `message` (`None` to heal).
    pub fn fail_role_lookups(&self, message: Option<&str>) {
        *self.role_failure.write() = message.map(str::to_string);
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn membership_by_principal(
        &self,
        principal: &PrincipalId,
    ) -> Result<Option<OrganizationMembership>, StoreError> {
        let failure = self.membership_failure.read().clone();
        if let Some(message) = failure {
            return Err(StoreError::Query(message));
        }
        Ok(self.memberships.get(principal).map(|m| m.clone()))
    }

    async fn roles_by_membership(&self, membership: &MembershipId) -> Result<Vec<Role>, StoreError> {
        let failure = self.role_failure.read().clone();
        if let Some(message) = failure {
            return Err(StoreError::Query(message));
        }
        Ok(self
            .roles
            .get(membership)
            .map(|r| r.clone())
            .unwrap_or_default())
    }
}
