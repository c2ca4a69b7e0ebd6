//! Organization and role lookup for an established session.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::rbac::{MembershipId, OrganizationMembership, PrincipalId, Role};

pub mod memory;
pub mod resolver;

pub use memory::InMemoryRoleStore;
pub use resolver::{RoleResolution, RoleResolver};

/// The organization/role store the resolver reads from.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Membership of `principal`, if any. At most one per principal.
    async fn membership_by_principal(
        &self,
        principal: &PrincipalId,
    ) -> Result<Option<OrganizationMembership>, StoreError>;

    /// Roles assigned to a membership. May be empty.
    async fn roles_by_membership(&self, membership: &MembershipId) -> Result<Vec<Role>, StoreError>;
}
