//! Resolve a principal into its membership and roles.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::RoleStore;
use crate::error::PortalError;
use crate::rbac::{OrganizationMembership, PrincipalId, Role, RoleSet};

/// Outcome of a resolution. Never an `Err`: failures fail closed.
#[derive(Debug, Clone, Default)]
pub struct RoleResolution {
    pub membership: Option<OrganizationMembership>,
    pub roles: Vec<Role>,
    pub error: Option<Arc<PortalError>>,
}

impl RoleResolution {
    fn failed(error: PortalError) -> Self {
        Self {
            membership: None,
            roles: Vec::new(),
            error: Some(Arc::new(error)),
        }
    }

    pub fn role_set(&self) -> RoleSet {
        RoleSet::from_roles(&self.roles)
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Looks up membership and roles on every call; nothing is cached.
#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn RoleStore>,
}

impl RoleResolver {
    pub fn new(store: Arc<dyn RoleStore>) -> Self {
        Self { store }
    }

    #[instrument(skip_all, fields(principal = %principal))]
    pub async fn resolve(&self, principal: &PrincipalId) -> RoleResolution {
        let membership = match self.store.membership_by_principal(principal).await {
            Ok(Some(membership)) => membership,
            Ok(None) => {
                debug!("Principal has no organization membership");
                return RoleResolution::default();
            }
            Err(e) => return self.fail(principal, e),
        };

        match self.store.roles_by_membership(&membership.membership_id).await {
            Ok(roles) => {
                debug!(
                    organization = %membership.organization_id,
                    roles = roles.len(),
                    "Resolved organization roles"
                );
                RoleResolution {
                    membership: Some(membership),
                    roles,
                    error: None,
                }
            }
            Err(e) => self.fail(principal, e),
        }
    }

    fn fail(&self, principal: &PrincipalId, cause: crate::error::StoreError) -> RoleResolution {
        warn!(error = %cause, "Role resolution failed, treating principal as roleless");
        let error = PortalError::resolution(principal.as_str(), cause.to_string()).with_source(cause);
        error.log();
        RoleResolution::failed(error)
    }
}

impl std::fmt::Debug for RoleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::roles::InMemoryRoleStore;

    fn principal() -> PrincipalId {
        PrincipalId::new("p-1")
    }

    #[tokio::test]
    async fn test_no_membership_is_not_an_error() {
        let store = Arc::new(InMemoryRoleStore::new());
        let resolution = RoleResolver::new(store).resolve(&principal()).await;
        assert!(resolution.membership.is_none());
        assert!(resolution.roles.is_empty());
        assert!(!resolution.is_failed());
    }

    #[tokio::test]
    async fn test_membership_without_roles() {
        let store = Arc::new(InMemoryRoleStore::new());
        store.add_membership(&principal(), OrganizationMembership::new("m-1", "org-1", "Faculty"));
        let resolution = RoleResolver::new(store).resolve(&principal()).await;
        assert!(resolution.membership.is_some());
        assert!(resolution.roles.is_empty());
        assert!(resolution.role_set().is_empty());
    }

    #[tokio::test]
    async fn test_resolves_roles() {
        let store = Arc::new(InMemoryRoleStore::new());
        store.add_membership(&principal(), OrganizationMembership::new("m-1", "org-1", "Faculty"));
        store.add_role(&"m-1".into(), Role::new("r-1", "Supervisor"));
        store.add_role(&"m-1".into(), Role::new("r-2", "marker"));

        let resolution = RoleResolver::new(store).resolve(&principal()).await;
        let roles = resolution.role_set();
        assert!(roles.contains("supervisor"));
        assert!(roles.contains("MARKER"));
        assert_eq!(resolution.membership.unwrap().organization_name, "Faculty");
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_closed() {
        let store = Arc::new(InMemoryRoleStore::new());
        store.add_membership(&principal(), OrganizationMembership::new("m-1", "org-1", "Faculty"));
        store.add_role(&"m-1".into(), Role::new("r-1", "administrator"));
        store.fail_role_lookups(Some("connection reset"));

        let resolution = RoleResolver::new(store).resolve(&principal()).await;
        assert!(resolution.membership.is_none());
        assert!(resolution.roles.is_empty());
        let error = resolution.error.expect("resolution error");
        assert_eq!(error.code(), ErrorCode::ResolutionError);
    }

    #[tokio::test]
    async fn test_roles_are_refetched_each_time() {
        let store = Arc::new(InMemoryRoleStore::new());
        store.add_membership(&principal(), OrganizationMembership::new("m-1", "org-1", "Faculty"));
        let resolver = RoleResolver::new(store.clone());

        assert!(resolver.resolve(&principal()).await.roles.is_empty());
        store.add_role(&"m-1".into(), Role::new("r-1", "student"));
        assert!(resolver.resolve(&principal()).await.role_set().contains("student"));
    }
}
