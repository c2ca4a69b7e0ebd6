//! The published authentication snapshot.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::PortalError;
use crate::gateway::{Session, User};
use crate::rbac::{MembershipId, OrganizationId, OrganizationMembership, Role, RoleSet};
use crate::roles::RoleResolution;

/// Organization view handed to page modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationData {
    pub membership_id: MembershipId,
    pub organization_id: OrganizationId,
    pub organization_name: String,
    pub roles: Vec<String>,
}

/// Immutable snapshot of session, membership and roles.
///
/// A new snapshot replaces the old one wholesale; fields are never updated
/// in place.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub session: Option<Session>,
    pub membership: Option<OrganizationMembership>,
    pub roles: Vec<Role>,
    pub role_set: RoleSet,
    pub error: Option<Arc<PortalError>>,
}

impl AuthContext {
    /// No session, no roles.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Context for `session` after role resolution.
    pub fn resolved(session: Session, resolution: RoleResolution) -> Self {
        let role_set = if resolution.membership.is_some() && resolution.error.is_none() {
            resolution.role_set()
        } else {
            RoleSet::new()
        };
        Self {
            session: Some(session),
            membership: resolution.membership,
            roles: resolution.roles,
            role_set,
            error: resolution.error,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn organization_data(&self) -> Option<OrganizationData> {
        self.membership.as_ref().map(|m| OrganizationData {
            membership_id: m.membership_id.clone(),
            organization_id: m.organization_id.clone(),
            organization_name: m.organization_name.clone(),
            roles: self.role_set.iter().map(str::to_string).collect(),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.role_set.contains(name)
    }

    pub fn has_any_role<S: AsRef<str>>(&self, names: &[S]) -> bool {
        self.role_set.contains_any(names)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Context Cell
// ═══════════════════════════════════════════════════════════════════════════════

/// The single current [`AuthContext`].
///
/// Writers take a ticket before starting the work that produces a context,
/// and publish with it. A publish carrying an older ticket than the last
/// accepted one is dropped, so a slow resolution cannot overwrite the result
/// of a newer one.
#[derive(Debug)]
pub struct ContextCell {
    current: RwLock<(u64, Arc<AuthContext>)>,
    tickets: AtomicU64,
}

impl ContextCell {
    pub fn new() -> Self {
        Self {
            current: RwLock::new((0, Arc::new(AuthContext::empty()))),
            tickets: AtomicU64::new(1),
        }
    }

    pub fn ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst)
    }

    /// Publish `ctx` under `ticket`. Returns `false` if a newer context was
    /// already published.
    pub fn publish(&self, ticket: u64, ctx: AuthContext) -> bool {
        let mut current = self.current.write();
        if ticket < current.0 {
            return false;
        }
        *current = (ticket, Arc::new(ctx));
        true
    }

    pub fn load(&self) -> Arc<AuthContext> {
        self.current.read().1.clone()
    }
}

impl Default for ContextCell {
    fn default() -> Self {
        Self::new()
    }
}
