//! Role-based access control for portal pages.
//!
//! This module provides:
//! - **Models**: identifiers, Role, OrganizationMembership, RoleSet
//! - **Portal Roles**: the five recognized roles, their aliases and dashboards
//! - **Access Policy**: ordered page rules, `decide`, and dashboard routing
//!
//! # Usage
//!
//! ```rust
//! use portal_core::navigation::PathTable;
//! use portal_core::rbac::{AccessPolicy, RoleSet};
//!
//! let policy = AccessPolicy::standard(PathTable::default());
//! let roles: RoleSet = ["administrator"].into_iter().collect();
//!
//! assert!(policy.decide("/student.html", &roles).is_denied());
//! assert_eq!(policy.denial_redirect(&roles), "/admin.html");
//! ```

pub mod models;
pub mod policy;
pub mod roles;

pub use models::{
    MembershipId, OrganizationId, OrganizationMembership, PrincipalId, Role, RoleId, RoleSet,
};
pub use policy::{
    AccessDecision, AccessPolicy, AccessRule, DashboardRoute, RouteMatcher,
    NO_DASHBOARD_MESSAGE, NO_ROLE_MESSAGE,
};
pub use roles::PortalRole;
