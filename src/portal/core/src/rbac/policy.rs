//! Access policy: which roles may view which page, and where to send
//! principals who may not.
//!
//! The policy answers two questions:
//! "May a principal holding these roles view this path?" ([`AccessPolicy::decide`])
//! and "Which dashboard does this principal belong on?" ([`AccessPolicy::route_to_dashboard`]).

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use super::models::RoleSet;
use super::roles::PortalRole;
use crate::navigation::{normalize_path, PageId, PathTable};
use crate::telemetry::metrics::ACCESS_DECISIONS_TOTAL;
use crate::telemetry::SensitiveFieldRedactor;

/// Shown on the login page when a principal has no roles at all.
pub const NO_ROLE_MESSAGE: &str = "User has no assigned role or organization.";

/// Shown on the login page when a principal's roles map to no dashboard.
pub const NO_DASHBOARD_MESSAGE: &str = "Your role does not have an assigned dashboard.";

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The page may be shown.
    Allow,
    /// The page may not be shown, with a reason.
    Deny(String),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    fn outcome(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny(_) => "deny",
        }
    }
}

/// Where a principal lands after sign-in or a denial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardRoute {
    /// The highest-precedence role's dashboard.
    Dashboard { role: PortalRole, path: String },
    /// No recognized role; the message explains why.
    NoDashboard { message: &'static str },
}

impl DashboardRoute {
    /// Concrete redirect target: the dashboard, or the login page carrying
    /// the explanatory message.
    pub fn target(&self, paths: &PathTable) -> String {
        match self {
            Self::Dashboard { path, .. } => path.clone(),
            Self::NoDashboard { message } => paths.login_with_error(message),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rules
// ═══════════════════════════════════════════════════════════════════════════════

/// How a rule selects request paths. Both forms compare normalized paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum RouteMatcher {
    /// The path equals this one.
    Exact(String),
    /// The path is this one or lies beneath it (`/admin` covers `/admin/users`).
    Prefix(String),
}

impl RouteMatcher {
    pub fn exact(path: &str) -> Self {
        Self::Exact(normalize_path(path))
    }

    pub fn prefix(path: &str) -> Self {
        Self::Prefix(normalize_path(path))
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = normalize_path(path);
        match self {
            Self::Exact(expected) => path == *expected,
            Self::Prefix(base) => {
                base == "/"
                    || path == *base
                    || path
                        .strip_prefix(base.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

/// One entry of the policy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    pub matcher: RouteMatcher,
    pub allowed: BTreeSet<PortalRole>,
}

impl AccessRule {
    pub fn new(matcher: RouteMatcher, allowed: impl IntoIterator<Item = PortalRole>) -> Self {
        Self {
            matcher,
            allowed: allowed.into_iter().collect(),
        }
    }

    fn admits(&self, roles: &RoleSet) -> bool {
        self.allowed.iter().any(|role| roles.holds(*role))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Access Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered page policy table plus the dashboard routing rule.
///
/// Rules are scanned in declaration order and the first match governs. Paths
/// no rule matches are allowed for any principal with at least one role.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    paths: PathTable,
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    /// Empty policy over `paths`: only the public-page rule applies.
    pub fn new(paths: PathTable) -> Self {
        Self {
            paths,
            rules: Vec::new(),
        }
    }

    /// The portal's page table, every rule an exact match.
    pub fn standard(paths: PathTable) -> Self {
        use PortalRole::*;

        let table: [(PageId, &[PortalRole]); 10] = [
            (PageId::AdminDashboard, &[Administrator]),
            (PageId::SupervisorDashboard, &[Supervisor]),
            (PageId::StudentDashboard, &[Student]),
            (PageId::CommitteeDashboard, &[CommitteeMember, Administrator]),
            (PageId::Markers, &[Marker, Supervisor, Administrator]),
            (PageId::ThesisSubmission, &[Student]),
            (PageId::ThesisReview, &[Supervisor, CommitteeMember, Administrator]),
            (PageId::ThesisMarking, &[Marker, Supervisor, Administrator]),
            (PageId::EthicsForm, &[Student]),
            (PageId::EthicsReview, &[Supervisor, CommitteeMember, Administrator]),
        ];

        let mut policy = Self::new(paths);
        for (page, allowed) in table {
            let matcher = RouteMatcher::exact(policy.paths.path(page));
            policy = policy.with_rule(AccessRule::new(matcher, allowed.iter().copied()));
        }
        policy
    }

    /// Append a rule after the existing ones.
    pub fn with_rule(mut self, rule: AccessRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    pub fn paths(&self) -> &PathTable {
        &self.paths
    }

    /// May a principal holding `roles` view `path`?
    pub fn decide(&self, path: &str, roles: &RoleSet) -> AccessDecision {
        let decision = if roles.is_empty() {
            if self.paths.is_public(path) {
                AccessDecision::Allow
            } else {
                AccessDecision::Deny(NO_ROLE_MESSAGE.to_string())
            }
        } else {
            match self.rules.iter().find(|rule| rule.matcher.matches(path)) {
                Some(rule) if rule.admits(roles) => AccessDecision::Allow,
                Some(_) => AccessDecision::Deny(format!(
                    "None of the held roles may view {}",
                    normalize_path(path)
                )),
                None => AccessDecision::Allow,
            }
        };

        debug!(
            path = %SensitiveFieldRedactor::global().redact_value(path),
            outcome = decision.outcome(),
            "Access decision"
        );
        counter!(ACCESS_DECISIONS_TOTAL, "outcome" => decision.outcome()).increment(1);
        decision
    }

    /// Dashboard of the highest-precedence recognized role.
    pub fn route_to_dashboard(&self, roles: &RoleSet) -> DashboardRoute {
        if roles.is_empty() {
            return DashboardRoute::NoDashboard {
                message: NO_ROLE_MESSAGE,
            };
        }

        // BTreeSet iterates in precedence order.
        match roles.portal_roles().into_iter().next() {
            Some(role) => DashboardRoute::Dashboard {
                role,
                path: self.paths.path(role.dashboard()).to_string(),
            },
            None => DashboardRoute::NoDashboard {
                message: NO_DASHBOARD_MESSAGE,
            },
        }
    }

    /// Redirect target for a principal denied a page.
    pub fn denial_redirect(&self, roles: &RoleSet) -> String {
        self.route_to_dashboard(roles).target(&self.paths)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
