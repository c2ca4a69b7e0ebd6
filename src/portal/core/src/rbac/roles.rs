//! Recognized portal roles and their dashboards.
//!
//! | Role             | Aliases                                   | Dashboard                 |
//! |------------------|-------------------------------------------|---------------------------|
//! | Administrator    | `admin`                                   | `admin_dashboard`         |
//! | Supervisor       |                                           | `supervisor_dashboard`    |
//! | Committee member | `committee`, `committee-member`           | `committee_dashboard`     |
//! | Marker           |                                           | `markers`                 |
//! | Student          |                                           | `student_dashboard`       |
//!
//! Rows are listed in routing precedence: a principal holding several roles
//! lands on the dashboard of the first one.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::navigation::PageId;

/// Roles the portal routes on.
///
/// The derived ordering is the routing precedence, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalRole {
    Administrator,
    Supervisor,
    CommitteeMember,
    Marker,
    Student,
}

impl PortalRole {
    /// Canonical role name as stored in the role table.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Supervisor => "supervisor",
            Self::CommitteeMember => "committee member",
            Self::Marker => "marker",
            Self::Student => "student",
        }
    }

    /// Recognize a role name, case-insensitively and including aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "administrator" | "admin" => Some(Self::Administrator),
            "supervisor" => Some(Self::Supervisor),
            "committee member" | "committee-member" | "committee" => Some(Self::CommitteeMember),
            "marker" => Some(Self::Marker),
            "student" => Some(Self::Student),
            _ => None,
        }
    }

    /// Landing page for this role.
    pub fn dashboard(&self) -> PageId {
        match self {
            Self::Administrator => PageId::AdminDashboard,
            Self::Supervisor => PageId::SupervisorDashboard,
            Self::CommitteeMember => PageId::CommitteeDashboard,
            Self::Marker => PageId::Markers,
            Self::Student => PageId::StudentDashboard,
        }
    }

    /// All roles, in routing precedence.
    pub fn all() -> &'static [PortalRole] {
        &[
            Self::Administrator,
            Self::Supervisor,
            Self::CommitteeMember,
            Self::Marker,
            Self::Student,
        ]
    }
}

impl fmt::Display for PortalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
