//! Page identifiers, the symbolic path table, and the navigation seam.
//!
//! Every page of the portal has a symbolic [`PageId`]; the [`PathTable`]
//! maps each identifier to the path it is served from. Paths are compared
//! after [`normalize_path`], which strips the query string, the fragment and
//! any trailing slash.
//!
//! Redirects go through the [`Navigator`] trait so that the session core can
//! run headless. [`MemoryNavigator`] records redirects in memory.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{PortalError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Page Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Symbolic identifier of a portal page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageId {
    Login,
    ResetPassword,
    Unauthorized,
    Index,
    AdminDashboard,
    StudentDashboard,
    SupervisorDashboard,
    CommitteeDashboard,
    Markers,
    ThesisSubmission,
    ThesisReview,
    ThesisMarking,
    EthicsForm,
    EthicsReview,
    TermsOfService,
    PrivacyPolicy,
    HelpAndContact,
}

impl PageId {
    pub fn all() -> &'static [PageId] {
        &[
            Self::Login,
            Self::ResetPassword,
            Self::Unauthorized,
            Self::Index,
            Self::AdminDashboard,
            Self::StudentDashboard,
            Self::SupervisorDashboard,
            Self::CommitteeDashboard,
            Self::Markers,
            Self::ThesisSubmission,
            Self::ThesisReview,
            Self::ThesisMarking,
            Self::EthicsForm,
            Self::EthicsReview,
            Self::TermsOfService,
            Self::PrivacyPolicy,
            Self::HelpAndContact,
        ]
    }

    /// Public pages are reachable without any role.
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Login | Self::ResetPassword)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Path Normalization
// ═══════════════════════════════════════════════════════════════════════════════

/// Normalize a request path for comparison.
///
/// `"login.html?error=x"` and `"/login.html/"` both become `"/login.html"`.
/// The root stays `"/"`.
pub fn normalize_path(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim().trim_end_matches('/');

    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Decoded `error` query parameter of `path`. A `+` reads as a space.
pub fn error_param(path: &str) -> Option<String> {
    let without_fragment = path.split('#').next().unwrap_or(path);
    let (_, query) = without_fragment.split_once('?')?;

    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == "error").then(|| {
            let spaced = value.replace('+', " ");
            urlencoding::decode(&spaced)
                .map(|decoded| decoded.into_owned())
                .unwrap_or(spaced)
        })
    })
}

/// `true` if both locations name the same page and carry the same `error`
/// message. Other parameters, their order and their encoding are ignored.
pub fn same_location(a: &str, b: &str) -> bool {
    normalize_path(a) == normalize_path(b) && error_param(a) == error_param(b)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Path Table
// ═══════════════════════════════════════════════════════════════════════════════

/// Symbolic path table: where each page is served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTable {
    #[serde(default = "default_login")]
    pub login: String,
    #[serde(default = "default_reset_password")]
    pub reset_password: String,
    #[serde(default = "default_unauthorized")]
    pub unauthorized: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_admin_dashboard")]
    pub admin_dashboard: String,
    #[serde(default = "default_student_dashboard")]
    pub student_dashboard: String,
    #[serde(default = "default_supervisor_dashboard")]
    pub supervisor_dashboard: String,
    #[serde(default = "default_committee_dashboard")]
    pub committee_dashboard: String,
    #[serde(default = "default_markers")]
    pub markers: String,
    #[serde(default = "default_thesis_submission")]
    pub thesis_submission: String,
    #[serde(default = "default_thesis_review")]
    pub thesis_review: String,
    #[serde(default = "default_thesis_marking")]
    pub thesis_marking: String,
    #[serde(default = "default_ethics_form")]
    pub ethics_form: String,
    #[serde(default = "default_ethics_review")]
    pub ethics_review: String,
    #[serde(default = "default_terms_of_service")]
    pub terms_of_service: String,
    #[serde(default = "default_privacy_policy")]
    pub privacy_policy: String,
    #[serde(default = "default_help_and_contact")]
    pub help_and_contact: String,
}

impl Default for PathTable {
    fn default() -> Self {
        Self {
            login: default_login(),
            reset_password: default_reset_password(),
            unauthorized: default_unauthorized(),
            index: default_index(),
            admin_dashboard: default_admin_dashboard(),
            student_dashboard: default_student_dashboard(),
            supervisor_dashboard: default_supervisor_dashboard(),
            committee_dashboard: default_committee_dashboard(),
            markers: default_markers(),
            thesis_submission: default_thesis_submission(),
            thesis_review: default_thesis_review(),
            thesis_marking: default_thesis_marking(),
            ethics_form: default_ethics_form(),
            ethics_review: default_ethics_review(),
            terms_of_service: default_terms_of_service(),
            privacy_policy: default_privacy_policy(),
            help_and_contact: default_help_and_contact(),
        }
    }
}

fn default_login() -> String { "/login.html".to_string() }
fn default_reset_password() -> String { "/reset-password.html".to_string() }
fn default_unauthorized() -> String { "/unauthorized.html".to_string() }
fn default_index() -> String { "/index.html".to_string() }
fn default_admin_dashboard() -> String { "/admin.html".to_string() }
fn default_student_dashboard() -> String { "/student.html".to_string() }
fn default_supervisor_dashboard() -> String { "/supervisor.html".to_string() }
fn default_committee_dashboard() -> String { "/committee-dashboard.html".to_string() }
fn default_markers() -> String { "/markers.html".to_string() }
fn default_thesis_submission() -> String { "/thesis-submission.html".to_string() }
fn default_thesis_review() -> String { "/thesis-review.html".to_string() }
fn default_thesis_marking() -> String { "/thesis-marking.html".to_string() }
fn default_ethics_form() -> String { "/ethics-form.html".to_string() }
fn default_ethics_review() -> String { "/ethics-review.html".to_string() }
fn default_terms_of_service() -> String { "/terms-of-service.html".to_string() }
fn default_privacy_policy() -> String { "/privacy-policy.html".to_string() }
fn default_help_and_contact() -> String { "/help-and-contact.html".to_string() }

impl PathTable {
    /// Path a page is served from, as configured.
    pub fn path(&self, page: PageId) -> &str {
        match page {
            PageId::Login => &self.login,
            PageId::ResetPassword => &self.reset_password,
            PageId::Unauthorized => &self.unauthorized,
            PageId::Index => &self.index,
            PageId::AdminDashboard => &self.admin_dashboard,
            PageId::StudentDashboard => &self.student_dashboard,
            PageId::SupervisorDashboard => &self.supervisor_dashboard,
            PageId::CommitteeDashboard => &self.committee_dashboard,
            PageId::Markers => &self.markers,
            PageId::ThesisSubmission => &self.thesis_submission,
            PageId::ThesisReview => &self.thesis_review,
            PageId::ThesisMarking => &self.thesis_marking,
            PageId::EthicsForm => &self.ethics_form,
            PageId::EthicsReview => &self.ethics_review,
            PageId::TermsOfService => &self.terms_of_service,
            PageId::PrivacyPolicy => &self.privacy_policy,
            PageId::HelpAndContact => &self.help_and_contact,
        }
    }

    /// Identify the page a request path refers to.
    pub fn page_for(&self, path: &str) -> Option<PageId> {
        let normalized = normalize_path(path);
        PageId::all()
            .iter()
            .copied()
            .find(|page| normalize_path(self.path(*page)) == normalized)
    }

    /// `true` for the login and password-reset pages.
    pub fn is_public(&self, path: &str) -> bool {
        self.page_for(path).is_some_and(|page| page.is_public())
    }

    /// `true` for the pages an authenticated principal is bounced off:
    /// login, password reset, and the site root.
    pub fn is_entry_page(&self, path: &str) -> bool {
        let normalized = normalize_path(path);
        normalized == "/"
            || matches!(
                self.page_for(&normalized),
                Some(PageId::Login | PageId::ResetPassword | PageId::Index)
            )
    }

    /// Login page carrying an explanatory `error` query parameter.
    pub fn login_with_error(&self, message: &str) -> String {
        format!("{}?error={}", self.login, urlencoding::encode(message))
    }

    /// Check that every page has a distinct, absolute path.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for page in PageId::all() {
            let path = self.path(*page);
            if path.trim().is_empty() {
                return Err(PortalError::configuration(format!(
                    "Path table entry for {} is empty",
                    page
                )));
            }
            if !path.starts_with('/') {
                return Err(PortalError::configuration(format!(
                    "Path table entry for {} must start with '/': {}",
                    page, path
                )));
            }
            if !seen.insert(normalize_path(path)) {
                return Err(PortalError::configuration(format!(
                    "Path table entry for {} duplicates another page: {}",
                    page, path
                )));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Navigator
// ═══════════════════════════════════════════════════════════════════════════════

/// Where the user currently is, and how to send them elsewhere.
pub trait Navigator: Send + Sync {
    /// Current location path (may include a query string).
    fn current_path(&self) -> String;

    /// Navigate to `target`.
    fn redirect(&self, target: &str);
}

/// In-memory navigator that records every redirect.
#[derive(Debug)]
pub struct MemoryNavigator {
    current: RwLock<String>,
    history: RwLock<Vec<String>>,
}

impl MemoryNavigator {
    pub fn new(initial_path: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(initial_path.into()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Move without recording a redirect (the user followed a link).
    pub fn visit(&self, path: impl Into<String>) {
        *self.current.write() = path.into();
    }

    /// Every redirect issued so far, oldest first.
    pub fn redirects(&self) -> Vec<String> {
        self.history.read().clone()
    }

    pub fn last_redirect(&self) -> Option<String> {
        self.history.read().last().cloned()
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.current.read().clone()
    }

    fn redirect(&self, target: &str) {
        tracing::debug!(target = %target, "Redirecting");
        self.history.write().push(target.to_string());
        *self.current.write() = target.to_string();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
