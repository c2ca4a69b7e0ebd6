//! Initialization state, its outcome, and per-operation loading flags.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::context::{AuthContext, OrganizationData};
use crate::error::{ErrorSummary, PortalError};
use crate::gateway::User;

/// Session manager lifecycle.
///
/// ```text
/// Uninitialized ──► Initializing ──► Ready
///                        │
///                        └─────────► Failed ──► Initializing (explicit retry)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::Initializing => write!(f, "INITIALIZING"),
            Self::Ready => write!(f, "READY"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Result of `initialize()`, also the `ModuleReady` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitOutcome {
    pub initialized: bool,
    pub user: Option<User>,
    pub organization: Option<OrganizationData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
}

impl InitOutcome {
    /// Successful outcome describing `ctx`. A resolution error on the
    /// context is carried along; initialization itself still succeeded.
    pub fn ready(ctx: &AuthContext) -> Self {
        Self {
            initialized: true,
            user: ctx.user().cloned(),
            organization: ctx.organization_data(),
            error: ctx.error.as_ref().map(|e| e.summary()),
        }
    }

    pub fn failed(error: &PortalError) -> Self {
        Self {
            initialized: false,
            user: None,
            organization: None,
            error: Some(error.summary()),
        }
    }
}

/// Operations that toggle a loading affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingContext {
    Login,
    Logout,
    PasswordReset,
    UserProfile,
}

/// Which operations are currently in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingState {
    pub login: bool,
    pub logout: bool,
    pub password_reset: bool,
    pub user_profile: bool,
}

impl LoadingState {
    pub fn set(&mut self, context: LoadingContext, loading: bool) {
        match context {
            LoadingContext::Login => self.login = loading,
            LoadingContext::Logout => self.logout = loading,
            LoadingContext::PasswordReset => self.password_reset = loading,
            LoadingContext::UserProfile => self.user_profile = loading,
        }
    }

    pub fn get(&self, context: LoadingContext) -> bool {
        match context {
            LoadingContext::Login => self.login,
            LoadingContext::Logout => self.logout,
            LoadingContext::PasswordReset => self.password_reset,
            LoadingContext::UserProfile => self.user_profile,
        }
    }

    pub fn any(&self) -> bool {
        self.login || self.logout || self.password_reset || self.user_profile
    }
}
