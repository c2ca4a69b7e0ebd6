//! Lifecycle events and their wire names.
//!
//! Every milestone the session core announces is one variant of
//! [`LifecycleEvent`], each with a fixed payload. Subscribers register by
//! [`EventKind`]; the [`EventNameTable`] gives each kind the stable name used
//! in logs and by page modules.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{ErrorSummary, PortalError, Result};
use crate::gateway::{ChangeKind, User};
use crate::session::{InitOutcome, LoadingContext, OrganizationData};

// ═══════════════════════════════════════════════════════════════════════════════
// Event Kind
// ═══════════════════════════════════════════════════════════════════════════════

/// Tag of a [`LifecycleEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ModuleReady,
    StateChanged,
    LoginSucceeded,
    LoginFailed,
    LogoutSucceeded,
    LogoutFailed,
    PasswordResetSent,
    PasswordUpdated,
    Loading,
    GatewayConnected,
    InitStarted,
    InitComplete,
    Error,
}

impl EventKind {
    pub fn all() -> &'static [EventKind] {
        &[
            Self::ModuleReady,
            Self::StateChanged,
            Self::LoginSucceeded,
            Self::LoginFailed,
            Self::LogoutSucceeded,
            Self::LogoutFailed,
            Self::PasswordResetSent,
            Self::PasswordUpdated,
            Self::Loading,
            Self::GatewayConnected,
            Self::InitStarted,
            Self::InitComplete,
            Self::Error,
        ]
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Lifecycle Event
// ═══════════════════════════════════════════════════════════════════════════════

/// A lifecycle milestone announced by the session core or the bootstrapper.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Initialization finished, successfully or not.
    ModuleReady(InitOutcome),

    /// The gateway reported a session change and the context was replaced.
    StateChanged {
        kind: ChangeKind,
        user: Option<User>,
        organization: Option<OrganizationData>,
    },

    LoginSucceeded { user: User },

    LoginFailed { error: ErrorSummary },

    LogoutSucceeded,

    LogoutFailed { error: ErrorSummary },

    PasswordResetSent { email: String },

    PasswordUpdated { user: Option<User> },

    /// An operation started (`loading: true`) or finished.
    Loading { context: LoadingContext, loading: bool },

    /// A gateway handle was constructed.
    GatewayConnected,

    InitStarted { path: String },

    InitComplete { path: String },

    /// A failure surfaced at a component boundary.
    Error { context: String, error: ErrorSummary },
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ModuleReady(_) => EventKind::ModuleReady,
            Self::StateChanged { .. } => EventKind::StateChanged,
            Self::LoginSucceeded { .. } => EventKind::LoginSucceeded,
            Self::LoginFailed { .. } => EventKind::LoginFailed,
            Self::LogoutSucceeded => EventKind::LogoutSucceeded,
            Self::LogoutFailed { .. } => EventKind::LogoutFailed,
            Self::PasswordResetSent { .. } => EventKind::PasswordResetSent,
            Self::PasswordUpdated { .. } => EventKind::PasswordUpdated,
            Self::Loading { .. } => EventKind::Loading,
            Self::GatewayConnected => EventKind::GatewayConnected,
            Self::InitStarted { .. } => EventKind::InitStarted,
            Self::InitComplete { .. } => EventKind::InitComplete,
            Self::Error { .. } => EventKind::Error,
        }
    }

    pub fn error(context: impl Into<String>, error: &PortalError) -> Self {
        Self::Error {
            context: context.into(),
            error: error.summary(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Event Name Table
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable wire name of every event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventNameTable {
    #[serde(default = "default_module_ready")]
    pub module_ready: String,
    #[serde(default = "default_state_changed")]
    pub state_changed: String,
    #[serde(default = "default_login_succeeded")]
    pub login_succeeded: String,
    #[serde(default = "default_login_failed")]
    pub login_failed: String,
    #[serde(default = "default_logout_succeeded")]
    pub logout_succeeded: String,
    #[serde(default = "default_logout_failed")]
    pub logout_failed: String,
    #[serde(default = "default_password_reset_sent")]
    pub password_reset_sent: String,
    #[serde(default = "default_password_updated")]
    pub password_updated: String,
    #[serde(default = "default_loading")]
    pub loading: String,
    #[serde(default = "default_gateway_connected")]
    pub gateway_connected: String,
    #[serde(default = "default_init_started")]
    pub init_started: String,
    #[serde(default = "default_init_complete")]
    pub init_complete: String,
    #[serde(default = "default_error")]
    pub error: String,
}

impl Default for EventNameTable {
    fn default() -> Self {
        Self {
            module_ready: default_module_ready(),
            state_changed: default_state_changed(),
            login_succeeded: default_login_succeeded(),
            login_failed: default_login_failed(),
            logout_succeeded: default_logout_succeeded(),
            logout_failed: default_logout_failed(),
            password_reset_sent: default_password_reset_sent(),
            password_updated: default_password_updated(),
            loading: default_loading(),
            gateway_connected: default_gateway_connected(),
            init_started: default_init_started(),
            init_complete: default_init_complete(),
            error: default_error(),
        }
    }
}

fn default_module_ready() -> String { "auth:module:ready".to_string() }
fn default_state_changed() -> String { "auth:state:changed".to_string() }
fn default_login_succeeded() -> String { "auth:login:success".to_string() }
fn default_login_failed() -> String { "auth:login:failed".to_string() }
fn default_logout_succeeded() -> String { "auth:logout:success".to_string() }
fn default_logout_failed() -> String { "auth:logout:failed".to_string() }
fn default_password_reset_sent() -> String { "auth:password:reset:sent".to_string() }
fn default_password_updated() -> String { "auth:password:updated".to_string() }
fn default_loading() -> String { "app:loading".to_string() }
fn default_gateway_connected() -> String { "gateway:client:initialized".to_string() }
fn default_init_started() -> String { "app:init:started".to_string() }
fn default_init_complete() -> String { "app:init:complete".to_string() }
fn default_error() -> String { "auth:error".to_string() }

impl EventNameTable {
    pub fn name(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::ModuleReady => &self.module_ready,
            EventKind::StateChanged => &self.state_changed,
            EventKind::LoginSucceeded => &self.login_succeeded,
            EventKind::LoginFailed => &self.login_failed,
            EventKind::LogoutSucceeded => &self.logout_succeeded,
            EventKind::LogoutFailed => &self.logout_failed,
            EventKind::PasswordResetSent => &self.password_reset_sent,
            EventKind::PasswordUpdated => &self.password_updated,
            EventKind::Loading => &self.loading,
            EventKind::GatewayConnected => &self.gateway_connected,
            EventKind::InitStarted => &self.init_started,
            EventKind::InitComplete => &self.init_complete,
            EventKind::Error => &self.error,
        }
    }

    /// Reverse lookup of a wire name.
    pub fn kind_of(&self, name: &str) -> Option<EventKind> {
        EventKind::all()
            .iter()
            .copied()
            .find(|kind| self.name(*kind) == name)
    }

    /// Every kind needs a distinct, non-blank name.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for kind in EventKind::all() {
            let name = self.name(*kind).trim();
            if name.is_empty() {
                return Err(PortalError::configuration(format!(
                    "Event name for {} is empty",
                    kind
                )));
            }
            if !seen.insert(name) {
                return Err(PortalError::configuration(format!(
                    "Event name '{}' is used by more than one event",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(LifecycleEvent::LogoutSucceeded.kind(), EventKind::LogoutSucceeded);
        assert_eq!(
            LifecycleEvent::PasswordResetSent { email: "a@b.c".into() }.kind(),
            EventKind::PasswordResetSent
        );
        let err = PortalError::not_initialized();
        let event = LifecycleEvent::error("login", &err);
        assert_eq!(event.kind(), EventKind::Error);
        match event {
            LifecycleEvent::Error { context, error } => {
                assert_eq!(context, "login");
                assert_eq!(error.code, ErrorCode::NotInitialized);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_default_names() {
        let names = EventNameTable::default();
        assert_eq!(names.name(EventKind::ModuleReady), "auth:module:ready");
        assert_eq!(names.name(EventKind::InitComplete), "app:init:complete");
        assert_eq!(names.kind_of("auth:login:failed"), Some(EventKind::LoginFailed));
        assert_eq!(names.kind_of("nope"), None);
        assert!(names.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_and_duplicate_names() {
        let mut names = EventNameTable::default();
        names.loading = " ".into();
        assert!(names.validate().is_err());

        let mut names = EventNameTable::default();
        names.logout_failed = names.login_failed.clone();
        let err = names.validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(LifecycleEvent::Loading {
            context: LoadingContext::Login,
            loading: true,
        })
        .unwrap();
        assert_eq!(json["event"], "loading");
        assert_eq!(json["loading"], true);
    }
}
