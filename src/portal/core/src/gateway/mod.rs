//! Identity gateway seam.
//!
//! The gateway is the remote service that verifies credentials, issues
//! sessions and reports session changes. The portal only sees it through
//! the [`IdentityGateway`] trait; a [`GatewayConnector`] builds the handle
//! and [`GatewayHandle`] memoizes it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::GatewayError;
use crate::rbac::PrincipalId;

pub mod handle;
pub mod memory;

pub use handle::GatewayHandle;
pub use memory::{InMemoryConnector, InMemoryGateway};

// ═══════════════════════════════════════════════════════════════════════════════
// Session Data
// ═══════════════════════════════════════════════════════════════════════════════

/// An authenticated principal as the gateway describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: PrincipalId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: impl Into<PrincipalId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            created_at: None,
        }
    }
}

/// Opaque bearer credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// A session issued by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub credential: Credential,
}

impl Session {
    pub fn new(user: User, credential: Credential) -> Self {
        Self {
            user,
            issued_at: Utc::now(),
            expires_at: None,
            credential,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn principal_id(&self) -> &PrincipalId {
        &self.user.id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Change Notifications
// ═══════════════════════════════════════════════════════════════════════════════

/// Why the gateway's session changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
    InitialSession,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One notification from the gateway's change stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub kind: ChangeKind,
    pub session: Option<Session>,
}

impl SessionChange {
    pub fn new(kind: ChangeKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════════════════════════════════════════

/// Operations the portal consumes from the identity gateway.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// Verify credentials and start a session.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, GatewayError>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), GatewayError>;

    /// The current session, if any.
    async fn get_session(&self) -> Result<Option<Session>, GatewayError>;

    /// Subscribe to session changes. Notifications arrive in emission order.
    fn on_session_change(&self) -> broadcast::Receiver<SessionChange>;

    /// Send a password-reset link that lands on `redirect_to`.
    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<(), GatewayError>;

    /// Replace the signed-in principal's password.
    async fn update_credential(&self, password: &str) -> Result<User, GatewayError>;
}

/// Builds a gateway handle. Called at most once per successful connection.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn IdentityGateway>, GatewayError>;
}
