//! In-memory identity gateway for development and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::{ChangeKind, Credential, GatewayConnector, IdentityGateway, Session, SessionChange, User};
use crate::error::GatewayError;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

struct Account {
    user: User,
    password: String,
}

/// Gateway holding accounts and the current session in memory.
///
/// Sign-in, sign-out and password updates publish the same notifications a
/// remote gateway would.
pub struct InMemoryGateway {
    accounts: DashMap<String, Account>,
    current: RwLock<Option<Session>>,
    changes: broadcast::Sender<SessionChange>,
    reset_requests: Mutex<Vec<(String, String)>>,
    session_check_failure: RwLock<Option<String>>,
    latency: RwLock<Option<Duration>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            accounts: DashMap::new(),
            current: RwLock::new(None),
            changes,
            reset_requests: Mutex::new(Vec::new()),
            session_check_failure: RwLock::new(None),
            latency: RwLock::new(None),
        }
    }

    /// Register an account and return its user.
    pub fn add_account(&self, email: &str, password: &str) -> User {
        let user = User::new(Uuid::new_v4().to_string(), email);
        self.accounts.insert(
            email.to_lowercase(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        user
    }

    /// Install a session silently, as if persisted from an earlier visit.
    pub fn restore_session(&self, user: &User) -> Session {
        let session = Session::new(user.clone(), Credential::new(Uuid::new_v4().to_string()));
        *self.current.write() = Some(session.clone());
        session
    }

    /// Make every `get_session` call fail with `message` (`None` to heal).
    pub fn fail_session_checks(&self, message: Option<&str>) {
        *self.session_check_failure.write() = message.map(str::to_string);
    }

    /// Delay every network-facing call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Publish a notification as the remote side would.
    pub fn notify(&self, kind: ChangeKind, session: Option<Session>) {
        // No receivers is not an error for a broadcast source.
        let _ = self.changes.send(SessionChange::new(kind, session));
    }

    pub fn current_session(&self) -> Option<Session> {
        self.current.read().clone()
    }

    /// `(email, redirect_to)` of every reset request received.
    pub fn reset_requests(&self) -> Vec<(String, String)> {
        self.reset_requests.lock().clone()
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityGateway for InMemoryGateway {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, GatewayError> {
        self.simulate_latency().await;

        let user = match self.accounts.get(&email.to_lowercase()) {
            Some(account) if account.password == password => account.user.clone(),
            _ => return Err(GatewayError::InvalidCredentials),
        };

        let session = Session::new(user, Credential::new(Uuid::new_v4().to_string()));
        *self.current.write() = Some(session.clone());
        debug!(user_id = %session.user.id, "In-memory sign-in");
        self.notify(ChangeKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        self.simulate_latency().await;
        *self.current.write() = None;
        self.notify(ChangeKind::SignedOut, None);
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, GatewayError> {
        self.simulate_latency().await;
        let failure = self.session_check_failure.read().clone();
        if let Some(message) = failure {
            return Err(GatewayError::Unavailable(message));
        }
        Ok(self.current.read().clone())
    }

    fn on_session_change(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<(), GatewayError> {
        self.simulate_latency().await;
        // Unknown addresses succeed too, so callers cannot probe for accounts.
        self.reset_requests
            .lock()
            .push((email.to_string(), redirect_to.to_string()));
        Ok(())
    }

    async fn update_credential(&self, password: &str) -> Result<User, GatewayError> {
        self.simulate_latency().await;

        let session = self
            .current
            .read()
            .clone()
            .ok_or_else(|| GatewayError::Rejected("Auth session missing".to_string()))?;

        let key = session.user.email.to_lowercase();
        match self.accounts.get_mut(&key) {
            Some(mut account) => {
                if account.password == password {
                    return Err(GatewayError::Rejected(
                        "New password should be different from the old password".to_string(),
                    ));
                }
                account.password = password.to_string();
            }
            None => return Err(GatewayError::Rejected("User not found".to_string())),
        }

        self.notify(ChangeKind::UserUpdated, Some(session.clone()));
        Ok(session.user)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Connector
// ═══════════════════════════════════════════════════════════════════════════════

/// Connector handing out a shared [`InMemoryGateway`].
///
/// The first `n` connection attempts can be scripted to fail, and each
/// attempt can be slowed down.
pub struct InMemoryConnector {
    gateway: Arc<InMemoryGateway>,
    failures_remaining: AtomicU32,
    attempts: AtomicU32,
    delay: Option<Duration>,
}

impl InMemoryConnector {
    pub fn new(gateway: Arc<InMemoryGateway>) -> Self {
        Self {
            gateway,
            failures_remaining: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            delay: None,
        }
    }

    /// Fail the first `n` attempts with `GatewayError::Unavailable`.
    pub fn failing_first(self, n: u32) -> Self {
        self.failures_remaining.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn gateway(&self) -> &Arc<InMemoryGateway> {
        &self.gateway
    }
}

#[async_trait]
impl GatewayConnector for InMemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn IdentityGateway>, GatewayError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(GatewayError::Unavailable(format!(
                "connection attempt {} refused",
                attempt
            )));
        }

        Ok(self.gateway.clone())
    }
}
