//! The session manager: one authenticated session, supervised.
//!
//! The manager owns the gateway handle, the current [`AuthContext`] and the
//! initialization state machine. It listens to the gateway's change stream
//! on a single background task and republishes every change as a fresh
//! context plus lifecycle events.

use metrics::counter;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::context::{AuthContext, ContextCell, OrganizationData};
use super::retry::RetryPolicy;
use super::state::{InitOutcome, InitState, LoadingContext, LoadingState};
use crate::config::{PortalConfig, SessionConfig};
use crate::error::{ErrorCode, PortalError, Result};
use crate::events::{Broadcaster, EventKind, LifecycleEvent};
use crate::gateway::{
    ChangeKind, GatewayConnector, GatewayHandle, IdentityGateway, SessionChange, User,
};
use crate::navigation::{Navigator, PathTable};
use crate::rbac::{AccessPolicy, DashboardRoute, RoleSet};
use crate::roles::{RoleResolver, RoleStore};
use crate::telemetry::metrics::{record_session_state, INIT_ATTEMPTS_TOTAL};

const DEFAULT_SITE_ORIGIN: &str = "http://localhost:8080";

// ═══════════════════════════════════════════════════════════════════════════════
// Session Manager
// ═══════════════════════════════════════════════════════════════════════════════

/// Supervises the portal's single authenticated session.
///
/// Built with [`SessionManagerBuilder`] and shared as `Arc<SessionManager>`.
pub struct SessionManager {
    handle: GatewayHandle,
    resolver: RoleResolver,
    broadcaster: Arc<Broadcaster>,
    navigator: Arc<dyn Navigator>,
    policy: Arc<AccessPolicy>,
    context: ContextCell,
    init: Mutex<InitSlot>,
    loading: Mutex<LoadingState>,
    listener: Mutex<Option<JoinHandle<()>>>,
    connected_announced: AtomicBool,
    retry: RetryPolicy,
    min_password_length: usize,
    site_origin: String,
}

impl SessionManager {
    pub fn builder(
        connector: Arc<dyn GatewayConnector>,
        store: Arc<dyn RoleStore>,
        navigator: Arc<dyn Navigator>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder::new(connector, store, navigator)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Initialization
    // ─────────────────────────────────────────────────────────────────────────

    /// Establish the session once.
    ///
    /// Concurrent callers share a single attempt and receive the same
    /// outcome. A `Ready` manager answers immediately and re-announces
    /// `ModuleReady`. Failures are reported in the outcome, never as a panic
    /// or `Err`.
    ///
    /// The attempt runs on its own task: a caller that stops waiting does
    /// not stop it, and the state still leaves `Initializing`.
    pub async fn initialize(self: &Arc<Self>) -> InitOutcome {
        let waiter = {
            let mut slot = self.init.lock();
            match slot.state {
                InitState::Ready => None,
                InitState::Initializing => {
                    debug!("Initialization already in flight, waiting for it");
                    Some(slot.join())
                }
                InitState::Uninitialized | InitState::Failed => {
                    slot.state = InitState::Initializing;
                    record_session_state(InitState::Initializing);
                    let waiter = slot.join();
                    let manager = Arc::clone(self);
                    tokio::spawn(async move { manager.run_initialization().await });
                    Some(waiter)
                }
            }
        };

        match waiter {
            None => {
                let outcome = InitOutcome::ready(&self.context.load());
                self.broadcaster
                    .emit(LifecycleEvent::ModuleReady(outcome.clone()));
                outcome
            }
            Some(waiter) => waiter.await.unwrap_or_else(|_| {
                InitOutcome::failed(&PortalError::new(
                    ErrorCode::InternalError,
                    "Initialization was abandoned",
                ))
            }),
        }
    }

    /// [`initialize`](Self::initialize), retrying gateway outages according
    /// to the configured [`RetryPolicy`]. Other failures are returned as is.
    pub async fn initialize_with_retry(self: &Arc<Self>) -> InitOutcome {
        let mut attempt = 1;
        loop {
            let outcome = self.initialize().await;
            let retryable = !outcome.initialized
                && outcome
                    .error
                    .as_ref()
                    .is_some_and(|e| e.code.is_retryable());

            if !retryable || !self.retry.should_retry(attempt) {
                return outcome;
            }

            let delay = self.retry.delay_after(attempt);
            warn!(attempt, delay = ?delay, "Session initialization failed, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    #[instrument(skip_all)]
    async fn run_initialization(self: Arc<Self>) {
        counter!(INIT_ATTEMPTS_TOTAL).increment(1);

        match self.establish().await {
            Ok(ctx) => {
                let outcome = InitOutcome::ready(&ctx);
                let waiters = self.finish_attempt(InitState::Ready);
                info!(
                    authenticated = ctx.is_authenticated(),
                    roles = ctx.role_set.len(),
                    waiters = waiters.len(),
                    "Session manager ready"
                );
                self.broadcaster
                    .emit(LifecycleEvent::ModuleReady(outcome.clone()));
                resolve_waiters(waiters, &outcome);
            }
            Err(error) => {
                error.log();
                let outcome = InitOutcome::failed(&error);
                let waiters = self.finish_attempt(InitState::Failed);
                self.broadcaster
                    .emit(LifecycleEvent::error("initialize", &error));
                self.broadcaster
                    .emit(LifecycleEvent::ModuleReady(outcome.clone()));
                resolve_waiters(waiters, &outcome);
            }
        }
    }

    /// Leave `Initializing` and detach this attempt's waiters under one lock.
    /// Callers arriving afterwards start or join the next attempt.
    fn finish_attempt(&self, state: InitState) -> Vec<oneshot::Sender<InitOutcome>> {
        let mut slot = self.init.lock();
        slot.state = state;
        record_session_state(state);
        std::mem::take(&mut slot.waiters)
    }

    async fn establish(self: &Arc<Self>) -> Result<Arc<AuthContext>> {
        let gateway = self.handle.acquire().await?;
        if !self.connected_announced.swap(true, Ordering::SeqCst) {
            self.broadcaster.emit(LifecycleEvent::GatewayConnected);
        }
        self.attach_listener(gateway.as_ref());

        let ticket = self.context.ticket();
        let session = gateway
            .get_session()
            .await
            .map_err(|e| PortalError::gateway_unavailable(e.to_string()).with_source(e))?
            .filter(|s| !s.is_expired(chrono::Utc::now()));

        let ctx = match session {
            Some(session) => {
                let resolution = self.resolver.resolve(session.principal_id()).await;
                AuthContext::resolved(session, resolution)
            }
            None => AuthContext::empty(),
        };

        if !self.context.publish(ticket, ctx) {
            debug!("Initial session check superseded by a newer notification");
        }
        Ok(self.context.load())
    }

    fn attach_listener(self: &Arc<Self>, gateway: &dyn IdentityGateway) {
        let mut slot = self.listener.lock();
        if slot.is_some() {
            return;
        }

        let mut changes = gateway.on_session_change();
        let weak: Weak<Self> = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        let Some(manager) = weak.upgrade() else {
                            break;
                        };
                        manager.handle_change(change).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session change listener lagged behind the gateway");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Session change listener stopped");
        }));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Notification Handling
    // ─────────────────────────────────────────────────────────────────────────

    #[instrument(skip_all, fields(kind = %change.kind))]
    async fn handle_change(&self, change: SessionChange) {
        let ticket = self.context.ticket();
        let kind = change.kind;

        match change.session {
            Some(session) => {
                let resolution = self.resolver.resolve(session.principal_id()).await;
                self.context
                    .publish(ticket, AuthContext::resolved(session, resolution));

                if kind == ChangeKind::SignedIn {
                    let ctx = self.context.load();
                    if let Some(user) = ctx.user() {
                        info!(user_id = %user.id, "Principal signed in");
                        self.broadcaster
                            .emit(LifecycleEvent::LoginSucceeded { user: user.clone() });
                    }

                    let current = self.navigator.current_path();
                    if self.paths().is_entry_page(&current) {
                        let target = self.dashboard_redirect(&ctx.role_set);
                        self.navigator.redirect(&target);
                    }
                }
            }
            None => {
                self.context.publish(ticket, AuthContext::empty());

                if kind == ChangeKind::SignedOut {
                    let current = self.navigator.current_path();
                    if !self.paths().is_public(&current) {
                        self.navigator.redirect(&self.paths().login);
                    }
                }
            }
        }

        let ctx = self.context.load();
        self.broadcaster.emit(LifecycleEvent::StateChanged {
            kind,
            user: ctx.user().cloned(),
            organization: ctx.organization_data(),
        });
    }

    /// Dashboard target for `roles`, or the login page with an explanation.
    pub fn dashboard_redirect(&self, roles: &RoleSet) -> String {
        let route = self.policy.route_to_dashboard(roles);
        if let DashboardRoute::NoDashboard { message } = &route {
            PortalError::routing_ambiguity(*message).log();
        }
        route.target(self.paths())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// The current snapshot.
    pub fn context(&self) -> Arc<AuthContext> {
        self.context.load()
    }

    pub fn current_user(&self) -> Option<User> {
        self.context.load().user().cloned()
    }

    pub fn organization_data(&self) -> Option<OrganizationData> {
        self.context.load().organization_data()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.context.load().has_role(name)
    }

    pub fn has_any_role<S: AsRef<str>>(&self, names: &[S]) -> bool {
        self.context.load().has_any_role(names)
    }

    pub fn is_authenticated(&self) -> bool {
        self.context.load().is_authenticated()
    }

    pub fn is_initialized(&self) -> bool {
        self.init.lock().state == InitState::Ready
    }

    pub fn state(&self) -> InitState {
        self.init.lock().state
    }

    pub fn loading_state(&self) -> LoadingState {
        *self.loading.lock()
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn policy(&self) -> &Arc<AccessPolicy> {
        &self.policy
    }

    pub fn paths(&self) -> &PathTable {
        self.policy.paths()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Gateway connection attempts made so far.
    pub fn connect_attempts(&self) -> u32 {
        self.handle.connect_attempts()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Credential Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign in. Redirection happens when the gateway's `SignedIn`
    /// notification arrives, not here.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let result = self
            .with_loading(LoadingContext::Login, async {
                let email = email.trim();
                if email.is_empty() || password.is_empty() {
                    return Err(PortalError::invalid_input("Email and password are required"));
                }
                let session = self.gateway()?.sign_in_with_password(email, password).await?;
                Ok(session.user)
            })
            .await;

        if let Err(error) = &result {
            error.log();
            self.broadcaster.emit(LifecycleEvent::LoginFailed {
                error: error.summary(),
            });
        }
        result
    }

    pub async fn logout(&self) -> Result<()> {
        let result = self
            .with_loading(LoadingContext::Logout, async {
                self.gateway()?.sign_out().await?;
                Ok::<(), PortalError>(())
            })
            .await;

        match &result {
            Ok(()) => {
                info!("Principal signed out");
                self.broadcaster.emit(LifecycleEvent::LogoutSucceeded);
            }
            Err(error) => {
                error.log();
                self.broadcaster.emit(LifecycleEvent::LogoutFailed {
                    error: error.summary(),
                });
            }
        }
        result
    }

    /// Ask the gateway to mail a reset link pointing at the reset page.
    pub async fn send_password_reset_email(&self, email: &str) -> Result<()> {
        let email = email.trim().to_string();
        let redirect_to = format!(
            "{}{}",
            self.site_origin.trim_end_matches('/'),
            self.paths().reset_password
        );

        let result = self
            .with_loading(LoadingContext::PasswordReset, async {
                if email.is_empty() {
                    return Err(PortalError::invalid_input("Email is required"));
                }
                self.gateway()?
                    .reset_password_for_email(&email, &redirect_to)
                    .await?;
                Ok(())
            })
            .await;

        match &result {
            Ok(()) => self
                .broadcaster
                .emit(LifecycleEvent::PasswordResetSent { email }),
            Err(error) => {
                error.log();
                self.broadcaster
                    .emit(LifecycleEvent::error("password_reset", error));
            }
        }
        result
    }

    /// Replace the signed-in principal's password.
    pub async fn update_password(&self, new_password: &str) -> Result<User> {
        let min = self.min_password_length;
        let result = self
            .with_loading(LoadingContext::UserProfile, async {
                if new_password.chars().count() < min {
                    return Err(PortalError::invalid_input(format!(
                        "Password must be at least {} characters",
                        min
                    )));
                }
                let user = self.gateway()?.update_credential(new_password).await?;
                Ok(user)
            })
            .await;

        match &result {
            Ok(user) => self.broadcaster.emit(LifecycleEvent::PasswordUpdated {
                user: Some(user.clone()),
            }),
            Err(error) => {
                error.log();
                self.broadcaster
                    .emit(LifecycleEvent::error("password_update", error));
            }
        }
        result
    }

    fn gateway(&self) -> Result<Arc<dyn IdentityGateway>> {
        self.handle.get().ok_or_else(PortalError::not_initialized)
    }

    async fn with_loading<T, F>(&self, context: LoadingContext, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.set_loading(context, true);
        let _loading = LoadingGuard {
            manager: self,
            context,
        };
        operation.await
    }

    fn set_loading(&self, context: LoadingContext, loading: bool) {
        self.loading.lock().set(context, loading);
        self.broadcaster
            .emit(LifecycleEvent::Loading { context, loading });
    }
}

/// Initialization state plus the callers waiting on the attempt in flight.
#[derive(Default)]
struct InitSlot {
    state: InitState,
    waiters: Vec<oneshot::Sender<InitOutcome>>,
}

impl InitSlot {
    fn join(&mut self) -> oneshot::Receiver<InitOutcome> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }
}

fn resolve_waiters(waiters: Vec<oneshot::Sender<InitOutcome>>, outcome: &InitOutcome) {
    for waiter in waiters {
        // The caller may have stopped waiting.
        let _ = waiter.send(outcome.clone());
    }
}

/// Clears a loading flag when the operation ends, including when its
/// caller drops the future.
struct LoadingGuard<'a> {
    manager: &'a SessionManager,
    context: LoadingContext,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.manager.set_loading(self.context, false);
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("authenticated", &self.is_authenticated())
            .field("gateway", &self.handle)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    connector: Arc<dyn GatewayConnector>,
    store: Arc<dyn RoleStore>,
    navigator: Arc<dyn Navigator>,
    broadcaster: Option<Arc<Broadcaster>>,
    policy: Option<Arc<AccessPolicy>>,
    retry: RetryPolicy,
    min_password_length: usize,
    site_origin: String,
}

impl SessionManagerBuilder {
    pub fn new(
        connector: Arc<dyn GatewayConnector>,
        store: Arc<dyn RoleStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let defaults = SessionConfig::default();
        Self {
            connector,
            store,
            navigator,
            broadcaster: None,
            policy: None,
            retry: defaults.retry,
            min_password_length: defaults.min_password_length,
            site_origin: DEFAULT_SITE_ORIGIN.to_string(),
        }
    }

    pub fn broadcaster(mut self, broadcaster: Arc<Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn policy(mut self, policy: Arc<AccessPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn min_password_length(mut self, length: usize) -> Self {
        self.min_password_length = length;
        self
    }

    pub fn site_origin(mut self, origin: impl Into<String>) -> Self {
        self.site_origin = origin.into();
        self
    }

    /// Apply the retry policy and password rule from configuration.
    pub fn session_config(self, config: &SessionConfig) -> Self {
        self.retry_policy(config.retry.clone())
            .min_password_length(config.min_password_length)
    }

    /// Wire every configured section: path table, event names, session
    /// rules and the reset-link origin. Missing tables fall back to the
    /// defaults; the bootstrapper reports them as configuration errors.
    pub fn portal_config(mut self, config: &PortalConfig) -> Self {
        let paths = config.paths.clone().unwrap_or_default();
        let names = config.events.clone().unwrap_or_default();
        self.policy = Some(Arc::new(AccessPolicy::standard(paths)));
        self.broadcaster = Some(Arc::new(Broadcaster::new(names)));
        self.site_origin = config.gateway.site_origin.clone();
        self.session_config(&config.session)
    }

    pub fn build(self) -> Arc<SessionManager> {
        Arc::new(SessionManager {
            handle: GatewayHandle::new(self.connector),
            resolver: RoleResolver::new(self.store),
            broadcaster: self.broadcaster.unwrap_or_default(),
            navigator: self.navigator,
            policy: self
                .policy
                .unwrap_or_else(|| Arc::new(AccessPolicy::standard(PathTable::default()))),
            context: ContextCell::new(),
            init: Mutex::new(InitSlot::default()),
            loading: Mutex::new(LoadingState::default()),
            listener: Mutex::new(None),
            connected_announced: AtomicBool::new(false),
            retry: self.retry,
            min_password_length: self.min_password_length,
            site_origin: self.site_origin,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
