//! Page bootstrap sequence.
//!
//! Every page load runs the same steps: check the static tables, announce
//! `InitStarted`, wait (bounded) for the session, then either redirect or
//! start the page's own module. The bootstrapper never cancels a session
//! attempt it started; running out of patience only means the page boots as
//! if nobody were signed in.

use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::PortalConfig;
use crate::error::{ErrorCode, ErrorSummary, PortalError, Result};
use crate::events::LifecycleEvent;
use crate::navigation::{same_location, PageId};
use crate::rbac::AccessDecision;
use crate::session::{AuthContext, SessionManager};
use crate::telemetry::metrics::BOOTSTRAP_DEGRADED_TOTAL;
use crate::telemetry::SensitiveFieldRedactor;

/// Loading affordance text while the page boots.
pub const LOADING_MESSAGE: &str = "Initializing system...";

/// Blocking message when the session or the page module could not start.
pub const INIT_FAILED_MESSAGE: &str =
    "Failed to initialize application. Please try refreshing the page.";

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborators
// ═══════════════════════════════════════════════════════════════════════════════

/// What a page module receives when it is started.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// The page, when the path is one the portal knows.
    pub page: Option<PageId>,
    pub path: String,
    pub context: Arc<AuthContext>,
    /// The session was not ready in time and the page runs unauthenticated.
    pub degraded: bool,
}

/// Starts the module behind a page.
#[async_trait]
pub trait PageInitializer: Send + Sync {
    async fn initialize_page(&self, request: PageRequest) -> Result<()>;
}

/// Loading and error display for the page being booted.
pub trait PageUi: Send + Sync {
    fn show_loading(&self, message: &str);

    fn hide_loading(&self);

    /// Blocking error the user has to act on.
    fn show_error(&self, message: &str);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Outcome
// ═══════════════════════════════════════════════════════════════════════════════

/// How a bootstrap run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The navigator was sent elsewhere.
    Redirected { target: String },
    /// The page module was started.
    PageStarted {
        page: Option<PageId>,
        path: String,
        degraded: bool,
    },
    /// A static table is missing or malformed.
    ConfigurationFailed { error: ErrorSummary },
    /// Session initialization finished without a usable session.
    SessionFailed { error: ErrorSummary },
    /// The page module reported an error.
    PageFailed {
        page: Option<PageId>,
        error: ErrorSummary,
    },
}

impl BootstrapOutcome {
    /// Whether the run got as far as a routing decision.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Redirected { .. } | Self::PageStarted { .. })
    }
}

enum Readiness {
    Ready(Arc<AuthContext>),
    Degraded,
    Failed(ErrorSummary),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Page Bootstrapper
// ═══════════════════════════════════════════════════════════════════════════════

/// Sequences one page load.
pub struct PageBootstrapper {
    config: PortalConfig,
    manager: Arc<SessionManager>,
    initializer: Arc<dyn PageInitializer>,
    ui: Arc<dyn PageUi>,
}

impl PageBootstrapper {
    pub fn new(
        config: PortalConfig,
        manager: Arc<SessionManager>,
        initializer: Arc<dyn PageInitializer>,
        ui: Arc<dyn PageUi>,
    ) -> Self {
        Self {
            config,
            manager,
            initializer,
            ui,
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Boot the navigator's current page.
    #[instrument(skip_all)]
    pub async fn run(&self) -> BootstrapOutcome {
        if let Err(error) = self.config.require_tables() {
            error.log();
            self.ui.show_error(error.user_message());
            self.manager
                .broadcaster()
                .emit(LifecycleEvent::error("bootstrap", &error));
            return BootstrapOutcome::ConfigurationFailed {
                error: error.summary(),
            };
        }

        let path = self.manager.navigator().current_path();
        let shown_path = SensitiveFieldRedactor::global().redact_value(&path);
        debug!(path = %shown_path, "Bootstrapping page");

        self.manager
            .broadcaster()
            .emit(LifecycleEvent::InitStarted { path: path.clone() });
        self.ui.show_loading(LOADING_MESSAGE);

        let outcome = match self.await_session().await {
            Readiness::Ready(ctx) => self.dispatch(&path, ctx, false).await,
            Readiness::Degraded => {
                self.dispatch(&path, Arc::new(AuthContext::empty()), true)
                    .await
            }
            Readiness::Failed(error) => {
                self.ui.show_error(INIT_FAILED_MESSAGE);
                BootstrapOutcome::SessionFailed { error }
            }
        };

        if outcome.is_complete() {
            self.manager
                .broadcaster()
                .emit(LifecycleEvent::InitComplete { path });
        }
        self.ui.hide_loading();
        outcome
    }

    async fn await_session(&self) -> Readiness {
        if self.manager.is_initialized() {
            return Readiness::Ready(self.manager.context());
        }

        // Spawned so the attempt outlives the wait window.
        let manager = self.manager.clone();
        let attempt = tokio::spawn(async move { manager.initialize_with_retry().await });
        let window = self.config.session.ready_timeout;

        match tokio::time::timeout(window, attempt).await {
            Ok(Ok(outcome)) if outcome.initialized => Readiness::Ready(self.manager.context()),
            Ok(Ok(outcome)) => Readiness::Failed(outcome.error.unwrap_or_else(|| {
                PortalError::gateway_unavailable("initialization failed without an error").summary()
            })),
            Ok(Err(join)) => {
                let error = PortalError::with_internal(
                    ErrorCode::InternalError,
                    "Session initialization stopped unexpectedly",
                    join.to_string(),
                );
                error.log();
                Readiness::Failed(error.summary())
            }
            Err(_) => {
                warn!(
                    timeout = ?window,
                    "Session not ready in time, proceeding unauthenticated"
                );
                counter!(BOOTSTRAP_DEGRADED_TOTAL).increment(1);
                Readiness::Degraded
            }
        }
    }

    async fn dispatch(&self, path: &str, ctx: Arc<AuthContext>, degraded: bool) -> BootstrapOutcome {
        let paths = self.manager.paths();

        if !ctx.is_authenticated() {
            if paths.is_public(path) {
                return self.start_page(path, ctx, degraded).await;
            }
            return self.redirect(paths.login.clone());
        }

        if paths.is_entry_page(path) {
            let target = self.manager.dashboard_redirect(&ctx.role_set);
            return self.redirect_or_start(target, path, ctx, degraded).await;
        }

        match self.manager.policy().decide(path, &ctx.role_set) {
            AccessDecision::Allow => self.start_page(path, ctx, degraded).await,
            AccessDecision::Deny(reason) => {
                info!(reason = %reason, "Page denied, routing to dashboard");
                let target = self.manager.dashboard_redirect(&ctx.role_set);
                self.redirect_or_start(target, path, ctx, degraded).await
            }
        }
    }

    /// A target naming the current location starts the page instead, so a
    /// principal without a dashboard settles on the login page however the
    /// navigator encodes its query.
    async fn redirect_or_start(
        &self,
        target: String,
        path: &str,
        ctx: Arc<AuthContext>,
        degraded: bool,
    ) -> BootstrapOutcome {
        if same_location(&target, path) {
            return self.start_page(path, ctx, degraded).await;
        }
        self.redirect(target)
    }

    fn redirect(&self, target: String) -> BootstrapOutcome {
        debug!(
            target = %SensitiveFieldRedactor::global().redact_value(&target),
            "Redirecting"
        );
        self.manager.navigator().redirect(&target);
        BootstrapOutcome::Redirected { target }
    }

    async fn start_page(&self, path: &str, ctx: Arc<AuthContext>, degraded: bool) -> BootstrapOutcome {
        let page = self.manager.paths().page_for(path);
        let request = PageRequest {
            page,
            path: path.to_string(),
            context: ctx,
            degraded,
        };

        match self.initializer.initialize_page(request).await {
            Ok(()) => BootstrapOutcome::PageStarted {
                page,
                path: path.to_string(),
                degraded,
            },
            Err(error) => {
                error.log();
                self.ui.show_error(INIT_FAILED_MESSAGE);
                self.manager
                    .broadcaster()
                    .emit(LifecycleEvent::error("page_initialize", &error));
                BootstrapOutcome::PageFailed {
                    page,
                    error: error.summary(),
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
