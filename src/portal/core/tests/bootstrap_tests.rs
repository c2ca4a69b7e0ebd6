//! Integration tests for the page bootstrap sequence.
//!
//! Tests cover:
//! - Configuration checks
//! - The four routing branches
//! - Degraded mode when the session is slow
//! - Session and page module failures

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{record, Portal, RecordingPages, RecordingUi};
use portal_core::bootstrap::{BootstrapOutcome, PageBootstrapper, INIT_FAILED_MESSAGE, LOADING_MESSAGE};
use portal_core::config::{PortalConfig, SessionConfig};
use portal_core::error::{ErrorCode, PortalError};
use portal_core::events::{EventKind, LifecycleEvent};
use portal_core::navigation::{PageId, PathTable};
use portal_core::rbac::NO_ROLE_MESSAGE;
use portal_core::session::{Backoff, RetryPolicy, SessionManager};

struct Harness {
    bootstrapper: PageBootstrapper,
    ui: Arc<RecordingUi>,
    pages: Arc<RecordingPages>,
}

impl Harness {
    fn new(portal: &Portal, config: PortalConfig) -> Self {
        let manager = portal.builder().portal_config(&config).build();
        Self::with_manager(manager, config)
    }

    fn with_manager(manager: Arc<SessionManager>, config: PortalConfig) -> Self {
        let ui = Arc::new(RecordingUi::default());
        let pages = Arc::new(RecordingPages::default());
        let bootstrapper = PageBootstrapper::new(config, manager, pages.clone(), ui.clone());
        Self {
            bootstrapper,
            ui,
            pages,
        }
    }

    fn manager(&self) -> &Arc<SessionManager> {
        self.bootstrapper.manager()
    }
}

/// Defaults without retries, so failures surface on the first attempt.
fn config() -> PortalConfig {
    PortalConfig {
        session: SessionConfig {
            retry: RetryPolicy::none(),
            ..SessionConfig::default()
        },
        ..PortalConfig::default()
    }
}

fn config_with_timeout(timeout: Duration) -> PortalConfig {
    let mut config = config();
    config.session.ready_timeout = timeout;
    config
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn test_missing_path_table_is_fatal() {
    let portal = Portal::new("/student.html");
    let config = PortalConfig {
        paths: None,
        ..config()
    };
    let harness = Harness::new(&portal, config);
    let started = record(harness.manager(), &[EventKind::InitStarted]);

    let outcome = harness.bootstrapper.run().await;

    assert!(matches!(
        outcome,
        BootstrapOutcome::ConfigurationFailed { ref error } if error.code == ErrorCode::ConfigurationError
    ));
    assert_eq!(harness.ui.errors(), vec!["Path configuration is missing".to_string()]);
    assert!(started.lock().is_empty());
    assert_eq!(portal.connector.attempts(), 0);
    assert!(portal.navigator.redirects().is_empty());
}

#[tokio::test]
async fn test_malformed_path_table_is_fatal() {
    let portal = Portal::new("/student.html");
    let paths = PathTable {
        student_dashboard: "/admin.html".to_string(),
        ..PathTable::default()
    };
    let config = PortalConfig {
        paths: Some(paths),
        ..config()
    };
    let harness = Harness::new(&portal, config);

    let outcome = harness.bootstrapper.run().await;

    assert!(!outcome.is_complete());
    assert!(harness.pages.started.lock().is_empty());
}

#[tokio::test]
async fn test_configured_login_path_is_used() {
    let portal = Portal::new("/student.html");
    let paths = PathTable {
        login: "/signin.html".to_string(),
        ..PathTable::default()
    };
    let config = PortalConfig {
        paths: Some(paths),
        ..config()
    };
    let harness = Harness::new(&portal, config);

    let outcome = harness.bootstrapper.run().await;

    assert_eq!(
        outcome,
        BootstrapOutcome::Redirected {
            target: "/signin.html".to_string()
        }
    );
}

// ============================================================================
// Routing Branches
// ============================================================================

#[tokio::test]
async fn test_anonymous_restricted_page_redirects_to_login() {
    let portal = Portal::new("/thesis-marking.html");
    let harness = Harness::new(&portal, config());
    let events = record(
        harness.manager(),
        &[EventKind::InitStarted, EventKind::InitComplete],
    );

    let outcome = harness.bootstrapper.run().await;

    assert_eq!(
        outcome,
        BootstrapOutcome::Redirected {
            target: "/login.html".to_string()
        }
    );
    assert_eq!(portal.navigator.redirects(), vec!["/login.html".to_string()]);
    assert_eq!(
        *events.lock(),
        vec![
            LifecycleEvent::InitStarted {
                path: "/thesis-marking.html".to_string()
            },
            LifecycleEvent::InitComplete {
                path: "/thesis-marking.html".to_string()
            },
        ]
    );
    assert_eq!(
        *harness.ui.calls.lock(),
        vec![format!("loading:{LOADING_MESSAGE}"), "hide".to_string()]
    );
}

#[tokio::test]
async fn test_anonymous_reset_page_is_started() {
    let portal = Portal::new("/reset-password.html?token=abc");
    let harness = Harness::new(&portal, config());

    let outcome = harness.bootstrapper.run().await;

    assert_eq!(
        outcome,
        BootstrapOutcome::PageStarted {
            page: Some(PageId::ResetPassword),
            path: "/reset-password.html?token=abc".to_string(),
            degraded: false,
        }
    );
    let started = harness.pages.started.lock();
    assert!(!started[0].context.is_authenticated());
}

#[tokio::test]
async fn test_signed_in_visitor_on_entry_page_goes_to_dashboard() {
    for entry in ["/", "/index.html", "/login.html", "/reset-password.html"] {
        let portal = Portal::new(entry);
        portal.signed_in_member("sup@uni.test", &["supervisor", "marker"]);
        let harness = Harness::new(&portal, config());

        let outcome = harness.bootstrapper.run().await;

        assert_eq!(
            outcome,
            BootstrapOutcome::Redirected {
                target: "/supervisor.html".to_string()
            },
            "from {entry}"
        );
        assert!(harness.pages.started.lock().is_empty());
    }
}

#[tokio::test]
async fn test_permitted_content_page_is_started() {
    let portal = Portal::new("/thesis-marking.html");
    portal.signed_in_member("mark@uni.test", &["marker"]);
    let harness = Harness::new(&portal, config());

    let outcome = harness.bootstrapper.run().await;

    assert!(outcome.is_complete());
    assert_eq!(harness.pages.pages(), vec![Some(PageId::ThesisMarking)]);
    let started = harness.pages.started.lock();
    assert!(started[0].context.has_role("marker"));
    assert!(!started[0].degraded);
    assert!(portal.navigator.redirects().is_empty());
}

#[tokio::test]
async fn test_denied_content_page_routes_to_dashboard() {
    let portal = Portal::new("/student.html");
    portal.signed_in_member("root@uni.test", &["administrator"]);
    let harness = Harness::new(&portal, config());

    let outcome = harness.bootstrapper.run().await;

    assert_eq!(
        outcome,
        BootstrapOutcome::Redirected {
            target: "/admin.html".to_string()
        }
    );
    assert!(harness.pages.started.lock().is_empty());
}

#[tokio::test]
async fn test_roleless_principal_settles_on_login_page() {
    let portal = Portal::new("/student.html");
    let user = portal.gateway.add_account("nomad@uni.test", common::PASSWORD);
    portal.gateway.restore_session(&user);
    let harness = Harness::new(&portal, config());

    let first = harness.bootstrapper.run().await;
    let expected = PathTable::default().login_with_error(NO_ROLE_MESSAGE);
    assert_eq!(
        first,
        BootstrapOutcome::Redirected {
            target: expected.clone()
        }
    );

    // The next page load is the login page carrying the reason.
    let second = harness.bootstrapper.run().await;
    assert_eq!(
        second,
        BootstrapOutcome::PageStarted {
            page: Some(PageId::Login),
            path: expected.clone(),
            degraded: false,
        }
    );
    assert_eq!(portal.navigator.redirects(), vec![expected]);
    assert_eq!(portal.connector.attempts(), 1);
}

#[tokio::test]
async fn test_roleless_principal_settles_when_query_is_reencoded() {
    let portal = Portal::new("/login.html?lang=en&error=User+has+no+assigned+role+or+organization.");
    let user = portal.gateway.add_account("nomad@uni.test", common::PASSWORD);
    portal.gateway.restore_session(&user);
    let harness = Harness::new(&portal, config());

    let outcome = harness.bootstrapper.run().await;

    assert!(matches!(
        outcome,
        BootstrapOutcome::PageStarted {
            page: Some(PageId::Login),
            degraded: false,
            ..
        }
    ));
    assert!(portal.navigator.redirects().is_empty());
    assert_eq!(harness.pages.pages(), vec![Some(PageId::Login)]);
}

// ============================================================================
// Slow and Failing Sessions
// ============================================================================

#[tokio::test]
async fn test_slow_session_boots_degraded_and_keeps_initializing() {
    tokio::time::pause();
    let portal = Portal::with_connector("/login.html", |c| c.with_delay(Duration::from_secs(10)));
    portal.signed_in_member("sam@uni.test", &["student"]);
    let harness = Harness::new(&portal, config_with_timeout(Duration::from_secs(1)));

    let outcome = harness.bootstrapper.run().await;

    assert_eq!(
        outcome,
        BootstrapOutcome::PageStarted {
            page: Some(PageId::Login),
            path: "/login.html".to_string(),
            degraded: true,
        }
    );
    assert!(!harness.pages.started.lock()[0].context.is_authenticated());
    assert!(!harness.manager().is_initialized());

    // The abandoned wait did not cancel the attempt.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.manager().is_initialized());
    assert!(harness.manager().is_authenticated());
    assert_eq!(portal.connector.attempts(), 1);
}

#[tokio::test]
async fn test_slow_session_on_restricted_page_redirects_to_login() {
    tokio::time::pause();
    let portal = Portal::with_connector("/student.html", |c| c.with_delay(Duration::from_secs(30)));
    let harness = Harness::new(&portal, config_with_timeout(Duration::from_secs(5)));

    let outcome = harness.bootstrapper.run().await;

    assert_eq!(
        outcome,
        BootstrapOutcome::Redirected {
            target: "/login.html".to_string()
        }
    );
}

#[tokio::test]
async fn test_configured_retries_ride_out_an_outage() {
    tokio::time::pause();
    let portal = Portal::with_connector("/student.html", |c| c.failing_first(2));
    portal.signed_in_member("sam@uni.test", &["student"]);
    let mut config = config();
    config.session.retry = RetryPolicy::default()
        .with_max_attempts(3)
        .with_base_delay(Duration::from_millis(500))
        .with_backoff(Backoff::Fixed);
    let harness = Harness::new(&portal, config);

    let outcome = harness.bootstrapper.run().await;

    assert_eq!(harness.pages.pages(), vec![Some(PageId::StudentDashboard)]);
    assert!(outcome.is_complete());
    assert_eq!(portal.connector.attempts(), 3);
    assert!(harness.ui.errors().is_empty());
}

#[tokio::test]
async fn test_failed_session_shows_blocking_error() {
    let portal = Portal::with_connector("/student.html", |c| c.failing_first(1));
    let harness = Harness::new(&portal, config());
    let complete = record(harness.manager(), &[EventKind::InitComplete]);

    let outcome = harness.bootstrapper.run().await;

    assert!(matches!(
        outcome,
        BootstrapOutcome::SessionFailed { ref error } if error.code == ErrorCode::GatewayUnavailable
    ));
    assert_eq!(harness.ui.errors(), vec![INIT_FAILED_MESSAGE.to_string()]);
    assert!(complete.lock().is_empty());
    assert_eq!(harness.ui.calls.lock().last().map(String::as_str), Some("hide"));
    assert!(portal.navigator.redirects().is_empty());
}

#[tokio::test]
async fn test_page_module_failure_is_reported() {
    let portal = Portal::new("/help-and-contact.html");
    portal.signed_in_member("sam@uni.test", &["student"]);
    let harness = Harness::new(&portal, config());
    *harness.pages.fail_with.lock() = Some(PortalError::new(
        ErrorCode::InternalError,
        "Help content unavailable",
    ));
    let errors = record(harness.manager(), &[EventKind::Error]);

    let outcome = harness.bootstrapper.run().await;

    assert!(matches!(
        outcome,
        BootstrapOutcome::PageFailed { page: Some(PageId::HelpAndContact), .. }
    ));
    assert_eq!(harness.ui.errors(), vec![INIT_FAILED_MESSAGE.to_string()]);
    assert!(matches!(
        &errors.lock()[..],
        [LifecycleEvent::Error { context, .. }] if context == "page_initialize"
    ));
}

#[tokio::test]
async fn test_ready_manager_is_not_reinitialized() {
    let portal = Portal::new("/student.html");
    portal.signed_in_member("sam@uni.test", &["student"]);
    let config = config();
    let manager = portal.builder().portal_config(&config).build();
    manager.initialize().await;

    let harness = Harness::with_manager(manager, config);
    let ready = record(harness.manager(), &[EventKind::ModuleReady]);

    let outcome = harness.bootstrapper.run().await;

    assert!(outcome.is_complete());
    assert_eq!(harness.pages.pages(), vec![Some(PageId::StudentDashboard)]);
    assert_eq!(portal.connector.attempts(), 1);
    assert!(ready.lock().is_empty());
}
