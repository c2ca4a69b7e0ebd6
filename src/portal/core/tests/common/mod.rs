//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use portal_core::bootstrap::{PageInitializer, PageRequest, PageUi};
use portal_core::events::{EventKind, LifecycleEvent};
use portal_core::gateway::{InMemoryConnector, InMemoryGateway, User};
use portal_core::navigation::{MemoryNavigator, PageId};
use portal_core::rbac::{MembershipId, OrganizationMembership, Role};
use portal_core::roles::InMemoryRoleStore;
use portal_core::session::{RetryPolicy, SessionManager, SessionManagerBuilder};
use portal_core::Result;

pub const PASSWORD: &str = "correct-horse";

/// One portal wired to in-memory collaborators.
pub struct Portal {
    pub gateway: Arc<InMemoryGateway>,
    pub connector: Arc<InMemoryConnector>,
    pub store: Arc<InMemoryRoleStore>,
    pub navigator: Arc<MemoryNavigator>,
}

impl Portal {
    pub fn new(path: &str) -> Self {
        Self::with_connector(path, |c| c)
    }

    /// Customize the connector (scripted failures, delays) before wiring.
    pub fn with_connector(
        path: &str,
        customize: impl FnOnce(InMemoryConnector) -> InMemoryConnector,
    ) -> Self {
        let gateway = Arc::new(InMemoryGateway::new());
        let connector = Arc::new(customize(InMemoryConnector::new(gateway.clone())));
        Self {
            gateway,
            connector,
            store: Arc::new(InMemoryRoleStore::new()),
            navigator: Arc::new(MemoryNavigator::new(path)),
        }
    }

    pub fn builder(&self) -> SessionManagerBuilder {
        SessionManager::builder(
            self.connector.clone(),
            self.store.clone(),
            self.navigator.clone(),
        )
        .retry_policy(RetryPolicy::none())
    }

    pub fn manager(&self) -> Arc<SessionManager> {
        self.builder().build()
    }

    /// An account with a membership holding `roles`.
    pub fn member(&self, email: &str, roles: &[&str]) -> User {
        let user = self.gateway.add_account(email, PASSWORD);
        let membership_id = MembershipId::new(format!("m-{}", user.id));
        self.store.add_membership(
            &user.id,
            OrganizationMembership::new(membership_id.clone(), "org-1", "Faculty of Science"),
        );
        for (i, name) in roles.iter().enumerate() {
            self.store
                .add_role(&membership_id, Role::new(format!("r-{i}"), *name));
        }
        user
    }

    /// A member whose session already exists when the page loads.
    pub fn signed_in_member(&self, email: &str, roles: &[&str]) -> User {
        let user = self.member(email, roles);
        self.gateway.restore_session(&user);
        user
    }
}

/// Let the session-change listener drain its queue.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Records every event of the given kinds.
pub fn record(manager: &SessionManager, kinds: &[EventKind]) -> Arc<Mutex<Vec<LifecycleEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let seen = seen.clone();
        manager
            .broadcaster()
            .on(*kind, move |event| seen.lock().push(event.clone()));
    }
    seen
}

#[derive(Default)]
pub struct RecordingUi {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingUi {
    pub fn errors(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| c.strip_prefix("error:").map(str::to_string))
            .collect()
    }
}

impl PageUi for RecordingUi {
    fn show_loading(&self, message: &str) {
        self.calls.lock().push(format!("loading:{message}"));
    }

    fn hide_loading(&self) {
        self.calls.lock().push("hide".to_string());
    }

    fn show_error(&self, message: &str) {
        self.calls.lock().push(format!("error:{message}"));
    }
}

#[derive(Default)]
pub struct RecordingPages {
    pub started: Mutex<Vec<PageRequest>>,
    pub fail_with: Mutex<Option<portal_core::PortalError>>,
}

impl RecordingPages {
    pub fn pages(&self) -> Vec<Option<PageId>> {
        self.started.lock().iter().map(|r| r.page).collect()
    }
}

#[async_trait]
impl PageInitializer for RecordingPages {
    async fn initialize_page(&self, request: PageRequest) -> Result<()> {
        self.started.lock().push(request);
        match self.fail_with.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
