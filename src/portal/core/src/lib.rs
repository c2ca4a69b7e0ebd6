#![allow(clippy::result_large_err)]
//! # Portal Core
//!
//! Session lifecycle and role-based access control for the supervision portal.
//!
//! ## Architecture
//!
//! - **Gateway**: trait seam to the remote identity service, with a memoized handle
//! - **Roles**: organization membership and role lookup, failing closed
//! - **RBAC**: the page policy table and dashboard precedence
//! - **Session**: the [`SessionManager`](session::SessionManager) and its published [`AuthContext`](session::AuthContext)
//! - **Events**: lifecycle events and the synchronous readiness broadcaster
//! - **Bootstrap**: per-page boot sequence that redirects or starts the page module
//! - **Telemetry**: structured logging with redaction, plus metric names

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod navigation;
pub mod rbac;
pub mod roles;
pub mod session;
pub mod telemetry;

pub use error::{ErrorCode, ErrorDetails, ErrorSeverity, ErrorSummary, PortalError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bootstrap::{
        BootstrapOutcome, PageBootstrapper, PageInitializer, PageRequest, PageUi,
    };
    pub use crate::config::{GatewayConfig, PortalConfig, SessionConfig};
    pub use crate::error::{
        ErrorCode, ErrorDetails, ErrorSeverity, ErrorSummary, GatewayError, PortalError, Result,
        StoreError,
    };
    pub use crate::events::{Broadcaster, EventKind, EventNameTable, LifecycleEvent, SubscriptionId};
    pub use crate::gateway::{
        ChangeKind, Credential, GatewayConnector, IdentityGateway, Session, SessionChange, User,
    };
    pub use crate::navigation::{MemoryNavigator, Navigator, PageId, PathTable};
    pub use crate::rbac::{
        AccessDecision, AccessPolicy, AccessRule, DashboardRoute, OrganizationMembership,
        PortalRole, PrincipalId, Role, RoleSet, RouteMatcher,
    };
    pub use crate::roles::{RoleResolution, RoleResolver, RoleStore};
    pub use crate::session::{
        AuthContext, InitOutcome, InitState, LoadingContext, LoadingState, OrganizationData,
        RetryPolicy, SessionManager, SessionManagerBuilder,
    };
    pub use crate::telemetry::{init_logging, LoggingConfig};
}
