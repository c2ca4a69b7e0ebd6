//! Session lifecycle.
//!
//! - **`context`**: the immutable [`AuthContext`] snapshot and the cell that
//!   publishes it.
//! - **`state`**: the initialization state machine, its outcome, and loading
//!   flags.
//! - **`retry`**: the bounded [`RetryPolicy`] for gateway outages.
//! - **`manager`**: the [`SessionManager`] tying gateway, resolver and
//!   broadcaster together.

pub mod context;
pub mod manager;
pub mod retry;
pub mod state;

pub use context::{AuthContext, ContextCell, OrganizationData};
pub use manager::{SessionManager, SessionManagerBuilder};
pub use retry::{Backoff, RetryPolicy};
pub use state::{InitOutcome, InitState, LoadingContext, LoadingState};
