//! Lifecycle events and the readiness broadcaster.
//!
//! - **`event`**: the closed [`LifecycleEvent`] enum, its [`EventKind`] tags, and
//!   the [`EventNameTable`] of wire names.
//! - **`broadcaster`**: synchronous fan-out to registered handlers, no replay.

pub mod broadcaster;
pub mod event;

pub use broadcaster::{BroadcastStats, Broadcaster, EventHandler, SubscriptionId};
pub use event::{EventKind, EventNameTable, LifecycleEvent};
