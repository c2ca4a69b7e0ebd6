//! In-process readiness broadcaster.
//!
//! Delivery is synchronous: [`Broadcaster::emit`] calls every handler that is
//! registered at the moment of the call, on the caller's task, before it
//! returns. Nothing is queued and nothing is replayed, so a handler
//! registered after an event fired never sees it.

use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::event::{EventKind, EventNameTable, LifecycleEvent};
use crate::telemetry::metrics::EVENTS_EMITTED_TOTAL;

/// Callback invoked for each delivered event.
pub type EventHandler = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Handle returned by [`Broadcaster::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    handler: EventHandler,
    once: bool,
}

/// Delivery statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BroadcastStats {
    pub total_emitted: u64,
    pub total_delivered: u64,
    pub active_subscribers: usize,
}

/// Publish/subscribe surface keyed by [`EventKind`].
pub struct Broadcaster {
    names: EventNameTable,
    subscribers: DashMap<EventKind, Vec<Subscriber>>,
    next_id: AtomicU64,
    total_emitted: AtomicU64,
    total_delivered: AtomicU64,
}

impl Broadcaster {
    pub fn new(names: EventNameTable) -> Self {
        Self {
            names,
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            total_emitted: AtomicU64::new(0),
            total_delivered: AtomicU64::new(0),
        }
    }

    pub fn names(&self) -> &EventNameTable {
        &self.names
    }

    /// Register `handler` for events of `kind`. A `once` subscription is
    /// removed right before its first delivery.
    pub fn subscribe(&self, kind: EventKind, handler: EventHandler, once: bool) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .entry(kind)
            .or_default()
            .push(Subscriber { id, handler, once });
        trace!(event = %self.names.name(kind), once, "Subscribed");
        id
    }

    /// Convenience wrapper taking a closure.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(handler), false)
    }

    /// Convenience wrapper for a one-shot closure.
    pub fn once<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(handler), true)
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for mut entry in self.subscribers.iter_mut() {
            let before = entry.len();
            entry.retain(|s| s.id != id);
            removed |= entry.len() != before;
        }
        removed
    }

    /// Deliver `event` to the handlers currently registered for its kind.
    ///
    /// Handlers run after the subscriber list is released, so a handler may
    /// subscribe, unsubscribe or emit without deadlocking.
    pub fn emit(&self, event: LifecycleEvent) {
        let kind = event.kind();
        let recipients: Vec<Subscriber> = match self.subscribers.get_mut(&kind) {
            Some(mut entry) => {
                let snapshot = entry.clone();
                entry.retain(|s| !s.once);
                snapshot
            }
            None => Vec::new(),
        };

        let name = self.names.name(kind);
        debug!(event = %name, recipients = recipients.len(), "Emitting lifecycle event");

        self.total_emitted.fetch_add(1, Ordering::Relaxed);
        self.total_delivered
            .fetch_add(recipients.len() as u64, Ordering::Relaxed);
        counter!(EVENTS_EMITTED_TOTAL, "event" => name.to_string()).increment(1);

        for subscriber in recipients {
            (subscriber.handler)(&event);
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map(|s| s.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            total_emitted: self.total_emitted.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            active_subscribers: self.subscribers.iter().map(|e| e.len()).sum(),
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(EventNameTable::default())
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> impl Fn(&LifecycleEvent) + Send + Sync + 'static {
        let counter = counter.clone();
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_emit_reaches_only_matching_kind() {
        let bus = Broadcaster::default();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.on(EventKind::LogoutSucceeded, counting(&hits));

        bus.emit(LifecycleEvent::GatewayConnected);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        bus.emit(LifecycleEvent::LogoutSucceeded);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = Broadcaster::default();
        bus.emit(LifecycleEvent::GatewayConnected);

        let hits = Arc::new(AtomicUsize::new(0));
        bus.on(EventKind::GatewayConnected, counting(&hits));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_once_subscription_fires_once() {
        let bus = Broadcaster::default();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.once(EventKind::LogoutSucceeded, counting(&hits));
        assert_eq!(bus.subscriber_count(EventKind::LogoutSucceeded), 1);

        bus.emit(LifecycleEvent::LogoutSucceeded);
        bus.emit(LifecycleEvent::LogoutSucceeded);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(EventKind::LogoutSucceeded), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = Broadcaster::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let id = bus.on(EventKind::LogoutSucceeded, counting(&hits));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));

        bus.emit(LifecycleEvent::LogoutSucceeded);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_may_subscribe_during_delivery() {
        let bus = Arc::new(Broadcaster::default());
        let hits = Arc::new(AtomicUsize::new(0));

        let inner_bus = bus.clone();
        let inner_hits = hits.clone();
        bus.once(EventKind::GatewayConnected, move |_| {
            inner_bus.on(EventKind::GatewayConnected, counting(&inner_hits));
        });

        bus.emit(LifecycleEvent::GatewayConnected);
        // Registered during the first delivery, so only the second reaches it.
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        bus.emit(LifecycleEvent::GatewayConnected);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stats() {
        let bus = Broadcaster::default();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.on(EventKind::LogoutSucceeded, counting(&hits));
        bus.on(EventKind::LogoutSucceeded, counting(&hits));
        bus.emit(LifecycleEvent::LogoutSucceeded);
        bus.emit(LifecycleEvent::GatewayConnected);

        let stats = bus.stats();
        assert_eq!(stats.total_emitted, 2);
        assert_eq!(stats.total_delivered, 2);
        assert_eq!(stats.active_subscribers, 2);
    }
}
