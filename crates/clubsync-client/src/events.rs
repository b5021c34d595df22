//! Per-domain event fan-out.
//!
//! Each domain gets its own broadcast channel; subscribing returns a receiver
//! handle and dropping it unsubscribes, so lifetime is deterministic. A slow
//! subscriber lags on its own channel without blocking other domains.

use dashmap::DashMap;
use tokio::sync::{broadcast, watch};

use clubsync_core::event::{Domain, DomainEvent};

pub struct EventBus {
    channels: DashMap<Domain, broadcast::Sender<DomainEvent>>,
    connectivity_tx: watch::Sender<bool>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (connectivity_tx, _) = watch::channel(false);
        Self {
            channels: DashMap::new(),
            connectivity_tx,
            capacity,
        }
    }

    fn sender(&self, domain: Domain) -> broadcast::Sender<DomainEvent> {
        self.channels
            .entry(domain)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to one domain's events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self, domain: Domain) -> broadcast::Receiver<DomainEvent> {
        self.sender(domain).subscribe()
    }

    /// Dispatch one event, in wire order. A domain with no subscribers
    /// silently drops it.
    pub fn publish(&self, domain: Domain, event: DomainEvent) {
        let _ = self.sender(domain).send(event);
    }

    /// Connectivity-changed notifications; the current value is readable at
    /// any time via the receiver.
    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity_tx.subscribe()
    }

    /// Emit connectivity-changed only on actual transitions.
    pub(crate) fn set_connected(&self, up: bool) {
        self.connectivity_tx.send_if_modified(|current| {
            let changed = *current != up;
            *current = up;
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe(Domain::Membership);
        bus.publish(Domain::Membership, DomainEvent::Added(json!({"id": "a"})));
        bus.publish(Domain::Membership, DomainEvent::Removed("a".into()));
        assert!(matches!(rx.recv().await.unwrap(), DomainEvent::Added(_)));
        assert!(matches!(rx.recv().await.unwrap(), DomainEvent::Removed(_)));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(16);
        bus.publish(Domain::Broadcast, DomainEvent::Announcement("hi".into()));
    }

    #[tokio::test]
    async fn domains_are_independent() {
        let bus = EventBus::new(16);
        let mut roster = bus.subscribe(Domain::Roster);
        bus.publish(Domain::Schedule, DomainEvent::Snapshot(vec![]));
        assert!(roster.try_recv().is_err());
    }

    #[tokio::test]
    async fn connectivity_notifies_only_on_transition() {
        let bus = EventBus::new(16);
        let mut rx = bus.connectivity();
        assert!(!*rx.borrow_and_update());

        bus.set_connected(true);
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        // Same value again: no wakeup.
        bus.set_connected(true);
        assert!(!rx.has_changed().unwrap());
    }
}
