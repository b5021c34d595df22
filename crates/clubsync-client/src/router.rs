//! Inbound envelope classification.
//!
//! Every frame read off the socket lands here, in wire order. An envelope is
//! either a correlated response (handed to the correlator), a domain
//! snapshot/delta/broadcast (published to that domain's channel), or
//! unrecognized (logged and dropped without affecting the loop).

use std::sync::Arc;

use clubsync_core::event::{Domain, DomainEvent};
use clubsync_core::protocol::Envelope;

use crate::correlate::Correlator;
use crate::events::EventBus;

/// Where an inbound envelope went. Exposed for tests and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Response,
    Event(Domain),
    Dropped,
}

pub struct Router {
    correlator: Arc<Correlator>,
    bus: Arc<EventBus>,
}

impl Router {
    pub fn new(correlator: Arc<Correlator>, bus: Arc<EventBus>) -> Self {
        Self { correlator, bus }
    }

    pub fn route(&self, env: Envelope) -> Routed {
        // Responses are matched on exact type, so `membership.update.ok`
        // never collides with the `membership.update` delta broadcast.
        if self.correlator.resolve(&env) {
            return Routed::Response;
        }
        match classify(&env) {
            Some((domain, event)) => {
                self.bus.publish(domain, event);
                Routed::Event(domain)
            }
            None => {
                tracing::debug!(kind = %env.kind, "dropping unrecognized envelope");
                Routed::Dropped
            }
        }
    }
}

fn classify(env: &Envelope) -> Option<(Domain, DomainEvent)> {
    match env.kind.as_str() {
        "server.announcement" => {
            let message = env.get_str("message")?.to_string();
            return Some((Domain::Broadcast, DomainEvent::Announcement(message)));
        }
        "membership.added" | "membership.removed" => {
            let username = env.get_str("username")?.to_string();
            let group_id = env.get_str("groupId")?.to_string();
            let event = if env.kind == "membership.added" {
                DomainEvent::MemberJoined { username, group_id }
            } else {
                DomainEvent::MemberLeft { username, group_id }
            };
            return Some((Domain::Group, event));
        }
        _ => {}
    }

    if let Some(prefix) = env.kind.strip_suffix(".snapshot") {
        let domain = Domain::from_wire(prefix)?;
        let entries = env.fields.get("entries")?.as_array()?.clone();
        return Some((domain, DomainEvent::Snapshot(entries)));
    }

    if let Some(prefix) = env.kind.strip_suffix(".update") {
        let domain = Domain::from_wire(prefix)?;
        let event = match env.get_str("op")? {
            "add" => DomainEvent::Added(env.fields.get("entry")?.clone()),
            "update" => DomainEvent::Updated(env.fields.get("entry")?.clone()),
            "remove" => DomainEvent::Removed(env.get_str("id")?.to_string()),
            other => {
                tracing::warn!(kind = %env.kind, op = other, "unknown delta op");
                return None;
            }
        };
        return Some((domain, event));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use clubsync_core::protocol::calls::spec_for;

    fn router() -> (Router, Arc<Correlator>, Arc<EventBus>) {
        let correlator = Arc::new(Correlator::new());
        let bus = Arc::new(EventBus::new(16));
        (
            Router::new(Arc::clone(&correlator), Arc::clone(&bus)),
            correlator,
            bus,
        )
    }

    fn decode(text: &str) -> Envelope {
        Envelope::decode(text).unwrap()
    }

    #[tokio::test]
    async fn snapshot_replaces_via_domain_channel() {
        let (router, _, bus) = router();
        let mut rx = bus.subscribe(Domain::Membership);
        let routed = router.route(decode(
            r#"{"type":"membership.snapshot","entries":[{"id":"a"},{"id":"b"}]}"#,
        ));
        assert_eq!(routed, Routed::Event(Domain::Membership));
        match rx.recv().await.unwrap() {
            DomainEvent::Snapshot(entries) => assert_eq!(entries.len(), 2),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delta_ops_map_to_events() {
        let (router, _, bus) = router();
        let mut roster = bus.subscribe(Domain::Roster);
        let mut schedule = bus.subscribe(Domain::Schedule);

        router.route(decode(
            r#"{"type":"dj.update","op":"add","entry":{"id":"d1"}}"#,
        ));
        router.route(decode(r#"{"type":"shift.update","op":"remove","id":"s1"}"#));

        assert!(matches!(roster.recv().await.unwrap(), DomainEvent::Added(_)));
        assert_eq!(
            schedule.recv().await.unwrap(),
            DomainEvent::Removed("s1".into())
        );
    }

    #[tokio::test]
    async fn membership_changes_land_on_the_group_domain() {
        let (router, _, bus) = router();
        let mut rx = bus.subscribe(Domain::Group);
        router.route(decode(
            r#"{"type":"membership.added","username":"alice","groupId":"g1"}"#,
        ));
        assert_eq!(
            rx.recv().await.unwrap(),
            DomainEvent::MemberJoined {
                username: "alice".into(),
                group_id: "g1".into()
            }
        );
    }

    #[tokio::test]
    async fn announcement_is_a_broadcast_event() {
        let (router, _, bus) = router();
        let mut rx = bus.subscribe(Domain::Broadcast);
        router.route(decode(
            r#"{"type":"server.announcement","message":"closing early"}"#,
        ));
        assert_eq!(
            rx.recv().await.unwrap(),
            DomainEvent::Announcement("closing early".into())
        );
    }

    #[tokio::test]
    async fn response_wins_over_broadcast_classification() {
        let (router, correlator, _) = router();
        let (_, rx) = correlator.register(spec_for("login.request").unwrap());
        let routed = router.route(decode(r#"{"type":"login.ok","token":"T1"}"#));
        assert_eq!(routed, Routed::Response);
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_without_blocking_others() {
        let (router, _, bus) = router();
        let mut rx = bus.subscribe(Domain::Membership);

        // Missing `op`: dropped.
        assert_eq!(
            router.route(decode(r#"{"type":"membership.update","entry":{}}"#)),
            Routed::Dropped
        );
        // Snapshot entries of the wrong shape: dropped.
        assert_eq!(
            router.route(decode(r#"{"type":"dj.snapshot","entries":"oops"}"#)),
            Routed::Dropped
        );
        // The domain still receives later well-formed events.
        router.route(decode(
            r#"{"type":"membership.update","op":"add","entry":{"id":"m1"}}"#,
        ));
        assert!(matches!(rx.recv().await.unwrap(), DomainEvent::Added(_)));
    }

    #[tokio::test]
    async fn unknown_kind_is_dropped() {
        let (router, _, _) = router();
        assert_eq!(
            router.route(decode(r#"{"type":"telemetry.blob","x":1}"#)),
            Routed::Dropped
        );
    }

    #[test]
    fn classify_ignores_response_like_types() {
        // `*.update.ok` must never classify as a delta for domain "membership.update".
        let env = decode(r#"{"type":"membership.update.ok"}"#);
        assert!(classify(&env).is_none());
    }
}
