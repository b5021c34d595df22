//! Kind-keyed single-slot request correlation.
//!
//! The wire protocol carries no request id, so an inbound response can only
//! be matched to the pending call whose [`CallSpec`] names its type.
//! Registering a kind that already has a pending slot overwrites it; the
//! orphaned caller resolves only through its own timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use clubsync_core::protocol::{CallSpec, Envelope};

/// Terminal state of one correlated call. A deadline expiry is not an
/// outcome: the caller observes it as its completion handle never firing.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The `ok` response arrived; carries the response fields.
    Ok(Map<String, Value>),
    /// The `fail` response arrived.
    Rejected { message: String },
}

struct PendingCall {
    call_id: u64,
    ok: &'static str,
    fail: &'static str,
    tx: oneshot::Sender<CallOutcome>,
    created_at: Instant,
}

/// In-flight call table, one slot per call kind.
#[derive(Default)]
pub struct Correlator {
    pending: DashMap<&'static str, PendingCall>,
    next_id: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending slot for `spec.kind`. Returns the slot's id (used
    /// by [`forget`](Self::forget)) and the completion handle. An existing
    /// slot of the same kind is overwritten and its caller orphaned.
    pub fn register(&self, spec: &'static CallSpec) -> (u64, oneshot::Receiver<CallOutcome>) {
        let call_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let prev = self.pending.insert(
            spec.kind,
            PendingCall {
                call_id,
                ok: spec.ok,
                fail: spec.fail,
                tx,
                created_at: Instant::now(),
            },
        );
        if prev.is_some() {
            tracing::debug!(kind = spec.kind, "pending slot overwritten by a newer call");
        }
        (call_id, rx)
    }

    /// Drop a slot after its caller timed out, unless a newer call of the
    /// same kind has already taken it over.
    pub fn forget(&self, kind: &str, call_id: u64) {
        self.pending.remove_if(kind, |_, p| p.call_id == call_id);
    }

    /// Try to consume an inbound envelope as a correlated response.
    /// Returns false if no pending slot expects this type.
    pub fn resolve(&self, env: &Envelope) -> bool {
        let matched = self
            .pending
            .iter()
            .find_map(|e| (e.ok == env.kind || e.fail == env.kind).then_some(*e.key()));
        let Some(kind) = matched else {
            return false;
        };
        let Some((_, slot)) = self.pending.remove(kind) else {
            return false;
        };

        let outcome = if env.kind == slot.fail {
            let message = env.get_str("message").unwrap_or_default().to_string();
            self.record_error(&message);
            CallOutcome::Rejected { message }
        } else {
            CallOutcome::Ok(env.fields.clone())
        };

        tracing::debug!(
            kind,
            response = %env.kind,
            elapsed_ms = slot.created_at.elapsed().as_millis() as u64,
            "call resolved"
        );
        // The caller may have timed out already; a dropped receiver is fine.
        let _ = slot.tx.send(outcome);
        true
    }

    /// Most recent `*.fail` message, last-write-wins. Diagnostic only:
    /// concurrent failures race on this slot by design.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn record_error(&self, message: &str) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clubsync_core::protocol::calls::spec_for;

    fn login() -> &'static CallSpec {
        spec_for("login.request").unwrap()
    }

    #[tokio::test]
    async fn ok_response_resolves_with_fields() {
        let c = Correlator::new();
        let (_, rx) = c.register(login());
        let env = Envelope::new("login.ok").field("token", "T1");
        assert!(c.resolve(&env));
        match rx.await.unwrap() {
            CallOutcome::Ok(fields) => assert_eq!(fields["token"], "T1"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fail_response_sets_diagnostic_slot() {
        let c = Correlator::new();
        let (_, rx) = c.register(login());
        let env = Envelope::new("login.fail").field("message", "bad credentials");
        assert!(c.resolve(&env));
        assert_eq!(
            rx.await.unwrap(),
            CallOutcome::Rejected {
                message: "bad credentials".into()
            }
        );
        assert_eq!(c.last_error().as_deref(), Some("bad credentials"));
    }

    #[tokio::test]
    async fn unrelated_envelope_is_not_consumed() {
        let c = Correlator::new();
        let (_, _rx) = c.register(login());
        assert!(!c.resolve(&Envelope::new("membership.snapshot")));
        assert!(c.pending.contains_key("login.request"));
    }

    #[tokio::test]
    async fn same_kind_registration_orphans_the_first_caller() {
        let c = Correlator::new();
        let (_, first) = c.register(login());
        let (_, second) = c.register(login());

        // The first completion handle is gone; only its timeout can end it.
        assert!(first.await.is_err());

        assert!(c.resolve(&Envelope::new("login.ok").field("token", "T2")));
        match second.await.unwrap() {
            CallOutcome::Ok(fields) => assert_eq!(fields["token"], "T2"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn forget_leaves_a_newer_slot_alone() {
        let c = Correlator::new();
        let (stale_id, _old) = c.register(login());
        let (_, newer) = c.register(login());

        // Timed-out first caller must not evict the second caller's slot.
        c.forget("login.request", stale_id);
        assert!(c.resolve(&Envelope::new("login.ok")));
        assert!(matches!(newer.await.unwrap(), CallOutcome::Ok(_)));
    }
}
