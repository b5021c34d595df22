//! Snapshot-replace and idempotent delta semantics.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use clubsync_core::event::{Domain, DomainEvent, DomainState};
use serde_json::json;

#[test]
fn snapshot_fully_replaces_prior_state() {
    let mut state = DomainState::new();
    state.apply(&DomainEvent::Snapshot(vec![
        json!({"id": "a"}),
        json!({"id": "b"}),
        json!({"id": "c"}),
    ]));
    assert_eq!(state.len(), 3);

    // A later snapshot does not merge; it replaces.
    state.apply(&DomainEvent::Snapshot(vec![json!({"id": "z"})]));
    assert_eq!(state.len(), 1);
    assert_eq!(state.entries()[0]["id"], "z");
}

#[test]
fn double_remove_is_a_noop() {
    let mut state = DomainState::new();
    state.apply(&DomainEvent::Snapshot(vec![
        json!({"id": "a"}),
        json!({"id": "b"}),
    ]));
    state.apply(&DomainEvent::Removed("a".into()));
    let once = state.clone();
    state.apply(&DomainEvent::Removed("a".into()));
    assert_eq!(state.entries(), once.entries());
    assert_eq!(state.len(), 1);
}

#[test]
fn add_of_existing_id_behaves_as_update() {
    let mut state = DomainState::new();
    state.apply(&DomainEvent::Added(json!({"id": "a", "name": "old"})));
    state.apply(&DomainEvent::Added(json!({"id": "a", "name": "new"})));
    assert_eq!(state.len(), 1);
    assert_eq!(state.entries()[0]["name"], "new");
}

#[test]
fn update_of_unknown_id_inserts() {
    let mut state = DomainState::new();
    state.apply(&DomainEvent::Updated(json!({"id": "a"})));
    assert_eq!(state.len(), 1);
}

#[test]
fn custom_id_field() {
    let mut state = DomainState::keyed_by("username");
    state.apply(&DomainEvent::Added(json!({"username": "alice"})));
    state.apply(&DomainEvent::Removed("alice".into()));
    assert!(state.is_empty());
}

#[test]
fn non_entity_events_leave_state_untouched() {
    let mut state = DomainState::new();
    state.apply(&DomainEvent::Snapshot(vec![json!({"id": "a"})]));
    state.apply(&DomainEvent::Announcement("maintenance at noon".into()));
    state.apply(&DomainEvent::MemberJoined {
        username: "bob".into(),
        group_id: "g1".into(),
    });
    assert_eq!(state.len(), 1);
}

#[test]
fn wire_prefix_round_trip() {
    for d in Domain::ALL {
        assert_eq!(Domain::from_wire(d.wire_prefix()), Some(*d));
    }
    assert_eq!(Domain::from_wire("dj"), Some(Domain::Roster));
    assert_eq!(Domain::from_wire("nonsense"), None);
}
