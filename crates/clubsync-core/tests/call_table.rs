//! Call table lookup tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use clubsync_core::protocol::calls::{spec_for, CALL_TABLE};

#[test]
fn login_has_long_deadline_and_no_token() {
    let spec = spec_for("login.request").unwrap();
    assert_eq!(spec.ok, "login.ok");
    assert_eq!(spec.fail, "login.fail");
    assert_eq!(spec.timeout_ms, 8_000);
    assert!(!spec.needs_token);
}

#[test]
fn delta_verbs_share_one_response_pair() {
    for kind in ["membership.add", "membership.update", "membership.remove"] {
        let spec = spec_for(kind).unwrap();
        assert_eq!(spec.ok, "membership.update.ok");
        assert_eq!(spec.fail, "membership.update.fail");
    }
    assert_eq!(spec_for("dj.remove").unwrap().ok, "dj.update.ok");
    assert_eq!(spec_for("shift.add").unwrap().fail, "shift.update.fail");
}

#[test]
fn fire_and_forget_kinds_are_absent() {
    assert!(spec_for("group.switch").is_none());
    assert!(spec_for("broadcast.send").is_none());
}

#[test]
fn authenticated_kinds_need_token() {
    for spec in CALL_TABLE {
        if spec.kind == "login.request" {
            continue;
        }
        assert!(spec.needs_token, "{} must carry the token", spec.kind);
    }
}

#[test]
fn table_kinds_are_unique() {
    for (i, a) in CALL_TABLE.iter().enumerate() {
        for b in &CALL_TABLE[i + 1..] {
            assert_ne!(a.kind, b.kind);
        }
    }
}
