//! Envelope codec tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use clubsync_core::protocol::Envelope;

#[test]
fn parse_envelope_min() {
    let env = Envelope::decode(r#"{"type":"session.logout.ok"}"#).unwrap();
    assert_eq!(env.kind, "session.logout.ok");
    assert!(env.fields.is_empty());
}

#[test]
fn parse_envelope_full() {
    let env = Envelope::decode(
        r#"{"type":"login.request","username":"A@B","password":"pw"}"#,
    )
    .unwrap();
    assert_eq!(env.kind, "login.request");
    assert_eq!(env.get_str("username"), Some("A@B"));
    assert_eq!(env.get_str("password"), Some("pw"));
}

#[test]
fn parse_envelope_nested_fields() {
    let env = Envelope::decode(
        r#"{"type":"membership.snapshot","entries":[{"id":"m1"},{"id":"m2"}]}"#,
    )
    .unwrap();
    let entries = env.fields.get("entries").unwrap().as_array().unwrap();
    assert_eq!(entries.len(), 2);
}

#[test]
fn reject_missing_type() {
    let err = Envelope::decode(r#"{"username":"A"}"#).unwrap_err();
    assert_eq!(err.kind().as_str(), "PROTOCOL");
}

#[test]
fn reject_non_object() {
    assert!(Envelope::decode("[1,2,3]").is_err());
    assert!(Envelope::decode("not json at all").is_err());
}

#[test]
fn encode_round_trips() {
    let env = Envelope::new("membership.add")
        .field("entry", serde_json::json!({"id": "m1", "name": "alice"}))
        .token("T1");
    let text = env.encode().unwrap();
    let back = Envelope::decode(&text).unwrap();
    assert_eq!(back.kind, "membership.add");
    assert_eq!(back.get_str("token"), Some("T1"));
    assert_eq!(back.fields.get("entry").unwrap()["name"], "alice");
}
