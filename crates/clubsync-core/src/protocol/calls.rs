//! Call-kind table.
//!
//! The wire protocol has no per-request id, so every correlated call kind
//! declares up front which response types resolve it. Several delta verbs
//! share one response pair (e.g. `membership.add/update/remove` are all
//! acknowledged as `membership.update.ok` / `membership.update.fail`), which
//! is why the table is explicit instead of derived from the verb string.

/// Static description of one correlated call kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSpec {
    /// Outbound `type` tag.
    pub kind: &'static str,
    /// Inbound type that resolves the call successfully.
    pub ok: &'static str,
    /// Inbound type that resolves the call as a server rejection.
    pub fail: &'static str,
    /// Default deadline, milliseconds.
    pub timeout_ms: u64,
    /// Whether the session token is attached to the request.
    pub needs_token: bool,
}

const LOGIN_TIMEOUT_MS: u64 = 8_000;
const CALL_TIMEOUT_MS: u64 = 6_000;

macro_rules! spec {
    ($kind:literal, $ok:literal, $fail:literal, $timeout:expr, $token:expr) => {
        CallSpec {
            kind: $kind,
            ok: $ok,
            fail: $fail,
            timeout_ms: $timeout,
            needs_token: $token,
        }
    };
}

/// All correlated call kinds. Fire-and-forget verbs (`group.switch`,
/// `broadcast.send`) are deliberately absent: they have no response type.
pub const CALL_TABLE: &[CallSpec] = &[
    spec!("login.request", "login.ok", "login.fail", LOGIN_TIMEOUT_MS, false),
    spec!("membership.add", "membership.update.ok", "membership.update.fail", CALL_TIMEOUT_MS, true),
    spec!("membership.update", "membership.update.ok", "membership.update.fail", CALL_TIMEOUT_MS, true),
    spec!("membership.remove", "membership.update.ok", "membership.update.fail", CALL_TIMEOUT_MS, true),
    spec!("dj.add", "dj.update.ok", "dj.update.fail", CALL_TIMEOUT_MS, true),
    spec!("dj.update", "dj.update.ok", "dj.update.fail", CALL_TIMEOUT_MS, true),
    spec!("dj.remove", "dj.update.ok", "dj.update.fail", CALL_TIMEOUT_MS, true),
    spec!("shift.add", "shift.update.ok", "shift.update.fail", CALL_TIMEOUT_MS, true),
    spec!("shift.update", "shift.update.ok", "shift.update.fail", CALL_TIMEOUT_MS, true),
    spec!("shift.remove", "shift.update.ok", "shift.update.fail", CALL_TIMEOUT_MS, true),
    spec!("jobs.rights.update", "jobs.rights.ok", "jobs.rights.fail", CALL_TIMEOUT_MS, true),
    spec!("user.create", "user.create.ok", "user.create.fail", CALL_TIMEOUT_MS, true),
    spec!("user.delete", "user.delete.ok", "user.delete.fail", CALL_TIMEOUT_MS, true),
    spec!("group.create", "group.create.ok", "group.create.fail", CALL_TIMEOUT_MS, true),
    spec!("group.delete", "group.delete.ok", "group.delete.fail", CALL_TIMEOUT_MS, true),
    spec!("group.logo", "group.logo.ok", "group.logo.fail", CALL_TIMEOUT_MS, true),
    spec!("session.logout", "session.logout.ok", "session.logout.fail", CALL_TIMEOUT_MS, true),
];

/// Look up the spec for an outbound call kind.
pub fn spec_for(kind: &str) -> Option<&'static CallSpec> {
    CALL_TABLE.iter().find(|s| s.kind == kind)
}
