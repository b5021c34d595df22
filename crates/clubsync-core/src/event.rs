//! Domain taxonomy and broadcast events.
//!
//! Every unsolicited server message belongs to one domain. The client fans
//! events out per domain without interpreting entity fields; the only
//! semantics it owns are snapshot-replace and idempotent delta application,
//! captured here in [`DomainState`] so collaborators and tests share one
//! implementation.

use serde_json::Value;

/// Independent broadcast domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Membership entries for the selected group.
    Membership,
    /// Roster (DJ) entries.
    Roster,
    /// Schedule (shift) entries.
    Schedule,
    /// Job role/rights tables.
    Rights,
    /// User directory entries.
    Users,
    /// Group metadata: logo, ownership, member join/leave.
    Group,
    /// Fire-and-forget server announcements.
    Broadcast,
}

impl Domain {
    /// All domains, in fan-out registration order.
    pub const ALL: &'static [Domain] = &[
        Domain::Membership,
        Domain::Roster,
        Domain::Schedule,
        Domain::Rights,
        Domain::Users,
        Domain::Group,
        Domain::Broadcast,
    ];

    /// Wire prefix of this domain's `*.snapshot` / `*.update` messages.
    pub fn wire_prefix(self) -> &'static str {
        match self {
            Domain::Membership => "membership",
            Domain::Roster => "dj",
            Domain::Schedule => "shift",
            Domain::Rights => "jobs.rights",
            Domain::Users => "user",
            Domain::Group => "group",
            Domain::Broadcast => "server",
        }
    }

    /// Reverse lookup by wire prefix.
    pub fn from_wire(prefix: &str) -> Option<Domain> {
        Domain::ALL.iter().copied().find(|d| d.wire_prefix() == prefix)
    }
}

/// One broadcast event within a domain. Transient: the client dispatches and
/// forgets; storage is a collaborator's responsibility.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// Full replace of the domain's entity set, in wire order.
    Snapshot(Vec<Value>),
    /// One entity added.
    Added(Value),
    /// One entity updated.
    Updated(Value),
    /// One entity removed, by id.
    Removed(String),
    /// A user joined the group (Group domain).
    MemberJoined { username: String, group_id: String },
    /// A user left the group (Group domain).
    MemberLeft { username: String, group_id: String },
    /// Server announcement text (Broadcast domain).
    Announcement(String),
}

/// Ordered entity set with snapshot-replace and idempotent delta semantics.
///
/// Entities are matched by a string id field (`"id"` unless overridden).
/// Applying the same delta twice leaves the state identical to applying it
/// once; an add for an existing id behaves as an update.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    id_field: Option<&'static str>,
    entries: Vec<Value>,
}

const DEFAULT_ID_FIELD: &str = "id";

impl DomainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State whose entities are keyed by a non-default id field.
    pub fn keyed_by(id_field: &'static str) -> Self {
        Self {
            id_field: Some(id_field),
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn id_of<'a>(&self, entity: &'a Value) -> Option<&'a str> {
        entity
            .get(self.id_field.unwrap_or(DEFAULT_ID_FIELD))
            .and_then(Value::as_str)
    }

    fn position_of(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| self.id_of(e) == Some(id))
    }

    /// Apply one event. Non-entity events (join/leave, announcements) do not
    /// touch the entity set.
    pub fn apply(&mut self, event: &DomainEvent) {
        match event {
            DomainEvent::Snapshot(entries) => {
                self.entries = entries.clone();
            }
            DomainEvent::Added(entity) | DomainEvent::Updated(entity) => {
                match self.id_of(entity).and_then(|id| self.position_of(id)) {
                    Some(i) => self.entries[i] = entity.clone(),
                    None => self.entries.push(entity.clone()),
                }
            }
            DomainEvent::Removed(id) => {
                if let Some(i) = self.position_of(id) {
                    self.entries.remove(i);
                }
            }
            DomainEvent::MemberJoined { .. }
            | DomainEvent::MemberLeft { .. }
            | DomainEvent::Announcement(_) => {}
        }
    }
}
