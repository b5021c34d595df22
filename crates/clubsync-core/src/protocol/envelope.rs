//! Tagged JSON envelope (text frame).
//!
//! Fields past the `type` tag stay untyped: the client routes on the tag and
//! leaves field semantics to the caller or the subscribing collaborator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

/// One wire message: `{"type": "<verb>", ...fields}` in camelCase field names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Message type tag (field name is `type` in JSON).
    #[serde(rename = "type")]
    pub kind: String,
    /// Remaining payload, kept as untyped key/value pairs.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    /// Start a new envelope with the given type tag.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Attach one payload field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Attach the session token used by authenticated calls.
    pub fn token(self, token: &str) -> Self {
        self.field("token", token)
    }

    /// Borrow a string-typed field, if present.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Serialize to a single text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SyncError::Internal(format!("envelope encode failed: {e}")))
    }

    /// Parse an inbound text frame. A frame that is not a JSON object with a
    /// string `type` field is a protocol error, never a panic.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| SyncError::Protocol(format!("invalid envelope json: {e}")))
    }
}
