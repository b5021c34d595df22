use serde::Deserialize;
use url::Url;

use clubsync_core::error::{Result, SyncError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    pub server: ServerSection,

    #[serde(default)]
    pub connection: ConnectionSection,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(SyncError::Config("unsupported config version".into()));
        }
        self.server.validate()?;
        self.connection.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Base URL of the coordination service. http/https are mapped to ws/wss.
    pub url: String,
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        self.endpoint(None).map(|_| ())
    }

    /// The `ws(s)://<host>/ws[?groupId=<id>]` endpoint for one connection.
    pub fn endpoint(&self, group_id: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| SyncError::Config(format!("server.url invalid: {e}")))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(SyncError::Config(format!(
                    "server.url scheme must be http(s) or ws(s), got {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| SyncError::Config("server.url scheme rewrite failed".into()))?;
        if url.path() == "/" || url.path().is_empty() {
            url.set_path("/ws");
        }
        url.set_query(None);
        if let Some(group) = group_id {
            url.query_pairs_mut().append_pair("groupId", group);
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSection {
    /// Health probe period while the connection is open.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Overrides the per-kind call deadline when set.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,

    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,

    /// Depth of the single outbound write queue.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// Per-domain event fan-out buffer.
    #[serde(default = "default_event_queue")]
    pub event_queue: usize,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
            call_timeout_ms: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            outbound_queue: default_outbound_queue(),
            event_queue: default_event_queue(),
        }
    }
}

impl ConnectionSection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=120_000).contains(&self.probe_interval_ms) {
            return Err(SyncError::Config(
                "connection.probe_interval_ms must be between 1000 and 120000".into(),
            ));
        }
        if let Some(t) = self.call_timeout_ms {
            if !(100..=60_000).contains(&t) {
                return Err(SyncError::Config(
                    "connection.call_timeout_ms must be between 100 and 60000".into(),
                ));
            }
        }
        if !(500..=60_000).contains(&self.connect_timeout_ms) {
            return Err(SyncError::Config(
                "connection.connect_timeout_ms must be between 500 and 60000".into(),
            ));
        }
        if !(100..=self.reconnect_cap_ms).contains(&self.reconnect_initial_ms) {
            return Err(SyncError::Config(
                "connection.reconnect_initial_ms must be between 100 and reconnect_cap_ms".into(),
            ));
        }
        if self.reconnect_cap_ms > 60_000 {
            return Err(SyncError::Config(
                "connection.reconnect_cap_ms must not exceed 60000".into(),
            ));
        }
        if !(1..=100).contains(&self.reconnect_max_attempts) {
            return Err(SyncError::Config(
                "connection.reconnect_max_attempts must be between 1 and 100".into(),
            ));
        }
        if self.outbound_queue < 16 || self.event_queue < 16 {
            return Err(SyncError::Config(
                "connection queues must hold at least 16 messages".into(),
            ));
        }
        Ok(())
    }
}

fn default_probe_interval_ms() -> u64 {
    30_000
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_reconnect_initial_ms() -> u64 {
    1_000
}
fn default_reconnect_cap_ms() -> u64 {
    8_000
}
fn default_reconnect_max_attempts() -> u32 {
    12
}
fn default_outbound_queue() -> usize {
    1024
}
fn default_event_queue() -> usize {
    256
}
