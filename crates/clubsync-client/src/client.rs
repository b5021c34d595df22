//! Connection supervisor and the public client surface.
//!
//! One `SyncClient` owns one socket. The supervisor serializes every state
//! transition: a mutual-exclusion gate makes connect attempts single-flight,
//! the receive loop reports back through a generation counter so a stale
//! loop can never clobber a newer connection, and explicit `disconnect`
//! deterministically tears down every dependent task and disables automatic
//! reconnection until the next explicit `connect`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use clubsync_core::error::{Result, SyncError};
use clubsync_core::event::{Domain, DomainEvent};
use clubsync_core::protocol::{calls, CallSpec, Envelope};

use crate::config::ClientConfig;
use crate::correlate::{CallOutcome, Correlator};
use crate::events::EventBus;
use crate::router::Router;
use crate::session::{SessionCell, SessionContext};
use crate::transport::{self, ErrorThrottle};

/// Connection lifecycle. Exactly one state is active at a time; transitions
/// are serialized through the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Handles of one live connection.
struct Link {
    writer: mpsc::Sender<Message>,
    writer_task: JoinHandle<()>,
    reader_task: JoinHandle<()>,
    probe_task: JoinHandle<()>,
}

struct Inner {
    cfg: ClientConfig,
    correlator: Arc<Correlator>,
    bus: Arc<EventBus>,
    router: Arc<Router>,
    session: SessionCell,
    state_tx: watch::Sender<ConnectionState>,
    /// Single-flight gate for connect attempts.
    connect_gate: tokio::sync::Mutex<()>,
    /// Cleared by explicit disconnect; nothing reconnects while false.
    auto_reconnect: AtomicBool,
    /// At most one reconnect loop at a time.
    reconnect_running: AtomicBool,
    /// Bumped on every establish and on disconnect; background tasks carry
    /// the value they were spawned under and stand down when it moves on.
    generation: AtomicU64,
    link: Mutex<Option<Link>>,
    read_throttle: Arc<ErrorThrottle>,
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        });
    }

    fn take_link(&self) -> Option<Link> {
        self.link.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    fn writer(&self) -> Option<mpsc::Sender<Message>> {
        self.link
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|l| l.writer.clone())
    }

    /// Write one envelope through the single send path.
    async fn send(&self, env: Envelope) -> Result<()> {
        let text = env.encode()?;
        let writer = self
            .writer()
            .ok_or_else(|| SyncError::Transport("not connected".into()))?;
        writer
            .send(Message::Text(text))
            .await
            .map_err(|_| SyncError::Transport("connection closed while sending".into()))
    }

    /// Issue one correlated call: register, write, await resolution up to
    /// the deadline. A timeout resolves only this caller and never touches
    /// connection state.
    async fn call(&self, spec: &'static CallSpec, mut env: Envelope) -> Result<Map<String, Value>> {
        if spec.needs_token {
            if let Some(token) = self.session.token() {
                env = env.token(&token);
            }
        }
        let timeout_ms = self.cfg.connection.call_timeout_ms.unwrap_or(spec.timeout_ms);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);

        let (call_id, rx) = self.correlator.register(spec);
        if let Err(e) = self.send(env).await {
            self.correlator.forget(spec.kind, call_id);
            return Err(e);
        }

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(CallOutcome::Ok(fields))) => Ok(fields),
            Ok(Ok(CallOutcome::Rejected { message })) => Err(SyncError::Rejected(message)),
            Ok(Err(_overwritten)) => {
                // A newer call of the same kind took the pending slot; this
                // caller resolves only through its own deadline.
                tokio::time::sleep_until(deadline).await;
                Err(SyncError::Timeout)
            }
            Err(_) => {
                self.correlator.forget(spec.kind, call_id);
                Err(SyncError::Timeout)
            }
        }
    }
}

/// Establish the transport and start its tasks. Caller holds the connect gate.
async fn establish(inner: &Arc<Inner>) -> Result<()> {
    // Build the endpoint before any state transition so a bad URL cannot
    // strand the machine in Connecting.
    let endpoint = inner
        .cfg
        .server
        .endpoint(inner.session.group_id().as_deref())?;
    inner.set_state(ConnectionState::Connecting);

    let stream = match transport::connect(
        &endpoint,
        Duration::from_millis(inner.cfg.connection.connect_timeout_ms),
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            inner.set_state(ConnectionState::Disconnected);
            return Err(e);
        }
    };

    let (sink, stream) = stream.split();
    let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
    let (writer, writer_task) = transport::spawn_writer(sink, inner.cfg.connection.outbound_queue);

    let reader_task = {
        let inner = Arc::clone(inner);
        let writer = writer.clone();
        tokio::spawn(async move {
            let exit = transport::receive_loop(
                stream,
                Arc::clone(&inner.router),
                writer,
                Arc::clone(&inner.read_throttle),
            )
            .await;
            on_link_down(&inner, generation, exit);
        })
    };

    let probe_task = {
        let inner = Arc::clone(inner);
        let writer = writer.clone();
        tokio::spawn(async move {
            probe_loop(inner, generation, writer).await;
        })
    };

    let old = inner
        .link
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .replace(Link {
            writer,
            writer_task,
            reader_task,
            probe_task,
        });
    if let Some(old) = old {
        old.probe_task.abort();
        old.reader_task.abort();
        old.writer_task.abort();
    }

    inner.set_state(ConnectionState::Open);
    inner.bus.set_connected(true);
    tracing::info!(url = %endpoint, "connection open");
    Ok(())
}

/// Receive-loop exit handler. A stale generation means a newer connection
/// (or an explicit disconnect) already took over; stand down silently.
fn on_link_down(inner: &Arc<Inner>, generation: u64, exit: transport::LoopExit) {
    if inner.generation.load(Ordering::SeqCst) != generation {
        return;
    }
    inner.set_state(ConnectionState::Disconnected);
    inner.bus.set_connected(false);
    tracing::info!(?exit, "connection lost");
    if inner.auto_reconnect.load(Ordering::SeqCst) {
        spawn_reconnect(inner);
    }
}

/// Periodic liveness probe. Checks transport health without generating
/// traffic: the state machine plus the writer queue tell whether the socket
/// is still attached. Two consecutive failures force a disconnect
/// notification and one reconnect loop.
async fn probe_loop(inner: Arc<Inner>, generation: u64, writer: mpsc::Sender<Message>) {
    let mut tick =
        tokio::time::interval(Duration::from_millis(inner.cfg.connection.probe_interval_ms));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tick.tick().await; // first tick completes immediately

    let mut failures = 0u32;
    loop {
        tick.tick().await;
        if inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let state = inner.state();
        let alive = matches!(
            state,
            ConnectionState::Open | ConnectionState::Connecting
        ) && !writer.is_closed();
        if alive {
            failures = 0;
            continue;
        }
        failures += 1;
        tracing::warn!(failures, ?state, "health probe failed");
        if failures >= 2 {
            inner.set_state(ConnectionState::Disconnected);
            inner.bus.set_connected(false);
            if inner.auto_reconnect.load(Ordering::SeqCst) {
                spawn_reconnect(&inner);
            }
            return;
        }
    }
}

/// Start the reconnect loop unless one is already running (idempotent).
fn spawn_reconnect(inner: &Arc<Inner>) {
    if inner.reconnect_running.swap(true, Ordering::SeqCst) {
        return;
    }
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        reconnect_loop(&inner).await;
        inner.reconnect_running.store(false, Ordering::SeqCst);
    });
}

/// Bounded, backing-off retry. Gives up silently after the attempt cap,
/// leaving the connection down until an explicit connect.
async fn reconnect_loop(inner: &Arc<Inner>) {
    let cfg = &inner.cfg.connection;
    let initial = Duration::from_millis(cfg.reconnect_initial_ms);
    let cap = Duration::from_millis(cfg.reconnect_cap_ms);

    for attempt in 1..=cfg.reconnect_max_attempts {
        tokio::time::sleep(backoff(attempt, initial, cap)).await;
        if !inner.auto_reconnect.load(Ordering::SeqCst) {
            return; // explicit disconnect while waiting
        }
        if matches!(
            inner.state(),
            ConnectionState::Open | ConnectionState::Connecting
        ) {
            return;
        }
        // An explicit connect in flight owns the gate; defer to it.
        let Ok(_gate) = inner.connect_gate.try_lock() else {
            return;
        };
        match establish(inner).await {
            // The endpoint rebuild re-applies the selected group, so the
            // server replays that group's snapshots on its own.
            Ok(()) => return,
            Err(e) => tracing::warn!(attempt, error = %e, "reconnect attempt failed"),
        }
    }
    tracing::warn!(
        attempts = cfg.reconnect_max_attempts,
        "reconnect attempts exhausted; staying disconnected until an explicit connect"
    );
}

/// Delay before the n-th attempt (1-based): `initial * 2^(n-1)`, capped.
fn backoff(attempt: u32, initial: Duration, cap: Duration) -> Duration {
    let factor = 1u32 << (attempt - 1).min(16);
    (initial * factor).min(cap)
}

/// Resilient, single-socket duplex synchronization client.
///
/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<Inner>,
}

impl SyncClient {
    pub fn new(cfg: ClientConfig) -> Result<Self> {
        cfg.validate()?;
        let correlator = Arc::new(Correlator::new());
        let bus = Arc::new(EventBus::new(cfg.connection.event_queue));
        let router = Arc::new(Router::new(Arc::clone(&correlator), Arc::clone(&bus)));
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            inner: Arc::new(Inner {
                cfg,
                correlator,
                bus,
                router,
                session: SessionCell::new(),
                state_tx,
                connect_gate: tokio::sync::Mutex::new(()),
                auto_reconnect: AtomicBool::new(false),
                reconnect_running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                link: Mutex::new(None),
                read_throttle: Arc::new(ErrorThrottle::new(Duration::from_secs(10))),
            }),
        })
    }

    // --------------------
    // Lifecycle
    // --------------------

    /// Establish the connection. Fails fast (returns false) if another
    /// connect attempt is in flight; returns true immediately if already
    /// open. Success re-enables automatic reconnection.
    pub async fn connect(&self) -> bool {
        let inner = &self.inner;
        let Ok(_gate) = inner.connect_gate.try_lock() else {
            tracing::debug!("connect already in progress");
            return false;
        };
        if inner.state() == ConnectionState::Open {
            return true;
        }
        inner.auto_reconnect.store(true, Ordering::SeqCst);
        match establish(inner).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "connect failed");
                false
            }
        }
    }

    /// Cooperative teardown: cancels the probe and any reconnect loop,
    /// closes the socket gracefully, and disables automatic reconnection
    /// until the next explicit [`connect`](Self::connect).
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.auto_reconnect.store(false, Ordering::SeqCst);
        let _gate = inner.connect_gate.lock().await;
        // Invalidate every task spawned under the old generation.
        inner.generation.fetch_add(1, Ordering::SeqCst);
        inner.set_state(ConnectionState::Closing);
        if let Some(link) = inner.take_link() {
            link.probe_task.abort();
            // Graceful close: the writer task writes the frame and exits.
            let _ = link.writer.send(Message::Close(None)).await;
            link.reader_task.abort();
        }
        inner.set_state(ConnectionState::Disconnected);
        inner.bus.set_connected(false);
        tracing::info!("disconnected");
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Observe connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Connectivity-changed(true/false) notifications.
    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.inner.bus.connectivity()
    }

    /// Subscribe to one domain's snapshot/delta events. Dropping the
    /// receiver unsubscribes.
    pub fn subscribe(&self, domain: Domain) -> broadcast::Receiver<DomainEvent> {
        self.inner.bus.subscribe(domain)
    }

    /// Most recent server rejection message. Last-write-wins, diagnostic
    /// only; not authoritative for any specific call.
    pub fn last_error(&self) -> Option<String> {
        self.inner.correlator.last_error()
    }

    pub fn session(&self) -> SessionContext {
        self.inner.session.snapshot()
    }

    /// Re-supply a persisted credential and group across restarts.
    pub fn restore_session(&self, token: Option<String>, group_id: Option<String>) {
        self.inner.session.set_token(token);
        self.inner.session.set_group(group_id);
    }

    // --------------------
    // Correlated calls
    // --------------------

    /// Issue any correlated call from the call table.
    pub async fn call(&self, kind: &str, fields: Map<String, Value>) -> Result<Map<String, Value>> {
        let spec = calls::spec_for(kind)
            .ok_or_else(|| SyncError::Protocol(format!("unknown call kind: {kind}")))?;
        let env = Envelope {
            kind: spec.kind.to_string(),
            fields,
        };
        self.inner.call(spec, env).await
    }

    /// Authenticate; stores the session token on success and returns it.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let spec = lookup("login.request")?;
        let env = Envelope::new(spec.kind)
            .field("username", username)
            .field("password", password);
        let fields = self.inner.call(spec, env).await?;
        let token = fields
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Protocol("login.ok missing token".into()))?
            .to_string();
        self.inner.session.set_token(Some(token.clone()));
        Ok(token)
    }

    pub async fn logout(&self) -> Result<()> {
        let spec = lookup("session.logout")?;
        self.inner.call(spec, Envelope::new(spec.kind)).await?;
        self.inner.session.set_token(None);
        Ok(())
    }

    /// Add one entity to the Membership, Roster, or Schedule domain.
    pub async fn add_entry(&self, domain: Domain, entry: Value) -> Result<()> {
        self.entity_call(domain, "add", entry).await
    }

    /// Update one entity in the Membership, Roster, or Schedule domain.
    pub async fn update_entry(&self, domain: Domain, entry: Value) -> Result<()> {
        self.entity_call(domain, "update", entry).await
    }

    /// Remove one entity by id from the Membership, Roster, or Schedule domain.
    pub async fn remove_entry(&self, domain: Domain, id: &str) -> Result<()> {
        let spec = domain_spec(domain, "remove")?;
        let env = Envelope::new(spec.kind).field("id", id);
        self.inner.call(spec, env).await.map(|_| ())
    }

    pub async fn update_rights(&self, name: &str, rights: Value) -> Result<()> {
        let spec = lookup("jobs.rights.update")?;
        let env = Envelope::new(spec.kind)
            .field("name", name)
            .field("rights", rights);
        self.inner.call(spec, env).await.map(|_| ())
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<()> {
        let spec = lookup("user.create")?;
        let env = Envelope::new(spec.kind)
            .field("username", username)
            .field("password", password);
        self.inner.call(spec, env).await.map(|_| ())
    }

    pub async fn delete_user(&self, username: &str) -> Result<()> {
        let spec = lookup("user.delete")?;
        let env = Envelope::new(spec.kind).field("username", username);
        self.inner.call(spec, env).await.map(|_| ())
    }

    pub async fn create_group(&self, name: &str) -> Result<()> {
        let spec = lookup("group.create")?;
        let env = Envelope::new(spec.kind).field("name", name);
        self.inner.call(spec, env).await.map(|_| ())
    }

    pub async fn delete_group(&self, group_id: &str) -> Result<()> {
        let spec = lookup("group.delete")?;
        let env = Envelope::new(spec.kind).field("groupId", group_id);
        self.inner.call(spec, env).await.map(|_| ())
    }

    pub async fn set_group_logo(&self, logo: &str) -> Result<()> {
        let spec = lookup("group.logo")?;
        let env = Envelope::new(spec.kind).field("logo", logo);
        self.inner.call(spec, env).await.map(|_| ())
    }

    async fn entity_call(&self, domain: Domain, op: &str, entry: Value) -> Result<()> {
        let spec = domain_spec(domain, op)?;
        let env = Envelope::new(spec.kind).field("entry", entry);
        self.inner.call(spec, env).await.map(|_| ())
    }

    // --------------------
    // Fire-and-forget
    // --------------------

    /// Select the group whose domain data this connection receives.
    /// Acknowledged by the server through subsequent snapshots, not a
    /// response envelope. The choice survives reconnects.
    pub async fn switch_group(&self, group_id: &str) -> Result<()> {
        self.inner.session.set_group(Some(group_id.to_string()));
        self.inner
            .send(Envelope::new("group.switch").field("groupId", group_id))
            .await
    }

    /// Fire-and-forget broadcast message to the group.
    pub async fn send_broadcast(&self, message: &str) -> Result<()> {
        let mut env = Envelope::new("broadcast.send").field("message", message);
        if let Some(token) = self.inner.session.token() {
            env = env.token(&token);
        }
        self.inner.send(env).await
    }
}

fn lookup(kind: &str) -> Result<&'static CallSpec> {
    calls::spec_for(kind)
        .ok_or_else(|| SyncError::Internal(format!("call table missing kind: {kind}")))
}

fn domain_spec(domain: Domain, op: &str) -> Result<&'static CallSpec> {
    let kind = format!("{}.{op}", domain.wire_prefix());
    calls::spec_for(&kind).ok_or_else(|| {
        SyncError::Protocol(format!("domain {domain:?} has no `{op}` call"))
    })
}
