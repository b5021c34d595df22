//! Socket plumbing around tokio-tungstenite.
//!
//! Responsibilities:
//! - Establish the connection with a bounded connect timeout
//! - Writer task: the sink half lives in one task fed by one queue, so all
//!   writes on a transport are causally ordered with no interleaving
//! - Receive loop: read frames until message boundaries, decode, hand the
//!   envelope to the router; exit only on close or read failure

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use clubsync_core::error::{Result, SyncError};
use clubsync_core::protocol::Envelope;

use crate::router::Router;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Establish the socket. Refused/unreachable/slow connects surface as
/// `SyncError::Transport` for the supervisor's retry policy.
pub async fn connect(url: &Url, timeout: Duration) -> Result<WsStream> {
    let attempt = connect_async(url.as_str());
    let (stream, _response) = tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| {
            SyncError::Transport(format!("connect timed out after {}ms", timeout.as_millis()))
        })?
        .map_err(|e| SyncError::Transport(format!("connect failed: {e}")))?;
    Ok(stream)
}

/// Spawn the writer task. The returned sender is the only way to write on
/// this transport; sending a close frame ends the task after the write.
pub fn spawn_writer(
    mut sink: SplitSink<WsStream, Message>,
    queue: usize,
) -> (mpsc::Sender<Message>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Message>(queue);
    let task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = sink.send(msg).await {
                tracing::debug!(error = %e, "outbound write failed, writer exiting");
                break;
            }
            if closing {
                break;
            }
        }
        let _ = sink.close().await;
    });
    (tx, task)
}

/// Why the receive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Server sent a close frame; it was acknowledged.
    ClosedByPeer,
    /// The stream ended or a read failed mid-stream.
    ReadFailed,
}

/// Coalesces repeated read-error logs into one line per window so sustained
/// network loss does not storm the log. Shared across reconnect cycles.
pub struct ErrorThrottle {
    window: Duration,
    state: Mutex<(Option<Instant>, u32)>,
}

impl ErrorThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new((None, 0)),
        }
    }

    pub fn log(&self, error: &dyn std::fmt::Display) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (last, suppressed) = &mut *guard;
        match *last {
            Some(at) if at.elapsed() < self.window => *suppressed += 1,
            _ => {
                tracing::warn!(error = %error, suppressed = *suppressed, "socket read error");
                *last = Some(Instant::now());
                *suppressed = 0;
            }
        }
    }
}

/// One loop per live transport. tungstenite reassembles fragmented frames;
/// this loop decodes complete text messages and routes them. A malformed
/// message is logged and skipped, never torn out of the loop.
pub async fn receive_loop(
    mut stream: SplitStream<WsStream>,
    router: Arc<Router>,
    writer: mpsc::Sender<Message>,
    throttle: Arc<ErrorThrottle>,
) -> LoopExit {
    while let Some(item) = stream.next().await {
        match item {
            Ok(Message::Text(text)) => match Envelope::decode(&text) {
                Ok(env) => {
                    router.route(env);
                }
                Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
            },
            Ok(Message::Ping(payload)) => {
                let _ = writer.send(Message::Pong(payload)).await;
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "server closed the connection");
                // Acknowledge the close handshake before tearing down.
                let _ = writer.send(Message::Close(None)).await;
                return LoopExit::ClosedByPeer;
            }
            // Pong / binary / raw frames carry no envelopes on this protocol.
            Ok(_) => {}
            Err(e) => {
                throttle.log(&e);
                return LoopExit::ReadFailed;
            }
        }
    }
    LoopExit::ReadFailed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_coalesces_within_window() {
        let t = ErrorThrottle::new(Duration::from_secs(10));
        t.log(&"boom");
        t.log(&"boom");
        t.log(&"boom");
        let guard = t.state.lock().unwrap();
        assert_eq!(guard.1, 2, "two repeats suppressed inside the window");
    }

    #[test]
    fn throttle_resets_after_window() {
        let t = ErrorThrottle::new(Duration::from_millis(0));
        t.log(&"boom");
        t.log(&"boom");
        let guard = t.state.lock().unwrap();
        assert_eq!(guard.1, 0, "zero-length window logs every error");
    }
}
