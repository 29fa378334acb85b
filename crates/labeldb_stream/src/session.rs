//! Websocket change-feed session.
//!
//! One session serves one client over a full-duplex, message-framed
//! transport with JSON payloads. The session owns exactly one reader loop
//! and, once started, one delivery task; they coordinate only through the
//! shared write lock and the stop flag.
//!
//! Lock discipline: the state lock (plain mutex, never held across an
//! await) guards the `stopped`/`streamer_started` flags; the write lock
//! (async mutex) guards the transport. Control handlers take state first,
//! then send; `send` takes only the write lock. The two are never acquired
//! in the opposite order.

use crate::control::{now_ns, ControlFrame, Latency};
use crate::error::{StreamError, StreamResult};
use crate::streamer::ChangeStreamer;
use actix_ws::{Message, MessageStream, Session};
use futures_util::StreamExt;
use labeldb_core::cdc::{now_ms, ChangeEvent};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for a single transport write.
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-session flags, guarded by the state lock.
#[derive(Debug, Default)]
struct SessionState {
    stopped: bool,
    streamer_started: bool,
}

impl SessionState {
    /// Marks the session streaming. Fails on a second start.
    fn begin_streaming(&mut self) -> StreamResult<()> {
        if self.streamer_started {
            return Err(StreamError::AlreadyStarted);
        }
        self.streamer_started = true;
        Ok(())
    }

    /// Marks the session stopped. Returns false if it already was.
    fn begin_stop(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.stopped = true;
        true
    }
}

/// One client's websocket subscription to the change feed.
///
/// The session is single-use: after `stop` (explicit, peer close, or any
/// fatal error) the client must open a new connection. All frames written
/// to the transport serialize on one write lock, so event delivery,
/// control replies, and server pings never interleave mid-frame.
#[derive(Clone)]
pub struct ChangeFeedSession {
    id: String,
    /// The write lock over the shared transport.
    transport: Arc<Mutex<Session>>,
    state: Arc<parking_lot::Mutex<SessionState>>,
    streamer: Arc<ChangeStreamer>,
    /// Single-slot channel for the pending server ping.
    ping_tx: mpsc::Sender<Latency>,
    ping_rx: Arc<Mutex<mpsc::Receiver<Latency>>>,
    write_timeout: Duration,
}

impl ChangeFeedSession {
    /// Creates a session over an upgraded websocket transport.
    pub fn new(
        id: impl Into<String>,
        transport: Session,
        streamer: ChangeStreamer,
        config: SessionConfig,
    ) -> Self {
        let (ping_tx, ping_rx) = mpsc::channel(1);
        Self {
            id: id.into(),
            transport: Arc::new(Mutex::new(transport)),
            state: Arc::new(parking_lot::Mutex::new(SessionState::default())),
            streamer: Arc::new(streamer),
            ping_tx,
            ping_rx: Arc::new(Mutex::new(ping_rx)),
            write_timeout: config.write_timeout,
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Runs the reader loop until the peer closes or a fatal error occurs.
    ///
    /// This is the session's single reader; spawn it once per connection.
    pub async fn run(self, mut frames: MessageStream) {
        debug!(session = %self.id, "reader loop started");
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let received_ns = now_ns();
                    let result = match serde_json::from_str::<ControlFrame>(&text) {
                        Ok(control) => self.control(control, received_ns).await,
                        Err(err) => Err(StreamError::protocol(format!(
                            "bad control message: {err}"
                        ))),
                    };
                    if let Err(err) = result {
                        self.send_error(&err).await;
                        break;
                    }
                }
                Ok(Message::Ping(bytes)) => {
                    // Transport-level ping, below the control protocol.
                    let mut transport = self.transport.lock().await;
                    if transport.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(reason)) => {
                    debug!(session = %self.id, ?reason, "peer closed");
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(session = %self.id, error = %err, "websocket protocol error");
                    break;
                }
            }
        }
        self.stop().await;
        debug!(session = %self.id, "reader loop finished");
    }

    /// Sends a server-initiated ping and waits up to `timeout` for the pong.
    ///
    /// Returns the empty latency when no pong arrives in time. At most one
    /// server ping is outstanding per session; extra pongs are discarded by
    /// the full result slot.
    pub async fn ping(&self, timeout: Duration) -> Latency {
        if self.send(&ControlFrame::Ping { src_ts: now_ns() }).await.is_err() {
            // Half-open connections surface on write, not read.
            self.stop().await;
            return Latency::default();
        }
        let mut slot = self.ping_rx.lock().await;
        match tokio::time::timeout(timeout, slot.recv()).await {
            Ok(Some(latency)) => latency,
            _ => {
                debug!(session = %self.id, "ping timed out");
                Latency::default()
            }
        }
    }

    /// Stops the session: the streamer's event stream closes, and the
    /// transport closes, which unblocks the reader. Idempotent.
    pub async fn stop(&self) {
        if !self.state.lock().begin_stop() {
            return;
        }
        debug!(session = %self.id, "session stopping");
        self.streamer.stop();
        let transport = self.transport.lock().await.clone();
        let _ = transport.close(None).await;
    }

    /// Handles one client control frame.
    async fn control(&self, frame: ControlFrame, received_ns: i64) -> StreamResult<()> {
        match frame {
            ControlFrame::Ping { src_ts } => {
                let latency_ms = (received_ns - src_ts) / 1_000_000;
                debug!(session = %self.id, latency_ms, "client ping");
                self.send(&ControlFrame::Pong {
                    src_ts,
                    dst_ts: received_ns,
                })
                .await
            }
            ControlFrame::Pong { src_ts, dst_ts } => {
                let _ = self
                    .ping_tx
                    .try_send(Latency::from_pong(src_ts, dst_ts, received_ns));
                Ok(())
            }
            ControlFrame::Start { start_ts, .. } => {
                self.state.lock().begin_streaming()?;
                let start_ms = start_ts.map_or_else(now_ms, |secs| secs.saturating_mul(1000));
                let events = self.streamer.start(start_ms)?;
                let session = self.clone();
                tokio::spawn(async move { session.deliver(events).await });
                self.send(&ControlFrame::start_ack()).await
            }
            ControlFrame::Error { error } => Err(StreamError::protocol(format!(
                "unexpected error frame from client: {error}"
            ))),
        }
    }

    /// Forwards streamer events to the client until the stream closes.
    async fn deliver(self, mut events: mpsc::Receiver<ChangeEvent>) {
        debug!(session = %self.id, "delivery started");
        while let Some(event) = events.recv().await {
            if self.send(&event).await.is_err() {
                break;
            }
        }
        // A closed stream is the streamer's completion signal; report the
        // cause if it ended abnormally.
        if let Some(err) = self.streamer.error() {
            self.send_error(&err).await;
        }
        self.stop().await;
        debug!(session = %self.id, "delivery finished");
    }

    /// Writes one JSON frame under the write lock and deadline.
    async fn send<T: Serialize>(&self, value: &T) -> StreamResult<()> {
        let text = serde_json::to_string(value)
            .map_err(|err| StreamError::protocol(format!("frame encoding failed: {err}")))?;
        let mut transport = self.transport.lock().await;
        match tokio::time::timeout(self.write_timeout, transport.text(text)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) | Err(_) => Err(StreamError::WebsocketClosed),
        }
    }

    /// Best-effort error frame; the peer may already be gone.
    async fn send_error(&self, err: &StreamError) {
        debug!(session = %self.id, error = %err, "error to client");
        let _ = self.send(&ControlFrame::error(err.to_string())).await;
    }
}
