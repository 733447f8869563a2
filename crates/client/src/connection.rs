//! Connection management: socket lifetime, liveness, reconnection.
//!
//! A [`Connection`] owns the TCP stream (and Noise session, when
//! configured) for one device and exposes a typed send/receive interface
//! to the layer above. One spawned task per live socket serializes reads,
//! the ping cadence, and the pong deadline through a single `select!`
//! loop; lifecycle events fan out on a broadcast channel while inbound
//! application frames flow to the facade through an `mpsc` channel in
//! arrival order.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use esphome_proto::framing::Frame;
use esphome_proto::messages::MessageType;
use esphome_proto::ApiMessage;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::ApiError;
use crate::transport::{self, FrameSink, FrameSource};

/// Backoff before the second initial-connect attempt.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Cap on the initial-connect backoff.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Initial-connect attempts when the reconnect policy is enabled.
pub const INITIAL_CONNECT_ATTEMPTS: u32 = 3;

/// Buffer size for the inbound frame channel.
const FRAME_CHANNEL_SIZE: usize = 256;

/// Buffer size for the event broadcast channel.
const EVENT_CHANNEL_SIZE: usize = 64;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket, nothing in progress.
    Idle,
    /// Dialing and, when configured, running the Noise handshake.
    Connecting,
    /// Socket established; frames flow.
    Open,
    /// Lost unexpectedly; retrying at the reconnect interval.
    Reconnecting,
    /// Permanently shut down.
    Destroyed,
}

/// Protocol version advertised by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

/// Snapshot of the per-socket connection record.
///
/// Monotonic within a single TCP lifetime; reset on each new socket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionInfo {
    /// Whether a socket is currently established.
    pub connected: bool,
    /// Whether the handshake and authentication completed on this socket.
    pub authenticated: bool,
    /// Version negotiated in the hello exchange.
    pub api_version: Option<ApiVersion>,
    /// Server description from the hello exchange.
    pub server_info: Option<String>,
}

/// Events emitted by a connection.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A socket was established (and the Noise handshake, if configured,
    /// completed). `reconnection` is true when the reconnect loop opened it.
    Connected { reconnection: bool },
    /// The socket went away. `expected` covers local teardown and
    /// device-requested disconnects.
    Disconnected {
        expected: bool,
        reason: Option<String>,
    },
    /// The connection record changed.
    StateChange(ConnectionInfo),
    /// A fatal protocol fault was observed on the socket.
    Error(String),
}

/// How a socket task ended.
enum SocketEnd {
    /// Cancelled locally (disconnect or destroy).
    LocalClose,
    /// The device asked to disconnect.
    PeerRequested(String),
    /// Unexpected loss: socket error, EOF, protocol fault, ping timeout.
    Lost(String),
}

enum FrameOutcome {
    Handled,
    Forwarded,
    Close { expected: bool, reason: String },
}

/// A managed connection to one device.
///
/// Cheap to clone; all clones share the same underlying state.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

struct Shared {
    config: Arc<ConnectionConfig>,
    info: RwLock<ConnectionInfo>,
    lifecycle: RwLock<ConnectionState>,
    writer: Mutex<Option<FrameSink>>,
    events: broadcast::Sender<ConnectionEvent>,
    frame_tx: mpsc::Sender<Frame>,
    deep_sleep: AtomicBool,
    auto_reconnect: AtomicBool,
    destroyed: AtomicBool,
    expected_disconnect: AtomicBool,
    socket_cancel: Mutex<Option<CancellationToken>>,
    reconnect_cancel: Mutex<Option<CancellationToken>>,
    /// Serializes connection attempts so a manual connect and the
    /// reconnect loop never race on the socket slot.
    connect_lock: Mutex<()>,
    /// Bumped per socket; a finished socket task only tears down state
    /// that still belongs to its own generation.
    generation: AtomicU64,
}

impl Connection {
    /// Create a connection for `config`.
    ///
    /// Returns the connection and the inbound frame stream. Frames the
    /// connection handles itself (ping, disconnect) never appear on the
    /// stream; everything else is delivered in arrival order.
    pub fn new(config: Arc<ConnectionConfig>) -> (Self, mpsc::Receiver<Frame>) {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_SIZE);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let auto_reconnect = config.reconnect;
        let shared = Arc::new(Shared {
            config,
            info: RwLock::new(ConnectionInfo::default()),
            lifecycle: RwLock::new(ConnectionState::Idle),
            writer: Mutex::new(None),
            events,
            frame_tx,
            deep_sleep: AtomicBool::new(false),
            auto_reconnect: AtomicBool::new(auto_reconnect),
            destroyed: AtomicBool::new(false),
            expected_disconnect: AtomicBool::new(false),
            socket_cancel: Mutex::new(None),
            reconnect_cancel: Mutex::new(None),
            connect_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        });
        (Self { shared }, frame_rx)
    }

    /// The configuration this connection was built with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Subscribe to connection events.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Establish the socket (TCP plus the Noise handshake when a key is
    /// configured).
    ///
    /// With the reconnect policy enabled this makes up to
    /// [`INITIAL_CONNECT_ATTEMPTS`] attempts with exponential backoff;
    /// otherwise a single attempt. Handshake and crypto failures are not
    /// retried.
    pub async fn connect(&self) -> Result<(), ApiError> {
        let shared = &self.shared;
        if shared.destroyed.load(Ordering::SeqCst) {
            return Err(ApiError::Destroyed);
        }
        // A manual connect supersedes any reconnect loop in flight.
        if let Some(token) = shared.reconnect_cancel.lock().await.take() {
            token.cancel();
        }
        let _attempt = shared.connect_lock.lock().await;
        if shared.info.read().await.connected {
            return Ok(());
        }

        let attempts = if shared.config.reconnect {
            INITIAL_CONNECT_ATTEMPTS
        } else {
            1
        };
        let mut backoff = INITIAL_BACKOFF;
        let mut last_err = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            match shared.open_socket(false).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(attempt, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
                Err(e) => {
                    shared.set_lifecycle(ConnectionState::Idle).await;
                    return Err(e);
                }
            }
        }
        shared.set_lifecycle(ConnectionState::Idle).await;
        Err(last_err.unwrap_or(ApiError::NotConnected))
    }

    /// Frame and transmit one message.
    ///
    /// Requires an open socket; message types outside the
    /// hello/connect/disconnect/ping set additionally require completed
    /// authentication and produce no bytes on the wire otherwise.
    pub async fn send(&self, msg_type: MessageType, payload: &[u8]) -> Result<(), ApiError> {
        self.shared.send_checked(msg_type, payload).await
    }

    /// Encode and transmit one typed message.
    pub async fn send_message(&self, msg: &ApiMessage) -> Result<(), ApiError> {
        self.shared
            .send_checked(msg.message_type(), &msg.encode())
            .await
    }

    /// Orderly local teardown. Idempotent; suppresses auto-reconnect.
    pub async fn disconnect(&self) {
        let shared = &self.shared;
        if let Some(token) = shared.reconnect_cancel.lock().await.take() {
            token.cancel();
        }
        shared.expected_disconnect.store(true, Ordering::SeqCst);
        shared.teardown(true, None, None).await;
        if !shared.destroyed.load(Ordering::SeqCst) {
            shared.set_lifecycle(ConnectionState::Idle).await;
        }
    }

    /// Permanent shutdown. Subsequent `connect()` fails with
    /// [`ApiError::Destroyed`].
    pub async fn destroy(&self) {
        let shared = &self.shared;
        shared.destroyed.store(true, Ordering::SeqCst);
        shared.auto_reconnect.store(false, Ordering::SeqCst);
        if let Some(token) = shared.reconnect_cancel.lock().await.take() {
            token.cancel();
        }
        shared.expected_disconnect.store(true, Ordering::SeqCst);
        shared.teardown(true, None, None).await;
        shared.set_lifecycle(ConnectionState::Destroyed).await;
    }

    /// Whether a socket is currently established.
    pub fn is_connected(&self) -> bool {
        match self.shared.info.try_read() {
            Ok(info) => info.connected,
            Err(_) => false,
        }
    }

    /// Whether authentication completed on the current socket.
    pub fn is_authenticated(&self) -> bool {
        match self.shared.info.try_read() {
            Ok(info) => info.authenticated,
            Err(_) => false,
        }
    }

    /// Snapshot of the connection record.
    pub async fn info(&self) -> ConnectionInfo {
        self.shared.info.read().await.clone()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        *self.shared.lifecycle.read().await
    }

    /// Mark authentication complete (or reset it).
    pub async fn set_authenticated(&self, authenticated: bool) {
        self.shared
            .update_info(|info| info.authenticated = authenticated)
            .await;
    }

    /// Record the version negotiated in the hello exchange.
    pub async fn set_api_version(&self, major: u32, minor: u32) {
        self.shared
            .update_info(|info| info.api_version = Some(ApiVersion { major, minor }))
            .await;
    }

    /// Record the server description from the hello exchange.
    pub async fn set_server_info(&self, server_info: String) {
        self.shared
            .update_info(|info| info.server_info = Some(server_info))
            .await;
    }

    /// Enable or disable deep-sleep mode.
    ///
    /// While enabled the ping loop is suppressed entirely; the device owns
    /// the connection cadence.
    pub fn set_deep_sleep_mode(&self, enabled: bool) {
        self.shared.deep_sleep.store(enabled, Ordering::SeqCst);
        if enabled {
            debug!("deep-sleep mode enabled, suppressing pings");
        }
    }
}

impl Shared {
    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn set_lifecycle(&self, state: ConnectionState) {
        let mut lifecycle = self.lifecycle.write().await;
        // Destroyed is terminal.
        if *lifecycle == ConnectionState::Destroyed && state != ConnectionState::Destroyed {
            return;
        }
        if *lifecycle != state {
            trace!(from = ?*lifecycle, to = ?state, "lifecycle transition");
            *lifecycle = state;
        }
    }

    async fn update_info(&self, apply: impl FnOnce(&mut ConnectionInfo)) {
        let snapshot = {
            let mut info = self.info.write().await;
            apply(&mut *info);
            info.clone()
        };
        self.emit(ConnectionEvent::StateChange(snapshot));
    }

    /// Dial, install the sink, and spawn the socket task.
    ///
    /// Written as a boxed future rather than plain `async fn`: this
    /// function spawns `run_socket`, which on disconnect spawns the
    /// reconnect loop, which calls back into this function. That cycle
    /// through two `tokio::spawn` boundaries defeats rustc's opaque-type
    /// `Send` inference ("fetching the hidden types of an opaque inside
    /// of the defining scope is not supported"). Returning a concrete
    /// `Pin<Box<dyn Future + Send>>` here gives the recursive call site a
    /// fully resolved type to await instead of an opaque one, breaking
    /// the cycle.
    fn open_socket(
        self: &Arc<Self>,
        reconnection: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send + '_>> {
        Box::pin(async move {
            if self.destroyed.load(Ordering::SeqCst) {
                return Err(ApiError::Destroyed);
            }
            self.set_lifecycle(ConnectionState::Connecting).await;
            let (sink, source) = transport::establish(&self.config).await?;

            *self.writer.lock().await = Some(sink);
            self.expected_disconnect.store(false, Ordering::SeqCst);
            self.update_info(|info| {
                *info = ConnectionInfo {
                    connected: true,
                    ..ConnectionInfo::default()
                };
            })
            .await;
            self.set_lifecycle(ConnectionState::Open).await;

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let cancel = CancellationToken::new();
            *self.socket_cancel.lock().await = Some(cancel.clone());
            tokio::spawn(run_socket(Arc::clone(self), source, cancel, generation));

            debug!(host = %self.config.host, reconnection, "connected");
            self.emit(ConnectionEvent::Connected { reconnection });
            Ok(())
        })
    }

    async fn send_checked(&self, msg_type: MessageType, payload: &[u8]) -> Result<(), ApiError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(ApiError::Destroyed);
        }
        {
            let info = self.info.read().await;
            if !info.connected {
                return Err(ApiError::NotConnected);
            }
            if !info.authenticated && !msg_type.allowed_before_auth() {
                return Err(ApiError::AuthenticationRequired {
                    message_type: msg_type,
                });
            }
        }
        self.send_raw(msg_type, payload).await
    }

    /// Transmit without the authentication gate. Used by the socket task
    /// for ping and disconnect replies.
    async fn send_raw(&self, msg_type: MessageType, payload: &[u8]) -> Result<(), ApiError> {
        let mut guard = self.writer.lock().await;
        let sink = guard.as_mut().ok_or(ApiError::NotConnected)?;
        sink.send(msg_type.into(), payload).await
    }

    /// Close the socket and reset the record. Returns whether this call
    /// performed the teardown (guards against double events).
    ///
    /// When `generation` is given, the teardown is skipped if a newer
    /// socket has been opened since.
    async fn teardown(
        &self,
        expected: bool,
        reason: Option<String>,
        generation: Option<u64>,
    ) -> bool {
        if let Some(generation) = generation {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
        }
        if let Some(token) = self.socket_cancel.lock().await.take() {
            token.cancel();
        }
        *self.writer.lock().await = None;

        let was_connected = {
            let mut info = self.info.write().await;
            let was = info.connected;
            *info = ConnectionInfo::default();
            was
        };
        if was_connected {
            self.emit(ConnectionEvent::StateChange(ConnectionInfo::default()));
            self.emit(ConnectionEvent::Disconnected { expected, reason });
        }
        was_connected
    }

    async fn handle_frame(
        &self,
        frame: Frame,
        pong_deadline: &mut Option<tokio::time::Instant>,
    ) -> FrameOutcome {
        match MessageType::try_from(frame.msg_type) {
            Ok(MessageType::PingRequest) => {
                trace!("answering device ping");
                match self.send_raw(MessageType::PingResponse, &[]).await {
                    Ok(()) => FrameOutcome::Handled,
                    Err(e) => FrameOutcome::Close {
                        expected: false,
                        reason: format!("failed to answer ping: {e}"),
                    },
                }
            }
            Ok(MessageType::PingResponse) => {
                *pong_deadline = None;
                FrameOutcome::Handled
            }
            Ok(MessageType::DisconnectRequest) => {
                let _ = self.send_raw(MessageType::DisconnectResponse, &[]).await;
                self.expected_disconnect.store(true, Ordering::SeqCst);
                if self.deep_sleep.load(Ordering::SeqCst) {
                    debug!("deep-sleep device disconnecting; auto-reconnect disabled");
                    self.auto_reconnect.store(false, Ordering::SeqCst);
                }
                FrameOutcome::Close {
                    expected: true,
                    reason: "device requested disconnect".to_string(),
                }
            }
            _ => {
                if self.frame_tx.send(frame).await.is_err() {
                    trace!("frame receiver dropped, discarding inbound message");
                }
                FrameOutcome::Forwarded
            }
        }
    }

    /// Retry at the reconnect interval until a socket opens or the
    /// connection is destroyed.
    async fn spawn_reconnect(self: Arc<Self>) {
        let token = CancellationToken::new();
        *self.reconnect_cancel.lock().await = Some(token.clone());
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.config.reconnect_interval) => {}
                }
                let _attempt = self.connect_lock.lock().await;
                if self.destroyed.load(Ordering::SeqCst)
                    || !self.auto_reconnect.load(Ordering::SeqCst)
                    || self.info.read().await.connected
                {
                    break;
                }
                match self.open_socket(true).await {
                    Ok(()) => break,
                    Err(e) => {
                        debug!(error = %e, "reconnect attempt failed");
                        self.set_lifecycle(ConnectionState::Reconnecting).await;
                    }
                }
            }
        });
    }
}

/// Per-socket task: reads, ping cadence, pong deadline, cancellation.
///
/// Every timer arm rechecks connection state on entry, so a callback that
/// fires after teardown is a no-op.
async fn run_socket(
    shared: Arc<Shared>,
    mut source: FrameSource,
    cancel: CancellationToken,
    generation: u64,
) {
    let mut ping = tokio::time::interval(shared.config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval() fires immediately; the first real tick is one period out.
    ping.tick().await;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let end = loop {
        tokio::select! {
            _ = cancel.cancelled() => break SocketEnd::LocalClose,

            _ = ping.tick() => {
                if shared.deep_sleep.load(Ordering::SeqCst) || pong_deadline.is_some() {
                    continue;
                }
                match shared.send_raw(MessageType::PingRequest, &[]).await {
                    Ok(()) => {
                        pong_deadline =
                            Some(tokio::time::Instant::now() + shared.config.ping_timeout);
                    }
                    Err(e) => break SocketEnd::Lost(format!("ping send failed: {e}")),
                }
            }

            _ = sleep_until_opt(pong_deadline) => {
                warn!(timeout = ?shared.config.ping_timeout, "ping timed out");
                break SocketEnd::Lost("ping timeout".to_string());
            }

            result = source.next_frames() => match result {
                Ok(Some(frames)) => {
                    let mut close = None;
                    for frame in frames {
                        match shared.handle_frame(frame, &mut pong_deadline).await {
                            FrameOutcome::Handled | FrameOutcome::Forwarded => {}
                            FrameOutcome::Close { expected, reason } => {
                                close = Some((expected, reason));
                                break;
                            }
                        }
                    }
                    if let Some((expected, reason)) = close {
                        break if expected {
                            SocketEnd::PeerRequested(reason)
                        } else {
                            SocketEnd::Lost(reason)
                        };
                    }
                }
                Ok(None) => break SocketEnd::Lost("connection closed by device".to_string()),
                Err(e) => {
                    shared.emit(ConnectionEvent::Error(e.to_string()));
                    break SocketEnd::Lost(e.to_string());
                }
            }
        }
    };

    finish_socket(shared, end, generation).await;
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn finish_socket(shared: Arc<Shared>, end: SocketEnd, generation: u64) {
    let (mut expected, reason) = match end {
        SocketEnd::LocalClose => (true, None),
        SocketEnd::PeerRequested(reason) => (true, Some(reason)),
        SocketEnd::Lost(reason) => (false, Some(reason)),
    };
    expected = expected || shared.expected_disconnect.load(Ordering::SeqCst);

    // Another path (disconnect/destroy, or a newer socket) may own the
    // state already; it owns the reconnect policy then.
    if !shared.teardown(expected, reason, Some(generation)).await {
        return;
    }

    if !expected
        && shared.auto_reconnect.load(Ordering::SeqCst)
        && !shared.destroyed.load(Ordering::SeqCst)
    {
        shared.set_lifecycle(ConnectionState::Reconnecting).await;
        Shared::spawn_reconnect(Arc::clone(&shared)).await;
    } else if !shared.destroyed.load(Ordering::SeqCst) {
        shared.set_lifecycle(ConnectionState::Idle).await;
    }
}
