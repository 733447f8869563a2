//! High-level client facade.
//!
//! Owns the typed message table's routing side: request/response
//! correlation, the entity catalog, state and log subscriptions, and
//! command issuance. A background router task drains the connection's
//! inbound frame stream and classifies each message: matched by a pending
//! waiter, routed to the catalog or a subscription channel, or logged and
//! dropped.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use esphome_proto::framing::Frame;
use esphome_proto::messages::{
    ApiMessage, ListEntitiesRequest, LogLevel, MessageType, SubscribeLogsRequest,
    SubscribeStatesRequest, SwitchCommandRequest,
};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::connection::{Connection, ConnectionEvent, ConnectionInfo};
use crate::entities::{CoverCommand, EntityInfo, FanCommand, LightCommand, LogEntry, StateUpdate};
use crate::error::ApiError;
use crate::handshake::{self, DeviceInfo};
use crate::pending::PendingWaiters;

/// Budget for a full entity enumeration.
pub const LIST_ENTITIES_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffer size for the state and log broadcast channels.
const SUBSCRIPTION_CHANNEL_SIZE: usize = 256;

/// Buffer size for the client event broadcast channel.
const EVENT_CHANNEL_SIZE: usize = 64;

/// High-level events emitted by the client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Handshake and authentication completed.
    Connected,
    /// The connection went away.
    Disconnected {
        expected: bool,
        reason: Option<String>,
    },
    /// An entity was discovered during enumeration.
    Entity(EntityInfo),
    /// A state update arrived.
    State(StateUpdate),
    /// A log line arrived.
    Log(LogEntry),
    /// A connection-level error was observed.
    Error(String),
}

/// Client for one ESPHome device.
///
/// ```no_run
/// use esphome_client::{Client, ConnectionConfig};
///
/// # async fn run() -> Result<(), esphome_client::ApiError> {
/// let client = Client::new(ConnectionConfig::new("node.local").password("hunter2"));
/// client.connect().await?;
/// for entity in client.list_entities().await? {
///     println!("{} ({})", entity.name, entity.category());
/// }
/// let mut states = client.subscribe_states().await?;
/// while let Ok(update) = states.recv().await {
///     println!("{update:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct Client {
    connection: Connection,
    config: Arc<ConnectionConfig>,
    inner: Arc<ClientInner>,
    router_cancel: CancellationToken,
}

struct ClientInner {
    pending: Arc<PendingWaiters>,
    catalog: Mutex<HashMap<u32, EntityInfo>>,
    list_guard: Mutex<()>,
    device_info: RwLock<Option<DeviceInfo>>,
    events: broadcast::Sender<ClientEvent>,
    states: broadcast::Sender<StateUpdate>,
    logs: broadcast::Sender<LogEntry>,
    authenticating: AtomicBool,
}

impl Client {
    /// Create a client. No I/O happens until [`connect`](Client::connect).
    pub fn new(config: ConnectionConfig) -> Self {
        let config = Arc::new(config);
        let (connection, frames) = Connection::new(Arc::clone(&config));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (states, _) = broadcast::channel(SUBSCRIPTION_CHANNEL_SIZE);
        let (logs, _) = broadcast::channel(SUBSCRIPTION_CHANNEL_SIZE);
        let inner = Arc::new(ClientInner {
            pending: PendingWaiters::new(),
            catalog: Mutex::new(HashMap::new()),
            list_guard: Mutex::new(()),
            device_info: RwLock::new(None),
            events,
            states,
            logs,
            authenticating: AtomicBool::new(false),
        });

        let router_cancel = CancellationToken::new();
        tokio::spawn(router(
            Arc::clone(&inner),
            connection.clone(),
            Arc::clone(&config),
            frames,
            connection.events(),
            router_cancel.clone(),
        ));

        Self {
            connection,
            config,
            inner,
            router_cancel,
        }
    }

    /// The underlying connection, for state accessors and low-level sends.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Subscribe to high-level client events.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Connect, run the handshake, authenticate, and fetch device info.
    pub async fn connect(&self) -> Result<(), ApiError> {
        self.connection.connect().await?;
        let device = handshake::authenticate(
            &self.connection,
            &self.inner.pending,
            &self.config,
            &self.inner.authenticating,
        )
        .await?;
        *self.inner.device_info.write().await = Some(device);
        let _ = self.inner.events.send(ClientEvent::Connected);
        Ok(())
    }

    /// Orderly disconnect. Idempotent.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Permanent shutdown: closes the socket, stops the router, detaches
    /// all subscribers. Subsequent `connect()` fails.
    pub async fn destroy(&self) {
        self.connection.destroy().await;
        self.router_cancel.cancel();
        self.inner.pending.fail_all();
    }

    /// Device attributes cached from the last completed handshake.
    pub async fn device_info(&self) -> Option<DeviceInfo> {
        self.inner.device_info.read().await.clone()
    }

    /// Snapshot of the connection record.
    pub async fn connection_info(&self) -> ConnectionInfo {
        self.connection.info().await
    }

    /// Enumerate the device's entities.
    ///
    /// Clears the catalog, then accumulates per-kind descriptors until the
    /// device signals completion. Concurrent calls are serialized so one
    /// enumeration is in flight at a time. Every discovered entity is also
    /// emitted as [`ClientEvent::Entity`].
    pub async fn list_entities(&self) -> Result<Vec<EntityInfo>, ApiError> {
        let _guard = self.inner.list_guard.lock().await;
        self.inner.catalog.lock().await.clear();

        let reply = self
            .inner
            .pending
            .register(MessageType::ListEntitiesDoneResponse);
        self.connection
            .send_message(&ApiMessage::ListEntitiesRequest(
                ListEntitiesRequest::default(),
            ))
            .await?;
        reply.wait(LIST_ENTITIES_TIMEOUT, "list entities").await?;

        let mut entities: Vec<EntityInfo> =
            self.inner.catalog.lock().await.values().cloned().collect();
        entities.sort_by_key(|e| e.key);
        Ok(entities)
    }

    /// The current entity catalog, keyed order.
    pub async fn entities(&self) -> Vec<EntityInfo> {
        let mut entities: Vec<EntityInfo> =
            self.inner.catalog.lock().await.values().cloned().collect();
        entities.sort_by_key(|e| e.key);
        entities
    }

    /// Look up one entity by key.
    pub async fn entity(&self, key: u32) -> Result<EntityInfo, ApiError> {
        self.inner
            .catalog
            .lock()
            .await
            .get(&key)
            .cloned()
            .ok_or(ApiError::EntityNotFound { key })
    }

    /// Subscribe to state updates.
    ///
    /// Sends the subscription request and returns a receiver of decoded
    /// updates. Subscribers are isolated from each other: a slow or
    /// dropped receiver never disturbs delivery to the rest.
    pub async fn subscribe_states(&self) -> Result<broadcast::Receiver<StateUpdate>, ApiError> {
        let receiver = self.inner.states.subscribe();
        self.connection
            .send_message(&ApiMessage::SubscribeStatesRequest(
                SubscribeStatesRequest::default(),
            ))
            .await?;
        Ok(receiver)
    }

    /// Subscribe to the device log at `level`.
    pub async fn subscribe_logs(
        &self,
        level: LogLevel,
    ) -> Result<broadcast::Receiver<LogEntry>, ApiError> {
        let receiver = self.inner.logs.subscribe();
        self.connection
            .send_message(&ApiMessage::SubscribeLogsRequest(SubscribeLogsRequest {
                level: level as i32,
                dump_config: false,
            }))
            .await?;
        Ok(receiver)
    }

    /// Switch an output on or off.
    pub async fn switch_command(&self, key: u32, state: bool) -> Result<(), ApiError> {
        self.connection
            .send_message(&ApiMessage::SwitchCommandRequest(SwitchCommandRequest {
                key,
                state,
            }))
            .await
    }

    /// Issue a light command. Fire-and-forget; observable success is the
    /// subsequent state update.
    pub async fn light_command(&self, key: u32, command: LightCommand) -> Result<(), ApiError> {
        self.connection
            .send_message(&ApiMessage::LightCommandRequest(command.into_request(key)))
            .await
    }

    /// Issue a fan command.
    pub async fn fan_command(&self, key: u32, command: FanCommand) -> Result<(), ApiError> {
        self.connection
            .send_message(&ApiMessage::FanCommandRequest(command.into_request(key)))
            .await
    }

    /// Issue a cover command.
    pub async fn cover_command(&self, key: u32, command: CoverCommand) -> Result<(), ApiError> {
        self.connection
            .send_message(&ApiMessage::CoverCommandRequest(command.into_request(key)))
            .await
    }
}

/// Drains inbound frames and connection events.
async fn router(
    inner: Arc<ClientInner>,
    connection: Connection,
    config: Arc<ConnectionConfig>,
    mut frames: mpsc::Receiver<Frame>,
    mut conn_events: broadcast::Receiver<ConnectionEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            maybe_frame = frames.recv() => match maybe_frame {
                Some(frame) => route_frame(&inner, frame).await,
                None => break,
            },

            event = conn_events.recv() => match event {
                Ok(ConnectionEvent::Connected { reconnection: true }) => {
                    // The reconnect loop reopened the socket; re-run the
                    // handshake off this task so routing keeps flowing.
                    let inner = Arc::clone(&inner);
                    let connection = connection.clone();
                    let config = Arc::clone(&config);
                    tokio::spawn(async move {
                        match handshake::authenticate(
                            &connection,
                            &inner.pending,
                            &config,
                            &inner.authenticating,
                        )
                        .await
                        {
                            Ok(device) => {
                                *inner.device_info.write().await = Some(device);
                                let _ = inner.events.send(ClientEvent::Connected);
                            }
                            Err(e) => {
                                warn!(error = %e, "re-authentication after reconnect failed");
                                let _ = inner.events.send(ClientEvent::Error(e.to_string()));
                            }
                        }
                    });
                }
                Ok(ConnectionEvent::Disconnected { expected, reason }) => {
                    inner.pending.fail_all();
                    let _ = inner.events.send(ClientEvent::Disconnected { expected, reason });
                }
                Ok(ConnectionEvent::Error(message)) => {
                    let _ = inner.events.send(ClientEvent::Error(message));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "router lagged behind connection events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Classify one inbound frame.
async fn route_frame(inner: &ClientInner, frame: Frame) {
    let msg = match ApiMessage::decode(frame.msg_type, &frame.payload) {
        Ok(Some(msg)) => msg,
        Ok(None) => {
            debug!(msg_type = frame.msg_type, "dropping message of unknown type");
            return;
        }
        Err(e) => {
            warn!(msg_type = frame.msg_type, error = %e, "dropping undecodable message");
            return;
        }
    };

    // Pending waiters have first claim, in registration order.
    let Some(msg) = inner.pending.resolve(msg) else {
        return;
    };

    if let Some(entity) = EntityInfo::from_message(&msg) {
        inner
            .catalog
            .lock()
            .await
            .insert(entity.key, entity.clone());
        let _ = inner.events.send(ClientEvent::Entity(entity));
        return;
    }

    if let Some(update) = StateUpdate::from_message(&msg) {
        let _ = inner.states.send(update.clone());
        let _ = inner.events.send(ClientEvent::State(update));
        return;
    }

    if let ApiMessage::SubscribeLogsResponse(log) = msg {
        let level = LogLevel::try_from(log.level).unwrap_or(LogLevel::None);
        let entry = LogEntry {
            level,
            message: String::from_utf8_lossy(&log.message).into_owned(),
            send_failed: log.send_failed,
        };
        let _ = inner.logs.send(entry.clone());
        let _ = inner.events.send(ClientEvent::Log(entry));
        return;
    }

    debug!(msg_type = frame.msg_type, "unhandled message");
}
