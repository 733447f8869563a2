//! # ESPHome Native API client
//!
//! Async client for the ESPHome native TCP API: connection management
//! with keepalive and bounded reconnection, optional Noise-encrypted
//! transport, versioned handshake and password authentication, entity
//! enumeration, state and log subscriptions, and typed commands.
//!
//! ## Overview
//!
//! - [`ConnectionConfig`] — host, port, credentials, timers
//! - [`Connection`] — socket lifetime, liveness, reconnection
//! - [`Client`] — handshake, entity catalog, subscriptions, commands
//!
//! ```no_run
//! use esphome_client::{Client, ConnectionConfig};
//!
//! # async fn run() -> Result<(), esphome_client::ApiError> {
//! let client = Client::new(ConnectionConfig::new("node.local"));
//! client.connect().await?;
//! println!("{:?}", client.device_info().await);
//! # Ok(())
//! # }
//! ```
//!
//! Wire-level pieces (framing, Noise session, message schema) live in the
//! companion `esphome-proto` crate and are re-exported under [`proto`].

pub mod client;
pub mod config;
pub mod connection;
pub mod entities;
pub mod error;
pub mod handshake;
mod pending;
mod transport;

pub use client::{Client, ClientEvent, LIST_ENTITIES_TIMEOUT};
pub use config::{
    ConnectionConfig, DEFAULT_CLIENT_INFO, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PING_INTERVAL,
    DEFAULT_PING_TIMEOUT, DEFAULT_PORT, DEFAULT_RECONNECT_INTERVAL,
};
pub use connection::{
    ApiVersion, Connection, ConnectionEvent, ConnectionInfo, ConnectionState,
};
pub use entities::{
    BinarySensorState, CoverCommand, CoverState, EntityInfo, EntityKind, FanCommand, FanState,
    LightCommand, LightState, LogEntry, SensorState, StateUpdate, SwitchState, TextSensorState,
};
pub use error::{ApiError, ErrorKind};
pub use handshake::DeviceInfo;

pub use esphome_proto as proto;
pub use esphome_proto::noise::EncryptionKey;
pub use esphome_proto::{ApiMessage, LogLevel, MessageType};
