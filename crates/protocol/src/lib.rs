//! # ESPHome Native API — wire level
//!
//! This crate provides the wire-level building blocks for talking to
//! ESPHome devices over their native TCP API:
//!
//! - **Framing**: the length-prefixed plaintext frame format and the
//!   envelope framing used by encrypted sessions
//! - **Noise transport**: the Noise_NNpsk0_25519_ChaChaPoly_SHA256 session
//!   used when a pre-shared key is configured
//! - **Message schema**: protobuf definitions for the well-known message
//!   types, keyed by their wire identifiers
//! - **Errors**: the wire-level fault taxonomy
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Application Messages            │  protobuf (messages)
//! ├─────────────────────────────────────────┤
//! │        Plaintext Framing                │  0x00 + varint len/type
//! ├─────────────────────────────────────────┤
//! │   Noise Encryption (optional)           │  ChaCha20-Poly1305
//! ├─────────────────────────────────────────┤
//! │        Envelope Framing (encrypted)     │  0x01 + u16 length
//! ├─────────────────────────────────────────┤
//! │             TCP (port 6053)             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The connection state machine, handshake driver, and high-level client
//! live in the companion `esphome-client` crate.

pub mod error;
pub mod framing;
pub mod messages;
pub mod noise;
pub mod varint;

pub use error::{ProtocolError, Result};
pub use framing::{
    Frame, FrameCodec, NoiseFrameCodec, FRAME_PREAMBLE, MAX_FRAME_SIZE, MAX_NOISE_FRAME_SIZE,
    NOISE_HEADER_SIZE, NOISE_INDICATOR,
};
pub use messages::{ApiMessage, LogLevel, MessageType, API_VERSION_MAJOR, API_VERSION_MINOR};
pub use noise::{
    EncryptionKey, HandshakePhase, NoiseSession, MAX_NOISE_MESSAGE_SIZE, NOISE_PATTERN,
    NOISE_PROLOGUE, NOISE_TAG_SIZE, PSK_LENGTH,
};
