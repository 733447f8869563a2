//! Noise handshake and transport encryption for the native API.
//!
//! The API's encrypted mode uses Noise_NNpsk0_25519_ChaChaPoly_SHA256 with
//! the client as initiator: no static keys on either side, the device's
//! 32-byte pre-shared key mixed in before the first message, Curve25519 for
//! the ephemeral exchange, ChaCha20-Poly1305 for the data phase.
//!
//! ## Handshake
//! ```text
//! -> psk, e
//! <- e, ee
//! ```
//!
//! After reading the second message the handshake state is split into the
//! transport ciphers; each direction keeps its own monotonic nonce, so a
//! reordered or replayed record fails authentication.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use snow::{Builder, HandshakeState, TransportState};

use crate::error::{ProtocolError, Result};

/// The Noise pattern used for the encrypted session.
pub const NOISE_PATTERN: &str = "Noise_NNpsk0_25519_ChaChaPoly_SHA256";

/// Handshake prologue: ASCII "NoiseAPIInit" followed by two zero bytes.
pub const NOISE_PROLOGUE: &[u8] = b"NoiseAPIInit\x00\x00";

/// Maximum size for a single Noise message, per the Noise specification.
pub const MAX_NOISE_MESSAGE_SIZE: usize = 65535;

/// Overhead added by AEAD encryption (Poly1305 tag).
pub const NOISE_TAG_SIZE: usize = 16;

/// Length of the raw pre-shared key.
pub const PSK_LENGTH: usize = 32;

/// The device's API encryption secret: 32 raw bytes, base64-encoded in its
/// textual form.
///
/// `Debug` never prints key material.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; PSK_LENGTH]);

impl EncryptionKey {
    /// Wrap 32 raw key bytes.
    pub fn new(bytes: [u8; PSK_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Decode the textual (base64) form of the key.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64.decode(encoded.trim())?;
        let bytes: [u8; PSK_LENGTH] = bytes.try_into().map_err(|b: Vec<u8>| {
            ProtocolError::InvalidPsk(format!("expected {} bytes, got {}", PSK_LENGTH, b.len()))
        })?;
        Ok(Self(bytes))
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PSK_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// State of the handshake driven by [`NoiseSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Ready to write message 1.
    Start,
    /// Message 1 sent, waiting for the device's message 2.
    WaitingForPeer,
    /// Message 2 read; ready to split into transport ciphers.
    Complete,
    /// Split done; encrypt/decrypt are available.
    Transport,
}

/// An initiator-side Noise session for one connection.
///
/// Created when encryption is configured, driven through the two handshake
/// messages on connect, split into transport ciphers, and dropped on
/// disconnect. The handshake state is consumed by the split and cannot be
/// reused; `snow` zeroizes key material when states are dropped.
pub struct NoiseSession {
    handshake: Option<HandshakeState>,
    transport: Option<TransportState>,
    phase: HandshakePhase,
    buffer: Vec<u8>,
}

impl NoiseSession {
    /// Build an initiator session from the pre-shared key.
    pub fn new(key: &EncryptionKey) -> Result<Self> {
        let params = NOISE_PATTERN
            .parse()
            .map_err(|e| ProtocolError::HandshakeFailed(format!("invalid noise pattern: {e}")))?;
        let handshake = Builder::new(params)
            .prologue(NOISE_PROLOGUE)
            .psk(0, key.as_bytes())
            .build_initiator()
            .map_err(|e| ProtocolError::HandshakeFailed(format!("failed to build initiator: {e}")))?;

        Ok(Self {
            handshake: Some(handshake),
            transport: None,
            phase: HandshakePhase::Start,
            buffer: vec![0u8; MAX_NOISE_MESSAGE_SIZE],
        })
    }

    /// Current handshake phase.
    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Whether the session has split into transport mode.
    pub fn is_transport(&self) -> bool {
        self.phase == HandshakePhase::Transport
    }

    /// Produce handshake message 1 (`psk, e`).
    pub fn write_handshake_message(&mut self) -> Result<Vec<u8>> {
        if self.phase != HandshakePhase::Start {
            return Err(ProtocolError::HandshakeFailed(format!(
                "cannot write handshake message in phase {:?}",
                self.phase
            )));
        }
        let handshake = self
            .handshake
            .as_mut()
            .ok_or(ProtocolError::HandshakeIncomplete)?;
        let len = handshake.write_message(&[], &mut self.buffer)?;
        self.phase = HandshakePhase::WaitingForPeer;
        Ok(self.buffer[..len].to_vec())
    }

    /// Consume handshake message 2 (`e, ee`) from the device.
    pub fn read_handshake_message(&mut self, message: &[u8]) -> Result<()> {
        if self.phase != HandshakePhase::WaitingForPeer {
            return Err(ProtocolError::HandshakeFailed(format!(
                "cannot read handshake message in phase {:?}",
                self.phase
            )));
        }
        let handshake = self
            .handshake
            .as_mut()
            .ok_or(ProtocolError::HandshakeIncomplete)?;
        handshake.read_message(message, &mut self.buffer)?;
        self.phase = HandshakePhase::Complete;
        Ok(())
    }

    /// Split the completed handshake into the transport ciphers.
    pub fn into_transport(&mut self) -> Result<()> {
        if self.phase != HandshakePhase::Complete {
            return Err(ProtocolError::HandshakeIncomplete);
        }
        let handshake = self
            .handshake
            .take()
            .ok_or(ProtocolError::HandshakeIncomplete)?;
        self.transport = Some(handshake.into_transport_mode()?);
        self.phase = HandshakePhase::Transport;
        Ok(())
    }

    /// Encrypt one outbound record. Transport phase only.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let transport = self
            .transport
            .as_mut()
            .ok_or(ProtocolError::HandshakeIncomplete)?;
        if plaintext.len() > MAX_NOISE_MESSAGE_SIZE - NOISE_TAG_SIZE {
            return Err(ProtocolError::Encryption(format!(
                "plaintext too large: {} bytes exceeds maximum of {} bytes",
                plaintext.len(),
                MAX_NOISE_MESSAGE_SIZE - NOISE_TAG_SIZE
            )));
        }
        let len = transport.write_message(plaintext, &mut self.buffer)?;
        Ok(self.buffer[..len].to_vec())
    }

    /// Decrypt one inbound record. Transport phase only; a failed
    /// authentication tag is fatal for the connection.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let transport = self
            .transport
            .as_mut()
            .ok_or(ProtocolError::HandshakeIncomplete)?;
        if ciphertext.len() > MAX_NOISE_MESSAGE_SIZE {
            return Err(ProtocolError::Decryption(format!(
                "ciphertext too large: {} bytes exceeds maximum of {} bytes",
                ciphertext.len(),
                MAX_NOISE_MESSAGE_SIZE
            )));
        }
        let len = transport.read_message(ciphertext, &mut self.buffer)?;
        Ok(self.buffer[..len].to_vec())
    }

    /// Drop all cryptographic state. The session cannot be reused.
    pub fn reset(&mut self) {
        self.handshake = None;
        self.transport = None;
        self.buffer.fill(0);
        self.phase = HandshakePhase::Start;
    }
}

impl fmt::Debug for NoiseSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseSession")
            .field("phase", &self.phase)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> EncryptionKey {
        EncryptionKey::new([0x5a; PSK_LENGTH])
    }

    /// Device side of the handshake, built directly on snow.
    fn responder(key: &EncryptionKey) -> snow::HandshakeState {
        Builder::new(NOISE_PATTERN.parse().unwrap())
            .prologue(NOISE_PROLOGUE)
            .psk(0, key.as_bytes())
            .build_responder()
            .unwrap()
    }

    #[test]
    fn test_key_from_base64() {
        let encoded = BASE64.encode([7u8; PSK_LENGTH]);
        let key = EncryptionKey::from_base64(&encoded).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; PSK_LENGTH]);
    }

    #[test]
    fn test_key_wrong_length_rejected() {
        let encoded = BASE64.encode([7u8; 16]);
        assert!(matches!(
            EncryptionKey::from_base64(&encoded),
            Err(ProtocolError::InvalidPsk(_))
        ));
    }

    #[test]
    fn test_key_bad_base64_rejected() {
        assert!(matches!(
            EncryptionKey::from_base64("not base64!!!"),
            Err(ProtocolError::InvalidPsk(_))
        ));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let text = format!("{:?}", test_key());
        assert_eq!(text, "EncryptionKey(..)");
    }

    #[test]
    fn test_full_handshake_and_transport() {
        let key = test_key();
        let mut session = NoiseSession::new(&key).unwrap();
        let mut device = responder(&key);
        let mut buf = vec![0u8; MAX_NOISE_MESSAGE_SIZE];

        // -> psk, e
        let msg1 = session.write_handshake_message().unwrap();
        assert_eq!(session.phase(), HandshakePhase::WaitingForPeer);
        device.read_message(&msg1, &mut buf).unwrap();

        // <- e, ee
        let len = device.write_message(&[], &mut buf).unwrap();
        session.read_handshake_message(&buf[..len]).unwrap();
        assert_eq!(session.phase(), HandshakePhase::Complete);

        session.into_transport().unwrap();
        assert!(session.is_transport());
        let mut device = device.into_transport_mode().unwrap();

        // Client -> device
        let ct = session.encrypt(b"list entities").unwrap();
        let mut pt = vec![0u8; MAX_NOISE_MESSAGE_SIZE];
        let n = device.read_message(&ct, &mut pt).unwrap();
        assert_eq!(&pt[..n], b"list entities");

        // Device -> client
        let n = device.write_message(b"state update", &mut pt).unwrap();
        let decrypted = session.decrypt(&pt[..n]).unwrap();
        assert_eq!(decrypted, b"state update");
    }

    #[test]
    fn test_wrong_psk_fails_handshake() {
        let mut session = NoiseSession::new(&test_key()).unwrap();
        let mut device = responder(&EncryptionKey::new([0x11; PSK_LENGTH]));
        let mut buf = vec![0u8; MAX_NOISE_MESSAGE_SIZE];

        let msg1 = session.write_handshake_message().unwrap();
        // The responder rejects message 1: its psk0 tag does not verify.
        assert!(device.read_message(&msg1, &mut buf).is_err());
    }

    #[test]
    fn test_encrypt_before_transport_fails() {
        let mut session = NoiseSession::new(&test_key()).unwrap();
        assert!(matches!(
            session.encrypt(b"early"),
            Err(ProtocolError::HandshakeIncomplete)
        ));
    }

    #[test]
    fn test_decrypt_before_transport_fails() {
        let mut session = NoiseSession::new(&test_key()).unwrap();
        assert!(matches!(
            session.decrypt(&[0u8; 32]),
            Err(ProtocolError::HandshakeIncomplete)
        ));
    }

    #[test]
    fn test_read_out_of_order_fails() {
        let mut session = NoiseSession::new(&test_key()).unwrap();
        assert!(session.read_handshake_message(&[0u8; 48]).is_err());
    }

    #[test]
    fn test_double_write_fails() {
        let mut session = NoiseSession::new(&test_key()).unwrap();
        session.write_handshake_message().unwrap();
        assert!(session.write_handshake_message().is_err());
    }

    #[test]
    fn test_split_requires_complete_handshake() {
        let mut session = NoiseSession::new(&test_key()).unwrap();
        assert!(matches!(
            session.into_transport(),
            Err(ProtocolError::HandshakeIncomplete)
        ));
    }

    #[test]
    fn test_tampered_record_fails_decryption() {
        let key = test_key();
        let mut session = NoiseSession::new(&key).unwrap();
        let mut device = responder(&key);
        let mut buf = vec![0u8; MAX_NOISE_MESSAGE_SIZE];

        let msg1 = session.write_handshake_message().unwrap();
        device.read_message(&msg1, &mut buf).unwrap();
        let len = device.write_message(&[], &mut buf).unwrap();
        session.read_handshake_message(&buf[..len]).unwrap();
        session.into_transport().unwrap();
        let mut device = device.into_transport_mode().unwrap();

        let n = device.write_message(b"payload", &mut buf).unwrap();
        let mut record = buf[..n].to_vec();
        record[0] ^= 0xff;
        assert!(matches!(
            session.decrypt(&record),
            Err(ProtocolError::Decryption(_))
        ));
    }

    #[test]
    fn test_reset_disables_session() {
        let mut session = NoiseSession::new(&test_key()).unwrap();
        session.reset();
        assert!(session.write_handshake_message().is_err());
        assert!(matches!(
            session.encrypt(b"x"),
            Err(ProtocolError::HandshakeIncomplete)
        ));
    }
}
