//! Error types for the wire-level crate.

use thiserror::Error;

/// Protocol error type covering framing, Noise, and message decode faults.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Framing faults
    /// A frame declared a payload larger than the per-message cap.
    #[error("message too large: {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge {
        /// Declared payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A varint ran past its maximum length without terminating.
    #[error("malformed varint: no terminator within 10 bytes")]
    InvalidVarint,

    /// An encrypted-session frame did not start with the expected indicator.
    #[error("bad frame indicator: expected 0x01, got {got:#04x}")]
    BadIndicator {
        /// The byte that was received instead.
        got: u8,
    },

    // Message faults
    /// A payload failed protobuf decoding.
    #[error("message decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    /// A message of an unexpected type arrived where a specific one was required.
    #[error("unexpected message type {got}")]
    UnexpectedMessage {
        /// The received message type identifier.
        got: u32,
    },

    // Cryptographic faults
    /// Noise handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Attempted to use the transport before handshake completion.
    #[error("handshake incomplete: cannot perform operation before handshake is finished")]
    HandshakeIncomplete,

    /// AEAD encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// AEAD decryption failed. Fatal for the connection.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The pre-shared key is not 32 raw bytes.
    #[error("invalid pre-shared key: {0}")]
    InvalidPsk(String),

    // Transport faults
    /// The underlying stream closed mid-operation.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// An I/O error from the underlying stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for wire-level operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<snow::Error> for ProtocolError {
    fn from(err: snow::Error) -> Self {
        let msg = err.to_string();
        match err {
            snow::Error::Decrypt => ProtocolError::Decryption(msg),
            snow::Error::State(_) | snow::Error::Pattern(_) | snow::Error::Prereq(_) => {
                ProtocolError::HandshakeFailed(msg)
            }
            _ => ProtocolError::Encryption(msg),
        }
    }
}

impl From<base64::DecodeError> for ProtocolError {
    fn from(err: base64::DecodeError) -> Self {
        ProtocolError::InvalidPsk(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_too_large_display() {
        let err = ProtocolError::MessageTooLarge {
            size: 2_000_000,
            max: 1_048_576,
        };
        assert_eq!(
            err.to_string(),
            "message too large: 2000000 bytes exceeds maximum of 1048576 bytes"
        );
    }

    #[test]
    fn test_bad_indicator_display() {
        let err = ProtocolError::BadIndicator { got: 0x42 };
        assert_eq!(
            err.to_string(),
            "bad frame indicator: expected 0x01, got 0x42"
        );
    }

    #[test]
    fn test_handshake_incomplete_display() {
        assert_eq!(
            ProtocolError::HandshakeIncomplete.to_string(),
            "handshake incomplete: cannot perform operation before handshake is finished"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: ProtocolError = io_err.into();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProtocolError>();
    }
}
