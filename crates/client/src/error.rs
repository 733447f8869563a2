//! Client-facing error taxonomy.
//!
//! Every error exposes a [`kind`](ApiError::kind) for equality testing by
//! category rather than message text, and an optional
//! [`suggestion`](ApiError::suggestion) with a remediation hint. Context
//! such as host, port, and time budgets is carried in variant fields.

use std::time::Duration;

use esphome_proto::{MessageType, ProtocolError};
use thiserror::Error;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ApiError {
    // Network
    /// The TCP connection could not be established within the budget.
    #[error("connection to {host}:{port} timed out after {timeout:?}")]
    ConnectionTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    /// The device actively refused the connection.
    #[error("connection to {host}:{port} refused")]
    ConnectionRefused { host: String, port: u16 },

    /// The connection was reset by the peer.
    #[error("connection to {host}:{port} reset by peer")]
    ConnectionReset { host: String, port: u16 },

    /// An established connection was lost.
    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// An operation required an open connection.
    #[error("not connected")]
    NotConnected,

    // Authentication
    /// The device rejected the configured password.
    #[error("invalid password for {host}")]
    InvalidPassword { host: String },

    /// The device rejected the configured encryption key.
    #[error("invalid encryption key for {host}: {reason}")]
    InvalidEncryptionKey { host: String, reason: String },

    /// A message requiring authentication was sent before it completed.
    #[error("authentication required before sending {message_type:?}")]
    AuthenticationRequired { message_type: MessageType },

    /// A handshake was started while one was already in flight.
    #[error("already authenticating")]
    AuthenticationInProgress,

    // Protocol
    /// The device speaks an incompatible protocol major version.
    #[error(
        "protocol version mismatch: client speaks {client_major}.x, \
         device speaks {device_major}.{device_minor}"
    )]
    ProtocolVersionMismatch {
        client_major: u32,
        device_major: u32,
        device_minor: u32,
    },

    /// A wire-level fault (framing, Noise, message decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    // Entity
    /// No entity with the given key is in the catalog.
    #[error("entity with key {key} not found")]
    EntityNotFound { key: u32 },

    // Lifecycle
    /// A bounded wait expired.
    #[error("{operation} timed out after {budget:?}")]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },

    /// The client was destroyed; no further connections are possible.
    #[error("client destroyed")]
    Destroyed,
}

/// Error categories for equality testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionTimeout,
    ConnectionRefused,
    ConnectionReset,
    ConnectionLost,
    NotConnected,
    InvalidPassword,
    InvalidEncryptionKey,
    AuthenticationRequired,
    AuthenticationInProgress,
    ProtocolVersionMismatch,
    Protocol,
    EntityNotFound,
    Timeout,
    Destroyed,
}

impl ApiError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::ConnectionTimeout { .. } => ErrorKind::ConnectionTimeout,
            ApiError::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
            ApiError::ConnectionReset { .. } => ErrorKind::ConnectionReset,
            ApiError::ConnectionLost { .. } => ErrorKind::ConnectionLost,
            ApiError::NotConnected => ErrorKind::NotConnected,
            ApiError::InvalidPassword { .. } => ErrorKind::InvalidPassword,
            ApiError::InvalidEncryptionKey { .. } => ErrorKind::InvalidEncryptionKey,
            ApiError::AuthenticationRequired { .. } => ErrorKind::AuthenticationRequired,
            ApiError::AuthenticationInProgress => ErrorKind::AuthenticationInProgress,
            ApiError::ProtocolVersionMismatch { .. } => ErrorKind::ProtocolVersionMismatch,
            ApiError::Protocol(_) => ErrorKind::Protocol,
            ApiError::EntityNotFound { .. } => ErrorKind::EntityNotFound,
            ApiError::Timeout { .. } => ErrorKind::Timeout,
            ApiError::Destroyed => ErrorKind::Destroyed,
        }
    }

    /// A remediation hint for user-facing reporting, where one exists.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ApiError::ConnectionTimeout { .. } => Some(
                "verify the host is reachable; deep-sleep devices are only \
                 connectable while awake",
            ),
            ApiError::ConnectionRefused { .. } => Some(
                "verify the device is online and the native API is enabled \
                 on the configured port",
            ),
            ApiError::InvalidPassword { .. } => {
                Some("check the password configured under `api:` on the device")
            }
            ApiError::InvalidEncryptionKey { .. } => Some(
                "the key must be the device's 32-byte API encryption key in \
                 its base64 form",
            ),
            ApiError::AuthenticationRequired { .. } => {
                Some("call connect() and let the handshake finish before issuing commands")
            }
            _ => None,
        }
    }

    /// Whether another connection attempt could plausibly succeed.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConnectionTimeout
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionLost
        )
    }

    /// Map an I/O error from dialing or socket use into the taxonomy.
    pub(crate) fn from_io(err: std::io::Error, host: &str, port: u16) -> Self {
        use std::io::ErrorKind as Io;
        match err.kind() {
            Io::TimedOut => ApiError::ConnectionTimeout {
                host: host.to_string(),
                port,
                timeout: Duration::ZERO,
            },
            Io::ConnectionRefused => ApiError::ConnectionRefused {
                host: host.to_string(),
                port,
            },
            Io::ConnectionReset | Io::ConnectionAborted | Io::BrokenPipe => {
                ApiError::ConnectionReset {
                    host: host.to_string(),
                    port,
                }
            }
            Io::UnexpectedEof => ApiError::ConnectionLost {
                reason: err.to_string(),
            },
            _ => ApiError::Protocol(ProtocolError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_equality_ignores_context() {
        let a = ApiError::InvalidPassword {
            host: "a.local".into(),
        };
        let b = ApiError::InvalidPassword {
            host: "b.local".into(),
        };
        assert_eq!(a.kind(), b.kind());
        assert_ne!(a.kind(), ApiError::NotConnected.kind());
    }

    #[test]
    fn test_timeout_display_carries_budget() {
        let err = ApiError::Timeout {
            operation: "list entities",
            budget: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "list entities timed out after 10s");
    }

    #[test]
    fn test_suggestions() {
        let err = ApiError::InvalidPassword {
            host: "node.local".into(),
        };
        assert!(err.suggestion().unwrap().contains("api:"));
        assert!(ApiError::NotConnected.suggestion().is_none());
    }

    #[test]
    fn test_io_mapping() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(
            ApiError::from_io(refused, "h", 6053).kind(),
            ErrorKind::ConnectionRefused
        );

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(
            ApiError::from_io(reset, "h", 6053).kind(),
            ErrorKind::ConnectionReset
        );

        let other = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        assert_eq!(
            ApiError::from_io(other, "h", 6053).kind(),
            ErrorKind::Protocol
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ApiError::ConnectionLost {
            reason: "eof".into()
        }
        .is_retryable());
        assert!(!ApiError::InvalidPassword {
            host: "h".into()
        }
        .is_retryable());
        assert!(!ApiError::Destroyed.is_retryable());
    }

    #[test]
    fn test_protocol_error_wraps_transparently() {
        let err: ApiError = ProtocolError::MessageTooLarge {
            size: 2,
            max: 1,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("message too large"));
    }
}
