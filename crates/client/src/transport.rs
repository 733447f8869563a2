//! Framed transport over TCP, with and without Noise encryption.
//!
//! [`establish`] dials the device, runs the Noise handshake when a
//! pre-shared key is configured, and returns the two halves of the framed
//! stream: a [`FrameSink`] for writes and a [`FrameSource`] for reads. The
//! plaintext and encrypted variants sit behind the same two types and are
//! dispatched statically.

use std::sync::{Arc, Mutex, MutexGuard};

use esphome_proto::framing::{Frame, FrameCodec, NoiseFrameCodec};
use esphome_proto::noise::{EncryptionKey, NoiseSession};
use esphome_proto::ProtocolError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::ApiError;

const READ_CHUNK_SIZE: usize = 4096;

/// The session mutex is never held across an await; a poisoned lock can
/// only mean a panic mid-operation, in which case the cipher state is
/// still structurally valid to fail loudly with.
fn lock_session(session: &Mutex<NoiseSession>) -> MutexGuard<'_, NoiseSession> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write half of a framed connection.
pub(crate) enum FrameSink {
    Plain {
        write: OwnedWriteHalf,
    },
    Noise {
        write: OwnedWriteHalf,
        session: Arc<Mutex<NoiseSession>>,
    },
}

impl FrameSink {
    /// Frame, optionally encrypt, and transmit one message.
    pub(crate) async fn send(&mut self, msg_type: u32, payload: &[u8]) -> Result<(), ApiError> {
        let bytes = match self {
            FrameSink::Plain { .. } => FrameCodec::encode(msg_type, payload),
            FrameSink::Noise { session, .. } => {
                let plaintext = FrameCodec::encode(msg_type, payload);
                let record = lock_session(session).encrypt(&plaintext)?;
                NoiseFrameCodec::encode(&record)?
            }
        };
        let write = match self {
            FrameSink::Plain { write } | FrameSink::Noise { write, .. } => write,
        };
        write
            .write_all(&bytes)
            .await
            .map_err(|e| ApiError::ConnectionLost {
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// Read half of a framed connection.
pub(crate) enum FrameSource {
    Plain {
        read: OwnedReadHalf,
        codec: FrameCodec,
    },
    Noise {
        read: OwnedReadHalf,
        envelope: NoiseFrameCodec,
        codec: FrameCodec,
        session: Arc<Mutex<NoiseSession>>,
    },
}

impl FrameSource {
    /// Read from the socket until at least one complete frame is available.
    ///
    /// Returns `Ok(None)` on clean end-of-stream. Framing and decryption
    /// faults are fatal and propagate as errors. The only await is the
    /// socket read, so the future is safe to drop from a `select!` arm:
    /// decoding always runs to completion once bytes are in.
    pub(crate) async fn next_frames(&mut self) -> Result<Option<Vec<Frame>>, ApiError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let read = match self {
                FrameSource::Plain { read, .. } | FrameSource::Noise { read, .. } => read,
            };
            let n = read
                .read(&mut chunk)
                .await
                .map_err(|e| ApiError::ConnectionLost {
                    reason: e.to_string(),
                })?;
            if n == 0 {
                return Ok(None);
            }

            let frames = match self {
                FrameSource::Plain { codec, .. } => codec.feed(&chunk[..n])?,
                FrameSource::Noise {
                    envelope,
                    codec,
                    session,
                    ..
                } => {
                    let mut frames = Vec::new();
                    envelope.push(&chunk[..n]);
                    while let Some(record) = envelope.next()? {
                        let plaintext = lock_session(session).decrypt(&record)?;
                        frames.extend(codec.feed(&plaintext)?);
                    }
                    frames
                }
            };
            if !frames.is_empty() {
                return Ok(Some(frames));
            }
        }
    }
}

/// Dial the device and, when a key is configured, complete the Noise
/// handshake. Returns the framed stream halves.
pub(crate) async fn establish(
    config: &ConnectionConfig,
) -> Result<(FrameSink, FrameSource), ApiError> {
    let address = config.address();
    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&address))
        .await
        .map_err(|_| ApiError::ConnectionTimeout {
            host: config.host.clone(),
            port: config.port,
            timeout: config.connect_timeout,
        })?
        .map_err(|e| ApiError::from_io(e, &config.host, config.port))?;
    let _ = stream.set_nodelay(true);
    let (read, write) = stream.into_split();

    match &config.encryption_key {
        None => Ok((
            FrameSink::Plain { write },
            FrameSource::Plain {
                read,
                codec: FrameCodec::new(),
            },
        )),
        Some(key) => noise_handshake(config, key, read, write).await,
    }
}

/// Run the two-message Noise handshake inside the envelope framing.
async fn noise_handshake(
    config: &ConnectionConfig,
    key: &EncryptionKey,
    mut read: OwnedReadHalf,
    mut write: OwnedWriteHalf,
) -> Result<(FrameSink, FrameSource), ApiError> {
    let mut session = NoiseSession::new(key)?;

    // Announce the encrypted protocol with an empty client hello frame,
    // then send handshake message 1 behind a zero status byte.
    let msg1 = session.write_handshake_message()?;
    let mut opening = NoiseFrameCodec::encode(&[])?;
    let mut framed_msg1 = Vec::with_capacity(msg1.len() + 1);
    framed_msg1.push(0x00);
    framed_msg1.extend_from_slice(&msg1);
    opening.extend_from_slice(&NoiseFrameCodec::encode(&framed_msg1)?);
    write
        .write_all(&opening)
        .await
        .map_err(|e| ApiError::from_io(e, &config.host, config.port))?;

    let mut envelope = NoiseFrameCodec::new();

    // Server hello: first byte is the protocol it selected, optionally
    // followed by NUL-terminated name and MAC.
    let server_hello = read_envelope_frame(config, &mut read, &mut envelope).await?;
    match server_hello.first() {
        Some(&0x01) => {
            let mut fields = server_hello[1..].split(|&b| b == 0);
            let name = fields.next().map(String::from_utf8_lossy);
            let mac = fields.next().map(String::from_utf8_lossy);
            debug!(
                name = name.as_deref().unwrap_or(""),
                mac = mac.as_deref().unwrap_or(""),
                "encrypted session accepted"
            );
        }
        Some(&other) => {
            return Err(ProtocolError::HandshakeFailed(format!(
                "device selected unsupported protocol {other:#04x}"
            ))
            .into());
        }
        None => {
            return Err(
                ProtocolError::HandshakeFailed("empty server hello frame".to_string()).into(),
            );
        }
    }

    // Handshake reply: zero status byte then message 2, or a nonzero status
    // with an ASCII reason.
    let reply = read_envelope_frame(config, &mut read, &mut envelope).await?;
    match reply.split_first() {
        Some((&0x00, msg2)) => {
            session.read_handshake_message(msg2)?;
            session.into_transport()?;
        }
        Some((_, reason)) => {
            let reason = String::from_utf8_lossy(reason).into_owned();
            if reason.to_ascii_lowercase().contains("mac") {
                return Err(ApiError::InvalidEncryptionKey {
                    host: config.host.clone(),
                    reason,
                });
            }
            return Err(ProtocolError::HandshakeFailed(reason).into());
        }
        None => {
            return Err(
                ProtocolError::HandshakeFailed("empty handshake reply".to_string()).into(),
            );
        }
    }

    let session = Arc::new(Mutex::new(session));
    Ok((
        FrameSink::Noise {
            write,
            session: Arc::clone(&session),
        },
        FrameSource::Noise {
            read,
            envelope,
            codec: FrameCodec::new(),
            session,
        },
    ))
}

/// Read one envelope frame during the handshake, bounded by the connect
/// budget.
async fn read_envelope_frame(
    config: &ConnectionConfig,
    read: &mut OwnedReadHalf,
    envelope: &mut NoiseFrameCodec,
) -> Result<bytes::Bytes, ApiError> {
    let deadline = tokio::time::Instant::now() + config.connect_timeout;
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        if let Some(frame) = envelope.next()? {
            return Ok(frame);
        }
        let n = tokio::time::timeout_at(deadline, read.read(&mut chunk))
            .await
            .map_err(|_| ApiError::ConnectionTimeout {
                host: config.host.clone(),
                port: config.port,
                timeout: config.connect_timeout,
            })?
            .map_err(|e| ApiError::from_io(e, &config.host, config.port))?;
        if n == 0 {
            return Err(ApiError::ConnectionReset {
                host: config.host.clone(),
                port: config.port,
            });
        }
        envelope.push(&chunk[..n]);
    }
}
