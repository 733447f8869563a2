//! One-shot waiters for request/response correlation.
//!
//! Operations that await a reply register a waiter for the expected
//! message type *before* sending the request. The router tests each
//! inbound message against the waiters in registration order; the first
//! match resolves and is removed. Waits are bounded by explicit deadlines
//! and fail with a connection-closed error when the socket goes away.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use esphome_proto::messages::{ApiMessage, MessageType};
use tokio::sync::oneshot;

use crate::error::ApiError;

struct Waiter {
    id: u64,
    expected: MessageType,
    tx: oneshot::Sender<ApiMessage>,
}

/// Ordered registry of pending one-shot waits.
#[derive(Default)]
pub(crate) struct PendingWaiters {
    waiters: Mutex<VecDeque<Waiter>>,
    next_id: AtomicU64,
}

impl PendingWaiters {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a waiter for `expected`. Call before sending the request.
    pub(crate) fn register(self: &Arc<Self>, expected: MessageType) -> PendingReply {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        if let Ok(mut waiters) = self.waiters.lock() {
            waiters.push_back(Waiter { id, expected, tx });
        }
        PendingReply {
            id,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Offer a message to the registry. Returns the message back when no
    /// waiter consumed it.
    pub(crate) fn resolve(&self, msg: ApiMessage) -> Option<ApiMessage> {
        let msg_type = msg.message_type();
        let Ok(mut waiters) = self.waiters.lock() else {
            return Some(msg);
        };
        let mut msg = msg;
        while let Some(pos) = waiters.iter().position(|w| w.expected == msg_type) {
            let waiter = match waiters.remove(pos) {
                Some(waiter) => waiter,
                None => break,
            };
            match waiter.tx.send(msg) {
                Ok(()) => return None,
                // Receiver already gone (timed out); try the next waiter.
                Err(returned) => msg = returned,
            }
        }
        Some(msg)
    }

    /// Drop every waiter; their waits fail with a connection-closed error.
    pub(crate) fn fail_all(&self) {
        if let Ok(mut waiters) = self.waiters.lock() {
            waiters.clear();
        }
    }

    fn remove(&self, id: u64) {
        if let Ok(mut waiters) = self.waiters.lock() {
            waiters.retain(|w| w.id != id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.waiters.lock().map(|w| w.len()).unwrap_or(0)
    }
}

/// Handle for one registered wait.
pub(crate) struct PendingReply {
    id: u64,
    rx: oneshot::Receiver<ApiMessage>,
    registry: Arc<PendingWaiters>,
}

impl PendingReply {
    /// Await the reply within `budget`.
    ///
    /// A deadline miss deregisters the waiter and yields
    /// [`ApiError::Timeout`]; a dropped registry slot (disconnect) yields
    /// [`ApiError::ConnectionLost`].
    pub(crate) async fn wait(
        self,
        budget: Duration,
        operation: &'static str,
    ) -> Result<ApiMessage, ApiError> {
        match tokio::time::timeout(budget, self.rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(ApiError::ConnectionLost {
                reason: format!("connection closed while waiting for {operation} reply"),
            }),
            Err(_) => {
                self.registry.remove(self.id);
                Err(ApiError::Timeout { operation, budget })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esphome_proto::messages::{HelloResponse, PingResponse};

    fn hello(minor: u32) -> ApiMessage {
        ApiMessage::HelloResponse(HelloResponse {
            api_version_major: 1,
            api_version_minor: minor,
            server_info: String::new(),
            name: String::new(),
        })
    }

    #[tokio::test]
    async fn test_resolve_in_registration_order() {
        let pending = PendingWaiters::new();
        let first = pending.register(MessageType::HelloResponse);
        let second = pending.register(MessageType::HelloResponse);

        assert!(pending.resolve(hello(1)).is_none());
        assert!(pending.resolve(hello(2)).is_none());

        let a = first.wait(Duration::from_secs(1), "first").await.unwrap();
        let b = second.wait(Duration::from_secs(1), "second").await.unwrap();
        assert_eq!(a, hello(1));
        assert_eq!(b, hello(2));
    }

    #[tokio::test]
    async fn test_unmatched_message_is_returned() {
        let pending = PendingWaiters::new();
        let _reply = pending.register(MessageType::HelloResponse);
        let msg = ApiMessage::PingResponse(PingResponse::default());
        assert_eq!(pending.resolve(msg.clone()), Some(msg));
    }

    #[tokio::test]
    async fn test_timeout_deregisters() {
        let pending = PendingWaiters::new();
        let reply = pending.register(MessageType::HelloResponse);
        let err = reply
            .wait(Duration::from_millis(10), "hello")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Timeout);
        assert_eq!(pending.len(), 0);

        // A late reply is simply unmatched.
        assert!(pending.resolve(hello(9)).is_some());
    }

    #[tokio::test]
    async fn test_fail_all_yields_connection_lost() {
        let pending = PendingWaiters::new();
        let reply = pending.register(MessageType::HelloResponse);
        pending.fail_all();
        let err = reply
            .wait(Duration::from_secs(1), "hello")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConnectionLost);
    }

    #[tokio::test]
    async fn test_timed_out_waiter_does_not_steal_reply() {
        let pending = PendingWaiters::new();
        let stale = pending.register(MessageType::HelloResponse);
        let live = pending.register(MessageType::HelloResponse);
        // The stale waiter gives up before any reply arrives.
        let _ = stale.wait(Duration::from_millis(5), "stale").await;

        assert!(pending.resolve(hello(7)).is_none());
        let msg = live.wait(Duration::from_secs(1), "live").await.unwrap();
        assert_eq!(msg, hello(7));
    }
}
