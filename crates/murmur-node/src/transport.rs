//! Transport abstraction and request/response correlation.
//!
//! A [`Transport`] only knows how to put an addressed envelope on the wire.
//! [`Endpoint`] layers the protocol verbs on top of it: fire-and-forget
//! `send`, `rpc` with a timeout, and `reply`. Responses to outstanding RPCs
//! are matched by `msg_id` in [`Endpoint::complete`], which the message loop
//! calls for every inbound envelope.

use crate::error::TransportError;
use crate::protocol::{Body, Envelope, Payload};
use async_trait::async_trait;
use murmur_core::NodeId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Abstract outbound transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Hand a fully addressed envelope to the substrate.
    async fn deliver(&self, envelope: Envelope) -> Result<(), TransportError>;
}

type PendingReplies = Mutex<HashMap<u64, oneshot::Sender<Envelope>>>;

/// A node's (or client's) view of the transport.
pub struct Endpoint<T: Transport> {
    id: NodeId,
    transport: Arc<T>,
    next_msg_id: AtomicU64,
    pending: PendingReplies,
}

impl<T: Transport> Endpoint<T> {
    pub fn new(id: NodeId, transport: Arc<T>) -> Self {
        Self {
            id,
            transport,
            next_msg_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    fn next_msg_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send without expecting an answer.
    pub async fn send(&self, dest: &NodeId, payload: Payload) -> Result<(), TransportError> {
        self.transport
            .deliver(Envelope::new(self.id.clone(), dest.clone(), Body::notify(payload)))
            .await
    }

    /// Send a request and wait up to `timeout` for the matching reply.
    pub async fn rpc(
        &self,
        dest: &NodeId,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Envelope, TransportError> {
        let msg_id = self.next_msg_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(msg_id, tx);
        // Removes the slot however this future ends, including cancellation.
        let _slot = PendingSlot {
            pending: &self.pending,
            msg_id,
        };

        let envelope = Envelope::new(self.id.clone(), dest.clone(), Body::request(msg_id, payload));
        self.transport.deliver(envelope).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout {
                dest: dest.clone(),
                after: timeout,
            }),
        }
    }

    /// Answer `request`. Requests without a `msg_id` expect no answer and
    /// are silently skipped.
    pub async fn reply(&self, request: &Envelope, payload: Payload) -> Result<(), TransportError> {
        match request.answer(payload) {
            Some(mut answer) => {
                answer.src = self.id.clone();
                self.transport.deliver(answer).await
            }
            None => Ok(()),
        }
    }

    /// Route `envelope` to the RPC waiting for it. Anything that is not an
    /// answer to an outstanding RPC is handed back to the caller.
    pub fn complete(&self, envelope: Envelope) -> Option<Envelope> {
        let Some(in_reply_to) = envelope.body.in_reply_to else {
            return Some(envelope);
        };
        let Some(waiter) = self.pending.lock().remove(&in_reply_to) else {
            return Some(envelope);
        };
        // The waiter may have timed out in the meantime; give it back then.
        waiter.send(envelope).err()
    }

    /// Number of RPCs still waiting for a reply.
    pub fn pending_rpcs(&self) -> usize {
        self.pending.lock().len()
    }
}

struct PendingSlot<'a> {
    pending: &'a PendingReplies,
    msg_id: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.msg_id);
    }
}
