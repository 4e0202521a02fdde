//! In-memory network for tests and simulation.
//!
//! Each attached endpoint gets a bounded mailbox. Nodes can be isolated
//! and healed at runtime; deliveries to or from an isolated node fail with
//! [`TransportError::Unreachable`], which is how a crashed or partitioned
//! peer looks to the sender.

use crate::config::NodeConfig;
use crate::error::TransportError;
use crate::node::Node;
use crate::protocol::Envelope;
use crate::runtime;
use crate::transport::{Endpoint, Transport};
use async_trait::async_trait;
use murmur_core::NodeId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of every mailbox on the in-memory network.
pub const MAILBOX_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct NetworkState {
    mailboxes: RwLock<HashMap<NodeId, mpsc::Sender<Envelope>>>,
    isolated: RwLock<HashSet<NodeId>>,
    delivered: AtomicU64,
    refused: AtomicU64,
}

/// Shared handle to an in-memory network. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct MemoryNetwork {
    state: Arc<NetworkState>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an endpoint named `id`, replacing any previous one.
    pub fn attach(&self, id: NodeId) -> (Arc<MemoryTransport>, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        self.state.mailboxes.write().insert(id.clone(), tx);
        let transport = Arc::new(MemoryTransport {
            local: id,
            network: self.clone(),
        });
        (transport, rx)
    }

    /// Start a node on this network: message loop plus dissemination timer.
    pub fn spawn_node(
        &self,
        id: NodeId,
        cluster: Vec<NodeId>,
        config: NodeConfig,
    ) -> Arc<Node<MemoryTransport>> {
        let (transport, inbox) = self.attach(id.clone());
        let endpoint = Arc::new(Endpoint::new(id, transport));
        let node = Node::new(endpoint, cluster, config);
        node.start();
        tokio::spawn(runtime::run(Arc::clone(&node), inbox));
        node
    }

    /// Remove `id`'s mailbox. Its message loop ends once queued envelopes
    /// are drained.
    pub fn detach(&self, id: &NodeId) {
        self.state.mailboxes.write().remove(id);
    }

    /// Detach every endpoint, ending all message loops on this network.
    pub fn shutdown(&self) {
        self.state.mailboxes.write().clear();
    }

    /// Cut `id` off: nothing reaches it and nothing it sends gets out.
    pub fn isolate(&self, id: &NodeId) {
        self.state.isolated.write().insert(id.clone());
    }

    pub fn heal(&self, id: &NodeId) {
        self.state.isolated.write().remove(id);
    }

    pub fn is_isolated(&self, id: &NodeId) -> bool {
        self.state.isolated.read().contains(id)
    }

    /// Envelopes successfully placed in a mailbox.
    pub fn delivered(&self) -> u64 {
        self.state.delivered.load(Ordering::Relaxed)
    }

    /// Envelopes refused because an endpoint was isolated or unknown.
    pub fn refused(&self) -> u64 {
        self.state.refused.load(Ordering::Relaxed)
    }
}

/// One endpoint's handle on a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryTransport {
    local: NodeId,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn local_id(&self) -> &NodeId {
        &self.local
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn deliver(&self, envelope: Envelope) -> Result<(), TransportError> {
        let state = &self.network.state;
        let mailbox = {
            let isolated = state.isolated.read();
            if isolated.contains(&self.local) || isolated.contains(&envelope.dest) {
                None
            } else {
                state.mailboxes.read().get(&envelope.dest).cloned()
            }
        };

        let Some(mailbox) = mailbox else {
            state.refused.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::Unreachable(envelope.dest));
        };
        mailbox
            .send(envelope)
            .await
            .map_err(|_| TransportError::Closed)?;
        state.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Body, Payload};

    fn envelope(src: &str, dest: &str) -> Envelope {
        Envelope::new(src.into(), dest.into(), Body::notify(Payload::Read))
    }

    #[tokio::test]
    async fn delivers_to_attached_mailbox() {
        let network = MemoryNetwork::new();
        let (a, _a_inbox) = network.attach("n0".into());
        let (_b, mut b_inbox) = network.attach("n1".into());

        a.deliver(envelope("n0", "n1")).await.unwrap();
        let received = b_inbox.recv().await.unwrap();
        assert_eq!(received.src, NodeId::from("n0"));
        assert_eq!(network.delivered(), 1);
    }

    #[tokio::test]
    async fn unknown_and_isolated_nodes_are_unreachable() {
        let network = MemoryNetwork::new();
        let (a, _a_inbox) = network.attach("n0".into());
        let (b, mut b_inbox) = network.attach("n1".into());

        let err = a.deliver(envelope("n0", "n9")).await.unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(id) if id == NodeId::from("n9")));

        network.isolate(&"n1".into());
        assert!(a.deliver(envelope("n0", "n1")).await.is_err());
        assert!(b.deliver(envelope("n1", "n0")).await.is_err());
        assert_eq!(network.refused(), 3);

        network.heal(&"n1".into());
        a.deliver(envelope("n0", "n1")).await.unwrap();
        assert!(b_inbox.recv().await.is_some());
    }

    #[tokio::test]
    async fn shutdown_ends_message_loops() {
        let network = MemoryNetwork::new();
        let node = network.spawn_node("n0".into(), vec!["n0".into()], NodeConfig::default());
        assert!(node.is_running());
        assert_eq!(Arc::strong_count(&node), 2);

        network.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while Arc::strong_count(&node) > 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        node.stop();
        assert!(!node.is_running());
        let (client, _inbox) = network.attach("c1".into());
        assert!(client.deliver(envelope("c1", "n0")).await.is_err());
    }
}
