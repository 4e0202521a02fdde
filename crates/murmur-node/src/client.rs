//! Test and simulation client speaking the workload protocol.

use crate::error::{NodeError, Result};
use crate::memory::{MemoryNetwork, MemoryTransport};
use crate::protocol::{Envelope, Payload};
use crate::transport::{Endpoint, Transport};
use murmur_core::{NodeId, Topology, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default time to wait for a node's answer.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(1);

/// Issues `broadcast`, `read`, `topology` and `generate` requests the way
/// the workload controller does.
///
/// # Example
///
/// ```rust,no_run
/// use murmur_node::{Client, MemoryNetwork, NodeConfig};
///
/// # async fn demo() -> murmur_node::Result<()> {
/// let network = MemoryNetwork::new();
/// network.spawn_node("n0".into(), vec!["n0".into()], NodeConfig::default());
///
/// let client = Client::connect(&network, "c1");
/// client.broadcast(&"n0".into(), 5).await?;
/// assert_eq!(client.read(&"n0".into()).await?, vec![5]);
/// # Ok(())
/// # }
/// ```
pub struct Client<T: Transport> {
    endpoint: Arc<Endpoint<T>>,
    timeout: Duration,
    pump: JoinHandle<()>,
}

impl Client<MemoryTransport> {
    /// Attach a client named `id` to an in-memory network.
    pub fn connect(network: &MemoryNetwork, id: impl Into<NodeId>) -> Self {
        let id = id.into();
        let (transport, inbox) = network.attach(id.clone());
        Self::new(Arc::new(Endpoint::new(id, transport)), inbox)
    }
}

impl<T: Transport> Client<T> {
    /// Wrap an endpoint whose incoming envelopes arrive on `inbox`.
    pub fn new(endpoint: Arc<Endpoint<T>>, mut inbox: mpsc::Receiver<Envelope>) -> Self {
        let pump_endpoint = Arc::clone(&endpoint);
        let pump = tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                if let Some(stray) = pump_endpoint.complete(envelope) {
                    debug!(
                        client = %pump_endpoint.id(),
                        from = %stray.src,
                        kind = stray.body.payload.kind(),
                        "client dropped unsolicited message"
                    );
                }
            }
        });
        Self {
            endpoint,
            timeout: DEFAULT_CLIENT_TIMEOUT,
            pump,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn id(&self) -> &NodeId {
        self.endpoint.id()
    }

    async fn call(&self, node: &NodeId, payload: Payload) -> Result<Payload> {
        let request = payload.kind();
        let reply = self.endpoint.rpc(node, payload, self.timeout).await?;
        match reply.body.payload {
            Payload::Error { code, text } => Err(NodeError::Remote { code, text }),
            other => {
                debug!(node = %node, request, reply = other.kind(), "client call answered");
                Ok(other)
            }
        }
    }

    pub async fn broadcast(&self, node: &NodeId, value: Value) -> Result<()> {
        match self.call(node, Payload::Broadcast { message: value }).await? {
            Payload::BroadcastOk => Ok(()),
            other => Err(unexpected("broadcast", &other)),
        }
    }

    pub async fn read(&self, node: &NodeId) -> Result<Vec<Value>> {
        match self.call(node, Payload::Read).await? {
            Payload::ReadOk { messages } => Ok(messages),
            other => Err(unexpected("read", &other)),
        }
    }

    pub async fn topology(&self, node: &NodeId, topology: Topology) -> Result<()> {
        match self.call(node, Payload::Topology { topology }).await? {
            Payload::TopologyOk => Ok(()),
            other => Err(unexpected("topology", &other)),
        }
    }

    /// Send `topology` to every node it mentions.
    pub async fn assign_topology(&self, topology: &Topology) -> Result<()> {
        for node in topology.nodes() {
            self.topology(node, topology.clone()).await?;
        }
        Ok(())
    }

    pub async fn generate(&self, node: &NodeId) -> Result<String> {
        match self.call(node, Payload::Generate).await? {
            Payload::GenerateOk { id } => Ok(id),
            other => Err(unexpected("generate", &other)),
        }
    }
}

impl<T: Transport> Drop for Client<T> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn unexpected(request: &'static str, got: &Payload) -> NodeError {
    NodeError::UnexpectedReply {
        request,
        got: got.kind(),
    }
}
