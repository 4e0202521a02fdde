//! The broadcast node: protocol handlers over the replica store.

use crate::config::NodeConfig;
use crate::disseminator::Disseminator;
use crate::error::{NodeError, Result};
use crate::protocol::{Envelope, Payload};
use crate::transport::{Endpoint, Transport};
use murmur_core::{Ingested, NodeId, ReplicaStore, Topology, TopologyManager, Value};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One participant in the broadcast cluster.
///
/// Handlers may run concurrently with each other and with the sync timer;
/// all shared state lives in the [`ReplicaStore`] and [`TopologyManager`].
pub struct Node<T: Transport> {
    endpoint: Arc<Endpoint<T>>,
    cluster: Arc<[NodeId]>,
    store: Arc<ReplicaStore>,
    topology: Arc<TopologyManager>,
    config: NodeConfig,
    disseminator: Disseminator<T>,
    next_unique: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> Node<T> {
    /// Create a node. `cluster` lists every node id, this one included.
    pub fn new(endpoint: Arc<Endpoint<T>>, cluster: Vec<NodeId>, config: NodeConfig) -> Arc<Self> {
        let cluster: Arc<[NodeId]> = cluster.into();
        let store = Arc::new(ReplicaStore::new());
        let topology = Arc::new(TopologyManager::new());
        let disseminator = Disseminator::new(
            Arc::clone(&endpoint),
            Arc::clone(&store),
            Arc::clone(&topology),
            Arc::clone(&cluster),
            config.clone(),
        );
        Arc::new(Self {
            endpoint,
            cluster,
            store,
            topology,
            config,
            disseminator,
            next_unique: AtomicU64::new(0),
            timer: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &NodeId {
        self.endpoint.id()
    }

    pub fn endpoint(&self) -> &Arc<Endpoint<T>> {
        &self.endpoint
    }

    pub fn cluster(&self) -> &[NodeId] {
        &self.cluster
    }

    pub fn store(&self) -> &Arc<ReplicaStore> {
        &self.store
    }

    pub fn topology(&self) -> &Arc<TopologyManager> {
        &self.topology
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn disseminator(&self) -> &Disseminator<T> {
        &self.disseminator
    }

    /// Start the periodic sync timer, if the strategy uses one. The timer
    /// runs until [`Node::stop`] or until the node is dropped.
    pub fn start(&self) {
        info!(
            node = %self.id(),
            strategy = %self.config.strategy,
            cluster = self.cluster.len(),
            "node started"
        );
        let timer = self.disseminator.spawn_timer();
        if let Some(previous) = std::mem::replace(&mut *self.timer.lock(), timer) {
            previous.abort();
        }
    }

    /// Stop the sync timer. Rounds already in flight run to completion.
    pub fn stop(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
            debug!(node = %self.id(), "sync timer stopped");
        }
    }

    /// Whether the sync timer is running.
    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Current replica set.
    pub fn read(&self) -> Vec<Value> {
        self.store.snapshot()
    }

    /// Admit a client or peer value; floods it when it is new.
    pub fn ingest(&self, value: Value, source: &NodeId) -> Ingested {
        let outcome = self.store.ingest(value, source);
        if outcome.is_new() {
            debug!(value, from = %source, total = self.store.len(), "admitted value");
            if self.config.strategy.floods() {
                self.disseminator.flood(value, source);
            }
        }
        outcome
    }

    pub fn assign_topology(&self, topology: Topology) {
        let neighbors = topology.neighbors_of(self.id()).to_vec();
        if self.topology.assign(topology).is_some() {
            warn!("topology reassigned");
        }
        info!(neighbors = ?neighbors, "topology assigned");
    }

    /// Ids of the form `<node>-<counter>`, unique across the cluster.
    pub fn generate_id(&self) -> String {
        let n = self.next_unique.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.id(), n)
    }

    /// Apply `request` and produce the answer payload, if it has one.
    pub fn dispatch(&self, request: &Envelope) -> Result<Option<Payload>> {
        let src = &request.src;
        match &request.body.payload {
            Payload::Broadcast { message } => {
                self.ingest(*message, src);
                Ok(Some(Payload::BroadcastOk))
            }
            Payload::Read => Ok(Some(Payload::ReadOk {
                messages: self.read(),
            })),
            Payload::Topology { topology } => {
                self.assign_topology(topology.clone());
                Ok(Some(Payload::TopologyOk))
            }
            Payload::Sync { messages } => {
                let admitted = self.store.ingest_all(messages.iter().copied(), src);
                if !admitted.is_empty() {
                    debug!(from = %src, admitted = ?admitted, "admitted values from sync");
                    if self.config.strategy.relays_synced() {
                        self.disseminator.relay(&admitted, src);
                    }
                }
                Ok(Some(Payload::SyncOk {
                    messages: messages.clone(),
                }))
            }
            Payload::SyncOk { messages } => {
                // Acknowledgment that outlived its rpc; still good provenance.
                self.store.record_delivery(src, messages);
                Ok(None)
            }
            Payload::Generate => Ok(Some(Payload::GenerateOk {
                id: self.generate_id(),
            })),
            Payload::Init { node_id, .. } if node_id == self.id() => Ok(Some(Payload::InitOk)),
            Payload::Init { node_id, .. } => Err(NodeError::Malformed(format!(
                "init for {} delivered to {}",
                node_id,
                self.id()
            ))),
            Payload::Error { code, text } => {
                warn!(from = %src, code = %code, text = %text, "peer reported error");
                Ok(None)
            }
            Payload::InitOk
            | Payload::BroadcastOk
            | Payload::ReadOk { .. }
            | Payload::TopologyOk
            | Payload::GenerateOk { .. } => {
                debug!(from = %src, kind = request.body.payload.kind(), "ignoring stray reply");
                Ok(None)
            }
        }
    }

    /// Dispatch `request` and send its answer or error back.
    pub async fn handle(&self, request: Envelope) {
        let answer = match self.dispatch(&request) {
            Ok(Some(payload)) => payload,
            Ok(None) => return,
            Err(err) => {
                warn!(from = %request.src, kind = request.body.payload.kind(), error = %err, "request failed");
                Payload::Error {
                    code: err.code(),
                    text: err.to_string(),
                }
            }
        };
        if let Err(err) = self.endpoint.reply(&request, answer).await {
            debug!(to = %request.src, error = %err, "failed to reply");
        }
    }
}

impl<T: Transport> Drop for Node<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNetwork;
    use crate::protocol::{Body, ErrorCode};
    use murmur_sync::Strategy;

    fn node(config: NodeConfig) -> Arc<Node<crate::memory::MemoryTransport>> {
        let network = MemoryNetwork::new();
        let (transport, _inbox) = network.attach("n0".into());
        let endpoint = Arc::new(Endpoint::new("n0".into(), transport));
        Node::new(endpoint, vec!["n0".into(), "n1".into()], config)
    }

    fn request(src: &str, msg_id: u64, payload: Payload) -> Envelope {
        Envelope::new(src.into(), "n0".into(), Body::request(msg_id, payload))
    }

    #[tokio::test]
    async fn broadcast_then_read_in_arrival_order() {
        let node = node(NodeConfig::default());
        for (i, value) in [3, 1, 3, 2].into_iter().enumerate() {
            let answer = node
                .dispatch(&request("c1", i as u64, Payload::Broadcast { message: value }))
                .unwrap();
            assert_eq!(answer, Some(Payload::BroadcastOk));
        }
        let answer = node.dispatch(&request("c1", 9, Payload::Read)).unwrap();
        assert_eq!(answer, Some(Payload::ReadOk { messages: vec![3, 1, 2] }));
    }

    #[tokio::test]
    async fn sync_admits_new_values_and_echoes_the_batch() {
        let node = node(NodeConfig::builder().strategy(Strategy::AntiEntropy).build());
        node.ingest(1, &"c1".into());

        let answer = node
            .dispatch(&request("n1", 1, Payload::Sync { messages: vec![1, 2, 2] }))
            .unwrap();
        assert_eq!(answer, Some(Payload::SyncOk { messages: vec![1, 2, 2] }));
        assert_eq!(node.read(), vec![1, 2]);
        assert!(node.store().is_known_to(&1, &"n1".into()));
        assert!(node.store().is_known_to(&2, &"n1".into()));
    }

    #[tokio::test]
    async fn late_sync_ok_still_records_provenance() {
        let node = node(NodeConfig::default());
        node.ingest(4, &"c1".into());
        let late = Envelope::new(
            "n1".into(),
            "n0".into(),
            Body::reply(77, Payload::SyncOk { messages: vec![4] }),
        );
        assert_eq!(node.dispatch(&late).unwrap(), None);
        assert!(node.store().is_known_to(&4, &"n1".into()));
    }

    #[tokio::test]
    async fn topology_is_stored_and_acknowledged() {
        let node = node(NodeConfig::default());
        assert!(!node.topology().is_assigned());
        let ids = [NodeId::from("n0"), NodeId::from("n1")];
        let answer = node
            .dispatch(&request("c1", 1, Payload::Topology { topology: Topology::line(&ids) }))
            .unwrap();
        assert_eq!(answer, Some(Payload::TopologyOk));
        assert_eq!(node.topology().neighbors_of(node.id()), vec![NodeId::from("n1")]);
    }

    #[tokio::test]
    async fn generated_ids_are_prefixed_and_distinct() {
        let node = node(NodeConfig::default());
        let a = node.generate_id();
        let b = node.generate_id();
        assert!(a.starts_with("n0-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn misaddressed_init_is_malformed() {
        let node = node(NodeConfig::default());
        let init = |id: &str| Payload::Init {
            node_id: id.into(),
            node_ids: vec!["n0".into(), "n1".into()],
        };
        assert_eq!(
            node.dispatch(&request("c0", 1, init("n0"))).unwrap(),
            Some(Payload::InitOk)
        );
        let err = node.dispatch(&request("c0", 2, init("n1"))).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedRequest);
    }

    #[tokio::test]
    async fn stray_replies_get_no_answer() {
        let node = node(NodeConfig::default());
        let stray = Envelope::new("n1".into(), "n0".into(), Body::reply(3, Payload::BroadcastOk));
        assert_eq!(node.dispatch(&stray).unwrap(), None);
    }

    #[tokio::test]
    async fn timer_is_owned_by_the_node() {
        let hybrid = node(NodeConfig::default());
        assert!(!hybrid.is_running());
        hybrid.start();
        assert!(hybrid.is_running());
        hybrid.stop();
        assert!(!hybrid.is_running());

        let flood_only = node(NodeConfig::builder().strategy(Strategy::Flood).build());
        flood_only.start();
        assert!(!flood_only.is_running());
    }

    #[tokio::test]
    async fn flood_only_node_passes_synced_values_on() {
        let network = MemoryNetwork::new();
        let (transport, _inbox) = network.attach("n0".into());
        let (_n2, mut n2_inbox) = network.attach("n2".into());
        let endpoint = Arc::new(Endpoint::new("n0".into(), transport));
        let node = Node::new(
            endpoint,
            vec!["n0".into(), "n1".into(), "n2".into()],
            NodeConfig::builder().strategy(Strategy::Flood).build(),
        );
        node.assign_topology(Topology::line(&[
            NodeId::from("n1"),
            NodeId::from("n0"),
            NodeId::from("n2"),
        ]));

        node.dispatch(&request("n1", 1, Payload::Sync { messages: vec![1, 2] }))
            .unwrap();

        let relayed = n2_inbox.recv().await.unwrap();
        assert_eq!(relayed.src, NodeId::from("n0"));
        assert_eq!(relayed.body.payload, Payload::Sync { messages: vec![1, 2] });
    }
}
