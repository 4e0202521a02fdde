use anyhow::{bail, Context};
use futures::future::join_all;
use murmur_node::{Client, MemoryNetwork, MemoryTransport, Node, NodeConfig, NodeId, Topology};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Shape of the neighbor map handed to every node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum TopologyKind {
    Line,
    Ring,
    Star,
    Mesh,
}

impl TopologyKind {
    fn build(self, nodes: &[NodeId]) -> Topology {
        match self {
            TopologyKind::Line => Topology::line(nodes),
            TopologyKind::Ring => Topology::ring(nodes),
            TopologyKind::Star => Topology::star(nodes),
            TopologyKind::Mesh => Topology::mesh(nodes),
        }
    }
}

/// Statistics collected during a simulation run
#[derive(Clone, Debug)]
pub struct SimulationStats {
    pub nodes: usize,
    pub values: usize,
    pub topology: TopologyKind,
    pub edges: usize,
    pub broadcast_time: Duration,
    pub convergence_time: Duration,
    pub delivered: u64,
    pub refused: u64,
}

impl SimulationStats {
    pub fn messages_per_value(&self) -> f64 {
        if self.values == 0 {
            return 0.0;
        }
        self.delivered as f64 / self.values as f64
    }

    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Broadcast Simulation Statistics               ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Nodes:                     {:>30} ║", self.nodes);
        println!("║  Topology:                  {:>30} ║", format!("{:?} ({} directed edges)", self.topology, self.edges));
        println!("║  Values Broadcast:          {:>30} ║", self.values);
        println!("║  Broadcast Time:            {:>29}s ║", format!("{:.3}", self.broadcast_time.as_secs_f64()));
        println!("║  Convergence Time:          {:>29}s ║", format!("{:.3}", self.convergence_time.as_secs_f64()));
        println!("║  Messages Delivered:        {:>30} ║", self.delivered);
        println!("║  Messages Refused:          {:>30} ║", self.refused);
        println!("║  Messages per Value:        {:>30.1} ║", self.messages_per_value());
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// Nodes running on a simulation network. Dropping it stops every sync
/// timer and closes every mailbox.
struct Cluster {
    network: MemoryNetwork,
    nodes: Vec<Arc<Node<MemoryTransport>>>,
}

impl Cluster {
    fn launch(network: &MemoryNetwork, ids: &[NodeId], config: &NodeConfig) -> Self {
        let nodes = ids
            .iter()
            .map(|id| network.spawn_node(id.clone(), ids.to_vec(), config.clone()))
            .collect();
        Self {
            network: network.clone(),
            nodes,
        }
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        for node in &self.nodes {
            node.stop();
        }
        self.network.shutdown();
    }
}

/// Spin up `nodes` nodes on an in-memory network, broadcast `values`
/// random values to random nodes, and wait until every node reads all of
/// them.
pub async fn run_simulation(
    nodes: usize,
    values: usize,
    kind: TopologyKind,
    config: NodeConfig,
    deadline: Duration,
    seed: Option<u64>,
) -> anyhow::Result<SimulationStats> {
    if nodes == 0 {
        bail!("a simulation needs at least one node");
    }

    let network = MemoryNetwork::new();
    let ids: Vec<NodeId> = (0..nodes).map(|i| NodeId::new(format!("n{}", i))).collect();
    let _cluster = Cluster::launch(&network, &ids, &config);

    let topology = kind.build(&ids);
    let client = Client::connect(&network, "c0");
    client
        .assign_topology(&topology)
        .await
        .context("failed to assign topology")?;
    info!(nodes, edges = topology.edge_count(), topology = ?kind, "cluster ready");

    println!("\n[Phase 1/2] Broadcasting {} values...", values);
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let start = Instant::now();
    let mut expected = HashSet::with_capacity(values);
    while expected.len() < values {
        let value: i64 = rng.gen_range(0..i64::from(i32::MAX));
        if !expected.insert(value) {
            continue;
        }
        let target = &ids[rng.gen_range(0..nodes)];
        client
            .broadcast(target, value)
            .await
            .with_context(|| format!("broadcast of {} to {} failed", value, target))?;
    }
    let broadcast_time = start.elapsed();
    println!("[Phase 1/2] ✓ Completed");

    println!("[Phase 2/2] Waiting for convergence...");
    let converged = tokio::time::timeout(deadline, async {
        let mut pending: Vec<&NodeId> = ids.iter().collect();
        while !pending.is_empty() {
            let reads = join_all(pending.iter().map(|id| client.read(id))).await;
            pending = pending
                .into_iter()
                .zip(reads)
                .filter_map(|(id, read)| {
                    let held = read.map(|values| values.len()).unwrap_or(0);
                    if held < expected.len() {
                        debug!(node = %id, held, "not converged yet");
                        Some(id)
                    } else {
                        None
                    }
                })
                .collect();
            if !pending.is_empty() {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        }
    })
    .await;
    if converged.is_err() {
        bail!("cluster did not converge within {:?}", deadline);
    }
    let convergence_time = start.elapsed();
    println!("[Phase 2/2] ✓ Completed");

    Ok(SimulationStats {
        nodes,
        values,
        topology: kind,
        edges: topology.edge_count(),
        broadcast_time,
        convergence_time,
        delivered: network.delivered(),
        refused: network.refused(),
    })
}
