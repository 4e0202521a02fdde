//! End-to-end tests over the in-memory network.

use murmur_node::{Client, MemoryNetwork, Node, NodeConfig, NodeId, Strategy, Topology};
use murmur_node::MemoryTransport;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

const SETTLE: Duration = Duration::from_secs(5);

fn ids(names: &[&str]) -> Vec<NodeId> {
    names.iter().map(|name| NodeId::from(*name)).collect()
}

fn fast(strategy: Strategy) -> NodeConfig {
    NodeConfig::builder()
        .strategy(strategy)
        .sync_interval(20)
        .rpc_timeout(50)
        .build()
}

fn spawn_cluster(
    network: &MemoryNetwork,
    cluster: &[NodeId],
    config: NodeConfig,
) -> Vec<Arc<Node<MemoryTransport>>> {
    cluster
        .iter()
        .map(|id| network.spawn_node(id.clone(), cluster.to_vec(), config.clone()))
        .collect()
}

fn star() -> Topology {
    let mut map = BTreeMap::new();
    map.insert(NodeId::from("n0"), ids(&["n1", "n2"]));
    map.insert(NodeId::from("n1"), ids(&["n0"]));
    map.insert(NodeId::from("n2"), ids(&["n0"]));
    Topology::from(map)
}

/// Poll `node` through `client` until its replica holds every value in
/// `expected`, or give up after `SETTLE`.
async fn wait_for(client: &Client<MemoryTransport>, node: &NodeId, expected: &[i64]) -> Vec<i64> {
    let want: HashSet<_> = expected.iter().copied().collect();
    let poll = async {
        loop {
            if let Ok(values) = client.read(node).await {
                if want.iter().all(|value| values.contains(value)) {
                    return values;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(SETTLE, poll)
        .await
        .unwrap_or_else(|_| panic!("{} never received {:?}", node, expected))
}

#[tokio::test]
async fn star_cluster_converges_on_a_broadcast() {
    let network = MemoryNetwork::new();
    let cluster = ids(&["n0", "n1", "n2"]);
    let _nodes = spawn_cluster(&network, &cluster, fast(Strategy::Hybrid));
    let client = Client::connect(&network, "c1");

    client.assign_topology(&star()).await.unwrap();
    client.broadcast(&cluster[0], 5).await.unwrap();
    assert_eq!(client.read(&cluster[0]).await.unwrap(), vec![5]);

    for id in &cluster[1..] {
        assert_eq!(wait_for(&client, id, &[5]).await, vec![5]);
    }
}

#[tokio::test]
async fn anti_entropy_alone_reaches_the_far_end_of_a_line() {
    let network = MemoryNetwork::new();
    let cluster = ids(&["n0", "n1", "n2", "n3"]);
    let _nodes = spawn_cluster(&network, &cluster, fast(Strategy::AntiEntropy));
    let client = Client::connect(&network, "c1");

    client.assign_topology(&Topology::line(&cluster)).await.unwrap();
    client.broadcast(&cluster[0], 1).await.unwrap();
    client.broadcast(&cluster[3], 2).await.unwrap();

    for id in &cluster {
        let values = wait_for(&client, id, &[1, 2]).await;
        assert_eq!(values.len(), 2);
    }
}

#[tokio::test]
async fn duplicate_broadcasts_are_stored_once() {
    let network = MemoryNetwork::new();
    let cluster = ids(&["n0", "n1", "n2"]);
    let _nodes = spawn_cluster(&network, &cluster, fast(Strategy::Hybrid));
    let client = Client::connect(&network, "c1");

    client.assign_topology(&star()).await.unwrap();
    client.broadcast(&cluster[1], 8).await.unwrap();
    client.broadcast(&cluster[2], 8).await.unwrap();
    client.broadcast(&cluster[0], 8).await.unwrap();

    for id in &cluster {
        assert_eq!(wait_for(&client, id, &[8]).await, vec![8]);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    for id in &cluster {
        assert_eq!(client.read(id).await.unwrap(), vec![8]);
    }
}

#[tokio::test]
async fn isolated_node_catches_up_after_healing() {
    let network = MemoryNetwork::new();
    let cluster = ids(&["n0", "n1", "n2"]);
    let _nodes = spawn_cluster(&network, &cluster, fast(Strategy::Hybrid));
    let client = Client::connect(&network, "c1");

    client.assign_topology(&star()).await.unwrap();
    network.isolate(&cluster[2]);

    // Acks do not wait on the unreachable neighbor.
    let acked = tokio::time::timeout(Duration::from_millis(200), async {
        client.broadcast(&cluster[0], 11).await?;
        client.broadcast(&cluster[1], 12).await
    })
    .await;
    assert!(matches!(acked, Ok(Ok(()))));

    wait_for(&client, &cluster[1], &[11, 12]).await;
    network.heal(&cluster[2]);

    let values = wait_for(&client, &cluster[2], &[11, 12]).await;
    assert_eq!(values.len(), 2);
}

#[tokio::test]
async fn flood_only_node_resends_what_an_unreachable_neighbor_missed() {
    let network = MemoryNetwork::new();
    let cluster = ids(&["n0", "n1", "n2"]);
    let _nodes = spawn_cluster(&network, &cluster, fast(Strategy::Flood));
    let client = Client::connect(&network, "c1");

    client.assign_topology(&star()).await.unwrap();
    network.isolate(&cluster[2]);
    client.broadcast(&cluster[0], 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    network.heal(&cluster[2]);
    client.broadcast(&cluster[0], 2).await.unwrap();

    let values = wait_for(&client, &cluster[2], &[1, 2]).await;
    assert_eq!(values.len(), 2);
}

#[tokio::test]
async fn silent_neighbor_does_not_hold_up_the_ack() {
    let network = MemoryNetwork::new();
    let cluster = ids(&["n0", "n1", "n2"]);
    let patient = NodeConfig::builder()
        .strategy(Strategy::Hybrid)
        .sync_interval(20)
        .rpc_timeout(10_000)
        .build();
    let _nodes = spawn_cluster(&network, &cluster[..2], patient);
    // n2's mailbox accepts envelopes but nothing ever answers them.
    let (_silent, _silent_inbox) = network.attach(cluster[2].clone());
    let client = Client::connect(&network, "c1");

    for id in &cluster[..2] {
        client.topology(id, star()).await.unwrap();
    }
    let acked = tokio::time::timeout(Duration::from_millis(100), client.broadcast(&cluster[0], 31)).await;
    assert!(matches!(acked, Ok(Ok(()))));

    wait_for(&client, &cluster[1], &[31]).await;
}

#[tokio::test]
async fn flood_only_cluster_delivers_without_sync_rounds() {
    let network = MemoryNetwork::new();
    let cluster = ids(&["n0", "n1", "n2", "n3"]);
    let nodes = spawn_cluster(&network, &cluster, fast(Strategy::Flood));
    let client = Client::connect(&network, "c1");

    client.assign_topology(&Topology::ring(&cluster)).await.unwrap();
    client.broadcast(&cluster[0], 21).await.unwrap();

    for id in &cluster {
        wait_for(&client, id, &[21]).await;
    }
    for node in &nodes {
        assert_eq!(node.disseminator().gate().rounds_started(), 0);
    }
}

#[tokio::test]
async fn generated_ids_are_unique_across_nodes() {
    let network = MemoryNetwork::new();
    let cluster = ids(&["n0", "n1", "n2"]);
    let _nodes = spawn_cluster(&network, &cluster, fast(Strategy::Hybrid));
    let client = Client::connect(&network, "c1");

    let mut seen = HashSet::new();
    for _ in 0..10 {
        for id in &cluster {
            let generated = client.generate(id).await.unwrap();
            assert!(seen.insert(generated), "duplicate id");
        }
    }
    assert_eq!(seen.len(), 30);
}

#[tokio::test]
async fn reads_before_any_broadcast_are_empty() {
    let network = MemoryNetwork::new();
    let cluster = ids(&["n0", "n1"]);
    let _nodes = spawn_cluster(&network, &cluster, fast(Strategy::Hybrid));
    let client = Client::connect(&network, "c1");

    for id in &cluster {
        assert!(client.read(id).await.unwrap().is_empty());
    }
}
