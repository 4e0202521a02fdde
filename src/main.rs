//! # Murmur
//!
//! A leaderless broadcast node for the Maelstrom workload.
//!
//! `murmur serve` (the default) speaks line-delimited JSON on stdin/stdout:
//!
//! ```text
//! {"src":"c1","dest":"n0","body":{"type":"broadcast","msg_id":1,"message":5}}
//! {"src":"n0","dest":"c1","body":{"type":"broadcast_ok","in_reply_to":1}}
//! ```
//!
//! `murmur simulate` runs a whole cluster in-process and reports how fast it
//! converged.

pub mod simulate;

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use murmur_node::{NodeConfig, Strategy, SyncPayload, SyncTargets};
use simulate::{run_simulation, TopologyKind};
use tracing_subscriber::EnvFilter;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Leaderless broadcast node with flood and anti-entropy dissemination")]
#[command(version)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (logs go to stderr)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one node over stdin/stdout
    Serve(NodeArgs),
    /// Run an in-process cluster and print convergence statistics
    Simulate(SimulateArgs),
}

#[derive(Args, Clone, Debug)]
struct NodeArgs {
    /// Dissemination strategy: flood, anti-entropy or hybrid
    #[arg(long, default_value_t = Strategy::Hybrid)]
    strategy: Strategy,

    /// Milliseconds between sync rounds
    #[arg(long, default_value_t = 500)]
    sync_interval_ms: u64,

    /// Milliseconds to wait for a peer to answer
    #[arg(long, default_value_t = 1000)]
    rpc_timeout_ms: u64,

    /// What a sync carries: full or delta
    #[arg(long, default_value_t = SyncPayload::Delta)]
    sync_payload: SyncPayload,

    /// Who a sync goes to: neighbors or cluster
    #[arg(long, default_value_t = SyncTargets::Neighbors)]
    sync_targets: SyncTargets,

    /// Flood fan-outs allowed in flight at once
    #[arg(long, default_value_t = 64)]
    max_inflight_fanouts: usize,
}

impl Default for NodeArgs {
    fn default() -> Self {
        let defaults = NodeConfig::default();
        Self {
            strategy: defaults.strategy,
            sync_interval_ms: defaults.sync_interval_ms,
            rpc_timeout_ms: defaults.rpc_timeout_ms,
            sync_payload: defaults.sync_payload,
            sync_targets: defaults.sync_targets,
            max_inflight_fanouts: defaults.max_inflight_fanouts,
        }
    }
}

impl From<NodeArgs> for NodeConfig {
    fn from(args: NodeArgs) -> Self {
        NodeConfig::builder()
            .strategy(args.strategy)
            .sync_interval(args.sync_interval_ms)
            .rpc_timeout(args.rpc_timeout_ms)
            .sync_payload(args.sync_payload)
            .sync_targets(args.sync_targets)
            .max_inflight_fanouts(args.max_inflight_fanouts)
            .build()
    }
}

#[derive(Args)]
struct SimulateArgs {
    /// Cluster size
    #[arg(long, default_value_t = 5)]
    nodes: usize,

    /// Distinct values to broadcast
    #[arg(long, default_value_t = 100)]
    values: usize,

    /// Neighbor map shape
    #[arg(long, value_enum, default_value_t = TopologyKind::Line)]
    topology: TopologyKind,

    /// Give up if the cluster has not converged after this many seconds
    #[arg(long, default_value_t = 30)]
    deadline_secs: u64,

    /// Seed for the value and target choice
    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    node: NodeArgs,
}

// ─── Main ──────────────────────────────────────────────────────────────────

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command.unwrap_or_else(|| Commands::Serve(NodeArgs::default())) {
        Commands::Serve(args) => {
            murmur_node::serve_stdio(args.into()).await?;
        }
        Commands::Simulate(args) => {
            let stats = run_simulation(
                args.nodes,
                args.values,
                args.topology,
                args.node.into(),
                Duration::from_secs(args.deadline_secs),
                args.seed,
            )
            .await?;
            stats.print();
        }
    }
    Ok(())
}
