use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use quorum_lite::config::{parse_duration, NodeConfig};
use quorum_lite::event::NodeEvent;
use quorum_lite::node::RaftNode;
use quorum_lite::shutdown::shutdown_token;
use quorum_lite::transport::InProcessNetwork;

#[derive(Parser, Debug)]
#[command(name = "quorum-lite")]
#[command(about = "In-process Raft leader-election demo cluster")]
struct Args {
    /// Number of nodes in the cluster
    #[arg(long, default_value = "3")]
    nodes: usize,

    /// Election timeout lower bound (milliseconds or e.g. "150 ms")
    #[arg(long, default_value = "150 ms")]
    election_min: String,

    /// Election timeout upper bound
    #[arg(long, default_value = "300 ms")]
    election_max: String,

    /// Heartbeat timeout lower bound
    #[arg(long, default_value = "50 ms")]
    heartbeat_min: String,

    /// Heartbeat timeout upper bound
    #[arg(long, default_value = "70 ms")]
    heartbeat_max: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let election_min = parse_duration(&args.election_min)?;
    let election_max = parse_duration(&args.election_max)?;
    let heartbeat_min = parse_duration(&args.heartbeat_min)?;
    let heartbeat_max = parse_duration(&args.heartbeat_max)?;

    tracing::info!(
        nodes = args.nodes,
        election_min_ms = election_min.as_millis() as u64,
        election_max_ms = election_max.as_millis() as u64,
        heartbeat_min_ms = heartbeat_min.as_millis() as u64,
        heartbeat_max_ms = heartbeat_max.as_millis() as u64,
        "Starting quorum-lite cluster"
    );

    let network = InProcessNetwork::new();
    let mut nodes = Vec::with_capacity(args.nodes);

    for i in 1..=args.nodes {
        let name = format!("node-{i}");
        let config = NodeConfig::new(name.as_str())
            .with_election(election_min, election_max)
            .with_heartbeat(heartbeat_min, heartbeat_max);
        config.validate()?;

        let (link, mut inbound) = network.open(name.as_str());
        let node = RaftNode::with_parts(config, Arc::new(link), network.clone());

        let pump = node.clone();
        tokio::spawn(async move {
            while let Some(packet) = inbound.recv().await {
                pump.read(packet);
            }
        });

        let mut events = node.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(NodeEvent::StateChange { new, old }) => {
                        tracing::info!(node = %name, from = %old, to = %new, "Role change");
                    }
                    Ok(NodeEvent::LeaderChange { new, .. }) => {
                        tracing::info!(
                            node = %name,
                            leader = new.as_deref().unwrap_or("-"),
                            "Leader change"
                        );
                    }
                    Ok(NodeEvent::TermChange { new, old }) => {
                        tracing::debug!(node = %name, term = new, previous = old, "Term change");
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        nodes.push(node);
    }

    let shutdown = shutdown_token();
    shutdown.cancelled().await;

    for node in &nodes {
        network.disconnect(node.name());
        node.end();
    }
    for node in &nodes {
        let status = node.status();
        tracing::info!(
            node = %status.name,
            role = %status.role,
            term = status.term,
            leader = status.leader.as_deref().unwrap_or("-"),
            "Final status"
        );
    }

    Ok(())
}
