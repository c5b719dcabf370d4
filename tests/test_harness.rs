//! Shared helpers for integration tests: rule-friendly node configs, a
//! recording transport, and in-process cluster spawning.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use quorum_lite::config::NodeConfig;
use quorum_lite::node::{NodeStatus, RaftNode};
use quorum_lite::packet::Packet;
use quorum_lite::state::Role;
use quorum_lite::transport::{InProcessNetwork, Transport};

/// Config whose timers are effectively frozen, so rule-level tests observe
/// only the transitions they drive themselves.
pub fn quiet_config(name: &str) -> NodeConfig {
    NodeConfig::new(name)
        .with_election(Duration::from_secs(600), Duration::from_secs(600))
        .with_heartbeat(Duration::from_secs(600), Duration::from_secs(600))
}

/// Config with short timeouts for timing-driven tests.
pub fn fast_config(name: &str) -> NodeConfig {
    NodeConfig::new(name)
        .with_election(Duration::from_millis(60), Duration::from_millis(120))
        .with_heartbeat(Duration::from_millis(15), Duration::from_millis(25))
}

/// Transport that records everything the node hands it and admits it all.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(Option<String>, Packet)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything sent so far: `(Some(peer), packet)` for unicasts,
    /// `(None, packet)` for broadcasts.
    pub fn sent(&self) -> Vec<(Option<String>, Packet)> {
        self.sent.lock().clone()
    }

    /// Drain the record.
    pub fn take(&self) -> Vec<(Option<String>, Packet)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Unicast packets addressed to `name`.
    pub fn sent_to(&self, name: &str) -> Vec<Packet> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to.as_deref() == Some(name))
            .map(|(_, packet)| packet.clone())
            .collect()
    }

    /// Broadcast packets handed to the sink.
    pub fn broadcasts(&self) -> Vec<Packet> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to.is_none())
            .map(|(_, packet)| packet.clone())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, to: &str, packet: Packet) -> bool {
        self.sent.lock().push((Some(to.to_string()), packet));
        true
    }

    fn broadcast(&self, packet: Packet) -> bool {
        self.sent.lock().push((None, packet));
        true
    }
}

/// An in-process cluster of live nodes with their packet pumps running.
pub struct TestCluster {
    pub network: Arc<InProcessNetwork>,
    pub nodes: Vec<RaftNode>,
    pumps: Vec<JoinHandle<()>>,
}

impl TestCluster {
    /// Spawn `n` nodes named `n1..n{n}` with fast timeouts, all meshed.
    pub fn spawn(n: usize) -> Self {
        let network = InProcessNetwork::new();
        let mut nodes = Vec::with_capacity(n);
        let mut pumps = Vec::with_capacity(n);

        for i in 1..=n {
            let name = format!("n{i}");
            let (link, mut inbound) = network.open(name.as_str());
            let node = RaftNode::with_parts(fast_config(&name), Arc::new(link), network.clone());

            let pump = node.clone();
            pumps.push(tokio::spawn(async move {
                while let Some(packet) = inbound.recv().await {
                    pump.read(packet);
                }
            }));
            nodes.push(node);
        }

        Self {
            network,
            nodes,
            pumps,
        }
    }

    pub fn node(&self, name: &str) -> &RaftNode {
        self.nodes
            .iter()
            .find(|node| node.name() == name)
            .unwrap_or_else(|| panic!("no node named {name}"))
    }

    pub fn statuses(&self) -> Vec<NodeStatus> {
        self.nodes.iter().map(|node| node.status()).collect()
    }

    fn live_statuses(&self) -> Vec<NodeStatus> {
        self.statuses()
            .into_iter()
            .filter(|status| status.role != Role::Stopped)
            .collect()
    }

    /// The settled leader, if the cluster has converged: exactly one live
    /// leader, every other live node following it at the same term.
    pub fn settled_leader(&self) -> Option<String> {
        let live = self.live_statuses();
        let mut leaders = live.iter().filter(|status| status.role == Role::Leader);
        let leader = leaders.next()?;
        if leaders.next().is_some() {
            return None;
        }
        let agreed = live.iter().all(|status| {
            status.term == leader.term
                && (status.name == leader.name
                    || (status.role == Role::Follower
                        && status.leader.as_deref() == Some(leader.name.as_str())))
        });
        agreed.then(|| leader.name.clone())
    }

    /// Wait until the cluster converges on a single leader.
    pub async fn wait_for_leader(&self, timeout: Duration) -> String {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(leader) = self.settled_leader() {
                return leader;
            }
            if Instant::now() >= deadline {
                panic!("cluster never settled on a leader: {:?}", self.statuses());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Take a node off the mesh and stop it.
    pub fn kill(&self, name: &str) {
        self.network.disconnect(name);
        self.node(name).end();
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        for pump in &self.pumps {
            pump.abort();
        }
        for node in &self.nodes {
            node.end();
        }
    }
}
