use tokio::sync::broadcast;

use crate::packet::Packet;
use crate::state::Role;

/// Lifecycle events a node publishes on its bus.
///
/// The bus is the seam surrounding code attaches to: transports observe
/// `Data`, higher layers watch the change events. Emission is synchronous
/// within the transition that caused it.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    TermChange {
        new: u64,
        old: u64,
    },
    StateChange {
        new: Role,
        old: Role,
    },
    LeaderChange {
        new: Option<String>,
        old: Option<String>,
    },
    /// The heartbeat watchdog expired on a non-leader; promotion follows.
    HeartbeatTimeout,
    /// A vote this node cast (granted or refused) on a solicitation.
    Vote {
        packet: Packet,
        granted: bool,
    },
    /// Ingress demultiplex point: every accepted, non-stale packet.
    Data {
        packet: Packet,
    },
}

/// Broadcast fan-out of [`NodeEvent`]s to any number of subscribers.
///
/// Slow subscribers lag (and observe `RecvError::Lagged`) rather than block
/// the node. Closing the bus drops the sender so every receiver sees the
/// channel end.
#[derive(Debug)]
pub struct EventBus {
    sender: Option<broadcast::Sender<NodeEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Some(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        match &self.sender {
            Some(sender) => sender.subscribe(),
            // Closed bus: hand out a receiver that reports Closed right away.
            None => broadcast::channel(1).0.subscribe(),
        }
    }

    pub fn emit(&self, event: NodeEvent) {
        if let Some(sender) = &self.sender {
            // A send error only means nobody is listening right now.
            let _ = sender.send(event);
        }
    }

    /// Detach all subscribers. Emissions after this are discarded.
    pub fn close(&mut self) {
        self.sender = None;
    }
}
