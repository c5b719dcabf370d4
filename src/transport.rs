use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::membership::Membership;
use crate::packet::Packet;

/// Outbound sink the node hands packets to.
///
/// The core neither dials nor frames; implementations own addressing,
/// encoding, and fan-out. Both methods report whether the packet was
/// admitted to the transport.
pub trait Transport: Send + Sync {
    /// Deliver a packet to the single peer named `to`.
    fn send(&self, to: &str, packet: Packet) -> bool;

    /// Hand a packet to the outbound sink once; delivering it to every peer
    /// is the transport's job.
    fn broadcast(&self, packet: Packet) -> bool;
}

/// Placeholder sink for a node with no transport attached: admits nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, _to: &str, _packet: Packet) -> bool {
        false
    }

    fn broadcast(&self, _packet: Packet) -> bool {
        false
    }
}

/// In-process packet mesh for demos and tests.
///
/// Every registered node gets a FIFO inbound channel, which preserves
/// same-sender ordering. The route table doubles as the membership
/// provider.
#[derive(Debug, Default)]
pub struct InProcessNetwork {
    routes: Mutex<HashMap<String, mpsc::UnboundedSender<Packet>>>,
}

impl InProcessNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `name` on the mesh. Returns the node's outbound link and
    /// the inbound packet stream the caller pumps into `RaftNode::read`.
    pub fn open(
        self: &Arc<Self>,
        name: impl Into<String>,
    ) -> (InProcessLink, mpsc::UnboundedReceiver<Packet>) {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().insert(name.clone(), tx);
        let link = InProcessLink {
            origin: name,
            network: Arc::clone(self),
        };
        (link, rx)
    }

    /// Drop `name` from the mesh; packets addressed to it are discarded
    /// from now on and it no longer counts toward membership.
    pub fn disconnect(&self, name: &str) {
        self.routes.lock().remove(name);
    }

    fn deliver(&self, to: &str, packet: Packet) -> bool {
        match self.routes.lock().get(to) {
            Some(route) => route.send(packet).is_ok(),
            None => false,
        }
    }

    fn fan_out(&self, from: &str, packet: Packet) -> bool {
        let routes = self.routes.lock();
        for (name, route) in routes.iter() {
            if name != from {
                let _ = route.send(packet.clone());
            }
        }
        true
    }
}

impl Membership for InProcessNetwork {
    fn size(&self) -> usize {
        self.routes.lock().len()
    }
}

/// A single node's handle onto an [`InProcessNetwork`].
#[derive(Debug, Clone)]
pub struct InProcessLink {
    origin: String,
    network: Arc<InProcessNetwork>,
}

impl Transport for InProcessLink {
    fn send(&self, to: &str, packet: Packet) -> bool {
        self.network.deliver(to, packet)
    }

    fn broadcast(&self, packet: Packet) -> bool {
        self.network.fan_out(&self.origin, packet)
    }
}
