use serde::{Deserialize, Serialize};

use crate::state::Role;

/// Kind-specific packet body.
///
/// Serialized adjacently tagged so the wire envelope carries the kind under
/// `type` and the body under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Message {
    /// Leader keep-alive. Carries the duration in milliseconds the recipient
    /// should re-arm its watchdog with, when present.
    Heartbeat(Option<u64>),
    /// A candidate soliciting this node's vote.
    Vote(VoteRequest),
    /// A ballot answering a solicitation we sent.
    Voted(Ballot),
    /// Reserved for future client-command dispatch.
    Rpc(serde_json::Value),
}

impl Message {
    /// Short kind label, mirroring the wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Heartbeat(_) => "heartbeat",
            Message::Vote(_) => "vote",
            Message::Voted(_) => "voted",
            Message::Rpc(_) => "rpc",
        }
    }
}

/// Vote solicitation body. The log-freshness fields are accepted for
/// compatibility with full Raft (§5.4) but not evaluated while the log
/// module is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoteRequest {
    #[serde(default)]
    pub last_log_index: u64,
    #[serde(default)]
    pub last_log_term: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub granted: bool,
}

/// The envelope exchanged between nodes.
///
/// Wire shape: `{ state, term, name, type, data }`. Framing and encoding are
/// the transport's choice; JSON helpers are provided for transports that
/// want them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Sender's role at send time.
    pub state: Role,
    /// Sender's term at send time.
    pub term: u64,
    /// Sender identity.
    pub name: String,
    #[serde(flatten)]
    pub message: Message,
}

impl Packet {
    /// Decode a packet from JSON text. Anything that is not a structured
    /// envelope yields `None` and is dropped by the caller.
    pub fn from_json(input: &str) -> Option<Packet> {
        serde_json::from_str(input).ok()
    }

    /// Decode a packet from raw bytes, same dropping contract as
    /// [`Packet::from_json`].
    pub fn from_slice(input: &[u8]) -> Option<Packet> {
        serde_json::from_slice(input).ok()
    }
}
