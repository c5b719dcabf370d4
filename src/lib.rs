//! Core of a Raft consensus node: the follower/candidate/leader state
//! machine, randomized election and heartbeat timers, and the packet
//! protocol for electing a single leader over an attachable transport.
//!
//! Log replication, durable term/vote persistence, and membership changes
//! are out of scope; transports and membership providers plug in through
//! the [`transport::Transport`] and [`membership::Membership`] seams.

pub mod config;
pub mod error;
pub mod event;
pub mod membership;
pub mod node;
pub mod packet;
pub mod shutdown;
pub mod state;
pub mod timer;
pub mod transport;

pub use config::{parse_duration, NodeConfig, TimeoutRange};
pub use error::{RaftError, Result};
pub use event::NodeEvent;
pub use node::{NodeStatus, RaftNode};
pub use packet::{Ballot, Message, Packet, VoteRequest};
pub use state::Role;
