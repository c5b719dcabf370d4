use serde::{Deserialize, Serialize};

/// Raft node role.
///
/// `Stopped` is not part of the Raft paper; it marks a node that has been
/// shut down with [`end`](crate::node::RaftNode::end) and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Follower,
    Candidate,
    Leader,
    Stopped,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Follower => write!(f, "follower"),
            Role::Candidate => write!(f, "candidate"),
            Role::Leader => write!(f, "leader"),
            Role::Stopped => write!(f, "stopped"),
        }
    }
}

/// Volatile per-node election state.
///
/// # Safety invariants
///
/// - `term` never decreases over the node's lifetime.
/// - Whenever `term` advances, `voted_for` and `votes_granted` are reset in
///   the same transition, so a node grants at most one vote per term.
/// - `leader` is `None` at startup and `Some("")` while an election is in
///   flight; it names a peer only once one is recognized as leader.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    pub role: Role,
    pub term: u64,
    pub leader: Option<String>,
    pub voted_for: Option<String>,
    pub votes_granted: u64,
}

impl NodeState {
    pub fn new() -> Self {
        Self {
            role: Role::Follower,
            term: 0,
            leader: None,
            voted_for: None,
            votes_granted: 0,
        }
    }

    /// Forget the current-term vote record. Must accompany every term
    /// advancement.
    pub fn clear_vote(&mut self) {
        self.voted_for = None;
        self.votes_granted = 0;
    }

    /// Cast the implicit self-vote a candidate starts its campaign with.
    pub fn vote_for_self(&mut self, name: &str) {
        self.voted_for = Some(name.to_string());
        self.votes_granted = 1;
    }

    /// Tally one granted ballot from a peer.
    pub fn record_ballot(&mut self) {
        self.votes_granted += 1;
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_follower() {
        let state = NodeState::new();
        assert_eq!(state.role, Role::Follower);
        assert_eq!(state.term, 0);
        assert_eq!(state.leader, None);
        assert_eq!(state.voted_for, None);
        assert_eq!(state.votes_granted, 0);
    }

    #[test]
    fn test_clear_vote() {
        let mut state = NodeState::new();
        state.vote_for_self("n1");
        state.record_ballot();
        assert_eq!(state.votes_granted, 2);

        state.clear_vote();
        assert_eq!(state.voted_for, None);
        assert_eq!(state.votes_granted, 0);
    }

    #[test]
    fn test_vote_for_self() {
        let mut state = NodeState::new();
        state.vote_for_self("n1");
        assert_eq!(state.voted_for.as_deref(), Some("n1"));
        assert_eq!(state.votes_granted, 1);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Follower.to_string(), "follower");
        assert_eq!(Role::Candidate.to_string(), "candidate");
        assert_eq!(Role::Leader.to_string(), "leader");
        assert_eq!(Role::Stopped.to_string(), "stopped");
    }
}
