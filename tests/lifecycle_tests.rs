mod test_harness;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use quorum_lite::event::NodeEvent;
use quorum_lite::membership::StaticMembership;
use quorum_lite::node::RaftNode;
use quorum_lite::packet::{Ballot, Message, Packet, VoteRequest};
use quorum_lite::state::Role;
use quorum_lite::timer::TimerKind;

use test_harness::{quiet_config, RecordingTransport};

fn quiet_node(transport: &Arc<RecordingTransport>, cluster_size: usize) -> RaftNode {
    RaftNode::with_parts(
        quiet_config("n1"),
        transport.clone(),
        Arc::new(StaticMembership::new(cluster_size)),
    )
}

fn any_packet(term: u64) -> Packet {
    Packet {
        state: Role::Follower,
        term,
        name: "peer".to_string(),
        message: Message::Rpc(serde_json::Value::Null),
    }
}

#[tokio::test]
async fn test_end_stops_the_node() {
    let transport = RecordingTransport::new();
    let node = quiet_node(&transport, 3);
    let mut events = node.subscribe();

    assert!(node.end());
    assert!(!node.end(), "end is idempotent and reports only once");

    // All entry points refuse a stopped node.
    assert!(!node.read(any_packet(1)));
    assert!(!node.write("peer", any_packet(1)));
    assert!(!node.broadcast(Message::Heartbeat(None)));
    assert!(!node.heartbeat(None));
    node.promote();

    let status = node.status();
    assert_eq!(status.role, Role::Stopped);
    assert_eq!(status.term, 0);
    assert!(status.armed_timers.is_empty());
    assert!(transport.sent().is_empty());

    // Subscribers see the bus close and nothing after it.
    assert!(matches!(events.recv().await, Err(RecvError::Closed)));
    let mut late = node.subscribe();
    assert!(matches!(late.recv().await, Err(RecvError::Closed)));
}

#[tokio::test]
async fn test_promote_emits_changes_in_tuple_order() {
    let transport = RecordingTransport::new();
    let node = quiet_node(&transport, 3);
    let mut events = node.subscribe();

    node.promote();

    assert!(matches!(
        events.try_recv().unwrap(),
        NodeEvent::TermChange { new: 1, old: 0 }
    ));
    match events.try_recv().unwrap() {
        NodeEvent::LeaderChange { new, old } => {
            assert_eq!(new.as_deref(), Some(""));
            assert_eq!(old, None);
        }
        other => panic!("expected leader change, got {other:?}"),
    }
    assert!(matches!(
        events.try_recv().unwrap(),
        NodeEvent::StateChange {
            new: Role::Candidate,
            old: Role::Follower
        }
    ));

    // Freshly promoted: self-vote in, campaign underway.
    let status = node.status();
    assert_eq!(status.role, Role::Candidate);
    assert_eq!(status.term, 1);
    assert_eq!(status.voted_for.as_deref(), Some("n1"));
    assert_eq!(status.votes_granted, 1);
}

#[tokio::test]
async fn test_exactly_one_timer_armed_per_role() {
    let transport = RecordingTransport::new();
    let node = quiet_node(&transport, 3);

    // Follower: watchdog only.
    assert_eq!(node.status().armed_timers, vec![TimerKind::Heartbeat]);

    // Candidate: election timer only.
    node.promote();
    assert_eq!(node.status().armed_timers, vec![TimerKind::Election]);

    // Leader: cadence only.
    assert!(node.read(Packet {
        state: Role::Follower,
        term: 1,
        name: "n2".to_string(),
        message: Message::Voted(Ballot { granted: true }),
    }));
    let status = node.status();
    assert_eq!(status.role, Role::Leader);
    assert_eq!(status.armed_timers, vec![TimerKind::Heartbeat]);
}

#[tokio::test]
async fn test_broadcast_stamps_current_identity() {
    let transport = RecordingTransport::new();
    let node = quiet_node(&transport, 3);

    node.promote();
    transport.take();

    assert!(node.broadcast(Message::Rpc(serde_json::Value::Null)));
    let broadcasts = transport.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].name, "n1");
    assert_eq!(broadcasts[0].term, 1);
    assert_eq!(broadcasts[0].state, Role::Candidate);
}

#[tokio::test]
async fn test_outbound_refused_without_transport() {
    // The default node carries the stub transport, which admits nothing.
    let node = RaftNode::new(quiet_config("n1"));
    assert!(!node.broadcast(Message::Heartbeat(None)));
    assert!(!node.write("peer", any_packet(0)));
}

#[tokio::test]
async fn test_write_routes_unicast() {
    let transport = RecordingTransport::new();
    let node = quiet_node(&transport, 3);

    assert!(node.write("peer", any_packet(0)));
    assert_eq!(transport.sent_to("peer").len(), 1);
}

#[tokio::test]
async fn test_public_heartbeat_adjusts_armed_watchdog() {
    let transport = RecordingTransport::new();
    let node = quiet_node(&transport, 3);

    assert_eq!(node.status().armed_timers, vec![TimerKind::Heartbeat]);
    assert!(node.heartbeat(Some(Duration::from_secs(300))));
    assert_eq!(node.status().armed_timers, vec![TimerKind::Heartbeat]);
}

#[tokio::test]
async fn test_vote_request_log_hooks_are_ignored() {
    let transport = RecordingTransport::new();
    let node = quiet_node(&transport, 3);

    // A candidate with an arbitrarily "fresh" log gets no special
    // treatment, and one with an empty log is not penalized: no freshness
    // policy exists yet.
    assert!(node.read(Packet {
        state: Role::Candidate,
        term: 1,
        name: "a".to_string(),
        message: Message::Vote(VoteRequest {
            last_log_index: 0,
            last_log_term: 0,
        }),
    }));
    assert_eq!(node.status().voted_for.as_deref(), Some("a"));

    let to_a = transport.sent_to("a");
    assert_eq!(to_a[0].message, Message::Voted(Ballot { granted: true }));
}
