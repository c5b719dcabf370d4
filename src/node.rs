use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::NodeConfig;
use crate::event::{EventBus, NodeEvent};
use crate::membership::{self, Membership, StaticMembership};
use crate::packet::{Ballot, Message, Packet, VoteRequest};
use crate::state::{NodeState, Role};
use crate::timer::{random_timeout, TimerKind, TimerRegistry};
use crate::transport::{NullTransport, Transport};

const EVENT_CAPACITY: usize = 128;

/// Point-in-time view of a node, for logs and assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStatus {
    pub name: String,
    pub role: Role,
    pub term: u64,
    pub leader: Option<String>,
    pub voted_for: Option<String>,
    pub votes_granted: u64,
    pub armed_timers: Vec<TimerKind>,
}

/// A Raft consensus node: follower/candidate/leader lifecycle, term
/// progression, and leader election over whatever transport is attached.
///
/// All per-node handling is serialized behind one mutex, so timer expiries
/// and inbound packets never interleave and every event is emitted inside
/// the transition that caused it. Log replication is not implemented; the
/// vote packets carry the log-freshness hooks so a log module can be added
/// without reshaping this type.
///
/// Construction arms the follower watchdog immediately and therefore must
/// happen inside a tokio runtime.
pub struct RaftNode {
    shared: Arc<Shared>,
}

struct Shared {
    config: NodeConfig,
    transport: Arc<dyn Transport>,
    membership: Arc<dyn Membership>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: NodeState,
    timers: TimerRegistry,
    events: EventBus,
}

/// Partial update over the `(term, leader, state)` tuple. Fields that are
/// present and different from the current value are written and announced,
/// in that order.
#[derive(Debug, Default)]
struct Delta {
    term: Option<u64>,
    leader: Option<Option<String>>,
    state: Option<Role>,
}

impl RaftNode {
    /// A node with no transport attached (outbound packets are refused) and
    /// a single-member cluster view.
    pub fn new(config: NodeConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(NullTransport),
            Arc::new(StaticMembership::solo()),
        )
    }

    pub fn with_parts(
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        membership: Arc<dyn Membership>,
    ) -> Self {
        let shared = Arc::new(Shared {
            config,
            transport,
            membership,
            inner: Mutex::new(Inner {
                state: NodeState::new(),
                timers: TimerRegistry::new(),
                events: EventBus::new(EVENT_CAPACITY),
            }),
        });

        {
            let mut inner = shared.inner.lock();
            Shared::schedule_heartbeat(&shared, &mut inner, None);
        }
        tracing::info!(node = %shared.config.name, "Node started as follower");

        Self { shared }
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Ingest one inbound packet. Returns false when the node is stopped or
    /// the packet was dropped as stale.
    pub fn read(&self, packet: Packet) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.state.role == Role::Stopped {
            return false;
        }
        Shared::ingest(&self.shared, &mut inner, packet)
    }

    /// Transmit a packet to a single peer through the attached transport.
    pub fn write(&self, to: &str, packet: Packet) -> bool {
        if self.shared.inner.lock().state.role == Role::Stopped {
            return false;
        }
        self.shared.transport.send(to, packet)
    }

    /// Stamp `message` with this node's current role/term/name and hand it
    /// to the transport's outbound sink once; fan-out is the transport's
    /// job.
    pub fn broadcast(&self, message: Message) -> bool {
        let inner = self.shared.inner.lock();
        if inner.state.role == Role::Stopped {
            return false;
        }
        let packet = self.shared.packet(&inner, message);
        self.shared.transport.broadcast(packet)
    }

    /// Start campaigning for leadership in a fresh term.
    pub fn promote(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state.role == Role::Stopped {
            return;
        }
        Shared::promote(&self.shared, &mut inner);
    }

    /// Re-arm (or arm) the heartbeat watchdog, with the given duration or a
    /// freshly generated one.
    pub fn heartbeat(&self, duration: Option<Duration>) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.state.role == Role::Stopped {
            return false;
        }
        Shared::schedule_heartbeat(&self.shared, &mut inner, duration)
    }

    /// Stop the node: cancel timers, detach subscribers, refuse further
    /// traffic. Idempotent; only the call that performed the shutdown
    /// returns true.
    pub fn end(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.state.role == Role::Stopped {
            return false;
        }
        inner.timers.end();
        inner.events.close();
        inner.state.role = Role::Stopped;
        tracing::info!(node = %self.shared.config.name, "Node stopped");
        true
    }

    /// Subscribe to the node's lifecycle events. A stopped node hands out
    /// receivers that report the channel as closed.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.shared.inner.lock().events.subscribe()
    }

    pub fn is_leader(&self) -> bool {
        self.shared.inner.lock().state.role == Role::Leader
    }

    pub fn status(&self) -> NodeStatus {
        let inner = self.shared.inner.lock();
        let armed_timers = [TimerKind::Heartbeat, TimerKind::Election]
            .into_iter()
            .filter(|kind| inner.timers.active(*kind))
            .collect();
        NodeStatus {
            name: self.shared.config.name.clone(),
            role: inner.state.role,
            term: inner.state.term,
            leader: inner.state.leader.clone(),
            voted_for: inner.state.voted_for.clone(),
            votes_granted: inner.state.votes_granted,
            armed_timers,
        }
    }
}

impl Clone for RaftNode {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Shared {
    fn packet(&self, inner: &Inner, message: Message) -> Packet {
        Packet {
            state: inner.state.role,
            term: inner.state.term,
            name: self.config.name.clone(),
            message,
        }
    }

    fn quorum(&self) -> u64 {
        membership::quorum(self.membership.size())
    }

    /// Apply a partial state update, announcing each changed field in
    /// `(term, leader, state)` order. A term advancement forgets the vote
    /// record within the same transition; a role change clears all timers
    /// before the new role's watchdog is armed.
    fn apply(this: &Arc<Shared>, inner: &mut Inner, delta: Delta) {
        if let Some(term) = delta.term {
            if term > inner.state.term {
                let old = inner.state.term;
                inner.state.term = term;
                inner.state.clear_vote();
                inner.events.emit(NodeEvent::TermChange { new: term, old });
            }
        }
        if let Some(leader) = delta.leader {
            if leader != inner.state.leader {
                let old = std::mem::replace(&mut inner.state.leader, leader.clone());
                tracing::debug!(
                    node = %this.config.name,
                    leader = leader.as_deref().unwrap_or("-"),
                    "Leader changed"
                );
                inner.events.emit(NodeEvent::LeaderChange { new: leader, old });
            }
        }
        if let Some(role) = delta.state {
            if role != inner.state.role {
                let old = std::mem::replace(&mut inner.state.role, role);
                tracing::debug!(node = %this.config.name, from = %old, to = %role, "Role changed");
                inner.events.emit(NodeEvent::StateChange { new: role, old });
                inner.timers.clear();
                match role {
                    Role::Follower | Role::Leader => {
                        Shared::schedule_heartbeat(this, inner, None);
                    }
                    // A candidate is armed by promote with the election
                    // timer; a stopped node arms nothing.
                    Role::Candidate | Role::Stopped => {}
                }
            }
        }
    }

    /// Ingress rules, applied in order on every well-formed packet.
    fn ingest(this: &Arc<Shared>, inner: &mut Inner, packet: Packet) -> bool {
        // Term reconciliation (Raft §5.1): a higher term demotes us, a
        // lower one marks the sender stale and the packet is dropped
        // without reply.
        if packet.term > inner.state.term {
            Shared::apply(
                this,
                inner,
                Delta {
                    term: Some(packet.term),
                    state: Some(Role::Follower),
                    ..Default::default()
                },
            );
        } else if packet.term < inner.state.term {
            tracing::trace!(
                node = %this.config.name,
                from = %packet.name,
                term = packet.term,
                ours = inner.state.term,
                "Dropping stale-term packet"
            );
            return false;
        }

        // Leader recognition (Raft §5.2): anyone claiming leadership at our
        // term is the leader; non-followers step down.
        if packet.state == Role::Leader {
            let mut delta = Delta::default();
            if inner.state.role != Role::Follower {
                delta.state = Some(Role::Follower);
            }
            if inner.state.leader.as_deref() != Some(packet.name.as_str()) {
                delta.leader = Some(Some(packet.name.clone()));
            }
            Shared::apply(this, inner, delta);
        }

        inner.events.emit(NodeEvent::Data {
            packet: packet.clone(),
        });

        match &packet.message {
            Message::Heartbeat(duration) => {
                if packet.state == Role::Leader {
                    let duration = duration.map(Duration::from_millis);
                    Shared::schedule_heartbeat(this, inner, duration);
                }
            }
            Message::Vote(_) => Shared::handle_vote(this, inner, &packet),
            Message::Voted(ballot) => Shared::handle_ballot(this, inner, &packet, *ballot),
            Message::Rpc(_) => {
                // Reserved for client-command dispatch.
                tracing::trace!(node = %this.config.name, from = %packet.name, "Ignoring rpc packet");
            }
        }
        true
    }

    /// Answer a vote solicitation. Terms are equal by the time we get here,
    /// so only the current-term vote record decides; the log-freshness
    /// check (Raft §5.4) is deferred along with the log module.
    fn handle_vote(this: &Arc<Shared>, inner: &mut Inner, packet: &Packet) {
        let granted = match inner.state.voted_for.as_deref() {
            Some(voted) if voted != packet.name => false,
            _ => true,
        };
        if granted {
            inner.state.voted_for = Some(packet.name.clone());
            // A granted vote defers our own candidacy for a full election
            // timeout, giving the candidate room to win and start beating.
            let grace = random_timeout(this.config.election);
            Shared::schedule_heartbeat(this, inner, Some(grace));
        }
        tracing::debug!(
            node = %this.config.name,
            candidate = %packet.name,
            term = inner.state.term,
            granted,
            "Vote solicited"
        );

        let reply = this.packet(inner, Message::Voted(Ballot { granted }));
        this.transport.send(&packet.name, reply);
        inner.events.emit(NodeEvent::Vote {
            packet: packet.clone(),
            granted,
        });
    }

    /// Tally a ballot answering our solicitation. Anything but a granted,
    /// current-term ballot while we are still campaigning is ignored.
    fn handle_ballot(this: &Arc<Shared>, inner: &mut Inner, packet: &Packet, ballot: Ballot) {
        if inner.state.role != Role::Candidate || !ballot.granted {
            return;
        }
        inner.state.record_ballot();
        tracing::debug!(
            node = %this.config.name,
            from = %packet.name,
            votes = inner.state.votes_granted,
            needed = this.quorum(),
            "Ballot received"
        );
        if inner.state.votes_granted >= this.quorum() {
            Shared::win(this, inner);
        }
    }

    fn win(this: &Arc<Shared>, inner: &mut Inner) {
        tracing::info!(
            node = %this.config.name,
            term = inner.state.term,
            votes = inner.state.votes_granted,
            "Won election, becoming leader"
        );
        Shared::apply(
            this,
            inner,
            Delta {
                leader: Some(Some(this.config.name.clone())),
                state: Some(Role::Leader),
                ..Default::default()
            },
        );
    }

    /// Campaign for leadership: bump the term (which forgets the old vote
    /// record), vote for ourselves, solicit the cluster, and arm the
    /// election timer that restarts the campaign on a split vote.
    fn promote(this: &Arc<Shared>, inner: &mut Inner) {
        let term = inner.state.term + 1;
        Shared::apply(
            this,
            inner,
            Delta {
                term: Some(term),
                leader: Some(Some(String::new())),
                state: Some(Role::Candidate),
            },
        );
        inner.state.vote_for_self(&this.config.name);
        tracing::info!(node = %this.config.name, term, "Campaigning for leadership");

        // A cluster of one elects itself on the self-vote alone.
        if inner.state.votes_granted >= this.quorum() {
            Shared::win(this, inner);
            return;
        }

        let solicitation = this.packet(inner, Message::Vote(VoteRequest::default()));
        this.transport.broadcast(solicitation);

        // A candidate keeps only the election timer armed.
        inner.timers.clear();
        let timeout = random_timeout(this.config.election);
        let shared = Arc::clone(this);
        let _ = inner.timers.set(TimerKind::Election, timeout, move |generation| {
            Shared::on_timer(&shared, TimerKind::Election, generation)
        });
    }

    /// Arm or re-arm the heartbeat timer: the cadence on a leader, the
    /// promotion watchdog on everyone else.
    fn schedule_heartbeat(this: &Arc<Shared>, inner: &mut Inner, duration: Option<Duration>) -> bool {
        let duration = duration.unwrap_or_else(|| random_timeout(this.config.heartbeat));
        if inner.timers.active(TimerKind::Heartbeat) {
            return inner.timers.adjust(TimerKind::Heartbeat, duration);
        }
        let shared = Arc::clone(this);
        inner
            .timers
            .set(TimerKind::Heartbeat, duration, move |generation| {
                Shared::on_timer(&shared, TimerKind::Heartbeat, generation)
            })
            .is_ok()
    }

    /// Timer expiry entry point. Runs on the timer task but under the node
    /// lock, serialized with packet handling. Returns whether the expiry
    /// was acknowledged (a refused expiry means it raced an adjust or clear
    /// and must have no effect).
    fn on_timer(this: &Arc<Shared>, kind: TimerKind, generation: u64) -> bool {
        let mut inner = this.inner.lock();
        if !inner.timers.acknowledge(kind, generation) {
            return false;
        }
        match kind {
            TimerKind::Heartbeat => {
                if inner.state.role == Role::Leader {
                    let cadence = random_timeout(this.config.heartbeat);
                    // Advertise a watchdog one full cadence longer than our
                    // own, so followers outlast a delayed beat.
                    let watchdog = cadence + this.config.heartbeat.max;
                    let beat = this.packet(
                        &inner,
                        Message::Heartbeat(Some(watchdog.as_millis() as u64)),
                    );
                    this.transport.broadcast(beat);
                    Shared::schedule_heartbeat(this, &mut inner, Some(cadence));
                } else {
                    tracing::debug!(
                        node = %this.config.name,
                        term = inner.state.term,
                        "Heartbeat timeout, promoting"
                    );
                    inner.events.emit(NodeEvent::HeartbeatTimeout);
                    Shared::promote(this, &mut inner);
                }
            }
            TimerKind::Election => {
                tracing::debug!(
                    node = %this.config.name,
                    term = inner.state.term,
                    "Election timed out without quorum, starting a new term"
                );
                Shared::promote(this, &mut inner);
            }
        }
        true
    }
}
