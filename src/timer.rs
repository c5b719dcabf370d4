use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::TimeoutRange;
use crate::error::{RaftError, Result};

/// Names of the node's one-shot timers. At most one timer per name is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Leader cadence / non-leader watchdog.
    Heartbeat,
    /// Candidate re-election deadline.
    Election,
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerKind::Heartbeat => write!(f, "heartbeat"),
            TimerKind::Election => write!(f, "election"),
        }
    }
}

/// Uniform random duration in the inclusive range. Staggered timeouts keep
/// peers from promoting in lockstep and splitting the vote (Raft §5.2).
pub fn random_timeout(range: TimeoutRange) -> Duration {
    let min_ms = range.min.as_millis() as u64;
    let max_ms = range.max.as_millis() as u64;
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(min_ms..=max_ms))
}

struct TimerEntry {
    generation: u64,
    deadline: watch::Sender<(Instant, u64)>,
    handle: JoinHandle<()>,
}

/// Named one-shot timers backed by tokio tasks.
///
/// Expiry callbacks receive the generation the timer was armed with and
/// report back whether the owner acknowledged the expiry. A caller that
/// adjusted or cleared the timer after the task committed to firing causes
/// the acknowledgement to fail; the task then re-arms on the updated
/// deadline (adjust) or exits (clear). This is what lets the owner cancel a
/// timer whose callback is already executing without preempting it: the
/// callback runs, but its acknowledgement is refused and it has no effect.
pub struct TimerRegistry {
    entries: HashMap<TimerKind, TimerEntry>,
    next_generation: u64,
    ended: bool,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_generation: 0,
            ended: false,
        }
    }

    /// Arm `kind` to invoke `fire` once after `duration`. Arming an
    /// already-active timer is a caller error; use [`TimerRegistry::adjust`].
    ///
    /// `fire` is handed the timer generation and must return the result of
    /// [`TimerRegistry::acknowledge`] for it.
    pub fn set<F>(&mut self, kind: TimerKind, duration: Duration, mut fire: F) -> Result<()>
    where
        F: FnMut(u64) -> bool + Send + 'static,
    {
        if self.ended {
            return Err(RaftError::TimersEnded);
        }
        if self.active(kind) {
            return Err(RaftError::TimerActive(kind));
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let (tx, mut rx) = watch::channel((Instant::now() + duration, generation));

        let handle = tokio::spawn(async move {
            loop {
                let (deadline, generation) = *rx.borrow_and_update();
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        if fire(generation) {
                            return;
                        }
                        // Refused expiry: the owner adjusted or cleared us
                        // while we were firing. Wait for the new deadline,
                        // or exit if the registry dropped this timer.
                        if rx.changed().await.is_err() {
                            return;
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        self.entries.insert(
            kind,
            TimerEntry {
                generation,
                deadline: tx,
                handle,
            },
        );
        Ok(())
    }

    /// Is a timer by this name pending?
    pub fn active(&self, kind: TimerKind) -> bool {
        self.entries
            .get(&kind)
            .is_some_and(|entry| !entry.handle.is_finished())
    }

    /// Move an armed timer's deadline without firing it. Returns false when
    /// no such timer is pending.
    pub fn adjust(&mut self, kind: TimerKind, duration: Duration) -> bool {
        let Some(entry) = self.entries.get_mut(&kind) else {
            return false;
        };
        if entry.handle.is_finished() {
            return false;
        }
        self.next_generation += 1;
        entry.generation = self.next_generation;
        entry
            .deadline
            .send((Instant::now() + duration, entry.generation))
            .is_ok()
    }

    /// Consume an expiry. True exactly when `generation` is still the one
    /// the timer is armed with; the timer is then disarmed and the caller
    /// runs its expiry action. A stale generation means the expiry raced an
    /// adjust/clear and must be discarded.
    pub fn acknowledge(&mut self, kind: TimerKind, generation: u64) -> bool {
        match self.entries.get(&kind) {
            Some(entry) if entry.generation == generation => {
                self.entries.remove(&kind);
                true
            }
            _ => false,
        }
    }

    /// Cancel all pending timers.
    pub fn clear(&mut self) {
        for entry in self.entries.values() {
            entry.handle.abort();
        }
        self.entries.clear();
    }

    /// Cancel all pending timers and refuse any further arming.
    pub fn end(&mut self) {
        self.clear();
        self.ended = true;
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
