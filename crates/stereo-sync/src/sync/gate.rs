//! Timestamp comparison gate
//!
//! A gate holds one [`TimeSlot`] per side for a single direction (DTS for
//! the input gate, PTS for the output gate). Each side publishes its
//! timestamp and then calls [`RendezvousGate::wait`], which decides whether
//! the frame may proceed:
//!
//! | mine vs theirs     | result                                              |
//! |--------------------|-----------------------------------------------------|
//! | theirs unknown     | poll until known (bounded, EOS aware)               |
//! | mine < theirs      | `MustAdvance`: this frame has no counterpart        |
//! | mine > theirs      | block until the peer publishes (bounded, EOS aware) |
//! | mine == theirs     | `Matched`                                           |
//!
//! Flush and push failure settle any wait with `Aborted` on the next check.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::slot::TimeSlot;
use super::wait::{lock, wait_until};
use crate::config::SyncConfig;
use crate::types::{Direction, Outcome, Role, NUM_SIDES};

/// Cancellation sources observed by a waiting side
///
/// Checked on every wake. Implementations must be cheap and lock-free:
/// they are called while the gate or latch mutex is held.
pub trait CancelSignals {
    /// A flush is in progress on either side
    fn is_flushing(&self) -> bool;

    /// Downstream push failed or the session was torn down
    fn is_aborted(&self) -> bool;

    /// The opposite side has reported end-of-stream
    fn peer_saw_eos(&self) -> bool;

    #[inline]
    fn is_cancelled(&self) -> bool {
        self.is_flushing() || self.is_aborted()
    }
}

/// Rendezvous point for one timestamp direction
pub struct RendezvousGate {
    direction: Direction,
    slots: Mutex<[TimeSlot; NUM_SIDES]>,
    changed: Condvar,
    /// Number of `wait` calls so far (diagnostics only)
    comparisons: AtomicU64,
}

impl RendezvousGate {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            slots: Mutex::new([TimeSlot::new(); NUM_SIDES]),
            changed: Condvar::new(),
            comparisons: AtomicU64::new(0),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Store `side`'s timestamp for its current frame and wake the peer
    pub fn publish(&self, side: Role, value: Option<Duration>) {
        lock(&self.slots)[side.index()].publish(value);
        self.changed.notify_all();
    }

    /// Clear `side`'s slot so the peer can't pair with a dropped frame
    pub fn retract(&self, side: Role) {
        lock(&self.slots)[side.index()].reset();
        self.changed.notify_all();
    }

    /// Clear both slots (flush, teardown)
    pub fn reset(&self) {
        {
            let mut slots = lock(&self.slots);
            for slot in slots.iter_mut() {
                slot.reset();
            }
        }
        self.changed.notify_all();
    }

    /// Wake every waiter so it re-evaluates the cancellation flags
    ///
    /// Taking the lock orders the flag store before any waiter's next check.
    pub fn wake(&self) {
        drop(lock(&self.slots));
        self.changed.notify_all();
    }

    /// Current value of `side`'s slot
    pub fn peek(&self, side: Role) -> Option<Duration> {
        lock(&self.slots)[side.index()].get()
    }

    pub fn comparisons(&self) -> u64 {
        self.comparisons.load(Ordering::Relaxed)
    }

    /// Compare `side`'s published timestamp against the peer's
    ///
    /// Never mutates the slots. `eos_polls` counts poll slices spent waiting
    /// on a peer that is at end-of-stream; it persists across calls so a
    /// peer that never comes back costs one bounded wait, after which every
    /// further wait times out on its first check. It is reset on `Matched`.
    pub fn wait<S: CancelSignals>(
        &self,
        side: Role,
        signals: &S,
        eos_polls: &AtomicU32,
        config: &SyncConfig,
    ) -> Outcome {
        let seq = self.comparisons.fetch_add(1, Ordering::Relaxed);
        let guard = lock(&self.slots);

        if signals.is_cancelled() {
            return Outcome::Aborted;
        }

        let Some(mine) = guard[side.index()].get() else {
            log::debug!(
                "[GATE] {} #{} {}: own timestamp unknown, advancing",
                self.direction, seq, side
            );
            return Outcome::MustAdvance;
        };

        let started = Instant::now();
        let mut ahead_since: Option<Instant> = None;
        let mut last_seen: Option<Duration> = None;

        let (guard, settled) = wait_until(
            &self.changed,
            guard,
            config.gate_wait_limit(),
            config.poll_interval(),
            |slots| {
                if signals.is_cancelled() {
                    return Some(Outcome::Aborted);
                }
                // Only a flush or teardown touches our slot while we wait.
                if slots[side.index()].get() != Some(mine) {
                    return Some(Outcome::Aborted);
                }

                let theirs = slots[side.peer().index()].get();
                last_seen = theirs;
                match theirs {
                    None => {
                        ahead_since = None;
                        if signals.peer_saw_eos() {
                            let polls = eos_polls.fetch_add(1, Ordering::Relaxed) + 1;
                            (polls > config.eos_poll_limit).then_some(Outcome::TimedOut)
                        } else {
                            (started.elapsed() >= config.absent_wait()).then_some(Outcome::TimedOut)
                        }
                    }
                    Some(theirs) if mine < theirs => Some(Outcome::MustAdvance),
                    Some(theirs) if mine == theirs => Some(Outcome::Matched),
                    Some(_) => {
                        let since = *ahead_since.get_or_insert_with(Instant::now);
                        // A peer at EOS will not publish again.
                        let eos_spent = signals.peer_saw_eos()
                            && eos_polls.fetch_add(1, Ordering::Relaxed) + 1 > config.eos_poll_limit;
                        (eos_spent || since.elapsed() >= config.ahead_wait())
                            .then_some(Outcome::TimedOut)
                    }
                }
            },
        );

        drop(guard);

        let outcome = settled.unwrap_or(Outcome::TimedOut);
        match outcome {
            Outcome::Matched => {
                eos_polls.store(0, Ordering::Relaxed);
                log::debug!(
                    "[GATE] {} #{} {}: matched at {:?} after {:?}",
                    self.direction, seq, side, mine, started.elapsed()
                );
            }
            Outcome::TimedOut => {
                log::warn!(
                    "[GATE] {} #{} {}: timed out at {:?} (peer {:?}, peer eos: {}) after {:?}",
                    self.direction,
                    seq,
                    side,
                    mine,
                    last_seen,
                    signals.peer_saw_eos(),
                    started.elapsed()
                );
            }
            other => {
                log::debug!(
                    "[GATE] {} #{} {}: {} at {:?} (peer {:?})",
                    self.direction, seq, side, other, mine, last_seen
                );
            }
        }
        outcome
    }
}
