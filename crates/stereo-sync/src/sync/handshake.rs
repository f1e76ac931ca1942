//! "Compared done" latch handed between the two sides after a match
//!
//! After both gates report `Matched`, each side sets its own latch and then
//! waits for the peer's. The latch is single-use: the observer clears it, so
//! a `true` never leaks into the next frame. The latch can carry one value
//! (typically the canonical timestamp to stamp on the outgoing frame).

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::gate::CancelSignals;
use super::wait::{lock, wait_until};
use crate::types::HandshakeOutcome;

#[derive(Debug, Default)]
struct Latch {
    done: bool,
    carried: Option<Duration>,
}

/// One side's "compared done" latch
#[derive(Debug, Default)]
pub struct SideHandshake {
    latch: Mutex<Latch>,
    cond: Condvar,
}

impl SideHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark this side done with the current comparison
    pub fn signal_done(&self, carry: Option<Duration>) {
        {
            let mut latch = lock(&self.latch);
            latch.done = true;
            latch.carried = carry;
        }
        self.cond.notify_all();
    }

    /// Withdraw an unobserved signal (the frame was dropped after all)
    pub fn clear(&self) {
        let mut latch = lock(&self.latch);
        latch.done = false;
        latch.carried = None;
    }

    /// Wake waiters so they re-evaluate the cancellation flags
    pub fn wake(&self) {
        drop(lock(&self.latch));
        self.cond.notify_all();
    }

    pub fn is_done(&self) -> bool {
        lock(&self.latch).done
    }

    /// Wait for the side owning this latch to signal done
    ///
    /// Called by the opposite side. On success the latch is consumed. A
    /// timeout means the owning thread stalled and is logged as an error.
    pub fn await_done<S: CancelSignals>(
        &self,
        signals: &S,
        timeout: Duration,
        slice: Duration,
    ) -> HandshakeOutcome {
        let (_guard, settled) = wait_until(&self.cond, lock(&self.latch), timeout, slice, |latch| {
            if latch.done {
                latch.done = false;
                return Some(HandshakeOutcome::PeerReady(latch.carried.take()));
            }
            // The owner of this latch is the peer; once it is at EOS it
            // will never signal.
            if signals.is_cancelled() || signals.peer_saw_eos() {
                return Some(HandshakeOutcome::Aborted);
            }
            None
        });

        settled.unwrap_or_else(|| {
            log::error!("[HANDSHAKE] Peer did not signal done within {:?}", timeout);
            HandshakeOutcome::TimedOut
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[derive(Default)]
    struct Flags {
        aborted: AtomicBool,
        peer_eos: AtomicBool,
    }

    impl CancelSignals for Flags {
        fn is_flushing(&self) -> bool {
            false
        }
        fn is_aborted(&self) -> bool {
            self.aborted.load(Ordering::Acquire)
        }
        fn peer_saw_eos(&self) -> bool {
            self.peer_eos.load(Ordering::Acquire)
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(200);
    const SLICE: Duration = Duration::from_millis(1);

    #[test]
    fn test_signal_is_consumed_once() {
        let latch = SideHandshake::new();
        let flags = Flags::default();
        latch.signal_done(Some(Duration::from_millis(40)));

        assert_eq!(
            latch.await_done(&flags, TIMEOUT, SLICE),
            HandshakeOutcome::PeerReady(Some(Duration::from_millis(40)))
        );
        assert!(!latch.is_done());
        assert_eq!(latch.await_done(&flags, TIMEOUT, SLICE), HandshakeOutcome::TimedOut);
    }

    #[test]
    fn test_both_sides_meet() {
        let latches = Arc::new([SideHandshake::new(), SideHandshake::new()]);
        let flags = Arc::new(Flags::default());

        let (peer_latches, peer_flags) = (Arc::clone(&latches), Arc::clone(&flags));
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            peer_latches[1].signal_done(Some(Duration::from_millis(2)));
            peer_latches[0].await_done(peer_flags.as_ref(), TIMEOUT, SLICE)
        });

        latches[0].signal_done(Some(Duration::from_millis(1)));
        let mine = latches[1].await_done(flags.as_ref(), TIMEOUT, SLICE);

        assert_eq!(mine, HandshakeOutcome::PeerReady(Some(Duration::from_millis(2))));
        assert_eq!(
            handle.join().unwrap(),
            HandshakeOutcome::PeerReady(Some(Duration::from_millis(1)))
        );
        assert!(!latches[0].is_done());
        assert!(!latches[1].is_done());
    }

    #[test]
    fn test_abort_wakes_waiter() {
        let latch = Arc::new(SideHandshake::new());
        let flags = Arc::new(Flags::default());

        let (peer_latch, peer_flags) = (Arc::clone(&latch), Arc::clone(&flags));
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            peer_flags.aborted.store(true, Ordering::Release);
            peer_latch.wake();
        });

        let start = Instant::now();
        let outcome = latch.await_done(flags.as_ref(), Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(outcome, HandshakeOutcome::Aborted);
        assert!(start.elapsed() < Duration::from_secs(1));
        handle.join().unwrap();
    }

    #[test]
    fn test_peer_eos_breaks_wait() {
        let latch = SideHandshake::new();
        let flags = Flags::default();
        flags.peer_eos.store(true, Ordering::Release);
        assert_eq!(latch.await_done(&flags, TIMEOUT, SLICE), HandshakeOutcome::Aborted);
    }

    #[test]
    fn test_signal_wins_over_peer_eos() {
        let latch = SideHandshake::new();
        let flags = Flags::default();
        latch.signal_done(None);
        flags.peer_eos.store(true, Ordering::Release);
        assert_eq!(
            latch.await_done(&flags, TIMEOUT, SLICE),
            HandshakeOutcome::PeerReady(None)
        );
    }

    #[test]
    fn test_clear_withdraws_signal() {
        let latch = SideHandshake::new();
        latch.signal_done(None);
        latch.clear();
        assert!(!latch.is_done());
    }
}
