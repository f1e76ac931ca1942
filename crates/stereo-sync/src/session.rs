//! Pair session shared by the two decoder instances of one stereo stream
//!
//! # Lifecycle
//!
//! ```text
//!  (no session) ──register──► AwaitingPeer ──peer registers──► Active
//!                                                             │    ▲
//!                                                 flush start │    │ flush stop
//!                                                             ▼    │
//!                                                            Draining
//!  any state ──finalize (either side)──► TornDown (terminal)
//! ```
//!
//! # Per-frame protocol
//!
//! 1. publish this side's timestamp into the direction's gate
//! 2. gate comparison (`Matched` / `MustAdvance` / `Aborted` / `TimedOut`)
//! 3. on `Matched`: set own latch, wait (bounded) for the peer's latch
//!
//! # Flags
//!
//! Flush, push failure, EOS and teardown are atomics so the cancellation
//! checks inside the gate and latch waits never take a second lock. Every
//! flag change is followed by waking all waiters.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::stats::{SideStats, SideStatsSnapshot};
use crate::sync::{CancelSignals, RendezvousGate, SideHandshake};
use crate::types::{
    Direction, HandshakeOutcome, Outcome, PairId, Rendezvous, Role, SessionState, NUM_DIRECTIONS,
    NUM_SIDES,
};

/// Shared rendezvous state for one stereoscopic stream pair
pub struct PairSession {
    pair: PairId,
    config: SyncConfig,

    /// Gates indexed by [`Direction`]
    gates: [RendezvousGate; NUM_DIRECTIONS],
    /// "Compared done" latches [direction][side]
    handshakes: [[SideHandshake; NUM_SIDES]; NUM_DIRECTIONS],

    registered: [AtomicBool; NUM_SIDES],
    flushing: [AtomicBool; NUM_SIDES],
    /// Sides that entered a flush since the session last resumed
    flushed: [AtomicBool; NUM_SIDES],
    saw_eos: [AtomicBool; NUM_SIDES],
    push_aborted: AtomicBool,
    torn_down: AtomicBool,

    /// Poll slices spent on a peer at EOS [direction][side]
    eos_polls: [[AtomicU32; NUM_SIDES]; NUM_DIRECTIONS],
    stats: [SideStats; NUM_SIDES],

    created_at: Instant,
    peer_wait_reported: AtomicBool,
}

/// Cancellation view of the session from one side
struct SideSignals<'a> {
    session: &'a PairSession,
    side: Role,
}

impl CancelSignals for SideSignals<'_> {
    fn is_flushing(&self) -> bool {
        self.session
            .flushing
            .iter()
            .any(|flag| flag.load(Ordering::Acquire))
    }

    fn is_aborted(&self) -> bool {
        self.session.push_aborted.load(Ordering::Acquire)
            || self.session.torn_down.load(Ordering::Acquire)
    }

    fn peer_saw_eos(&self) -> bool {
        self.session.saw_eos[self.side.peer().index()].load(Ordering::Acquire)
    }
}

impl PairSession {
    /// Create an empty session; sides attach through the registry
    pub fn new(pair: PairId, config: SyncConfig) -> Self {
        Self {
            pair,
            config,
            gates: [
                RendezvousGate::new(Direction::Input),
                RendezvousGate::new(Direction::Output),
            ],
            handshakes: std::array::from_fn(|_| std::array::from_fn(|_| SideHandshake::new())),
            registered: std::array::from_fn(|_| AtomicBool::new(false)),
            flushing: std::array::from_fn(|_| AtomicBool::new(false)),
            flushed: std::array::from_fn(|_| AtomicBool::new(false)),
            saw_eos: std::array::from_fn(|_| AtomicBool::new(false)),
            push_aborted: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            eos_polls: std::array::from_fn(|_| std::array::from_fn(|_| AtomicU32::new(0))),
            stats: std::array::from_fn(|_| SideStats::default()),
            created_at: Instant::now(),
            peer_wait_reported: AtomicBool::new(false),
        }
    }

    pub fn pair(&self) -> PairId {
        self.pair
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        if self.is_torn_down() {
            SessionState::TornDown
        } else if self.flushing.iter().any(|flag| flag.load(Ordering::Acquire)) {
            SessionState::Draining
        } else if Role::ALL.iter().all(|&role| self.is_registered(role)) {
            SessionState::Active
        } else {
            SessionState::AwaitingPeer
        }
    }

    pub fn is_registered(&self, role: Role) -> bool {
        self.registered[role.index()].load(Ordering::Acquire)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    pub fn saw_eos(&self, role: Role) -> bool {
        self.saw_eos[role.index()].load(Ordering::Acquire)
    }

    /// Claim `role` for a decoder instance
    pub(crate) fn attach(&self, role: Role) -> SyncResult<()> {
        if self.is_torn_down() {
            return Err(SyncError::TornDown { pair: self.pair });
        }
        if self.registered[role.index()].swap(true, Ordering::AcqRel) {
            return Err(SyncError::RoleTaken {
                pair: self.pair,
                role,
            });
        }

        if self.is_registered(role.peer()) {
            log::info!(
                "[PAIR] {} active ({} joined after {:?})",
                self.pair,
                role,
                self.created_at.elapsed()
            );
        } else {
            log::info!("[PAIR] {} {} registered, awaiting peer", self.pair, role);
        }
        Ok(())
    }

    fn ensure_live(&self, role: Role) -> SyncResult<()> {
        if self.is_torn_down() {
            return Err(SyncError::TornDown { pair: self.pair });
        }
        if !self.is_registered(role) {
            return Err(SyncError::NotRegistered {
                pair: self.pair,
                role,
            });
        }
        Ok(())
    }

    /// Publish `role`'s timestamp for its current frame in `direction`
    pub fn publish(
        &self,
        role: Role,
        direction: Direction,
        value: Option<Duration>,
    ) -> SyncResult<()> {
        self.ensure_live(role)?;
        self.gates[direction.index()].publish(role, value);
        Ok(())
    }

    /// Current slot value, for diagnostics
    pub fn peek(&self, role: Role, direction: Direction) -> Option<Duration> {
        self.gates[direction.index()].peek(role)
    }

    /// Run the gate comparison for `role` and, on a match, the handshake
    ///
    /// `carry` is handed to the peer through the handshake; the peer's
    /// carried value is returned in [`Rendezvous::peer_value`].
    pub fn rendezvous(
        &self,
        role: Role,
        direction: Direction,
        carry: Option<Duration>,
    ) -> Rendezvous {
        if self.is_torn_down() {
            log::warn!(
                "[PAIR] {} {} {} wait on torn down session",
                self.pair, role, direction
            );
            self.stats[role.index()].record(Outcome::Aborted);
            return Rendezvous::bare(Outcome::Aborted);
        }
        if !self.is_registered(role.peer()) {
            self.report_awaiting_peer(role);
            self.stats[role.index()].record(Outcome::Unpaired);
            return Rendezvous::bare(Outcome::Unpaired);
        }

        let signals = SideSignals {
            session: self,
            side: role,
        };
        let gate = &self.gates[direction.index()];
        let eos_polls = &self.eos_polls[direction.index()][role.index()];

        let result = match gate.wait(role, &signals, eos_polls, &self.config) {
            Outcome::Matched => self.hand_off(role, direction, carry, &signals),
            Outcome::TimedOut => {
                gate.retract(role);
                Rendezvous::bare(Outcome::TimedOut)
            }
            other => Rendezvous::bare(other),
        };

        let count = self.stats[role.index()].record(result.outcome);
        if result.outcome == Outcome::TimedOut {
            log::warn!(
                "[PAIR] {} {} {} frame dropped ({} timeouts so far)",
                self.pair,
                role,
                gate.direction(),
                count
            );
        }
        result
    }

    /// Exchange "compared done" latches after a gate match
    fn hand_off(
        &self,
        role: Role,
        direction: Direction,
        carry: Option<Duration>,
        signals: &SideSignals<'_>,
    ) -> Rendezvous {
        let own = &self.handshakes[direction.index()][role.index()];
        let peer = &self.handshakes[direction.index()][role.peer().index()];

        own.signal_done(carry);
        match peer.await_done(
            signals,
            self.config.handshake_timeout(),
            self.config.poll_interval(),
        ) {
            HandshakeOutcome::PeerReady(peer_value) => Rendezvous {
                outcome: Outcome::Matched,
                peer_value,
            },
            HandshakeOutcome::Aborted => {
                own.clear();
                self.gates[direction.index()].retract(role);
                Rendezvous::bare(Outcome::Aborted)
            }
            HandshakeOutcome::TimedOut => {
                own.clear();
                self.gates[direction.index()].retract(role);
                let stalls = self.stats[role.index()].record_handshake_timeout();
                log::error!(
                    "[PAIR] {} {} {} peer stalled after match ({} stalls so far)",
                    self.pair, role, direction, stalls
                );
                Rendezvous::bare(Outcome::TimedOut)
            }
        }
    }

    fn report_awaiting_peer(&self, role: Role) {
        let waited = self.created_at.elapsed();
        if waited >= self.config.peer_ready_warn()
            && !self.peer_wait_reported.swap(true, Ordering::AcqRel)
        {
            log::warn!(
                "[PAIR] {} {} still has no {} peer after {:?}, frames pass unsynchronized",
                self.pair,
                role,
                role.peer(),
                waited
            );
        }
    }

    /// `role` entered a flush: clear all shared state and abort every wait
    pub fn flush_start(&self, role: Role) -> SyncResult<()> {
        self.ensure_live(role)?;
        let already = self.flushing[role.index()].swap(true, Ordering::AcqRel);
        self.flushed[role.index()].store(true, Ordering::Release);

        for gate in &self.gates {
            gate.reset();
        }
        for latch in self.handshakes.iter().flatten() {
            latch.clear();
        }
        self.reset_eos_polls();
        self.wake_all();

        if !already {
            log::info!("[PAIR] {} flush start from {}", self.pair, role);
        }
        Ok(())
    }

    /// `role` left its flush; once no side is flushing the session resumes
    /// with push failure cleared, and EOS cleared for the sides that flushed
    ///
    /// A side that reached EOS and never flushed stays at EOS.
    pub fn flush_stop(&self, role: Role) -> SyncResult<()> {
        self.ensure_live(role)?;
        self.flushing[role.index()].store(false, Ordering::Release);

        if self.state() == SessionState::Draining {
            log::debug!("[PAIR] {} {} flush stop, peer still flushing", self.pair, role);
            return Ok(());
        }

        self.push_aborted.store(false, Ordering::Release);
        for side in Role::ALL {
            if self.flushed[side.index()].swap(false, Ordering::AcqRel) {
                self.saw_eos[side.index()].store(false, Ordering::Release);
            }
        }
        self.reset_eos_polls();
        log::info!("[PAIR] {} flush stop from {}, resuming", self.pair, role);
        Ok(())
    }

    /// `role` reached end-of-stream
    pub fn eos(&self, role: Role) -> SyncResult<()> {
        self.ensure_live(role)?;
        if !self.saw_eos[role.index()].swap(true, Ordering::AcqRel) {
            log::info!("[PAIR] {} {} reached end-of-stream", self.pair, role);
        }
        self.wake_all();
        Ok(())
    }

    /// Downstream rejected a frame from `role`; abort every wait until the
    /// next flush cycle
    pub fn push_aborted(&self, role: Role) -> SyncResult<()> {
        self.ensure_live(role)?;
        if !self.push_aborted.swap(true, Ordering::AcqRel) {
            log::warn!("[PAIR] {} push aborted by {}", self.pair, role);
        }
        self.wake_all();
        Ok(())
    }

    /// Tear the session down and wake every waiter with `Aborted`
    ///
    /// Returns `false` if it was already torn down.
    pub fn tear_down(&self, by: Role) -> bool {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return false;
        }

        for gate in &self.gates {
            gate.reset();
        }
        for latch in self.handshakes.iter().flatten() {
            latch.clear();
        }
        self.wake_all();

        let [base, dependent] = Role::ALL.map(|role| self.stats(role));
        log::info!(
            "[PAIR] {} torn down by {} (base: {} matched / {} dropped, dependent: {} matched / {} dropped)",
            self.pair,
            by,
            base.matched,
            base.dropped(),
            dependent.matched,
            dependent.dropped()
        );
        true
    }

    pub fn stats(&self, role: Role) -> SideStatsSnapshot {
        self.stats[role.index()].snapshot()
    }

    fn reset_eos_polls(&self) {
        for polls in self.eos_polls.iter().flatten() {
            polls.store(0, Ordering::Relaxed);
        }
    }

    fn wake_all(&self) {
        for gate in &self.gates {
            gate.wake();
        }
        for latch in self.handshakes.iter().flatten() {
            latch.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ms(v: u64) -> Option<Duration> {
        Some(Duration::from_millis(v))
    }

    fn active_session() -> Arc<PairSession> {
        let session = Arc::new(PairSession::new(PairId(1), SyncConfig::fast()));
        session.attach(Role::Base).unwrap();
        session.attach(Role::Dependent).unwrap();
        session
    }

    #[test]
    fn test_state_transitions() {
        let session = PairSession::new(PairId(1), SyncConfig::fast());
        session.attach(Role::Dependent).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingPeer);

        session.attach(Role::Base).unwrap();
        assert_eq!(session.state(), SessionState::Active);

        session.flush_start(Role::Base).unwrap();
        assert_eq!(session.state(), SessionState::Draining);
        session.flush_stop(Role::Base).unwrap();
        assert_eq!(session.state(), SessionState::Active);

        assert!(session.tear_down(Role::Base));
        assert_eq!(session.state(), SessionState::TornDown);
        assert!(!session.tear_down(Role::Dependent));
    }

    #[test]
    fn test_role_can_only_be_claimed_once() {
        let session = PairSession::new(PairId(3), SyncConfig::fast());
        session.attach(Role::Base).unwrap();
        assert_eq!(
            session.attach(Role::Base),
            Err(SyncError::RoleTaken {
                pair: PairId(3),
                role: Role::Base
            })
        );
    }

    #[test]
    fn test_unpaired_until_peer_registers() {
        let session = PairSession::new(PairId(1), SyncConfig::fast());
        session.attach(Role::Base).unwrap();
        session.publish(Role::Base, Direction::Input, ms(10)).unwrap();

        let start = Instant::now();
        let result = session.rendezvous(Role::Base, Direction::Input, None);
        assert_eq!(result.outcome, Outcome::Unpaired);
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(session.stats(Role::Base).unpaired, 1);
    }

    #[test]
    fn test_publish_requires_registration() {
        let session = PairSession::new(PairId(2), SyncConfig::fast());
        session.attach(Role::Base).unwrap();
        assert_eq!(
            session.publish(Role::Dependent, Direction::Output, ms(1)),
            Err(SyncError::NotRegistered {
                pair: PairId(2),
                role: Role::Dependent
            })
        );
    }

    #[test]
    fn test_matched_exchanges_carried_values() {
        let session = active_session();
        session.publish(Role::Base, Direction::Output, ms(40)).unwrap();
        session.publish(Role::Dependent, Direction::Output, ms(40)).unwrap();

        let peer = Arc::clone(&session);
        let handle = thread::spawn(move || peer.rendezvous(Role::Dependent, Direction::Output, None));

        let mine = session.rendezvous(Role::Base, Direction::Output, ms(40));
        let theirs = handle.join().unwrap();

        assert_eq!(mine.outcome, Outcome::Matched);
        assert_eq!(mine.peer_value, None);
        assert_eq!(theirs.outcome, Outcome::Matched);
        assert_eq!(theirs.peer_value, ms(40));
    }

    #[test]
    fn test_handshake_times_out_when_peer_never_compares() {
        let session = active_session();
        session.publish(Role::Base, Direction::Input, ms(10)).unwrap();
        session.publish(Role::Dependent, Direction::Input, ms(10)).unwrap();

        let result = session.rendezvous(Role::Base, Direction::Input, None);
        assert_eq!(result.outcome, Outcome::TimedOut);

        let stats = session.stats(Role::Base);
        assert_eq!(stats.handshake_timeouts, 1);
        assert_eq!(stats.timed_out, 1);
        // Dropped frame is withdrawn from pairing, and no latch leaks.
        assert_eq!(session.peek(Role::Base, Direction::Input), None);
        assert!(!session.handshakes[Direction::Input.index()][Role::Base.index()].is_done());
    }

    #[test]
    fn test_flush_clears_slots_and_latches() {
        let session = active_session();
        session.publish(Role::Base, Direction::Input, ms(10)).unwrap();
        session.publish(Role::Dependent, Direction::Output, ms(5)).unwrap();
        session.handshakes[0][1].signal_done(None);

        session.flush_start(Role::Dependent).unwrap();

        for direction in Direction::ALL {
            for role in Role::ALL {
                assert_eq!(session.peek(role, direction), None);
            }
        }
        assert!(session.handshakes.iter().flatten().all(|latch| !latch.is_done()));
    }

    #[test]
    fn test_wait_aborts_while_draining() {
        let session = active_session();
        session.flush_start(Role::Base).unwrap();

        session.publish(Role::Dependent, Direction::Input, ms(10)).unwrap();
        session.publish(Role::Base, Direction::Input, ms(10)).unwrap();
        assert_eq!(
            session.rendezvous(Role::Dependent, Direction::Input, None).outcome,
            Outcome::Aborted
        );
    }

    #[test]
    fn test_draining_until_both_sides_stop() {
        let session = active_session();
        session.push_aborted(Role::Base).unwrap();
        session.eos(Role::Dependent).unwrap();
        session.flush_start(Role::Base).unwrap();
        session.flush_start(Role::Dependent).unwrap();

        session.flush_stop(Role::Base).unwrap();
        assert_eq!(session.state(), SessionState::Draining);
        assert!(session.saw_eos(Role::Dependent));

        session.flush_stop(Role::Dependent).unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(!session.saw_eos(Role::Dependent));
        assert!(!session.push_aborted.load(Ordering::Acquire));
    }

    #[test]
    fn test_flush_by_one_side_keeps_peer_eos() {
        let session = active_session();
        session.eos(Role::Base).unwrap();

        session.flush_start(Role::Dependent).unwrap();
        session.flush_stop(Role::Dependent).unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.saw_eos(Role::Base));
        assert!(!session.saw_eos(Role::Dependent));

        // The base side is gone for good, so the dependent gives up after
        // the EOS poll budget instead of the full absent-peer wait.
        session.publish(Role::Dependent, Direction::Input, ms(10)).unwrap();
        let started = Instant::now();
        let result = session.rendezvous(Role::Dependent, Direction::Input, None);
        assert_eq!(result.outcome, Outcome::TimedOut);
        assert!(started.elapsed() < session.config().absent_wait());
    }

    #[test]
    fn test_flush_by_eos_side_clears_its_eos() {
        let session = active_session();
        session.eos(Role::Base).unwrap();
        session.flush_start(Role::Base).unwrap();
        session.flush_stop(Role::Base).unwrap();
        assert!(!session.saw_eos(Role::Base));

        // The flushed marker does not leak into the next cycle.
        session.eos(Role::Base).unwrap();
        session.flush_start(Role::Dependent).unwrap();
        session.flush_stop(Role::Dependent).unwrap();
        assert!(session.saw_eos(Role::Base));
    }

    #[test]
    fn test_push_abort_aborts_waits() {
        let session = active_session();
        session.publish(Role::Base, Direction::Output, ms(10)).unwrap();
        session.publish(Role::Dependent, Direction::Output, ms(10)).unwrap();
        session.push_aborted(Role::Dependent).unwrap();

        assert_eq!(
            session.rendezvous(Role::Base, Direction::Output, None).outcome,
            Outcome::Aborted
        );
    }

    #[test]
    fn test_tear_down_wakes_blocked_waiter() {
        let session = Arc::new(PairSession::new(
            PairId(9),
            SyncConfig {
                ahead_wait_ms: 10_000,
                ..SyncConfig::fast()
            },
        ));
        session.attach(Role::Base).unwrap();
        session.attach(Role::Dependent).unwrap();
        session.publish(Role::Base, Direction::Input, ms(50)).unwrap();
        session.publish(Role::Dependent, Direction::Input, ms(10)).unwrap();

        let peer = Arc::clone(&session);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            peer.tear_down(Role::Dependent)
        });

        let start = Instant::now();
        let result = session.rendezvous(Role::Base, Direction::Input, None);
        assert_eq!(result.outcome, Outcome::Aborted);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(handle.join().unwrap());

        assert_eq!(
            session.publish(Role::Base, Direction::Input, ms(60)),
            Err(SyncError::TornDown { pair: PairId(9) })
        );
        assert_eq!(
            session.rendezvous(Role::Base, Direction::Input, None).outcome,
            Outcome::Aborted
        );
    }
}
