//! Timing bounds for the rendezvous waits
//!
//! Every blocking wait in the crate is bounded by one of these values, so
//! a stalled or truncated eye costs at most a dropped frame, never a hang.
//! Tune them to the stream's frame cadence.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rendezvous timing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Length of one wait slice in milliseconds
    /// Cancellation flags and EOS are re-checked at least this often.
    /// Default: 2 ms
    pub poll_interval_ms: u64,

    /// Slices tolerated while the peer is at end-of-stream and has not
    /// published, before giving up with `TimedOut`
    /// Default: 500 (≈1 s at the default poll interval)
    pub eos_poll_limit: u32,

    /// Bound on blocking while this side is ahead of the peer
    /// Default: 1000 ms
    pub ahead_wait_ms: u64,

    /// Bound on waiting for a peer that has not published yet and is not at
    /// end-of-stream
    /// Default: 5000 ms
    pub absent_wait_ms: u64,

    /// Absolute deadline for the peer's "compared done" signal
    /// Default: 1000 ms
    pub handshake_timeout_ms: u64,

    /// A session still waiting for its second side after this long is
    /// reported once (not fatal)
    /// Default: 3000 ms
    pub peer_ready_warn_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2,
            eos_poll_limit: 500,
            ahead_wait_ms: 1000,
            absent_wait_ms: 5000,
            handshake_timeout_ms: 1000,
            peer_ready_warn_ms: 3000,
        }
    }
}

impl SyncConfig {
    /// Poll slice, never zero
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn ahead_wait(&self) -> Duration {
        Duration::from_millis(self.ahead_wait_ms)
    }

    pub fn absent_wait(&self) -> Duration {
        Duration::from_millis(self.absent_wait_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn peer_ready_warn(&self) -> Duration {
        Duration::from_millis(self.peer_ready_warn_ms)
    }

    /// Upper bound on a single gate wait, used as the backstop deadline
    ///
    /// A wait can first sit in the absent phase and then in the ahead phase,
    /// so the backstop covers both plus the EOS polling budget.
    pub fn gate_wait_limit(&self) -> Duration {
        let eos_budget = self.poll_interval() * self.eos_poll_limit;
        self.absent_wait().max(eos_budget) + self.ahead_wait() + self.poll_interval()
    }

    /// Short bounds for tests and soak runs
    pub fn fast() -> Self {
        Self {
            poll_interval_ms: 1,
            eos_poll_limit: 50,
            ahead_wait_ms: 200,
            absent_wait_ms: 400,
            handshake_timeout_ms: 200,
            peer_ready_warn_ms: 100,
        }
    }
}
