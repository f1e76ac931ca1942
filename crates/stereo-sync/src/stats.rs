//! Per-side rendezvous diagnostics
//!
//! Counters are written by the owning decoder thread and may be read from
//! anywhere. All operations use `Ordering::Relaxed`: they are diagnostics,
//! nothing synchronizes on them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::Outcome;

/// Lock-free outcome counters for one side of a session
#[derive(Debug, Default)]
pub struct SideStats {
    matched: AtomicU64,
    must_advance: AtomicU64,
    aborted: AtomicU64,
    timed_out: AtomicU64,
    unpaired: AtomicU64,
    handshake_timeouts: AtomicU64,
}

impl SideStats {
    /// Count one rendezvous outcome, returning the new count for that outcome
    pub fn record(&self, outcome: Outcome) -> u64 {
        let counter = match outcome {
            Outcome::Matched => &self.matched,
            Outcome::MustAdvance => &self.must_advance,
            Outcome::Aborted => &self.aborted,
            Outcome::TimedOut => &self.timed_out,
            Outcome::Unpaired => &self.unpaired,
        };
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_handshake_timeout(&self) -> u64 {
        self.handshake_timeouts.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> SideStatsSnapshot {
        SideStatsSnapshot {
            matched: self.matched.load(Ordering::Relaxed),
            must_advance: self.must_advance.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            unpaired: self.unpaired.load(Ordering::Relaxed),
            handshake_timeouts: self.handshake_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SideStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideStatsSnapshot {
    pub matched: u64,
    pub must_advance: u64,
    pub aborted: u64,
    pub timed_out: u64,
    pub unpaired: u64,
    /// Included in `timed_out` as well
    pub handshake_timeouts: u64,
}

impl SideStatsSnapshot {
    /// Frames skipped because of an abort or timeout
    pub fn dropped(&self) -> u64 {
        self.aborted + self.timed_out
    }

    /// Total rendezvous attempts
    pub fn total(&self) -> u64 {
        self.matched + self.must_advance + self.aborted + self.timed_out + self.unpaired
    }
}
