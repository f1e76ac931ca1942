//! Common types for stereo-sync
//!
//! Roles, gate directions and the decisions handed back to the decoder
//! loops after each rendezvous.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of sides in a stereoscopic pair (Base/Left and Dependent/Right)
pub const NUM_SIDES: usize = 2;

/// Number of gate directions (input/DTS and output/PTS)
pub const NUM_DIRECTIONS: usize = 2;

/// Role of one decoder instance within a stereoscopic pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum Role {
    /// Base view, carries the left eye
    Base = 0,
    /// Dependent view, carries the right eye
    Dependent = 1,
}

impl Role {
    /// Both roles in index order
    pub const ALL: [Role; NUM_SIDES] = [Role::Base, Role::Dependent];

    /// Slot index of this role (0-1)
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The opposite role
    #[inline]
    pub fn peer(self) -> Role {
        match self {
            Role::Base => Role::Dependent,
            Role::Dependent => Role::Base,
        }
    }

    /// Eye label used in log output
    pub fn name(self) -> &'static str {
        match self {
            Role::Base => "base/left",
            Role::Dependent => "dependent/right",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which timestamp domain a gate compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum Direction {
    /// Decode order: frames submitted to the decoder, compared by DTS
    Input = 0,
    /// Presentation order: frames released to the renderer, compared by PTS
    Output = 1,
}

impl Direction {
    pub const ALL: [Direction; NUM_DIRECTIONS] = [Direction::Input, Direction::Output];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical identity of a stream pair
///
/// Both decoder instances of one stereoscopic stream register with the
/// same id so the registry can hand them the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairId(pub u64);

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pair#{}", self.0)
    }
}

/// Result of comparing this side's timestamp against the peer's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Both timestamps are present and equal: forward the frame
    Matched,
    /// This side is behind the peer (or has no timestamp): skip this frame
    /// and retry with the next one
    MustAdvance,
    /// Flush, push failure or teardown in progress: skip, do not forward
    Aborted,
    /// The peer stalled or ended: skip, do not forward
    TimedOut,
    /// The peer role has not registered yet: forward unsynchronized
    Unpaired,
}

impl Outcome {
    /// Whether the caller should release the current frame downstream
    #[inline]
    pub fn should_forward(self) -> bool {
        matches!(self, Outcome::Matched | Outcome::Unpaired)
    }

    /// Whether the current frame is finished with (dropped) by this outcome
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Outcome::Aborted | Outcome::TimedOut)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matched => write!(f, "matched"),
            Self::MustAdvance => write!(f, "must-advance"),
            Self::Aborted => write!(f, "aborted"),
            Self::TimedOut => write!(f, "timed-out"),
            Self::Unpaired => write!(f, "unpaired"),
        }
    }
}

/// Result of waiting for the peer's "compared done" latch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The peer signalled done; carries the value it handed over
    PeerReady(Option<Duration>),
    Aborted,
    TimedOut,
}

/// Lifecycle state of a pair session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Only one role has registered
    AwaitingPeer,
    /// Both roles registered, no flush in progress
    Active,
    /// At least one side is between flush-start and flush-stop
    Draining,
    /// Finalized; every further wait observes `Aborted`
    TornDown,
}

/// Full result of one rendezvous: gate comparison plus handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rendezvous {
    pub outcome: Outcome,
    /// Value the peer carried across the handshake (only on `Matched`)
    pub peer_value: Option<Duration>,
}

impl Rendezvous {
    pub(crate) fn bare(outcome: Outcome) -> Self {
        Self {
            outcome,
            peer_value: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_peer_is_involution() {
        for role in Role::ALL {
            assert_ne!(role, role.peer());
            assert_eq!(role, role.peer().peer());
        }
        assert_eq!(Role::Base.index(), 0);
        assert_eq!(Role::Dependent.index(), 1);
    }

    #[test]
    fn test_outcome_forwarding() {
        assert!(Outcome::Matched.should_forward());
        assert!(Outcome::Unpaired.should_forward());
        assert!(!Outcome::MustAdvance.should_forward());
        assert!(!Outcome::Aborted.should_forward());
        assert!(!Outcome::TimedOut.should_forward());
        assert!(Outcome::TimedOut.is_terminal());
        assert!(!Outcome::MustAdvance.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(PairId(7).to_string(), "pair#7");
        assert_eq!(Outcome::MustAdvance.to_string(), "must-advance");
        assert_eq!(Direction::Output.to_string(), "output");
    }
}
