//! Caller-contract errors
//!
//! Runtime conditions (flush, push failure, stalled peer) are reported as
//! [`Outcome`](crate::Outcome) values. These errors only cover misuse of the
//! session API.

use thiserror::Error;

use crate::types::{PairId, Role};

/// Errors returned when a session is used outside its contract
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The role is already held by another live decoder instance
    #[error("{role} side of {pair} is already registered")]
    RoleTaken { pair: PairId, role: Role },

    /// The session was finalized by one of its sides
    #[error("session for {pair} has been torn down")]
    TornDown { pair: PairId },

    /// The handle's role is not attached to the session
    #[error("{role} side of {pair} is not registered")]
    NotRegistered { pair: PairId, role: Role },
}

impl SyncError {
    /// Whether the caller should handle this like an `Aborted` outcome
    pub fn is_abort(&self) -> bool {
        matches!(self, SyncError::TornDown { .. })
    }
}

/// Result type for session operations
pub type SyncResult<T> = Result<T, SyncError>;
