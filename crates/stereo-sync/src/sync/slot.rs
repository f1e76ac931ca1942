//! Per-side timestamp cell

use std::time::Duration;

/// Last timestamp published by one side
///
/// `None` is the "not yet known" sentinel. The slot lives inside its gate's
/// mutex; it has no locking of its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeSlot {
    value: Option<Duration>,
    /// Number of publishes since creation (diagnostics only)
    publishes: u64,
}

impl TimeSlot {
    /// Create an empty slot
    pub const fn new() -> Self {
        Self {
            value: None,
            publishes: 0,
        }
    }

    /// Current value, `None` while unknown
    #[inline]
    pub fn get(&self) -> Option<Duration> {
        self.value
    }

    #[inline]
    pub fn is_known(&self) -> bool {
        self.value.is_some()
    }

    /// Store this side's timestamp for the current frame
    pub fn publish(&mut self, value: Option<Duration>) {
        self.value = value;
        self.publishes = self.publishes.wrapping_add(1);
    }

    /// Back to unknown (flush, teardown, dropped frame)
    pub fn reset(&mut self) {
        self.value = None;
    }

    pub fn publishes(&self) -> u64 {
        self.publishes
    }
}
