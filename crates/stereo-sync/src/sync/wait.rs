//! Cancellable bounded condition wait
//!
//! Every blocking point in the crate (peer slot absent, this side ahead,
//! peer latch not yet set) goes through [`wait_until`]. The caller supplies
//! a check that inspects the guarded state and the cancellation flags and
//! either settles the wait or asks to keep waiting.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lock a mutex, recovering the data if a panicking thread poisoned it
///
/// A panic on one decoder thread must not wedge the other eye.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait on `cond` until `check` settles or `limit` elapses
///
/// `check` runs under the lock before the first wait and after every wake,
/// spurious or not. Each condvar wait lasts at most `slice`, so flags that
/// are flipped without a notification are still seen within one slice.
///
/// Returns the guard and `Some(result)`, or `None` when `limit` expired
/// without `check` settling.
pub(crate) fn wait_until<'a, T, R>(
    cond: &Condvar,
    mut guard: MutexGuard<'a, T>,
    limit: Duration,
    slice: Duration,
    mut check: impl FnMut(&mut T) -> Option<R>,
) -> (MutexGuard<'a, T>, Option<R>) {
    let deadline = Instant::now() + limit;

    loop {
        if let Some(result) = check(&mut guard) {
            return (guard, Some(result));
        }

        let now = Instant::now();
        if now >= deadline {
            return (guard, None);
        }

        let timeout = slice.min(deadline - now);
        guard = match cond.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
    }
}
