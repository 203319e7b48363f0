//! Condition variables

use core::sync::atomic::Ordering::Relaxed;

use crate::platform::RawMutex as _;
use crate::platform::RawMutexProvider;

use super::{Mutex, MutexGuard, RawSyncPrimitivesProvider};

/// Condition variables, roughly analogous to Rust's
/// [`std::sync::Condvar`](https://doc.rust-lang.org/std/sync/struct.Condvar.html)
///
/// The underlying atomic of the raw mutex is used as a wake-up sequence counter: every
/// notification bumps it, and a waiter only goes to sleep if no notification arrived since it
/// sampled the counter while still holding the mutex. Waits may wake spuriously, so callers must
/// re-check their condition in a loop.
pub struct Condvar<Platform: RawMutexProvider> {
    futex: Platform::RawMutex,
}

impl<Platform: RawSyncPrimitivesProvider> Condvar<Platform> {
    #[inline]
    pub const fn new() -> Self {
        Self {
            futex: <Platform::RawMutex as crate::platform::RawMutex>::INIT,
        }
    }

    /// Blocks the current thread until this condition variable receives a notification.
    ///
    /// The mutex behind `guard` is atomically released with respect to notifications: a
    /// notification sent by a thread that acquires that mutex after this waiter released it is
    /// guaranteed not to be missed.
    pub fn wait<'a, T>(
        &self,
        guard: MutexGuard<'a, Platform, T>,
    ) -> MutexGuard<'a, Platform, T> {
        // Sample the sequence counter while the mutex is still held, so any notifier that runs
        // after the mutex is released necessarily bumps past what we observed.
        let seq = self.futex.underlying_atomic().load(Relaxed);
        let mutex: &'a Mutex<Platform, T> = MutexGuard::mutex(&guard);
        drop(guard);

        // An `ImmediatelyWokenUp` here means a notification raced in between the release and the
        // block; that just turns into an extra trip around the caller's re-check loop.
        let _ = self.futex.block(seq);

        mutex.lock()
    }

    /// Wakes up one blocked thread on this condvar, if any.
    pub fn notify_one(&self) {
        self.futex.underlying_atomic().fetch_add(1, Relaxed);
        self.futex.wake_one();
    }

    /// Wakes up all blocked threads on this condvar.
    pub fn notify_all(&self) {
        self.futex.underlying_atomic().fetch_add(1, Relaxed);
        self.futex.wake_all();
    }
}

impl<Platform: RawSyncPrimitivesProvider> Default for Condvar<Platform> {
    fn default() -> Self {
        Self::new()
    }
}
