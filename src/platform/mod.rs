//! The underlying platform upon which the file layer resides.
//!
//! The top-level trait that denotes something is a valid platform is [`Provider`]. This trait is
//! merely a collection of subtraits that could be composed independently from various other crates
//! that implement them upon various types.

#[cfg(test)]
pub(crate) mod mock;

/// A provider of a platform upon which the file layer can execute.
///
/// Ideally, a [`Provider`] is zero-sized, and only exists to provide access to functionality
/// provided by it. _However_, most of the provided APIs within the provider act upon an `&self` to
/// allow storage of any useful "globals" within it necessary.
pub trait Provider: RawMutexProvider + DebugLogProvider {}

/// A provider of raw mutexes
pub trait RawMutexProvider {
    type RawMutex: RawMutex;
}

/// A raw mutex/lock API; expected to roughly match (or even be implemented using) a Linux futex.
pub trait RawMutex: Send + Sync {
    /// The initial (unlocked, no waiters) state for the raw mutex.
    const INIT: Self;

    /// Returns a reference to the underlying atomic value
    fn underlying_atomic(&self) -> &core::sync::atomic::AtomicU32;

    /// Wake up `n` threads blocked on this raw mutex.
    ///
    /// Returns the number of waiters that were woken up.
    fn wake_many(&self, n: usize) -> usize;

    /// Wake up one thread blocked on this raw mutex.
    ///
    /// Returns true if this actually woke up such a thread, or false if no thread was waiting on this raw mutex.
    fn wake_one(&self) -> bool {
        self.wake_many(1) > 0
    }

    /// Wake up all threads that are blocked on this raw mutex.
    ///
    /// Returns the number of waiters that were woken up.
    fn wake_all(&self) -> usize {
        self.wake_many(usize::MAX)
    }

    /// If the underlying value is `val`, block until a wake operation wakes us up.
    fn block(&self, val: u32) -> Result<(), ImmediatelyWokenUp>;
}

/// A zero-sized struct indicating that the block was immediately unblocked (due to non-matching
/// value).
pub struct ImmediatelyWokenUp;

/// An interface to dumping debug output for tracing purposes.
pub trait DebugLogProvider {
    /// Print `msg` to the debug log
    ///
    /// Newlines are *not* automatically appended to `msg`, thus the caller must make sure to
    /// include newlines if necessary.
    ///
    /// On some platforms, this might be a slow/expensive operation, thus ideally callers of this
    /// should prefer not making a large number of small prints to print a single logical message,
    /// but instead should combine all strings part of a single logical message into a single
    /// `debug_log_print` call.
    fn debug_log_print(&self, msg: &str);
}
