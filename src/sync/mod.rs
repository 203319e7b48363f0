//! Higher-level synchronization primitives
//!
//! The implementation of [`Mutex`] in this module is derived from related source files in Rust's
//! `std`. The files have been modified significantly to support invoking through the
//! [`platform`], rather than through regular system interfaces.

use crate::platform;

mod condvar;
mod mutex;

pub use condvar::Condvar;
pub use mutex::{Mutex, MutexGuard};

/// A convenience name for specific requirements from the platform
pub trait RawSyncPrimitivesProvider: platform::RawMutexProvider + Sync + 'static {}
impl<Platform> RawSyncPrimitivesProvider for Platform where
    Platform: platform::RawMutexProvider + Sync + 'static
{
}
