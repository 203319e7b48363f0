//! Crate-local test-only mock platform for easily running tests in the various modules.

// Pull in `std` for the test-only world, so that we have a nicer/easier time writing tests
extern crate std;

use core::sync::atomic::AtomicU32;

use super::*;

/// A mock platform that is a [`platform::Provider`](Provider), useful purely for testing within
/// this crate.
///
/// Some great features of this mock platform are:
///
/// - Full determinism
/// - Debugging output goes to stderr
/// - It will not mock you for using it during tests
pub(crate) struct MockPlatform {}

impl MockPlatform {
    pub(crate) fn new() -> &'static Self {
        //  Since this is used entirely for tests, leaking a bit of memory is perfectly fine in
        //  order to give ourselves a statically lived platform easily.
        alloc::boxed::Box::leak(alloc::boxed::Box::new(MockPlatform {}))
    }
}

impl Provider for MockPlatform {}

pub(crate) struct MockRawMutex {
    inner: AtomicU32,
    internal_state: std::sync::RwLock<MockRawMutexInternalState>,
}

struct MockRawMutexInternalState {
    number_to_wake_up: usize,
    number_blocked: usize,
}

impl MockRawMutex {
    const fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
            internal_state: std::sync::RwLock::new(MockRawMutexInternalState {
                number_to_wake_up: 0,
                number_blocked: 0,
            }),
        }
    }
}

impl RawMutex for MockRawMutex {
    const INIT: Self = Self::new();

    fn underlying_atomic(&self) -> &AtomicU32 {
        &self.inner
    }

    fn wake_many(&self, n: usize) -> usize {
        let mut internal_state = loop {
            let internal_state = self.internal_state.write().unwrap();
            if internal_state.number_to_wake_up > 0 {
                // Someone is already waking things up right now, let us not mess with it, and wait for our turn.
                drop(internal_state);
                continue;
            }
            break internal_state;
        };
        let num_to_wake_up = internal_state.number_blocked.min(n);
        internal_state.number_to_wake_up = num_to_wake_up;
        drop(internal_state); // actually allow the blocked things to wake up

        // we assume everyone we requested will actually wake up
        num_to_wake_up
    }

    fn block(&self, val: u32) -> Result<(), ImmediatelyWokenUp> {
        // Before we can lose any wake-ups, we go and set the number blocked incremented by one.
        self.internal_state.write().unwrap().number_blocked += 1;

        // We then immediately wake up (without triggering anything else) if we can clearly see that
        // the value is different.
        if self.inner.load(core::sync::atomic::Ordering::SeqCst) != val {
            // We do need to make sure we reset the state, importantly, making sure that if a waker
            // showed up along the way, we actually reset that waker count by one, so we are not
            // leaving it impossible for wakers to handle things later.
            let mut internal_state = self.internal_state.write().unwrap();
            internal_state.number_blocked -= 1;
            if internal_state.number_to_wake_up > 0 {
                internal_state.number_to_wake_up -= 1;
            }
            return Err(ImmediatelyWokenUp);
        }

        // We'll be looping until a wake-up actually arrives for us.
        loop {
            core::hint::spin_loop();

            // Fast-path check first
            if self.internal_state.read().unwrap().number_to_wake_up == 0 {
                continue;
            }

            // Seems like there may actually be stuff to wake up. We re-lock writably.
            let mut internal_state = self.internal_state.write().unwrap();

            // Now we can actually check and do things without anyone else interfering.
            if internal_state.number_to_wake_up == 0 {
                // Seems like someone else picked it up before us, go back to blocking
                continue;
            }

            internal_state.number_to_wake_up -= 1;
            internal_state.number_blocked -= 1;
            return Ok(());
        }
    }
}

impl RawMutexProvider for MockPlatform {
    type RawMutex = MockRawMutex;
}

impl DebugLogProvider for MockPlatform {
    fn debug_log_print(&self, msg: &str) {
        std::eprint!("{msg}");
    }
}
