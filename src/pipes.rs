//! Unidirectional byte channels backing anonymous and named pipes
//!
//! A [`Pipe`] is one bounded byte channel together with counts of its open read and write
//! endpoints. The file table points any number of handles at one `Pipe`; the endpoint counters,
//! not the handle refcounts, decide end-of-stream and no-reader conditions.

use alloc::sync::Arc;
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer as _, Observer as _, Producer as _, Split as _},
};

use crate::files::Access;
use crate::sync::{Condvar, Mutex, RawSyncPrimitivesProvider};

/// Default channel capacity in bytes, used by anonymous pipes and FIFOs alike.
pub const DEFAULT_CAPACITY: usize = 512;

/// A bounded unidirectional byte channel with open-endpoint accounting.
pub struct Pipe<Platform: RawSyncPrimitivesProvider> {
    state: Mutex<Platform, PipeState>,
    /// Waited on by readers needing data; notified when data arrives or the last writer leaves.
    read_side: Condvar<Platform>,
    /// Waited on by writers needing space; notified when space appears or the last reader leaves.
    write_side: Condvar<Platform>,
}

struct PipeState {
    prod: HeapProd<u8>,
    cons: HeapCons<u8>,
    /// Open read endpoints.
    readopen: u32,
    /// Open write endpoints.
    writeopen: u32,
}

impl<Platform: RawSyncPrimitivesProvider> Pipe<Platform> {
    /// Create a channel holding up to `capacity` bytes, with no endpoints registered yet.
    ///
    /// Callers register endpoints via [`register_open`](Self::register_open) as they hand out
    /// handles.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        assert!(capacity > 0, "pipe of zero capacity");
        let (prod, cons) = HeapRb::new(capacity).split();
        Arc::new(Self {
            state: Mutex::new(PipeState {
                prod,
                cons,
                readopen: 0,
                writeopen: 0,
            }),
            read_side: Condvar::new(),
            write_side: Condvar::new(),
        })
    }

    /// Register newly opened endpoints for the directions named in `access`.
    pub fn register_open(&self, access: Access) {
        let mut state = self.state.lock();
        if access.contains(Access::READ) {
            state.readopen += 1;
        }
        if access.contains(Access::WRITE) {
            state.writeopen += 1;
        }
    }

    /// Read bytes from the channel into `buf`, blocking while it is empty and writers remain.
    ///
    /// Returns the number of bytes read; `0` means end-of-stream (the channel is empty and every
    /// write endpoint is closed), except for an empty `buf`, which always reads `0`.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let mut state = self.state.lock();
        loop {
            if !state.cons.is_empty() {
                let n = state.cons.pop_slice(buf);
                // Space opened up; unblock writers.
                self.write_side.notify_all();
                return n;
            }
            if state.writeopen == 0 {
                return 0;
            }
            state = self.read_side.wait(state);
        }
    }

    /// Write all of `data` into the channel, blocking while it is full and readers remain.
    ///
    /// Fails with [`errors::NoReadersError`] as soon as no read endpoint is left, even if part of
    /// `data` was already transferred; bytes written before the failure stay in the channel.
    pub fn write(&self, data: &[u8]) -> Result<usize, errors::NoReadersError> {
        let mut written = 0;
        let mut state = self.state.lock();
        while written < data.len() {
            if state.readopen == 0 {
                return Err(errors::NoReadersError);
            }
            let n = state.prod.push_slice(&data[written..]);
            if n > 0 {
                written += n;
                self.read_side.notify_all();
            } else {
                state = self.write_side.wait(state);
            }
        }
        Ok(written)
    }

    /// Remove one endpoint of every direction named in `access` during handle-close bookkeeping.
    ///
    /// Retirement mirrors [`register_open`](Self::register_open): a handle open for both
    /// directions gives both counters back. When a direction's count reaches zero, every waiter
    /// that needed that direction is woken so it can observe end-of-stream or the loss of its
    /// readers. Returns whether both counts are now zero, i.e. the channel as a whole is dead.
    pub fn release_end(&self, access: Access) -> bool {
        let mut state = self.state.lock();
        if access.contains(Access::WRITE) {
            state.writeopen = state.writeopen.saturating_sub(1);
            if state.writeopen == 0 {
                self.read_side.notify_all();
            }
        }
        if access.contains(Access::READ) {
            state.readopen = state.readopen.saturating_sub(1);
            if state.readopen == 0 {
                self.write_side.notify_all();
            }
        }
        state.readopen == 0 && state.writeopen == 0
    }

    /// Tear down the channel directions named in `access`, unconditionally waking the other side
    /// of each.
    ///
    /// The decrements are clamped at zero, so running this after [`release_end`](Self::release_end)
    /// already emptied a direction is harmless.
    pub fn close_end(&self, access: Access) {
        let mut state = self.state.lock();
        if access.contains(Access::WRITE) {
            state.writeopen = state.writeopen.saturating_sub(1);
            self.read_side.notify_all();
        }
        if access.contains(Access::READ) {
            state.readopen = state.readopen.saturating_sub(1);
            self.write_side.notify_all();
        }
    }

    /// The current open-endpoint counts, `(readopen, writeopen)`.
    pub fn endpoints(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.readopen, state.writeopen)
    }
}

pub mod errors {
    use thiserror::Error;

    /// Possible error from [`Pipe::write`](super::Pipe::write)
    #[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
    #[error("the reading end of this pipe is closed")]
    pub struct NoReadersError;
}
