//! An in-memory inode store and write log, not backed by any physical device.
//!
//! # Warning
//!
//! This has no physical backing store, thus any file contents are erased as soon as the inode
//! objects are dropped.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering::Relaxed};

use crate::sync::{Mutex, RawSyncPrimitivesProvider};

use super::errors::TransferError;
use super::{FileType, Inode, Metadata, WriteLog};

/// An inode holding its file contents in memory.
pub struct MemInode<Platform: RawSyncPrimitivesProvider> {
    ino: u64,
    file_type: FileType,
    state: Mutex<Platform, MemInodeState>,
}

struct MemInodeState {
    data: Vec<u8>,
    /// Number of directory links. Dropping the last in-memory reference while this is zero
    /// deallocates the contents.
    nlink: u16,
    /// Number of in-memory references handed out.
    refs: u32,
    /// Whether a named pipe is currently registered against this inode.
    fifo_registered: bool,
}

impl<Platform: RawSyncPrimitivesProvider> MemInode<Platform> {
    /// Create a new inode with one in-memory reference and one directory link.
    #[must_use]
    pub fn new(ino: u64, file_type: FileType) -> Arc<Self> {
        Arc::new(Self {
            ino,
            file_type,
            state: Mutex::new(MemInodeState {
                data: Vec::new(),
                nlink: 1,
                refs: 1,
                fifo_registered: false,
            }),
        })
    }

    /// Take one more in-memory reference, as a path-walking open would.
    pub fn retain(&self) {
        self.state.lock().refs += 1;
    }

    /// Remove one directory link, as an unlink(2)-style path operation would.
    pub fn unlink(&self) {
        let mut state = self.state.lock();
        assert!(state.nlink > 0, "unlink of a link-less inode");
        state.nlink -= 1;
    }

    /// Record that a named pipe has been set up against this inode.
    pub fn register_fifo(&self) {
        self.state.lock().fifo_registered = true;
    }

    /// Whether a named pipe is currently registered against this inode.
    pub fn fifo_registered(&self) -> bool {
        self.state.lock().fifo_registered
    }

    /// Whether any in-memory references are still outstanding.
    pub fn in_use(&self) -> bool {
        self.state.lock().refs > 0
    }

    /// Snapshot of the file contents.
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }
}

impl<Platform: RawSyncPrimitivesProvider> Inode for MemInode<Platform> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, TransferError> {
        let state = self.state.lock();
        let offset = usize::try_from(offset).map_err(|_| TransferError::OutOfRange)?;
        if offset > state.data.len() {
            return Err(TransferError::OutOfRange);
        }
        let n = buf.len().min(state.data.len() - offset);
        buf[..n].copy_from_slice(&state.data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&self, data: &[u8], offset: u64) -> Result<usize, TransferError> {
        let mut state = self.state.lock();
        let offset = usize::try_from(offset).map_err(|_| TransferError::OutOfRange)?;
        let end = offset
            .checked_add(data.len())
            .ok_or(TransferError::OutOfRange)?;
        if end > state.data.len() {
            state.data.resize(end, 0);
        }
        state.data[offset..end].copy_from_slice(data);
        Ok(data.len())
    }

    fn metadata(&self) -> Metadata {
        let state = self.state.lock();
        Metadata {
            file_type: self.file_type,
            ino: self.ino,
            nlink: state.nlink,
            size: state.data.len() as u64,
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        assert!(state.refs > 0, "release of an unreferenced inode");
        state.refs -= 1;
        if state.refs == 0 && state.nlink == 0 {
            // No link and no reference left: the equivalent of on-disk deallocation.
            state.data = Vec::new();
        }
    }

    fn clear_fifo_registration(&self) {
        self.state.lock().fifo_registered = false;
    }
}

/// A write-ahead log that only counts transactions.
///
/// There is no disk to replay into; this exists so the transaction discipline of callers is
/// observable.
pub struct MemLog {
    capacity: usize,
    open: AtomicUsize,
    begun: AtomicUsize,
    committed: AtomicUsize,
}

impl MemLog {
    /// Create a log that admits transactions dirtying up to `capacity` blocks.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            open: AtomicUsize::new(0),
            begun: AtomicUsize::new(0),
            committed: AtomicUsize::new(0),
        })
    }

    /// Total number of transactions opened so far.
    pub fn begun(&self) -> usize {
        self.begun.load(Relaxed)
    }

    /// Total number of transactions committed so far.
    pub fn committed(&self) -> usize {
        self.committed.load(Relaxed)
    }
}

impl WriteLog for MemLog {
    fn begin(&self) {
        self.open.fetch_add(1, Relaxed);
        self.begun.fetch_add(1, Relaxed);
    }

    fn commit(&self) {
        let open = self.open.fetch_sub(1, Relaxed);
        assert!(open > 0, "commit without a matching begin");
        self.committed.fetch_add(1, Relaxed);
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::platform::mock::MockPlatform;

    #[test]
    fn read_past_end_is_out_of_range() {
        let inode = MemInode::<MockPlatform>::new(1, FileType::Regular);
        assert_eq!(inode.write_at(b"abc", 0), Ok(3));
        let mut buf = [0u8; 4];
        assert_eq!(inode.read_at(&mut buf, 4), Err(TransferError::OutOfRange));
        // Reading exactly at the end is an empty read, not an error.
        assert_eq!(inode.read_at(&mut buf, 3), Ok(0));
    }

    #[test]
    fn sparse_write_zero_fills() {
        let inode = MemInode::<MockPlatform>::new(1, FileType::Regular);
        assert_eq!(inode.write_at(b"xy", 4), Ok(2));
        assert_eq!(inode.contents(), b"\0\0\0\0xy");
    }

    #[test]
    fn release_of_unlinked_inode_frees_contents() {
        let inode = MemInode::<MockPlatform>::new(7, FileType::Regular);
        inode.write_at(b"data", 0).unwrap();
        inode.unlink();
        inode.release();
        assert!(!inode.in_use());
        assert!(inode.contents().is_empty());
    }

    #[test]
    fn log_counts_transactions() {
        let log = MemLog::new(8);
        log.begin();
        log.commit();
        log.begin();
        log.commit();
        assert_eq!((log.begun(), log.committed()), (2, 2));
    }

    #[test]
    #[should_panic(expected = "commit without a matching begin")]
    fn commit_without_begin_panics() {
        let log = MemLog::new(8);
        log.commit();
    }
}
