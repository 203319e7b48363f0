//! Contracts for the inode store and write-ahead log that back inode-backed handles
//!
//! The file table does not own on-disk layout or log internals; it talks to them through the
//! [`Inode`] and [`WriteLog`] traits. A concrete in-memory implementation suitable for hosting
//! the table without a disk lives in [`in_mem`].

pub mod errors;
pub mod in_mem;

use errors::TransferError;

/// The filesystem's fixed block size, in bytes.
///
/// The write-ahead log accounts for dirtied blocks in these units, so the per-transaction write
/// ceiling is derived from this.
pub const BLOCK_SIZE: usize = 512;

/// One open inode in the inode store.
///
/// Implementations perform their own per-inode mutual exclusion; callers may invoke these
/// concurrently from multiple handles to the same inode. Partial transfers are valid results,
/// not errors.
pub trait Inode: Send + Sync {
    /// Read up to `buf.len()` bytes starting at byte `offset` into `buf`.
    ///
    /// Returns the number of bytes actually transferred, which may be less than requested (for
    /// instance, near end of file).
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, TransferError>;

    /// Write `data` starting at byte `offset`.
    ///
    /// Must only be called inside a [`WriteLog`] transaction. Returns the number of bytes
    /// actually transferred.
    fn write_at(&self, data: &[u8], offset: u64) -> Result<usize, TransferError>;

    /// Snapshot of the inode's metadata, taken under the inode's own lock.
    fn metadata(&self) -> Metadata;

    /// Drop one in-memory reference to this inode.
    ///
    /// Releasing the last reference to an unlinked inode deallocates its on-disk storage, which
    /// dirties blocks; the caller must bracket this call in a log transaction.
    fn release(&self);

    /// Clear the inode's cached named-pipe registration, so that a later open of the same path
    /// sets up a fresh pipe.
    fn clear_fifo_registration(&self);
}

/// The write-ahead log bracketing every on-disk mutation.
pub trait WriteLog: Send + Sync {
    /// Open a transaction. May block until log space is available.
    fn begin(&self);

    /// Commit the currently open transaction.
    fn commit(&self);

    /// The maximum number of blocks one transaction may dirty.
    fn capacity(&self) -> usize;
}

/// A point-in-time snapshot of an inode's metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct Metadata {
    pub file_type: FileType,
    /// Inode number within the store.
    pub ino: u64,
    /// Number of directory links to the inode.
    pub nlink: u16,
    /// Size of the file contents, in bytes.
    pub size: u64,
}

/// What kind of object an inode is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum FileType {
    Regular,
    Directory,
    /// A named pipe; its data lives in a [`Pipe`](crate::pipes::Pipe), not in the inode.
    Fifo,
}
