//! The open-file table: a bounded pool of reference-counted handles
//!
//! One [`FileTable`] unifies inode-backed files, anonymous pipes, and named pipes (FIFOs) behind
//! a single handle API. The pool has a fixed capacity chosen at construction, is guarded by one
//! coarse lock, and hands out owned [`FileHandle`] tokens that must be consumed by
//! [`FileTable::close`].
//!
//! Lock ordering is pool lock before pipe lock, never the reverse, and the pool lock is never
//! held across a call that can block (pipe reads and writes, inode transfers, log transactions).

use alloc::boxed::Box;
use alloc::sync::Arc;

use bitflags::bitflags;

use crate::fs::{BLOCK_SIZE, Inode, Metadata, WriteLog};
use crate::pipes::Pipe;
use crate::sync::{Mutex, RawSyncPrimitivesProvider};

pub mod errors;


bitflags! {
    /// Which directions of I/O a handle permits.
    #[repr(transparent)]
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct Access: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
    }
}

/// What a pool slot currently holds.
///
/// Each variant carries exactly the state its kind needs; a slot with `refs == 0` is always
/// `Unused` and vice versa.
pub enum FileKind<Platform: RawSyncPrimitivesProvider> {
    /// A free slot.
    Unused,
    /// One endpoint of an anonymous pipe.
    Pipe {
        pipe: Arc<Pipe<Platform>>,
        access: Access,
    },
    /// One direction of a named pipe: channel data in the pipe, identity in the path inode.
    Fifo {
        pipe: Arc<Pipe<Platform>>,
        inode: Arc<dyn Inode>,
        access: Access,
    },
    /// An inode-backed file with a byte cursor shared by every handle to the slot.
    Inode {
        inode: Arc<dyn Inode>,
        /// Held across the inode transfer itself, so concurrent reads and writes through
        /// duplicated handles each consume a distinct byte range.
        cursor: Arc<Mutex<Platform, u64>>,
        access: Access,
    },
}

impl<Platform: RawSyncPrimitivesProvider> FileKind<Platform> {
    /// An inode-backed kind with its cursor at the start of the file.
    #[must_use]
    pub fn inode(inode: Arc<dyn Inode>, access: Access) -> Self {
        FileKind::Inode {
            inode,
            cursor: Arc::new(Mutex::new(0)),
            access,
        }
    }

    /// The permitted I/O directions. Must only be asked of a live slot.
    fn access(&self) -> Access {
        match self {
            FileKind::Unused => unreachable!("live slot with no kind"),
            FileKind::Pipe { access, .. }
            | FileKind::Fifo { access, .. }
            | FileKind::Inode { access, .. } => *access,
        }
    }
}

struct Slot<Platform: RawSyncPrimitivesProvider> {
    /// Number of outstanding handles to this slot.
    refs: u32,
    kind: FileKind<Platform>,
}

/// An owned (non-clonable) token of ownership over one pool slot.
///
/// A handle **must** be consumed by [`FileTable::close`] (handles to the same slot are minted by
/// [`FileTable::dup`]). Otherwise, (when using crate feature `panic_on_unclosed_handle_drop`),
/// it will panic if dropped without closing.
pub struct FileHandle {
    raw: u32,
    released: bool,
}

impl FileHandle {
    /// Produce a new owned token from a raw index
    ///
    /// Panics if outside the u32 range
    fn new(raw: usize) -> Self {
        Self {
            raw: raw.try_into().unwrap(),
            released: false,
        }
    }

    /// Obtain the raw index it was created with
    fn index(&self) -> usize {
        assert!(!self.released);
        self.raw as usize
    }

    /// Mark it as released by a close operation
    fn mark_released(&mut self) {
        assert!(!self.released);
        self.released = true;
    }

    /// Forge a token for an arbitrary slot, bypassing allocation. Only for exercising the fatal
    /// paths in tests.
    #[cfg(test)]
    pub(crate) fn forged(raw: u32) -> Self {
        Self {
            raw,
            released: false,
        }
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.released {
            // This has been closed out by a valid close operation
        } else {
            // The handle is dropped without being consumed by a `close` operation that has
            // properly marked it as released
            #[cfg(feature = "panic_on_unclosed_handle_drop")]
            panic!("Un-closed FileHandle ({}) being dropped", self.raw)
        }
    }
}

/// Where an I/O call is headed, snapshotted out of a slot so the pool lock can be dropped before
/// the (possibly blocking) transfer.
enum IoTarget<Platform: RawSyncPrimitivesProvider> {
    Pipe(Arc<Pipe<Platform>>),
    Inode(Arc<dyn Inode>, Arc<Mutex<Platform, u64>>),
}

/// The bounded pool of reference-counted open-file handles.
pub struct FileTable<Platform: crate::platform::Provider + Sync + 'static> {
    platform: &'static Platform,
    slots: Mutex<Platform, Box<[Slot<Platform>]>>,
    log: Arc<dyn WriteLog>,
    /// Most bytes one inode-write transaction may carry; see [`max_chunk_bytes`].
    max_chunk: usize,
}

/// Most content bytes one log transaction can carry.
///
/// Out of `log_blocks`, one block goes to the log header, one to the i-node, and two are slop for
/// non-aligned writes; each remaining pair covers one content block plus the allocation it may
/// dirty.
fn max_chunk_bytes(log_blocks: usize) -> usize {
    (log_blocks.saturating_sub(1 + 1 + 2) / 2) * BLOCK_SIZE
}

impl<Platform: crate::platform::Provider + Sync + 'static> FileTable<Platform> {
    /// Create a pool with `capacity` slots, all initially free.
    ///
    /// The pool never grows or shrinks afterwards.
    ///
    /// # Panics
    ///
    /// Panics if `log`'s per-transaction capacity is too small to carry even one content block.
    #[must_use]
    pub fn new(platform: &'static Platform, capacity: usize, log: Arc<dyn WriteLog>) -> Self {
        let max_chunk = max_chunk_bytes(log.capacity());
        assert!(
            max_chunk > 0,
            "write-ahead log too small for a single write transaction"
        );
        let slots = (0..capacity)
            .map(|_| Slot {
                refs: 0,
                kind: FileKind::Unused,
            })
            .collect();
        Self {
            platform,
            slots: Mutex::new(slots),
            log,
            max_chunk,
        }
    }

    /// Claim a free slot for `kind`, returning its first handle.
    ///
    /// The whole scan happens under the pool lock; exhaustion is reported immediately, never
    /// waited out.
    pub fn alloc(&self, kind: FileKind<Platform>) -> Result<FileHandle, errors::ExhaustedError> {
        assert!(
            !matches!(kind, FileKind::Unused),
            "allocating a free file handle"
        );
        let mut slots = self.slots.lock();
        let Some(idx) = slots.iter().position(|slot| slot.refs == 0) else {
            drop(slots);
            self.platform
                .debug_log_print("filetable: out of file handle slots\n");
            return Err(errors::ExhaustedError);
        };
        slots[idx] = Slot { refs: 1, kind };
        Ok(FileHandle::new(idx))
    }

    /// Mint another handle to the slot behind `handle`.
    ///
    /// For named pipes this also registers another open endpoint of each of the handle's
    /// directions, so endpoint accounting stays in step with handle accounting.
    pub fn dup(&self, handle: &FileHandle) -> FileHandle {
        let mut slots = self.slots.lock();
        let slot = &mut slots[handle.index()];
        assert!(slot.refs >= 1, "dup of a free file handle");
        slot.refs += 1;
        if let FileKind::Fifo { pipe, access, .. } = &slot.kind {
            // pool -> pipe lock order
            pipe.register_open(*access);
        }
        FileHandle::new(handle.index())
    }

    /// Read from the object behind `handle` into `buf`.
    ///
    /// Pipe and FIFO handles block until data or end-of-stream; inode handles transfer at the
    /// shared cursor and advance it by the number of bytes read. Partial reads are valid.
    pub fn read(&self, handle: &FileHandle, buf: &mut [u8]) -> Result<usize, errors::ReadError> {
        let slots = self.slots.lock();
        let slot = &slots[handle.index()];
        assert!(slot.refs >= 1, "read through a free file handle");
        if !slot.kind.access().contains(Access::READ) {
            return Err(errors::ReadError::NotForReading);
        }
        let target = match &slot.kind {
            FileKind::Unused => unreachable!("live slot with no kind"),
            FileKind::Pipe { pipe, .. } | FileKind::Fifo { pipe, .. } => {
                IoTarget::Pipe(Arc::clone(pipe))
            }
            FileKind::Inode { inode, cursor, .. } => {
                IoTarget::Inode(Arc::clone(inode), Arc::clone(cursor))
            }
        };
        drop(slots);

        match target {
            IoTarget::Pipe(pipe) => Ok(pipe.read(buf)),
            IoTarget::Inode(inode, cursor) => {
                let mut offset = cursor.lock();
                let n = inode.read_at(buf, *offset)?;
                *offset += n as u64;
                Ok(n)
            }
        }
    }

    /// Write `data` to the object behind `handle`.
    ///
    /// Pipe and FIFO handles block until everything is transferred or the readers disappear.
    /// Inode handles go through the transaction splitter: the write is cut into chunks of at most
    /// the log's per-transaction byte ceiling, each bracketed in its own transaction. Chunks
    /// committed before a collaborator failure stay committed; the error then reports how many
    /// bytes they covered.
    pub fn write(&self, handle: &FileHandle, data: &[u8]) -> Result<usize, errors::WriteError> {
        let slots = self.slots.lock();
        let slot = &slots[handle.index()];
        assert!(slot.refs >= 1, "write through a free file handle");
        if !slot.kind.access().contains(Access::WRITE) {
            return Err(errors::WriteError::NotForWriting);
        }
        let target = match &slot.kind {
            FileKind::Unused => unreachable!("live slot with no kind"),
            FileKind::Pipe { pipe, .. } | FileKind::Fifo { pipe, .. } => {
                IoTarget::Pipe(Arc::clone(pipe))
            }
            FileKind::Inode { inode, cursor, .. } => {
                IoTarget::Inode(Arc::clone(inode), Arc::clone(cursor))
            }
        };
        drop(slots);

        match target {
            IoTarget::Pipe(pipe) => Ok(pipe.write(data)?),
            IoTarget::Inode(inode, cursor) => self.write_chunked(&inode, &cursor, data),
        }
    }

    /// The transaction splitter for inode writes.
    ///
    /// The cursor lock is taken per chunk, inside the transaction, so writes through duplicated
    /// handles interleave at chunk granularity without ever overlapping.
    fn write_chunked(
        &self,
        inode: &Arc<dyn Inode>,
        cursor: &Mutex<Platform, u64>,
        data: &[u8],
    ) -> Result<usize, errors::WriteError> {
        let mut written = 0;
        while written < data.len() {
            let chunk = (data.len() - written).min(self.max_chunk);
            self.log.begin();
            let mut offset = cursor.lock();
            let wrote = inode.write_at(&data[written..written + chunk], *offset);
            if let Ok(n) = wrote {
                *offset += n as u64;
            }
            drop(offset);
            self.log.commit();
            match wrote {
                Ok(n) if n == chunk => written += n,
                Ok(0) | Err(_) => {
                    return Err(errors::WriteError::Io {
                        transferred: written,
                    });
                }
                // The transaction already committed a partial transfer; offsets can no longer be
                // trusted.
                Ok(_) => panic!("short write inside a committed transaction"),
            }
        }
        Ok(written)
    }

    /// Snapshot the metadata of the inode behind `handle`.
    pub fn stat(&self, handle: &FileHandle) -> Result<Metadata, errors::StatError> {
        let slots = self.slots.lock();
        let slot = &slots[handle.index()];
        assert!(slot.refs >= 1, "stat of a free file handle");
        let inode = match &slot.kind {
            FileKind::Unused => unreachable!("live slot with no kind"),
            FileKind::Inode { inode, .. } | FileKind::Fifo { inode, .. } => Arc::clone(inode),
            FileKind::Pipe { .. } => return Err(errors::StatError::NotInodeBacked),
        };
        drop(slots);
        Ok(inode.metadata())
    }

    /// Consume `handle`, running the two-phase close protocol.
    ///
    /// Phase 1 does the bookkeeping under the pool lock: FIFO handles retire the pipe endpoints
    /// of their held directions (which can force the whole named pipe dead even while handles
    /// remain), and the slot's
    /// refcount drops. If the slot stays live, that is all. Otherwise the slot's kind is taken
    /// over and the slot freed, and Phase 2 tears the object down with no pool lock held: pipe
    /// directions are closed out, FIFO inodes forget their pipe registration, and the last inode
    /// reference is released inside a log transaction.
    pub fn close(&self, mut handle: FileHandle) {
        let mut slots = self.slots.lock();
        let idx = handle.index();
        handle.mark_released();
        let slot = &mut slots[idx];
        assert!(slot.refs >= 1, "close of a free file handle");

        let mut forced = false;
        if let FileKind::Fifo { pipe, access, .. } = &slot.kind {
            // pool -> pipe lock order
            forced = pipe.release_end(*access);
        }
        slot.refs -= 1;
        if slot.refs > 0 && !forced {
            return;
        }

        // The slot (or the whole named pipe) is dead: take ownership of its kind and free it.
        let kind = core::mem::replace(&mut slot.kind, FileKind::Unused);
        slot.refs = 0;
        drop(slots);

        match kind {
            FileKind::Unused => unreachable!("live slot with no kind"),
            FileKind::Pipe { pipe, access } => {
                pipe.close_end(access);
            }
            FileKind::Fifo {
                pipe,
                inode,
                access,
            } => {
                if forced {
                    self.platform
                        .debug_log_print("filetable: tearing down named pipe\n");
                }
                pipe.close_end(access);
                inode.clear_fifo_registration();
            }
            FileKind::Inode { inode, .. } => {
                // Releasing the last reference to an unlinked inode frees on-disk blocks, so it
                // must sit inside a transaction.
                self.log.begin();
                inode.release();
                self.log.commit();
            }
        }
    }

    /// Number of slots currently in use.
    pub fn live_handles(&self) -> usize {
        self.slots.lock().iter().filter(|slot| slot.refs > 0).count()
    }

    /// The per-chunk byte ceiling of the transaction splitter.
    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }
}
