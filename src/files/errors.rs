//! Possible errors from [`FileTable`] operations

#[expect(
    unused_imports,
    reason = "used for doc string links to work out, but not for code"
)]
use super::FileTable;

use thiserror::Error;

use crate::fs::errors::TransferError;
use crate::pipes::errors::NoReadersError;

/// Possible error from [`FileTable::alloc`]: every slot in the pool is in use.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no free slot in the file table")]
pub struct ExhaustedError;

/// Possible errors from [`FileTable::read`]
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    #[error("file handle not open for reading")]
    NotForReading,
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Possible errors from [`FileTable::write`]
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    #[error("file handle not open for writing")]
    NotForWriting,
    #[error("the reading end of this pipe is closed")]
    NoReaders,
    /// An inode write stopped early; the transactions committed before the failure stay
    /// committed, covering `transferred` bytes.
    #[error("inode write failed after {transferred} bytes were committed")]
    Io { transferred: usize },
}

impl From<NoReadersError> for WriteError {
    fn from(_: NoReadersError) -> Self {
        WriteError::NoReaders
    }
}

/// Possible errors from [`FileTable::stat`]
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatError {
    #[error("anonymous pipes have no backing inode")]
    NotInodeBacked,
}
