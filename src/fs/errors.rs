//! Possible errors from the inode-store contracts

use thiserror::Error;

/// Possible errors from [`Inode::read_at`](super::Inode::read_at) and
/// [`Inode::write_at`](super::Inode::write_at)
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    #[error("offset is beyond the end of the file")]
    OutOfRange,
    #[error("the underlying device reported a failure")]
    Device,
}
