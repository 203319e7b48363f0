//! # filetable
//!
//! > The open-file layer of a Unix-like kernel.
//!
//! This crate provides a process-wide, fixed-capacity pool of
//! reference-counted handles ([`files::FileTable`]) that unifies three kinds
//! of open-file objects behind one API: inode-backed regular files, anonymous
//! pipes, and named pipes (FIFOs). Process-level read/write/close/dup/stat
//! paths all go through it.
//!
//! The crate does not own any on-disk format or pipe buffering policy; those
//! live behind the collaborator contracts in [`fs`] (the inode store and the
//! write-ahead log) and the [`pipes::Pipe`] entity. To use it, you provide a
//! type implementing the [`platform`] traits for raw synchronization and
//! debug output "below", and obtain the handle-pool interface "above".

#![no_std]

extern crate alloc;

pub mod files;
pub mod fs;
pub mod pipes;
pub mod platform;
pub mod sync;
